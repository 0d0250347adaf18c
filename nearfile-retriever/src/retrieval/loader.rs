//! Reading plain-text documents from disk.
//!
//! Only `.txt` and `.md` files are accepted (extension compared without
//! regard to case), and the extension is checked before touching the file.
//! Decoding never fails: a UTF-8 byte order mark is stripped, UTF-16 files
//! are recognised by their BOM, and invalid sequences become U+FFFD. The
//! number of replacements is reported on the [`RawDocument`].

use crate::error::{NearfileError, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

pub const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "md"];

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
const UTF16_LE_BOM: &[u8] = &[0xFF, 0xFE];
const UTF16_BE_BOM: &[u8] = &[0xFE, 0xFF];

/// A path resolved for loading, plus what was known about it when probed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHandle {
    pub path: PathBuf,
    pub exists: bool,
    pub modified: Option<DateTime<Utc>>,
}

impl FileHandle {
    /// Resolve `path` to an absolute path and record its metadata.
    pub fn probe(path: &Path) -> Self {
        let absolute = std::fs::canonicalize(path)
            .or_else(|_| std::path::absolute(path))
            .unwrap_or_else(|_| path.to_path_buf());
        let metadata = std::fs::metadata(&absolute).ok();
        Self {
            exists: metadata.as_ref().is_some_and(|m| m.is_file()),
            modified: metadata
                .and_then(|m| m.modified().ok())
                .map(DateTime::<Utc>::from),
            path: absolute,
        }
    }
}

/// Decoded contents of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDocument {
    pub path: PathBuf,
    pub text: String,
    /// Invalid byte sequences replaced with U+FFFD while decoding.
    pub replaced_sequences: usize,
}

#[derive(Debug, Clone)]
pub struct DocumentLoader {
    max_file_bytes: u64,
}

impl DocumentLoader {
    pub fn new(max_file_bytes: u64) -> Self {
        Self { max_file_bytes }
    }

    /// Fail with `UnsupportedFormat` unless `path` has a supported extension.
    pub fn check_format(path: &Path) -> Result<()> {
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
            Ok(())
        } else {
            Err(NearfileError::UnsupportedFormat {
                path: path.to_path_buf(),
                extension,
            })
        }
    }

    /// Read and decode the file behind `handle`. Blocks on file I/O.
    pub fn load(&self, handle: &FileHandle) -> Result<RawDocument> {
        Self::check_format(&handle.path)?;

        let metadata =
            std::fs::metadata(&handle.path).map_err(|e| NearfileError::unreadable(&handle.path, e))?;
        if !metadata.is_file() {
            return Err(NearfileError::unreadable(&handle.path, "not a regular file"));
        }
        if metadata.len() > self.max_file_bytes {
            return Err(NearfileError::unreadable(
                &handle.path,
                format!(
                    "file is {} bytes, larger than the {} byte limit",
                    metadata.len(),
                    self.max_file_bytes
                ),
            ));
        }

        let bytes = std::fs::read(&handle.path).map_err(|e| NearfileError::unreadable(&handle.path, e))?;
        let (text, replaced_sequences) = decode_text(&bytes);

        if replaced_sequences > 0 {
            tracing::warn!(
                path = %handle.path.display(),
                replaced = replaced_sequences,
                "replaced invalid byte sequences while decoding"
            );
        }
        tracing::debug!(path = %handle.path.display(), bytes = bytes.len(), "loaded document");

        Ok(RawDocument {
            path: handle.path.clone(),
            text,
            replaced_sequences,
        })
    }
}

/// Decode bytes as text, returning the text and the number of replaced
/// invalid sequences.
pub fn decode_text(bytes: &[u8]) -> (String, usize) {
    if let Some(rest) = bytes.strip_prefix(UTF8_BOM) {
        decode_utf8(rest)
    } else if let Some(rest) = bytes.strip_prefix(UTF16_LE_BOM) {
        decode_utf16(rest, u16::from_le_bytes)
    } else if let Some(rest) = bytes.strip_prefix(UTF16_BE_BOM) {
        decode_utf16(rest, u16::from_be_bytes)
    } else {
        decode_utf8(bytes)
    }
}

fn decode_utf8(bytes: &[u8]) -> (String, usize) {
    let mut text = String::with_capacity(bytes.len());
    let mut replaced = 0;
    for chunk in bytes.utf8_chunks() {
        text.push_str(chunk.valid());
        if !chunk.invalid().is_empty() {
            text.push(char::REPLACEMENT_CHARACTER);
            replaced += 1;
        }
    }
    (text, replaced)
}

fn decode_utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> (String, usize) {
    let pairs = bytes.chunks_exact(2);
    let dangling = usize::from(!pairs.remainder().is_empty());
    let units = pairs.map(|p| unit([p[0], p[1]]));

    let mut text = String::with_capacity(bytes.len() / 2);
    let mut replaced = dangling;
    for decoded in char::decode_utf16(units) {
        match decoded {
            Ok(c) => text.push(c),
            Err(_) => {
                text.push(char::REPLACEMENT_CHARACTER);
                replaced += 1;
            }
        }
    }
    if dangling > 0 {
        text.push(char::REPLACEMENT_CHARACTER);
    }
    (text, replaced)
}
