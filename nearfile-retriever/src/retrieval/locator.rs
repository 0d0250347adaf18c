//! Fuzzy file lookup under a directory tree.
//!
//! [`FileLocator::locate`] walks every regular file below a root, scores each
//! file name against the requested name with [`score_filename`], and returns
//! the best match at or above `min_score`. Ties go to the shallower file, then
//! to the lexicographically smaller path.
//!
//! The walk is bounded by `max_depth`, skips `excluded_dirs`, and does not
//! apply ignore files. When symlinks are followed, directory loops are
//! detected by the walker and reported as [`ScanWarning`]s, and a file reached
//! through several links is scored once, under its canonical path, keeping
//! its best-ranked sighting. Unreadable subtrees are also reported as warnings
//! and never fail the lookup. Siblings are visited in case-insensitive name
//! order, so results do not depend on directory listing order.
//!
//! [`FileLocator::tree`] lists the same walk as a [`DirectoryTree`].

use crate::config::LocatorConfig;
use crate::error::{NearfileError, Result};
use crate::retrieval::loader::FileHandle;
use crate::retrieval::scoring::score_filename;
use ignore::WalkBuilder;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// A part of the tree that could not be scanned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanWarning {
    pub path: Option<PathBuf>,
    pub reason: String,
}

impl ScanWarning {
    fn from_walk_error(err: &ignore::Error) -> Self {
        Self {
            path: error_path(err),
            reason: err.to_string(),
        }
    }
}

fn error_path(err: &ignore::Error) -> Option<PathBuf> {
    match err {
        ignore::Error::WithPath { path, .. } => Some(path.clone()),
        ignore::Error::WithDepth { err, .. } => error_path(err),
        ignore::Error::WithLineNumber { err, .. } => error_path(err),
        ignore::Error::Loop { child, .. } => Some(child.clone()),
        _ => None,
    }
}

/// The winning file and how the scan went.
#[derive(Debug, Clone, Serialize)]
pub struct LocateOutcome {
    pub path: PathBuf,
    pub score: f64,
    /// Directory levels below the root.
    pub depth: usize,
    pub candidates_scanned: usize,
    /// Non-empty means the scan was partial.
    pub warnings: Vec<ScanWarning>,
    #[serde(skip)]
    pub handle: FileHandle,
}

impl LocateOutcome {
    pub fn is_partial(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// One entry of a [`DirectoryTree`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeEntry {
    pub path: PathBuf,
    pub name: String,
    /// 1 for direct children of the root.
    pub depth: usize,
    pub is_dir: bool,
}

/// Pre-order listing of a directory.
#[derive(Debug, Clone, Serialize)]
pub struct DirectoryTree {
    pub root: PathBuf,
    pub entries: Vec<TreeEntry>,
    pub warnings: Vec<ScanWarning>,
}

impl DirectoryTree {
    pub fn is_partial(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Box-drawing rendering, one entry per line:
    ///
    /// ```text
    /// ├── docs
    /// │   └── guide.md
    /// └── readme.txt
    /// ```
    pub fn render(&self) -> String {
        let last = last_sibling_flags(&self.entries);
        let mut ancestors_last: Vec<bool> = Vec::new();
        let mut out = String::new();

        for (entry, &is_last) in self.entries.iter().zip(&last) {
            let level = entry.depth.saturating_sub(1);
            ancestors_last.truncate(level);
            for &ancestor_last in &ancestors_last {
                out.push_str(if ancestor_last { "    " } else { "│   " });
            }
            out.push_str(if is_last { "└── " } else { "├── " });
            out.push_str(&entry.name);
            out.push('\n');
            ancestors_last.push(is_last);
        }
        out
    }
}

/// For each pre-order entry, whether it is the last child of its parent.
fn last_sibling_flags(entries: &[TreeEntry]) -> Vec<bool> {
    let mut flags = vec![false; entries.len()];
    let mut seen_at_level: Vec<bool> = Vec::new();
    for (i, entry) in entries.iter().enumerate().rev() {
        let level = entry.depth.saturating_sub(1);
        seen_at_level.resize(level + 1, false);
        flags[i] = !seen_at_level[level];
        seen_at_level[level] = true;
    }
    flags
}

#[derive(Debug)]
struct Candidate {
    path: PathBuf,
    score: f64,
    depth: usize,
}

impl Candidate {
    /// `Less` means `self` ranks ahead of `other`.
    fn rank(&self, other: &Candidate) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then(self.depth.cmp(&other.depth))
            .then_with(|| self.path.cmp(&other.path))
    }
}

#[derive(Debug, Clone)]
pub struct FileLocator {
    config: LocatorConfig,
}

impl FileLocator {
    pub fn new(config: LocatorConfig) -> Self {
        Self { config }
    }

    /// Find the file under `root` whose name best matches `target`. Blocks on
    /// directory I/O.
    pub fn locate(&self, root: &Path, target: &str) -> Result<LocateOutcome> {
        let root = validate_root(root)?;
        let not_found = || NearfileError::NotFound {
            root: root.clone(),
            target: target.to_string(),
        };

        let wanted = Path::new(target.trim())
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(not_found)?;

        // Best sighting per canonical path.
        let mut sightings: HashMap<PathBuf, Candidate> = HashMap::new();
        let mut warnings = Vec::new();

        for result in self.walker(&root) {
            let entry = match result {
                Ok(entry) => entry,
                Err(err) => {
                    warnings.push(warn_partial(&err));
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }

            let canonical =
                std::fs::canonicalize(entry.path()).unwrap_or_else(|_| entry.path().to_path_buf());
            let name = entry.file_name().to_string_lossy();
            let candidate = Candidate {
                score: score_filename(&name, &wanted),
                depth: entry.depth().saturating_sub(1),
                path: canonical.clone(),
            };
            match sightings.get_mut(&canonical) {
                Some(current) if candidate.rank(current) == Ordering::Less => *current = candidate,
                Some(_) => {}
                None => {
                    sightings.insert(canonical, candidate);
                }
            }
        }

        let scanned = sightings.len();
        tracing::debug!(
            root = %root.display(),
            target = %wanted,
            scanned,
            warnings = warnings.len(),
            "scan finished"
        );

        let best = sightings
            .into_values()
            .filter(|c| c.score >= self.config.min_score)
            .min_by(|a, b| a.rank(b))
            .ok_or_else(not_found)?;
        tracing::info!(path = %best.path.display(), score = best.score, "located file");

        Ok(LocateOutcome {
            handle: FileHandle::probe(&best.path),
            path: best.path,
            score: best.score,
            depth: best.depth,
            candidates_scanned: scanned,
            warnings,
        })
    }

    /// List everything under `root`, directories first-visited and siblings
    /// sorted case-insensitively. Excluded directories and the depth bound
    /// apply as for [`FileLocator::locate`]. Blocks on directory I/O.
    pub fn tree(&self, root: &Path) -> Result<DirectoryTree> {
        let root = validate_root(root)?;
        let mut entries = Vec::new();
        let mut warnings = Vec::new();

        for result in self.walker(&root) {
            let entry = match result {
                Ok(entry) => entry,
                Err(err) => {
                    warnings.push(warn_partial(&err));
                    continue;
                }
            };
            if entry.depth() == 0 {
                continue;
            }
            entries.push(TreeEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                depth: entry.depth(),
                is_dir: entry.file_type().is_some_and(|t| t.is_dir()),
                path: entry.into_path(),
            });
        }

        tracing::debug!(root = %root.display(), entries = entries.len(), "tree listed");
        Ok(DirectoryTree {
            root,
            entries,
            warnings,
        })
    }

    fn walker(&self, root: &Path) -> ignore::Walk {
        let excluded: HashSet<String> = self.config.excluded_dirs.iter().cloned().collect();
        WalkBuilder::new(root)
            .standard_filters(false)
            .hidden(false)
            .follow_links(self.config.follow_symlinks)
            .max_depth(Some(self.config.max_depth))
            .sort_by_file_name(|a, b| {
                a.to_string_lossy()
                    .to_lowercase()
                    .cmp(&b.to_string_lossy().to_lowercase())
                    .then_with(|| a.cmp(b))
            })
            .filter_entry(move |entry| {
                let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
                !(is_dir
                    && entry.depth() > 0
                    && excluded.contains(entry.file_name().to_string_lossy().as_ref()))
            })
            .build()
    }
}

fn warn_partial(err: &ignore::Error) -> ScanWarning {
    let warning = ScanWarning::from_walk_error(err);
    tracing::warn!(reason = %warning.reason, "partial scan");
    warning
}

fn validate_root(root: &Path) -> Result<PathBuf> {
    let invalid = |reason: &str| NearfileError::InvalidRoot {
        path: root.to_path_buf(),
        reason: reason.to_string(),
    };
    let metadata = std::fs::metadata(root).map_err(|e| invalid(&e.to_string()))?;
    if !metadata.is_dir() {
        return Err(invalid("not a directory"));
    }
    std::fs::canonicalize(root).map_err(|e| invalid(&e.to_string()))
}
