//! Error types for locating, ingesting and retrieving.

use nearfile_embed::EmbedError;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, NearfileError>;

#[derive(Debug, thiserror::Error)]
pub enum NearfileError {
    /// The directory handed to the locator is missing or not a directory.
    #[error("invalid search root {}: {reason}", path.display())]
    InvalidRoot { path: PathBuf, reason: String },

    /// No file under `root` scored at or above the match threshold.
    #[error("no file matching '{target}' under {}", root.display())]
    NotFound { root: PathBuf, target: String },

    #[error("unsupported format '{extension}' for {} (expected .txt or .md)", path.display())]
    UnsupportedFormat { path: PathBuf, extension: String },

    #[error("cannot read {}: {reason}", path.display())]
    UnreadableFile { path: PathBuf, reason: String },

    #[error("embedding failed while {context}: {source}")]
    Embedding {
        context: String,
        #[source]
        source: EmbedError,
    },

    /// Retrieval was attempted while the store held no live records.
    #[error("the index holds no live records; nothing to search for '{query}'")]
    EmptyIndex { query: String },

    #[error("invalid query: {reason}")]
    InvalidQuery { reason: String },

    #[error("vector store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl NearfileError {
    pub fn embedding(context: impl Into<String>, source: EmbedError) -> Self {
        Self::Embedding {
            context: context.into(),
            source,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn unreadable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::UnreadableFile {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Errors tied to a single input file, which ingest records and skips
    /// instead of aborting the batch.
    pub fn is_per_file(&self) -> bool {
        matches!(
            self,
            NearfileError::UnsupportedFormat { .. } | NearfileError::UnreadableFile { .. }
        )
    }
}
