//! nearfile-retriever: local semantic indexing and retrieval for text files
//!
//! Find a file by an approximate name, index `.txt` and `.md` documents as
//! overlapping sentence-window chunks with embeddings, and query them by
//! meaning. Indexed chunks live in a SQLite-backed vector store and expire
//! after a retention window (20 minutes by default).
//!
//! ## Key Modules
//!
//! - **[`retrieval`]**: file locator, document loader, ingest pipeline and retrieval engine
//! - **[`storage`]**: the expiring vector store and its SQLite implementation
//! - **[`service`]**: the [`Nearfile`] facade tying everything to one configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nearfile_retriever::{Nearfile, config::NearfileConfig};
//! use std::path::{Path, PathBuf};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let nearfile = Nearfile::open(NearfileConfig::default()).await?;
//!
//! let found = nearfile.locate(Path::new("."), "meeting_notes.txt").await?;
//! let report = nearfile.ingest(&[found.path]).await?;
//! println!("indexed {} chunks", report.chunk_count);
//!
//! for hit in nearfile.retrieve("who owns the budget?", 5).await? {
//!     println!("{:.3} {}#{}", hit.score, hit.source_path.display(), hit.chunk_index);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! locate ─▶ FileLocator ─▶ path
//! ingest ─▶ DocumentLoader ─▶ SentenceChunker ─▶ EmbeddingProvider ─▶ VectorStore
//! retrieve ─▶ EmbeddingProvider ─▶ VectorStore (top 3k) ─▶ dedupe ─▶ top k
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod retrieval;
pub mod service;
pub mod storage;

pub use error::{NearfileError, Result};
pub use service::Nearfile;
