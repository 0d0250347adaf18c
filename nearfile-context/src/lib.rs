//! # nearfile-context
//!
//! Text segmentation for the nearfile retrieval pipeline. Documents are split
//! into sentences on Unicode sentence boundaries and grouped into overlapping
//! windows of a fixed sentence count, so each retrieval unit is a coherent run
//! of prose rather than an arbitrary byte range.
//!
//! - [`sentence`]: sentence detection and the fixed-width fallback split
//! - [`chunker`]: [`SentenceChunker`] and the [`Chunk`] values it yields

pub mod chunker;
pub mod sentence;

pub use chunker::{Chunk, ChunkerConfig, ChunkerConfigError, Chunks, SentenceChunker};
pub use sentence::{Segmentation, segment};
