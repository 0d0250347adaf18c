//! Vector store abstraction.
//!
//! A [`VectorStore`] holds [`IndexRecord`]s: one embedded chunk each, keyed by
//! (source path, chunk index) and carrying an expiry time. Records past their
//! expiry are invisible to every read even before [`VectorStore::purge_expired`]
//! removes them.
//!
//! ## Architecture
//!
//! ```text
//! ingest ──upsert──▶ VectorStore ◀──query── RetrievalEngine
//!                         ▲
//!              sweeper ───┘ purge_expired
//! ```
//!
//! [`sqlite_store::SqliteVectorStore`] is the only implementation. Callers
//! share it as `Arc<dyn VectorStore>`.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use half::f16;
use serde::Serialize;
use std::path::{Path, PathBuf};

pub mod sqlite_store;
pub mod sweeper;

/// Stable record id for a (source path, chunk index) pair.
pub fn record_id(source_path: &Path, chunk_index: usize) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(source_path.as_os_str().as_encoded_bytes());
    hasher.update(&[0]);
    hasher.update(&(chunk_index as u64).to_le_bytes());
    hex::encode(hasher.finalize().as_bytes())
}

/// One embedded chunk as stored.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexRecord {
    pub source_path: PathBuf,
    pub chunk_index: usize,
    pub content: String,
    pub embedding: Vec<f16>,
    pub ingested_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl IndexRecord {
    pub fn id(&self) -> String {
        record_id(&self.source_path, self.chunk_index)
    }
}

/// Restricts which records a query may return.
#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    /// Only records whose source path starts with this prefix.
    pub path_prefix: Option<PathBuf>,
}

impl QueryFilter {
    pub fn path_prefix(prefix: impl Into<PathBuf>) -> Self {
        Self {
            path_prefix: Some(prefix.into()),
        }
    }

    /// Whether `path` passes the filter. Prefixes match whole path
    /// components, so `/notes` admits `/notes/a.txt` but not `/notes2/a.txt`.
    pub fn matches(&self, path: &Path) -> bool {
        self.path_prefix
            .as_ref()
            .is_none_or(|prefix| path.starts_with(prefix))
    }
}

/// A record returned by a similarity query.
#[derive(Debug, Clone)]
pub struct ScoredRecord {
    pub record: IndexRecord,
    /// Cosine similarity with the query vector.
    pub score: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub live_records: u64,
    /// Expired but not yet purged.
    pub expired_records: u64,
    pub distinct_sources: u64,
    pub model_id: Option<String>,
    pub dimension: Option<usize>,
    /// When the oldest live record expires.
    pub next_expiry: Option<DateTime<Utc>>,
    pub retention_minutes: i64,
}

#[async_trait]
pub trait VectorStore: Send + Sync + std::fmt::Debug {
    /// Insert or overwrite records, all in one transaction. Returns the count written.
    async fn upsert(&self, records: Vec<IndexRecord>) -> Result<usize>;

    /// Make `records` the complete content for `source_path`: upsert them and
    /// delete that source's chunks past the new count, in one transaction.
    /// An empty `records` removes the source. Returns the count written.
    async fn replace_source(&self, source_path: &Path, records: Vec<IndexRecord>)
    -> Result<usize>;

    /// Up to `k` live records by descending cosine similarity; equal scores
    /// go to the most recently ingested record.
    async fn query(&self, vector: &[f16], k: usize, filter: &QueryFilter)
    -> Result<Vec<ScoredRecord>>;

    /// Physically delete expired records. Returns the count removed.
    async fn purge_expired(&self) -> Result<u64>;

    async fn live_count(&self) -> Result<u64>;

    async fn stats(&self) -> Result<StoreStats>;

    /// How long a record stays live after ingestion.
    fn retention(&self) -> chrono::Duration;
}

/// Cosine similarity of two vectors; 0.0 for mismatched lengths or zero vectors.
pub fn cosine_similarity(a: &[f16], b: &[f16]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot_product = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b) {
        let x = x.to_f32();
        let y = y.to_f32();
        dot_product += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let norm_a = norm_a.sqrt();
    let norm_b = norm_b.sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}
