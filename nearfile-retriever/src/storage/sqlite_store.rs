//! SQLite implementation of [`VectorStore`].
//!
//! ## Database Schema
//!
//! ```sql
//! CREATE TABLE records (
//!     id TEXT PRIMARY KEY,             -- blake3 of (source_path, chunk_index)
//!     source_path TEXT NOT NULL,
//!     chunk_index INTEGER NOT NULL,
//!     content TEXT NOT NULL,
//!     embedding BLOB NOT NULL,         -- f16 vector
//!     ingested_at INTEGER NOT NULL,    -- unix millis
//!     expires_at INTEGER NOT NULL      -- unix millis
//! );
//!
//! CREATE TABLE store_meta (
//!     key TEXT PRIMARY KEY,            -- 'model_id' | 'dimension'
//!     value TEXT NOT NULL
//! );
//! ```
//!
//! Similarity is computed in memory over the live rows. The store is stamped
//! with the embedding model id and dimension it was opened with; reopening it
//! with a different model fails while any record is still live, and silently
//! resets the store once everything has expired.

use super::{IndexRecord, QueryFilter, ScoredRecord, StoreStats, VectorStore, cosine_similarity};
use crate::clock::Clock;
use crate::error::{NearfileError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use half::f16;
use nearfile_embed::EmbedError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// What an index is stamped with: the vector space its records live in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelStamp {
    pub model_id: String,
    pub dimension: usize,
}

#[derive(Clone)]
pub struct SqliteVectorStore {
    pool: SqlitePool,
    stamp: ModelStamp,
    retention: Duration,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for SqliteVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteVectorStore")
            .field("stamp", &self.stamp)
            .field("retention", &self.retention)
            .finish()
    }
}

impl SqliteVectorStore {
    /// Open (or create) the store at `path`.
    pub async fn open(
        path: &Path,
        stamp: ModelStamp,
        retention: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                NearfileError::config(format!(
                    "cannot create store directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let pool = SqlitePool::connect_with(
            SqliteConnectOptions::new()
                .filename(path)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .busy_timeout(std::time::Duration::from_secs(5))
                .create_if_missing(true)
                .auto_vacuum(sqlx::sqlite::SqliteAutoVacuum::Full)
                .page_size(1 << 16)
                .optimize_on_close(true, 1 << 10),
        )
        .await?;

        tracing::info!(path = %path.display(), model = %stamp.model_id, "opened vector store");
        Self::new_with_pool(pool, stamp, retention, clock).await
    }

    /// In-memory store for tests. A single connection keeps one database alive.
    pub async fn open_memory(
        stamp: ModelStamp,
        retention: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::new_with_pool(pool, stamp, retention, clock).await
    }

    async fn new_with_pool(
        pool: SqlitePool,
        stamp: ModelStamp,
        retention: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        Self::create_tables(&pool).await?;
        let store = Self {
            pool,
            stamp,
            retention,
            clock,
        };
        store.check_stamp().await?;
        Ok(store)
    }

    async fn create_tables(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                id TEXT PRIMARY KEY,
                source_path TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                content TEXT NOT NULL,
                embedding BLOB NOT NULL,
                ingested_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS store_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_expires ON records(expires_at)")
            .execute(pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_source ON records(source_path)")
            .execute(pool)
            .await?;

        Ok(())
    }

    async fn stored_stamp(&self) -> Result<Option<ModelStamp>> {
        let rows = sqlx::query("SELECT key, value FROM store_meta")
            .fetch_all(&self.pool)
            .await?;

        let mut model_id = None;
        let mut dimension = None;
        for row in rows {
            let key: String = row.try_get("key")?;
            let value: String = row.try_get("value")?;
            match key.as_str() {
                "model_id" => model_id = Some(value),
                "dimension" => dimension = value.parse::<usize>().ok(),
                _ => {}
            }
        }

        Ok(match (model_id, dimension) {
            (Some(model_id), Some(dimension)) => Some(ModelStamp {
                model_id,
                dimension,
            }),
            _ => None,
        })
    }

    /// Stamp a fresh store, accept a matching one, and reset or reject a store
    /// built with another model depending on whether it still has live records.
    async fn check_stamp(&self) -> Result<()> {
        match self.stored_stamp().await? {
            Some(stored) if stored == self.stamp => return Ok(()),
            Some(stored) => {
                let live = self.live_count().await?;
                if live > 0 {
                    let source = if stored.model_id == self.stamp.model_id {
                        EmbedError::DimensionMismatch {
                            expected: stored.dimension,
                            actual: self.stamp.dimension,
                        }
                    } else {
                        EmbedError::ModelMismatch {
                            stored: stored.model_id,
                            active: self.stamp.model_id.clone(),
                        }
                    };
                    return Err(NearfileError::embedding("opening the vector store", source));
                }
                tracing::info!(
                    old = %stored.model_id,
                    new = %self.stamp.model_id,
                    "all records expired, re-stamping store for new model"
                );
            }
            None => {}
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM records").execute(&mut *tx).await?;
        for (key, value) in [
            ("model_id", self.stamp.model_id.clone()),
            ("dimension", self.stamp.dimension.to_string()),
        ] {
            sqlx::query(
                r#"
                INSERT INTO store_meta (key, value) VALUES (?1, ?2)
                ON CONFLICT(key) DO UPDATE SET value = excluded.value
                "#,
            )
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub fn stamp(&self) -> &ModelStamp {
        &self.stamp
    }

    fn check_dimension(&self, actual: usize) -> Result<()> {
        if actual != self.stamp.dimension {
            return Err(NearfileError::embedding(
                "checking vector dimension",
                EmbedError::DimensionMismatch {
                    expected: self.stamp.dimension,
                    actual,
                },
            ));
        }
        Ok(())
    }

    fn now_millis(&self) -> i64 {
        self.clock.now().timestamp_millis()
    }
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

async fn write_records(tx: &mut Transaction<'_, Sqlite>, records: &[IndexRecord]) -> Result<()> {
    for record in records {
        sqlx::query(
            r#"
            INSERT INTO records (id, source_path, chunk_index, content, embedding, ingested_at, expires_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
                content = excluded.content,
                embedding = excluded.embedding,
                ingested_at = excluded.ingested_at,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(record.id())
        .bind(record.source_path.to_string_lossy().into_owned())
        .bind(record.chunk_index as i64)
        .bind(&record.content)
        .bind(bytemuck::cast_slice::<f16, u8>(&record.embedding))
        .bind(record.ingested_at.timestamp_millis())
        .bind(record.expires_at.timestamp_millis())
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

fn row_to_record(row: &SqliteRow) -> Result<IndexRecord> {
    let source_path: String = row.try_get("source_path")?;
    let chunk_index: i64 = row.try_get("chunk_index")?;
    let content: String = row.try_get("content")?;
    let embedding_bytes: Vec<u8> = row.try_get("embedding")?;
    let ingested_at: i64 = row.try_get("ingested_at")?;
    let expires_at: i64 = row.try_get("expires_at")?;

    Ok(IndexRecord {
        source_path: PathBuf::from(source_path),
        chunk_index: chunk_index as usize,
        content,
        embedding: bytemuck::pod_collect_to_vec::<u8, f16>(&embedding_bytes),
        ingested_at: from_millis(ingested_at),
        expires_at: from_millis(expires_at),
    })
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn upsert(&self, records: Vec<IndexRecord>) -> Result<usize> {
        for record in &records {
            self.check_dimension(record.embedding.len())?;
        }

        let mut tx = self.pool.begin().await?;
        write_records(&mut tx, &records).await?;
        tx.commit().await?;

        tracing::debug!(records = records.len(), "upserted records");
        Ok(records.len())
    }

    async fn replace_source(
        &self,
        source_path: &Path,
        records: Vec<IndexRecord>,
    ) -> Result<usize> {
        for record in &records {
            self.check_dimension(record.embedding.len())?;
        }

        let keep = records
            .iter()
            .map(|r| r.chunk_index + 1)
            .max()
            .unwrap_or(0);

        let mut tx = self.pool.begin().await?;
        let stale = sqlx::query("DELETE FROM records WHERE source_path = ?1 AND chunk_index >= ?2")
            .bind(source_path.to_string_lossy().into_owned())
            .bind(keep as i64)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        write_records(&mut tx, &records).await?;
        tx.commit().await?;

        tracing::debug!(
            path = %source_path.display(),
            records = records.len(),
            stale,
            "replaced source"
        );
        Ok(records.len())
    }

    async fn query(
        &self,
        vector: &[f16],
        k: usize,
        filter: &QueryFilter,
    ) -> Result<Vec<ScoredRecord>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        self.check_dimension(vector.len())?;

        // The SQL prefix test narrows by string; `Path::starts_with` then
        // keeps only whole-component matches.
        let prefix = filter
            .path_prefix
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned());

        let rows = sqlx::query(
            r#"
            SELECT source_path, chunk_index, content, embedding, ingested_at, expires_at
            FROM records
            WHERE expires_at > ?1
              AND (?2 IS NULL OR substr(source_path, 1, length(?2)) = ?2)
            "#,
        )
        .bind(self.now_millis())
        .bind(prefix)
        .fetch_all(&self.pool)
        .await?;

        let mut scored = Vec::with_capacity(rows.len());
        for row in &rows {
            let record = row_to_record(row)?;
            if !filter.matches(&record.source_path) {
                continue;
            }
            let score = cosine_similarity(vector, &record.embedding);
            scored.push(ScoredRecord { record, score });
        }

        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(b.record.ingested_at.cmp(&a.record.ingested_at))
                .then_with(|| a.record.source_path.cmp(&b.record.source_path))
                .then(a.record.chunk_index.cmp(&b.record.chunk_index))
        });
        scored.truncate(k);

        Ok(scored)
    }

    async fn purge_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM records WHERE expires_at <= ?1")
            .bind(self.now_millis())
            .execute(&self.pool)
            .await?;
        let purged = result.rows_affected();
        if purged > 0 {
            tracing::info!(purged, "purged expired records");
        }
        Ok(purged)
    }

    async fn live_count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE expires_at > ?1")
            .bind(self.now_millis())
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn stats(&self) -> Result<StoreStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN expires_at > ?1 THEN 1 ELSE 0 END), 0) AS live,
                COALESCE(SUM(CASE WHEN expires_at <= ?1 THEN 1 ELSE 0 END), 0) AS expired,
                COUNT(DISTINCT CASE WHEN expires_at > ?1 THEN source_path END) AS sources,
                MIN(CASE WHEN expires_at > ?1 THEN expires_at END) AS next_expiry
            FROM records
            "#,
        )
        .bind(self.now_millis())
        .fetch_one(&self.pool)
        .await?;

        let live: i64 = row.try_get("live")?;
        let expired: i64 = row.try_get("expired")?;
        let sources: i64 = row.try_get("sources")?;
        let next_expiry: Option<i64> = row.try_get("next_expiry")?;
        let stamp = self.stored_stamp().await?;

        Ok(StoreStats {
            live_records: live as u64,
            expired_records: expired as u64,
            distinct_sources: sources as u64,
            model_id: stamp.as_ref().map(|s| s.model_id.clone()),
            dimension: stamp.map(|s| s.dimension),
            next_expiry: next_expiry.map(from_millis),
            retention_minutes: self.retention.num_minutes(),
        })
    }

    fn retention(&self) -> Duration {
        self.retention
    }
}
