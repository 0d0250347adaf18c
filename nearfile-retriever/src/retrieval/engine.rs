//! Query-time retrieval over the vector store.

use crate::error::{NearfileError, Result};
use crate::storage::{QueryFilter, VectorStore};
use nearfile_embed::EmbeddingProvider;
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

/// One ranked result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalHit {
    pub text: String,
    pub score: f32,
    pub source_path: PathBuf,
    pub chunk_index: usize,
}

#[derive(Clone)]
pub struct RetrievalEngine {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    candidate_multiplier: usize,
}

impl RetrievalEngine {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        candidate_multiplier: usize,
    ) -> Self {
        Self {
            embedder,
            store,
            candidate_multiplier: candidate_multiplier.max(1),
        }
    }

    /// Top `k` chunks for `query`, best first.
    ///
    /// Expired records are purged first. Fails with `EmptyIndex` when nothing
    /// live remains, and with `InvalidQuery` for a blank query.
    pub async fn retrieve(
        &self,
        query: &str,
        k: usize,
        filter: &QueryFilter,
    ) -> Result<Vec<RetrievalHit>> {
        if query.trim().is_empty() {
            return Err(NearfileError::InvalidQuery {
                reason: "query is empty".to_string(),
            });
        }

        self.store.purge_expired().await?;
        if self.store.live_count().await? == 0 {
            return Err(NearfileError::EmptyIndex {
                query: query.to_string(),
            });
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let embedder = Arc::clone(&self.embedder);
        let text = query.to_string();
        let vector = tokio::task::spawn_blocking(move || embedder.embed_text(&text))
            .await?
            .map_err(|e| NearfileError::embedding("embedding the query", e))?;

        let candidates = self
            .store
            .query(&vector, k.saturating_mul(self.candidate_multiplier), filter)
            .await?;
        let fetched = candidates.len();

        let mut seen = HashSet::new();
        let mut hits: Vec<RetrievalHit> = candidates
            .into_iter()
            .filter(|c| seen.insert((c.record.source_path.clone(), c.record.chunk_index)))
            .map(|c| RetrievalHit {
                text: c.record.content,
                score: c.score,
                source_path: c.record.source_path,
                chunk_index: c.record.chunk_index,
            })
            .collect();
        hits.truncate(k);

        tracing::debug!(k, fetched, returned = hits.len(), "retrieval finished");
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::storage::IndexRecord;
    use crate::storage::sqlite_store::{ModelStamp, SqliteVectorStore};
    use chrono::{Duration, TimeZone, Utc};
    use nearfile_embed::{EmbedConfig, HashEmbedProvider};

    async fn engine_with(
        texts: &[(&str, usize, &str)],
    ) -> (RetrievalEngine, Arc<dyn VectorStore>, ManualClock) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 7, 7, 7, 0, 0).unwrap());
        let embedder: Arc<dyn EmbeddingProvider> =
            Arc::new(HashEmbedProvider::new(EmbedConfig::hashed(128)).unwrap());
        let store: Arc<dyn VectorStore> = Arc::new(
            SqliteVectorStore::open_memory(
                ModelStamp {
                    model_id: embedder.model_id(),
                    dimension: 128,
                },
                Duration::minutes(20),
                Arc::new(clock.clone()),
            )
            .await
            .unwrap(),
        );

        let now = clock.now();
        let records = texts
            .iter()
            .map(|(path, index, text)| IndexRecord {
                source_path: PathBuf::from(path),
                chunk_index: *index,
                content: text.to_string(),
                embedding: embedder.embed_text(text).unwrap(),
                ingested_at: now,
                expires_at: now + Duration::minutes(20),
            })
            .collect();
        if !texts.is_empty() {
            store.upsert(records).await.unwrap();
        }

        (RetrievalEngine::new(embedder, store.clone(), 3), store, clock)
    }

    #[tokio::test]
    async fn test_ranks_best_match_first() -> anyhow::Result<()> {
        let (engine, _store, _clock) = engine_with(&[
            ("/garden.md", 0, "Tomatoes need full sun and deep watering."),
            ("/garden.md", 1, "Prune the roses in late winter."),
            ("/kitchen.md", 0, "Bake the bread at a high temperature."),
        ])
        .await;

        let hits = engine
            .retrieve("prune roses winter", 2, &QueryFilter::default())
            .await?;
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].source_path, PathBuf::from("/garden.md"));
        assert_eq!(hits[0].chunk_index, 1);
        assert!(hits[0].score > hits[1].score);
        Ok(())
    }

    #[tokio::test]
    async fn test_results_are_unique_and_truncated() -> anyhow::Result<()> {
        let (engine, _store, _clock) = engine_with(&[
            ("/a.md", 0, "shared words here"),
            ("/a.md", 1, "shared words there"),
            ("/b.md", 0, "shared words everywhere"),
            ("/c.md", 0, "nothing in common"),
        ])
        .await;

        let hits = engine
            .retrieve("shared words", 3, &QueryFilter::default())
            .await?;
        assert_eq!(hits.len(), 3);
        let keys: HashSet<_> = hits
            .iter()
            .map(|h| (h.source_path.clone(), h.chunk_index))
            .collect();
        assert_eq!(keys.len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_index_and_expiry() -> anyhow::Result<()> {
        let (engine, _store, _clock) = engine_with(&[]).await;
        assert!(matches!(
            engine.retrieve("anything", 5, &QueryFilter::default()).await,
            Err(NearfileError::EmptyIndex { .. })
        ));

        let (engine, store, clock) = engine_with(&[("/a.md", 0, "short lived")]).await;
        assert_eq!(engine.retrieve("short", 5, &QueryFilter::default()).await?.len(), 1);

        clock.advance(Duration::minutes(20));
        assert!(matches!(
            engine.retrieve("short", 5, &QueryFilter::default()).await,
            Err(NearfileError::EmptyIndex { .. })
        ));
        // The expired record was physically removed by the query.
        assert_eq!(store.stats().await?.expired_records, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_blank_query_and_zero_k() -> anyhow::Result<()> {
        let (engine, _store, _clock) = engine_with(&[("/a.md", 0, "text")]).await;
        assert!(matches!(
            engine.retrieve("   ", 5, &QueryFilter::default()).await,
            Err(NearfileError::InvalidQuery { .. })
        ));
        assert!(engine.retrieve("text", 0, &QueryFilter::default()).await?.is_empty());
        Ok(())
    }
}
