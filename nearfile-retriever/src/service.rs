//! The [`Nearfile`] facade: one configuration, one embedder, one store.

use crate::clock::{Clock, SystemClock};
use crate::config::NearfileConfig;
use crate::error::{NearfileError, Result};
use crate::retrieval::engine::{RetrievalEngine, RetrievalHit};
use crate::retrieval::ingest::{IngestReport, Ingestor};
use crate::retrieval::loader::DocumentLoader;
use crate::retrieval::locator::{DirectoryTree, FileLocator, LocateOutcome};
use crate::storage::sqlite_store::{ModelStamp, SqliteVectorStore};
use crate::storage::sweeper;
use crate::storage::{QueryFilter, StoreStats, VectorStore};
use nearfile_context::SentenceChunker;
use nearfile_embed::{EmbeddingProvider, create_provider};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;

pub struct Nearfile {
    config: NearfileConfig,
    locator: FileLocator,
    ingestor: Ingestor,
    engine: RetrievalEngine,
    store: Arc<dyn VectorStore>,
}

impl Nearfile {
    /// Build the embedder and open the store described by `config`.
    pub async fn open(config: NearfileConfig) -> Result<Self> {
        Self::open_with_clock(config, Arc::new(SystemClock)).await
    }

    pub async fn open_with_clock(config: NearfileConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        let embed_config = config.embedding.clone();
        let embedder = tokio::task::spawn_blocking(move || create_provider(&embed_config))
            .await?
            .map_err(|e| NearfileError::embedding("loading the embedding model", e))?;

        let stamp = ModelStamp {
            model_id: embedder.model_id(),
            dimension: embedder.embedding_dimension(),
        };
        let store = SqliteVectorStore::open(
            &config.store.path,
            stamp,
            config.store.retention(),
            clock.clone(),
        )
        .await?;

        Self::from_parts(config, embedder, Arc::new(store), clock)
    }

    /// Assemble from already-built parts.
    pub fn from_parts(
        config: NearfileConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let chunker = SentenceChunker::new(config.chunking.clone())
            .map_err(|e| NearfileError::config(format!("chunking: {e}")))?;
        let ingestor = Ingestor::new(
            DocumentLoader::new(config.ingest.max_file_bytes),
            chunker,
            embedder.clone(),
            store.clone(),
            clock,
            config.ingest.concurrency,
        );
        let engine = RetrievalEngine::new(
            embedder,
            store.clone(),
            config.retrieval.candidate_multiplier,
        );

        Ok(Self {
            locator: FileLocator::new(config.locator.clone()),
            config,
            ingestor,
            engine,
            store,
        })
    }

    pub fn config(&self) -> &NearfileConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn VectorStore> {
        self.store.clone()
    }

    /// Best fuzzy match for `target` under `root`.
    pub async fn locate(&self, root: &Path, target: &str) -> Result<LocateOutcome> {
        let locator = self.locator.clone();
        let root = root.to_path_buf();
        let target = target.to_string();
        tokio::task::spawn_blocking(move || locator.locate(&root, &target)).await?
    }

    /// Listing of `root`, pruned like [`Nearfile::locate`].
    pub async fn tree(&self, root: &Path) -> Result<DirectoryTree> {
        let locator = self.locator.clone();
        let root = root.to_path_buf();
        tokio::task::spawn_blocking(move || locator.tree(&root)).await?
    }

    pub async fn ingest(&self, paths: &[PathBuf]) -> Result<IngestReport> {
        self.ingestor.ingest(paths).await
    }

    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievalHit>> {
        self.engine.retrieve(query, k, &QueryFilter::default()).await
    }

    pub async fn retrieve_filtered(
        &self,
        query: &str,
        k: usize,
        filter: &QueryFilter,
    ) -> Result<Vec<RetrievalHit>> {
        self.engine.retrieve(query, k, filter).await
    }

    pub async fn purge_expired(&self) -> Result<u64> {
        self.store.purge_expired().await
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        self.store.stats().await
    }

    /// Start the periodic expiry sweeper. Abort the handle to stop it.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        sweeper::spawn_sweeper(self.store.clone(), self.config.store.sweep_interval())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{Duration, TimeZone, Utc};
    use nearfile_embed::{EmbedConfig, HashEmbedProvider};
    use tempfile::tempdir;

    async fn in_memory(clock: &ManualClock) -> Nearfile {
        let mut config = NearfileConfig::default();
        config.embedding = EmbedConfig::hashed(64);
        config.store.sweep_interval_secs = 1;
        let embedder: Arc<dyn EmbeddingProvider> =
            Arc::new(HashEmbedProvider::new(config.embedding.clone()).unwrap());
        let store = SqliteVectorStore::open_memory(
            ModelStamp {
                model_id: embedder.model_id(),
                dimension: embedder.embedding_dimension(),
            },
            config.store.retention(),
            Arc::new(clock.clone()),
        )
        .await
        .unwrap();
        Nearfile::from_parts(config, embedder, Arc::new(store), Arc::new(clock.clone())).unwrap()
    }

    #[tokio::test]
    async fn test_facade_round_trip_and_sweeper() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("plan.txt");
        std::fs::write(&path, "Pack the tent. Check the stove. Leave at six.")?;

        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 9, 9, 8, 0, 0).unwrap());
        let nearfile = in_memory(&clock).await;

        let tree = nearfile.tree(dir.path()).await?;
        assert_eq!(tree.render(), "└── plan.txt\n");

        let found = nearfile.locate(dir.path(), "Plan.txt").await?;
        let report = nearfile.ingest(&[found.path]).await?;
        assert_eq!(report.chunk_count, 1);
        assert_eq!(nearfile.retrieve("check the stove", 3).await?.len(), 1);

        clock.advance(Duration::minutes(30));
        assert_eq!(nearfile.stats().await?.expired_records, 1);

        let sweeper = nearfile.spawn_sweeper();
        for _ in 0..300 {
            if nearfile.stats().await?.expired_records == 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(nearfile.stats().await?.expired_records, 0);
        assert_eq!(nearfile.purge_expired().await?, 0);
        sweeper.abort();
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_chunking_is_a_config_error() {
        let mut config = NearfileConfig::default();
        config.chunking.overlap_sentences = config.chunking.sentences_per_chunk;
        config.embedding = EmbedConfig::hashed(16);
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 9, 9, 8, 0, 0).unwrap());

        let result = Nearfile::open_with_clock(config, Arc::new(clock)).await;
        assert!(matches!(result, Err(NearfileError::Config { .. })));
    }
}
