//! Ingest pipeline: load, chunk, embed, store.
//!
//! Up to `concurrency` files are loaded, chunked and embedded at once on the
//! blocking pool. Results are written to the store in input order, one
//! transaction per file; each write replaces everything previously stored for
//! that file, so chunks a shorter revision no longer has are dropped. A file that cannot be loaded is recorded in
//! [`IngestReport::skipped`] and the batch continues; an embedding or store
//! failure ends the call, leaving files written before it in place.

use crate::clock::Clock;
use crate::error::{NearfileError, Result};
use crate::retrieval::loader::{DocumentLoader, FileHandle};
use crate::storage::{IndexRecord, VectorStore};
use futures::stream::{self, StreamExt};
use nearfile_context::SentenceChunker;
use nearfile_embed::EmbeddingProvider;
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Files loaded and stored, including files that produced no chunks.
    pub ingested_count: usize,
    pub chunk_count: usize,
    /// Files chunked with the fixed-width fallback.
    pub degraded_documents: usize,
    /// Invalid byte sequences replaced across all files.
    pub replaced_sequences: usize,
    pub skipped: Vec<SkippedFile>,
}

/// A file ready to be written.
struct PreparedFile {
    path: PathBuf,
    records: Vec<IndexRecord>,
    degraded: bool,
    replaced_sequences: usize,
}

#[derive(Clone)]
pub struct Ingestor {
    loader: DocumentLoader,
    chunker: SentenceChunker,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    clock: Arc<dyn Clock>,
    concurrency: usize,
}

impl Ingestor {
    pub fn new(
        loader: DocumentLoader,
        chunker: SentenceChunker,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        clock: Arc<dyn Clock>,
        concurrency: usize,
    ) -> Self {
        Self {
            loader,
            chunker,
            embedder,
            store,
            clock,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn ingest(&self, paths: &[PathBuf]) -> Result<IngestReport> {
        let requested = paths.to_vec();
        let handles = tokio::task::spawn_blocking(move || {
            let mut seen = HashSet::new();
            requested
                .iter()
                .map(|p| FileHandle::probe(p))
                .filter(|h| seen.insert(h.path.clone()))
                .collect::<Vec<_>>()
        })
        .await?;

        tracing::info!(
            files = handles.len(),
            concurrency = self.concurrency,
            "starting ingest"
        );

        let mut prepared = stream::iter(handles)
            .map(|handle| self.prepare(handle))
            .buffered(self.concurrency);

        let mut report = IngestReport::default();
        while let Some((path, outcome)) = prepared.next().await {
            let file = match outcome {
                Ok(file) => file,
                Err(e) if e.is_per_file() => {
                    tracing::warn!(path = %path.display(), "skipping file: {e}");
                    report.skipped.push(SkippedFile {
                        path,
                        reason: e.to_string(),
                    });
                    continue;
                }
                Err(e) => return Err(e),
            };

            let written = self.store.replace_source(&file.path, file.records).await?;
            tracing::debug!(path = %file.path.display(), chunks = written, "stored file");

            report.ingested_count += 1;
            report.chunk_count += written;
            report.degraded_documents += usize::from(file.degraded);
            report.replaced_sequences += file.replaced_sequences;
        }

        tracing::info!(
            ingested = report.ingested_count,
            chunks = report.chunk_count,
            skipped = report.skipped.len(),
            degraded = report.degraded_documents,
            "ingest finished"
        );
        Ok(report)
    }

    /// Load, chunk and embed one file on the blocking pool.
    async fn prepare(&self, handle: FileHandle) -> (PathBuf, Result<PreparedFile>) {
        let path = handle.path.clone();
        let this = self.clone();
        let outcome = tokio::task::spawn_blocking(move || this.prepare_blocking(&handle))
            .await
            .map_err(NearfileError::from)
            .and_then(|r| r);
        (path, outcome)
    }

    fn prepare_blocking(&self, handle: &FileHandle) -> Result<PreparedFile> {
        let document = self.loader.load(handle)?;
        let ingested_at = self.clock.now();
        let expires_at = ingested_at + self.store.retention();

        let chunks = self.chunker.chunks(&document.path, &document.text, ingested_at);
        let degraded = chunks.is_degraded();
        let chunks: Vec<_> = chunks.collect();

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = if texts.is_empty() {
            Vec::new()
        } else {
            let result = self.embedder.embed_texts(&texts).map_err(|e| {
                NearfileError::embedding(format!("embedding {}", document.path.display()), e)
            })?;
            result
                .check_shape(texts.len(), self.embedder.embedding_dimension())
                .map_err(|e| {
                    NearfileError::embedding(format!("embedding {}", document.path.display()), e)
                })?;
            result.embeddings
        };

        let records = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexRecord {
                source_path: chunk.source_path,
                chunk_index: chunk.index,
                content: chunk.text,
                embedding,
                ingested_at,
                expires_at,
            })
            .collect();

        Ok(PreparedFile {
            path: document.path,
            records,
            degraded,
            replaced_sequences: document.replaced_sequences,
        })
    }
}
