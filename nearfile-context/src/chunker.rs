//! Sentence-window chunking.
//!
//! A document is segmented into sentences (see [`crate::sentence`]) and then
//! grouped into windows of `sentences_per_chunk` consecutive sentences. Each
//! window starts `sentences_per_chunk - overlap_sentences` sentences after the
//! previous one, so neighbouring chunks share their boundary sentences and no
//! sentence is stranded at a chunk edge.
//!
//! With the defaults (4 sentences, overlap 1):
//!
//! | sentences | chunks | spans |
//! |-----------|--------|-------|
//! | 0 | 0 | |
//! | 3 | 1 | `0..3` |
//! | 4 | 1 | `0..4` |
//! | 5 | 2 | `0..4`, `3..5` |
//! | 7 | 2 | `0..4`, `3..7` |
//! | 8 | 3 | `0..4`, `3..7`, `6..8` |
//!
//! [`SentenceChunker::chunks`] returns a lazy iterator. It is consumed once,
//! but the output is a pure function of the text and configuration, so calling
//! it again with the same input yields identical chunks.
//!
//! ```
//! use chrono::Utc;
//! use nearfile_context::{ChunkerConfig, SentenceChunker};
//! use std::path::Path;
//!
//! let chunker = SentenceChunker::new(ChunkerConfig::default()).unwrap();
//! let text = "One fish. Two fish. Red fish. Blue fish. Old fish.";
//! let chunks: Vec<_> = chunker.chunks(Path::new("fish.txt"), text, Utc::now()).collect();
//!
//! assert_eq!(chunks.len(), 2);
//! assert_eq!(chunks[0].text, "One fish. Two fish. Red fish. Blue fish.");
//! assert_eq!(chunks[1].text, "Blue fish. Old fish.");
//! assert_eq!(chunks[1].overlap_context, "Blue fish.");
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::iter::FusedIterator;
use std::ops::Range;
use std::path::{Path, PathBuf};

use crate::sentence::segment;

/// Chunking parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    /// Sentences per chunk (N).
    pub sentences_per_chunk: usize,
    /// Sentences shared between consecutive chunks. Must be below N.
    pub overlap_sentences: usize,
    /// A detected sentence longer than this (in chars) means segmentation failed.
    pub max_sentence_chars: usize,
    /// Piece width (in chars) for the fixed-width fallback split.
    pub fallback_chunk_chars: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            sentences_per_chunk: 4,
            overlap_sentences: 1,
            max_sentence_chars: 2000,
            fallback_chunk_chars: 800,
        }
    }
}

impl ChunkerConfig {
    pub fn with_sentences_per_chunk(mut self, sentences: usize) -> Self {
        self.sentences_per_chunk = sentences;
        self
    }

    pub fn with_overlap(mut self, overlap: usize) -> Self {
        self.overlap_sentences = overlap;
        self
    }

    /// Check the parameters can produce a terminating window sequence.
    pub fn validate(&self) -> Result<(), ChunkerConfigError> {
        if self.sentences_per_chunk == 0 {
            return Err(ChunkerConfigError::ZeroWindow);
        }
        if self.overlap_sentences >= self.sentences_per_chunk {
            return Err(ChunkerConfigError::OverlapTooLarge {
                overlap: self.overlap_sentences,
                window: self.sentences_per_chunk,
            });
        }
        if self.max_sentence_chars == 0 || self.fallback_chunk_chars == 0 {
            return Err(ChunkerConfigError::ZeroLength);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChunkerConfigError {
    #[error("sentences_per_chunk must be at least 1")]
    ZeroWindow,
    #[error("overlap_sentences ({overlap}) must be smaller than sentences_per_chunk ({window})")]
    OverlapTooLarge { overlap: usize, window: usize },
    #[error("max_sentence_chars and fallback_chunk_chars must be at least 1")]
    ZeroLength,
}

/// One retrieval unit cut from a document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    /// Position of this chunk within its document (0-indexed).
    pub index: usize,
    /// First sentence of the span.
    pub sentence_start: usize,
    /// One past the last sentence of the span.
    pub sentence_end: usize,
    /// Source text covering the whole span.
    pub text: String,
    /// Leading sentences shared with the previous chunk; empty for the first.
    pub overlap_context: String,
    pub source_path: PathBuf,
    pub ingested_at: DateTime<Utc>,
    /// Produced by the fixed-width fallback instead of sentence windows.
    pub degraded: bool,
}

impl Chunk {
    pub fn sentence_count(&self) -> usize {
        self.sentence_end - self.sentence_start
    }
}

/// Splits documents into overlapping sentence windows.
#[derive(Debug, Clone)]
pub struct SentenceChunker {
    config: ChunkerConfig,
}

impl SentenceChunker {
    pub fn new(config: ChunkerConfig) -> Result<Self, ChunkerConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Lazily chunk `text`, stamping every chunk with `source_path` and `ingested_at`.
    pub fn chunks<'a>(
        &self,
        source_path: &Path,
        text: &'a str,
        ingested_at: DateTime<Utc>,
    ) -> Chunks<'a> {
        let segmentation = segment(
            text,
            self.config.max_sentence_chars,
            self.config.fallback_chunk_chars,
        );

        // Fallback pieces are already sized, so each one becomes its own chunk.
        let (window, overlap) = if segmentation.degraded {
            tracing::warn!(
                path = %source_path.display(),
                pieces = segmentation.ranges.len(),
                "sentence segmentation failed, using fixed-width split"
            );
            (1, 0)
        } else {
            (
                self.config.sentences_per_chunk,
                self.config.overlap_sentences,
            )
        };

        tracing::debug!(
            path = %source_path.display(),
            units = segmentation.ranges.len(),
            window,
            overlap,
            "segmented document"
        );

        let next_start = if segmentation.ranges.is_empty() {
            None
        } else {
            Some(0)
        };

        Chunks {
            text,
            source_path: source_path.to_path_buf(),
            ingested_at,
            sentences: segmentation.ranges,
            window,
            overlap,
            next_start,
            next_index: 0,
            degraded: segmentation.degraded,
        }
    }
}

/// Iterator over the chunks of one document. See [`SentenceChunker::chunks`].
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    text: &'a str,
    source_path: PathBuf,
    ingested_at: DateTime<Utc>,
    sentences: Vec<Range<usize>>,
    window: usize,
    overlap: usize,
    next_start: Option<usize>,
    next_index: usize,
    degraded: bool,
}

impl Chunks<'_> {
    /// Whether this document fell back to the fixed-width split.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Number of sentences (or fallback pieces) detected in the document.
    pub fn sentence_count(&self) -> usize {
        self.sentences.len()
    }

    fn span_text(&self, first: usize, last_exclusive: usize) -> &str {
        let begin = self.sentences[first].start;
        let end = self.sentences[last_exclusive - 1].end;
        &self.text[begin..end]
    }

    fn remaining(&self) -> usize {
        let Some(start) = self.next_start else {
            return 0;
        };
        let left = self.sentences.len() - start;
        if left <= self.window {
            1
        } else {
            let step = self.window - self.overlap;
            1 + (left - self.window).div_ceil(step)
        }
    }
}

impl Iterator for Chunks<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let start = self.next_start?;
        let total = self.sentences.len();
        let end = (start + self.window).min(total);

        let overlap_context = if self.next_index > 0 && self.overlap > 0 {
            self.span_text(start, start + self.overlap).to_string()
        } else {
            String::new()
        };

        let chunk = Chunk {
            index: self.next_index,
            sentence_start: start,
            sentence_end: end,
            text: self.span_text(start, end).to_string(),
            overlap_context,
            source_path: self.source_path.clone(),
            ingested_at: self.ingested_at,
            degraded: self.degraded,
        };

        self.next_index += 1;
        self.next_start = if end >= total {
            None
        } else {
            Some(start + self.window - self.overlap)
        };

        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining();
        (n, Some(n))
    }
}

impl ExactSizeIterator for Chunks<'_> {}

impl FusedIterator for Chunks<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tracing_test::traced_test;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn sentences(n: usize) -> String {
        (0..n)
            .map(|i| format!("Sentence number {i} is here."))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn chunk_all(config: ChunkerConfig, text: &str) -> Vec<Chunk> {
        SentenceChunker::new(config)
            .unwrap()
            .chunks(Path::new("notes/doc.txt"), text, fixed_time())
            .collect()
    }

    #[test]
    fn test_empty_and_blank_documents_yield_nothing() {
        assert!(chunk_all(ChunkerConfig::default(), "").is_empty());
        assert!(chunk_all(ChunkerConfig::default(), "  \n\n\t ").is_empty());
    }

    #[test]
    fn test_fewer_than_window_is_one_chunk() {
        let text = sentences(2);
        let chunks = chunk_all(ChunkerConfig::default(), &text);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].sentence_count(), 2);
        assert_eq!(chunks[0].text, text);
    }

    #[test]
    fn test_exact_window_is_one_chunk() {
        let chunks = chunk_all(ChunkerConfig::default(), &sentences(4));
        assert_eq!(chunks.len(), 1);
        assert_eq!((chunks[0].sentence_start, chunks[0].sentence_end), (0, 4));
        assert!(chunks[0].overlap_context.is_empty());
    }

    #[test]
    fn test_window_plus_one_is_two_overlapping_chunks() {
        let text = "Alpha runs. Bravo jumps. Charlie swims. Delta flies. Echo rests.";
        let chunks = chunk_all(ChunkerConfig::default(), text);
        assert_eq!(chunks.len(), 2);
        assert_eq!((chunks[0].sentence_start, chunks[0].sentence_end), (0, 4));
        assert_eq!((chunks[1].sentence_start, chunks[1].sentence_end), (3, 5));
        assert_eq!(chunks[1].text, "Delta flies. Echo rests.");
        assert_eq!(chunks[1].overlap_context, "Delta flies.");
        assert!(chunks[0].text.ends_with("Delta flies."));
    }

    #[test]
    fn test_every_chunk_but_last_is_full() {
        let chunks = chunk_all(ChunkerConfig::default(), &sentences(23));
        let (last, rest) = chunks.split_last().unwrap();
        assert!(rest.iter().all(|c| c.sentence_count() == 4));
        assert!(last.sentence_count() <= 4);
        assert_eq!(last.sentence_end, 23);
        for pair in chunks.windows(2) {
            assert_eq!(pair[1].sentence_start, pair[0].sentence_end - 1);
        }
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
        }
    }

    #[test]
    fn test_zero_overlap_tiles_document() {
        let config = ChunkerConfig::default().with_overlap(0);
        let chunks = chunk_all(config, &sentences(9));
        let spans: Vec<_> = chunks
            .iter()
            .map(|c| (c.sentence_start, c.sentence_end))
            .collect();
        assert_eq!(spans, vec![(0, 4), (4, 8), (8, 9)]);
        assert!(chunks.iter().all(|c| c.overlap_context.is_empty()));
    }

    #[test]
    fn test_chunking_is_deterministic() {
        let text = sentences(17);
        let first = chunk_all(ChunkerConfig::default(), &text);
        let second = chunk_all(ChunkerConfig::default(), &text);
        assert_eq!(first, second);
    }

    #[test]
    fn test_size_hint_matches_output() {
        let chunker = SentenceChunker::new(ChunkerConfig::default()).unwrap();
        for n in 0..30 {
            let text = sentences(n);
            let iter = chunker.chunks(Path::new("a.txt"), &text, fixed_time());
            let expected = iter.len();
            assert_eq!(iter.count(), expected, "mismatch for {n} sentences");
        }
    }

    #[test]
    fn test_chunks_carry_metadata() {
        let chunks = chunk_all(ChunkerConfig::default(), &sentences(6));
        for chunk in &chunks {
            assert_eq!(chunk.source_path, PathBuf::from("notes/doc.txt"));
            assert_eq!(chunk.ingested_at, fixed_time());
            assert!(!chunk.degraded);
        }
    }

    #[test]
    #[traced_test]
    fn test_fallback_marks_chunks_degraded() {
        let config = ChunkerConfig {
            max_sentence_chars: 100,
            fallback_chunk_chars: 40,
            ..ChunkerConfig::default()
        };
        let blob = "z".repeat(150);
        let chunks = chunk_all(config, &blob);
        assert_eq!(chunks.len(), 4);
        assert!(chunks.iter().all(|c| c.degraded));
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 40));
        assert!(logs_contain("fixed-width split"));
    }

    #[test]
    fn test_config_validation() {
        assert_eq!(
            ChunkerConfig::default().with_sentences_per_chunk(0).validate(),
            Err(ChunkerConfigError::ZeroWindow)
        );
        assert!(matches!(
            ChunkerConfig::default().with_overlap(4).validate(),
            Err(ChunkerConfigError::OverlapTooLarge {
                overlap: 4,
                window: 4
            })
        ));
        assert!(ChunkerConfig::default().validate().is_ok());
    }
}
