//! Offline feature-hashing embedder.
//!
//! Each text is lowercased and split into alphanumeric tokens. Every token
//! and every pair of adjacent tokens is hashed with FNV-1a into one of
//! `dimension` buckets, with the sign taken from the top hash bit so that
//! collisions tend to cancel rather than accumulate. The resulting vector is
//! L2-normalized.
//!
//! Vectors only capture lexical overlap, not meaning. The provider needs no
//! model download, is fully deterministic and is cheap enough to run inline.
//!
//! ```
//! use nearfile_embed::{EmbedConfig, EmbeddingProvider, HashEmbedProvider};
//!
//! let provider = HashEmbedProvider::new(EmbedConfig::hashed(64)).unwrap();
//! let result = provider.embed_texts(&["red kite".into(), "blue heron".into()]).unwrap();
//! assert_eq!(result.len(), 2);
//! assert_eq!(result.dimension, 64);
//! ```

use crate::config::EmbedConfig;
use crate::error::{EmbedError, Result};
use crate::provider::{EmbeddingProvider, EmbeddingResult, l2_normalize};
use fnv::FnvHasher;
use half::f16;
use std::hash::Hasher;

const UNIGRAM_WEIGHT: f32 = 1.0;
const BIGRAM_WEIGHT: f32 = 0.5;

#[derive(Debug, Clone)]
pub struct HashEmbedProvider {
    dimension: usize,
    batch_size: usize,
    normalize: bool,
}

impl HashEmbedProvider {
    pub fn new(config: EmbedConfig) -> Result<Self> {
        if config.dimension == 0 {
            return Err(EmbedError::invalid_config(
                "hash provider dimension must be at least 1",
            ));
        }
        Ok(Self {
            dimension: config.dimension,
            batch_size: config.batch_size.max(1),
            normalize: config.normalize,
        })
    }

    fn embed_one(&self, text: &str) -> Vec<f16> {
        let lowered = text.to_lowercase();
        let tokens: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();

        let mut values = vec![0.0f32; self.dimension];
        for token in &tokens {
            self.accumulate(&mut values, &[token.as_bytes()], UNIGRAM_WEIGHT);
        }
        for pair in tokens.windows(2) {
            self.accumulate(
                &mut values,
                &[pair[0].as_bytes(), b" ", pair[1].as_bytes()],
                BIGRAM_WEIGHT,
            );
        }

        if self.normalize {
            l2_normalize(&mut values);
        }
        values.into_iter().map(f16::from_f32).collect()
    }

    fn accumulate(&self, values: &mut [f32], parts: &[&[u8]], weight: f32) {
        let mut hasher = FnvHasher::default();
        for part in parts {
            hasher.write(part);
        }
        let hash = hasher.finish();
        let bucket = (hash % self.dimension as u64) as usize;
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        values[bucket] += sign * weight;
    }
}

impl EmbeddingProvider for HashEmbedProvider {
    fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            tracing::trace!(batch = batch.len(), "hashing batch");
            embeddings.extend(batch.iter().map(|t| self.embed_one(t)));
        }
        let result = EmbeddingResult::new(embeddings);
        result.check_shape(texts.len(), self.dimension)?;
        Ok(result)
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "hash"
    }

    fn model_id(&self) -> String {
        format!(
            "hash:fnv1a-uni-bi:{}:{}",
            self.dimension,
            if self.normalize { "l2" } else { "raw" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(dimension: usize) -> HashEmbedProvider {
        HashEmbedProvider::new(EmbedConfig::hashed(dimension)).unwrap()
    }

    fn cosine(a: &[f16], b: &[f16]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x.to_f32() * y.to_f32()).sum()
    }

    #[test]
    fn test_batch_is_ordered_and_sized() {
        let p = HashEmbedProvider::new(EmbedConfig::hashed(48).with_batch_size(2)).unwrap();
        let texts: Vec<String> = (0..5).map(|i| format!("text number {i}")).collect();
        let result = p.embed_texts(&texts).unwrap();
        assert_eq!(result.len(), 5);
        assert!(result.embeddings.iter().all(|e| e.len() == 48));
        for (i, text) in texts.iter().enumerate() {
            assert_eq!(result.embeddings[i], p.embed_text(text).unwrap());
        }
    }

    #[test]
    fn test_deterministic() {
        let a = provider(128).embed_text("The quick brown fox").unwrap();
        let b = provider(128).embed_text("The quick brown fox").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_case_and_punctuation_insensitive() {
        let p = provider(128);
        let a = p.embed_text("Hello, World!").unwrap();
        let b = p.embed_text("hello world").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_overlap_scores_higher() {
        let p = provider(256);
        let query = p.embed_text("orbital mechanics of comets").unwrap();
        let near = p.embed_text("Comets follow orbital mechanics too.").unwrap();
        let far = p.embed_text("Sourdough needs a warm kitchen.").unwrap();
        assert!(cosine(&query, &near) > cosine(&query, &far));
        assert!((cosine(&near, &near) - 1.0).abs() < 1e-2);
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let v = provider(16).embed_text("   ").unwrap();
        assert_eq!(v.len(), 16);
        assert!(v.iter().all(|x| x.to_f32() == 0.0));
    }

    #[test]
    fn test_model_id_tracks_dimension() {
        assert_ne!(provider(16).model_id(), provider(32).model_id());
        assert!(HashEmbedProvider::new(EmbedConfig::hashed(0)).is_err());
    }
}
