//! Configuration for embedding providers

use crate::device::DevicePreference;
use crate::error::{EmbedError, Result};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which embedding backend to construct.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Local ONNX model run through fastembed
    #[default]
    FastEmbed,
    /// Deterministic feature hashing, no model download
    Hash,
}

/// Configuration for embedding providers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[builder(setter(into), default)]
#[serde(default)]
pub struct EmbedConfig {
    pub provider: ProviderKind,
    /// fastembed model, by enum name (`AllMiniLML6V2`) or model code
    /// (`sentence-transformers/all-MiniLM-L6-v2`)
    pub model_name: String,
    /// Where downloaded model files live; fastembed's default when unset
    pub cache_dir: Option<PathBuf>,
    /// Maximum number of texts per model invocation
    pub batch_size: usize,
    /// Whether to L2-normalize vectors
    pub normalize: bool,
    pub device: DevicePreference,
    /// Output dimension of the hash provider; fastembed models report their own
    pub dimension: usize,
    pub show_download_progress: bool,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::FastEmbed,
            model_name: "AllMiniLML6V2".to_string(),
            cache_dir: None,
            batch_size: 32,
            normalize: true,
            device: DevicePreference::Auto,
            dimension: 384,
            show_download_progress: false,
        }
    }
}

impl EmbedConfig {
    /// Create a new embedding configuration using the builder
    pub fn builder() -> EmbedConfigBuilder {
        EmbedConfigBuilder::default()
    }

    /// Configuration for the offline hash provider with the given dimension.
    pub fn hashed(dimension: usize) -> Self {
        Self {
            provider: ProviderKind::Hash,
            model_name: "fnv-ngram".to_string(),
            dimension,
            device: DevicePreference::Cpu,
            ..Self::default()
        }
    }

    /// Set the batch size for embedding generation (builder style)
    pub fn with_batch_size(self, batch_size: usize) -> Self {
        Self { batch_size, ..self }
    }

    /// Set whether to normalize embeddings (builder style)
    pub fn with_normalize(self, normalize: bool) -> Self {
        Self { normalize, ..self }
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(EmbedError::invalid_config("batch_size must be at least 1"));
        }
        match self.provider {
            ProviderKind::Hash if self.dimension == 0 => Err(EmbedError::invalid_config(
                "dimension must be at least 1 for the hash provider",
            )),
            ProviderKind::FastEmbed if self.model_name.trim().is_empty() => {
                Err(EmbedError::invalid_config("model_name must not be empty"))
            }
            _ => Ok(()),
        }
    }
}
