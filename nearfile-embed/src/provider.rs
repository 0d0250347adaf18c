//! Embedding provider implementations

use crate::config::{EmbedConfig, ProviderKind};
use crate::device::ComputeDevice;
use crate::error::{EmbedError, Result};
use crate::hashing::HashEmbedProvider;
use fastembed::{EmbeddingModel, InitOptions, ModelInfo, TextEmbedding};
use half::f16;
use std::sync::{Arc, Mutex};

/// Result of embedding generation
#[derive(Debug, Clone)]
pub struct EmbeddingResult {
    /// The generated embeddings, one per input text, in input order
    pub embeddings: Vec<Vec<f16>>,
    /// The dimension of each embedding vector
    pub dimension: usize,
}

impl EmbeddingResult {
    /// Create a result; the dimension is taken from the first vector (0 when empty).
    pub fn new(embeddings: Vec<Vec<f16>>) -> Self {
        let dimension = embeddings.first().map(|e| e.len()).unwrap_or(0);
        Self {
            embeddings,
            dimension,
        }
    }

    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }

    /// Check there is one vector per input and every vector has `dimension` entries.
    pub fn check_shape(&self, inputs: usize, dimension: usize) -> Result<()> {
        if self.embeddings.len() != inputs {
            return Err(EmbedError::CountMismatch {
                inputs,
                outputs: self.embeddings.len(),
            });
        }
        match self.embeddings.iter().find(|e| e.len() != dimension) {
            Some(bad) => Err(EmbedError::DimensionMismatch {
                expected: dimension,
                actual: bad.len(),
            }),
            None => Ok(()),
        }
    }
}

/// Trait for embedding providers that can generate embeddings from text.
///
/// Calls block while the model runs. Async callers should move them onto the
/// blocking pool (`tokio::task::spawn_blocking`).
pub trait EmbeddingProvider: Send + Sync + std::fmt::Debug {
    /// Generate embeddings for multiple texts. Output order matches input order.
    fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult>;

    /// Generate the embedding for a single text, as a batch of one
    fn embed_text(&self, text: &str) -> Result<Vec<f16>> {
        self.embed_texts(&[text.to_string()])?
            .embeddings
            .into_iter()
            .next()
            .ok_or(EmbedError::CountMismatch {
                inputs: 1,
                outputs: 0,
            })
    }

    /// Get the dimension of embeddings produced by this provider
    fn embedding_dimension(&self) -> usize;

    /// Get the name/identifier of this provider
    fn provider_name(&self) -> &str;

    /// Identifier of the vector space: two providers with equal ids produce
    /// comparable vectors.
    fn model_id(&self) -> String {
        format!("{}:{}", self.provider_name(), self.embedding_dimension())
    }
}

/// Build the provider described by `config`. Loading a fastembed model may
/// download files and blocks until the model is ready.
pub fn create_provider(config: &EmbedConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    config.validate()?;
    match config.provider {
        ProviderKind::FastEmbed => Ok(Arc::new(FastEmbedProvider::create(config.clone())?)),
        ProviderKind::Hash => Ok(Arc::new(HashEmbedProvider::new(config.clone())?)),
    }
}

/// FastEmbed-based embedding provider using local ONNX models
pub struct FastEmbedProvider {
    config: EmbedConfig,
    model: Arc<Mutex<TextEmbedding>>,
    model_code: String,
    dimension: usize,
    device: ComputeDevice,
}

impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("config", &self.config)
            .field("model_code", &self.model_code)
            .field("dimension", &self.dimension)
            .field("device", &self.device)
            .finish()
    }
}

impl FastEmbedProvider {
    /// Resolve the device, load the model and verify it produces vectors of
    /// the advertised dimension.
    pub fn create(config: EmbedConfig) -> Result<Self> {
        let info = resolve_model(&config.model_name)?;
        let device = ComputeDevice::resolve(config.device)?;

        tracing::info!(
            model = %info.model_code,
            dimension = info.dim,
            %device,
            "Loading fastembed model"
        );

        let mut options = InitOptions::new(info.model.clone())
            .with_show_download_progress(config.show_download_progress);
        if let Some(dir) = &config.cache_dir {
            std::fs::create_dir_all(dir)?;
            options = options.with_cache_dir(dir.clone());
        }
        #[cfg(feature = "cuda")]
        {
            options = options.with_execution_providers(device.execution_providers());
        }

        let model = TextEmbedding::try_new(options)
            .map_err(|e| EmbedError::model_unavailable(&info.model_code, e))?;

        let provider = Self {
            model: Arc::new(Mutex::new(model)),
            model_code: info.model_code.clone(),
            dimension: info.dim,
            device,
            config,
        };
        provider.validate_model()?;

        tracing::info!(model = %provider.model_code, "Model loaded successfully");
        Ok(provider)
    }

    pub fn device(&self) -> ComputeDevice {
        self.device
    }

    fn validate_model(&self) -> Result<()> {
        let probe = self.run_batch(vec!["validation test".to_string()])?;
        probe.check_shape(1, self.dimension)?;
        if probe.embeddings[0].iter().any(|v| !v.to_f32().is_finite()) {
            return Err(EmbedError::model_unavailable(
                &self.model_code,
                "model produced non-finite values",
            ));
        }
        Ok(())
    }

    fn run_batch(&self, batch: Vec<String>) -> Result<EmbeddingResult> {
        let mut model = self
            .model
            .lock()
            .map_err(|_| EmbedError::model_unavailable(&self.model_code, "model lock poisoned"))?;
        let raw = model
            .embed(batch, None)
            .map_err(|e| EmbedError::EmbeddingGeneration { source: e.into() })?;
        drop(model);
        Ok(EmbeddingResult::new(convert_to_f16(raw, self.config.normalize)))
    }
}

impl EmbeddingProvider for FastEmbedProvider {
    fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        if texts.is_empty() {
            return Ok(EmbeddingResult::new(vec![]));
        }

        tracing::debug!(
            texts = texts.len(),
            batch_size = self.config.batch_size,
            "Generating embeddings"
        );

        let mut all_embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.config.batch_size) {
            let result = self.run_batch(batch.to_vec())?;
            result.check_shape(batch.len(), self.dimension)?;
            all_embeddings.extend(result.embeddings);
        }

        Ok(EmbeddingResult::new(all_embeddings))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "fastembed"
    }

    fn model_id(&self) -> String {
        format!(
            "fastembed:{}:{}:{}",
            self.model_code,
            self.dimension,
            if self.config.normalize { "l2" } else { "raw" }
        )
    }
}

/// Find a supported fastembed model by enum name or model code, ignoring case.
pub fn resolve_model(name: &str) -> Result<ModelInfo<EmbeddingModel>> {
    let wanted = name.trim();
    TextEmbedding::list_supported_models()
        .into_iter()
        .find(|info| {
            info.model_code.eq_ignore_ascii_case(wanted)
                || format!("{:?}", info.model).eq_ignore_ascii_case(wanted)
        })
        .ok_or_else(|| EmbedError::model_unavailable(wanted, "not a supported fastembed model"))
}

/// Convert f32 embeddings to f16, optionally L2-normalizing first
pub(crate) fn convert_to_f16(embeddings: Vec<Vec<f32>>, normalize: bool) -> Vec<Vec<f16>> {
    embeddings
        .into_iter()
        .map(|mut embedding| {
            if normalize {
                l2_normalize(&mut embedding);
            }
            embedding.into_iter().map(f16::from_f32).collect()
        })
        .collect()
}

pub(crate) fn l2_normalize(values: &mut [f32]) {
    let norm = values.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in values.iter_mut() {
            *value /= norm;
        }
    }
}
