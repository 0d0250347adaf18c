//! Error types for the embedding system

/// Result type for embedding operations.
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Error type for all embedding operations.
///
/// Covers configuration problems, model availability, runtime failures
/// while generating vectors, and vectors whose shape does not match what the
/// caller (or the vector store) expects.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// The model could not be loaded or the requested device is missing
    #[error("Embedding model '{model}' is unavailable: {reason}")]
    ModelUnavailable { model: String, reason: String },

    /// Error when model configuration is invalid
    #[error("Invalid embedding configuration: {message}")]
    InvalidConfig { message: String },

    /// Error during embedding generation
    #[error("Embedding generation failed: {source}")]
    EmbeddingGeneration {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A vector does not have the dimension the consumer was configured for
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The provider returned a different number of vectors than inputs
    #[error("Embedding count mismatch: {inputs} inputs produced {outputs} vectors")]
    CountMismatch { inputs: usize, outputs: usize },

    /// Vectors already stored were produced by another model
    #[error("Embedding model mismatch: index was built with '{stored}', active model is '{active}'")]
    ModelMismatch { stored: String, active: String },

    /// IO errors when preparing the model cache
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl EmbedError {
    /// Create an invalid configuration error with a custom message.
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    pub fn model_unavailable(model: impl Into<String>, reason: impl ToString) -> Self {
        Self::ModelUnavailable {
            model: model.into(),
            reason: reason.to_string(),
        }
    }
}
