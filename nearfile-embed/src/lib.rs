//! # nearfile-embed
//!
//! Text embedding providers for nearfile. Texts go in as batches and come back
//! as half-precision (f16) vectors, one per input, in input order.
//!
//! ## Providers
//!
//! - [`FastEmbedProvider`]: a local ONNX model run through `fastembed`
//!   (default `AllMiniLML6V2`, 384 dimensions). Model files are downloaded on
//!   first use into the configured cache directory.
//! - [`HashEmbedProvider`]: deterministic feature hashing. No download, no
//!   model; used for tests and fully offline operation.
//!
//! ## Quick Start
//!
//! ```
//! use nearfile_embed::{EmbedConfig, create_provider};
//!
//! # fn example() -> nearfile_embed::Result<()> {
//! let provider = create_provider(&EmbedConfig::hashed(384))?;
//!
//! let texts = vec!["Hello world".to_string(), "How are you?".to_string()];
//! let result = provider.embed_texts(&texts)?;
//!
//! assert_eq!(result.len(), 2);
//! assert_eq!(result.dimension, provider.embedding_dimension());
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```
//!
//! ## Devices
//!
//! The compute device is resolved once, when the provider is created (see
//! [`device`]). The `cuda` feature enables the CUDA execution provider.
//!
//! ## Error Handling
//!
//! All operations return [`Result<T>`] using the crate's [`EmbedError`] type.
//! Vectors whose count or dimension does not match the request are rejected
//! with [`EmbedError::CountMismatch`] or [`EmbedError::DimensionMismatch`].

pub mod config;
pub mod device;
pub mod error;
pub mod hashing;
pub mod provider;

pub use config::{EmbedConfig, EmbedConfigBuilder, ProviderKind};
pub use device::{ComputeDevice, DevicePreference};
pub use error::{EmbedError, Result};
pub use half::f16;
pub use hashing::HashEmbedProvider;
pub use provider::{EmbeddingProvider, EmbeddingResult, FastEmbedProvider, create_provider};
