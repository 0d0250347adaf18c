//! TOML configuration.
//!
//! Every field has a default, so an empty file (or no file at all) is a valid
//! configuration. Sections: `[store]`, `[locator]`, `[chunking]`,
//! `[embedding]`, `[ingest]`, `[retrieval]`.

use crate::error::{NearfileError, Result};
use chrono::Duration;
use nearfile_context::ChunkerConfig;
use nearfile_embed::EmbedConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the configuration file picked up from the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "nearfile.toml";

/// Longest accepted retention window: one year.
pub const MAX_RETENTION_MINUTES: u64 = 366 * 24 * 60;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NearfileConfig {
    pub store: StoreConfig,
    pub locator: LocatorConfig,
    pub chunking: ChunkerConfig,
    pub embedding: EmbedConfig,
    pub ingest: IngestConfig,
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub retention_minutes: u64,
    pub sweep_interval_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".nearfile/index.db"),
            retention_minutes: 20,
            sweep_interval_secs: 60,
        }
    }
}

impl StoreConfig {
    /// The retention window, clamped to [`MAX_RETENTION_MINUTES`].
    pub fn retention(&self) -> Duration {
        Duration::minutes(self.retention_minutes.min(MAX_RETENTION_MINUTES) as i64)
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    /// Lowest fuzzy score accepted as a match.
    pub min_score: f64,
    pub max_depth: usize,
    pub follow_symlinks: bool,
    /// Directory names never descended into.
    pub excluded_dirs: Vec<String>,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            min_score: 0.6,
            max_depth: 32,
            follow_symlinks: true,
            excluded_dirs: [".git", "__pycache__", ".venv", "node_modules"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub max_file_bytes: u64,
    /// Files loaded, chunked and embedded at the same time within one ingest.
    pub concurrency: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: 16 * 1024 * 1024,
            concurrency: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub default_k: usize,
    /// Candidates fetched from the store per requested result.
    pub candidate_multiplier: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_k: 5,
            candidate_multiplier: 3,
        }
    }
}

impl NearfileConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: NearfileConfig = toml::from_str(content)
            .map_err(|e| NearfileError::config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.chunking
            .validate()
            .map_err(|e| NearfileError::config(format!("chunking: {e}")))?;
        self.embedding
            .validate()
            .map_err(|e| NearfileError::config(format!("embedding: {e}")))?;

        if !(0.0..=1.0).contains(&self.locator.min_score) {
            return Err(NearfileError::config("locator.min_score must be in [0.0, 1.0]"));
        }
        if self.store.retention_minutes == 0 {
            return Err(NearfileError::config("store.retention_minutes must be > 0"));
        }
        if self.store.retention_minutes > MAX_RETENTION_MINUTES {
            return Err(NearfileError::config(format!(
                "store.retention_minutes must be <= {MAX_RETENTION_MINUTES}"
            )));
        }
        if self.store.sweep_interval_secs == 0 {
            return Err(NearfileError::config("store.sweep_interval_secs must be > 0"));
        }
        if self.ingest.concurrency == 0 {
            return Err(NearfileError::config("ingest.concurrency must be >= 1"));
        }
        if self.ingest.max_file_bytes == 0 {
            return Err(NearfileError::config("ingest.max_file_bytes must be > 0"));
        }
        if self.retrieval.candidate_multiplier == 0 {
            return Err(NearfileError::config(
                "retrieval.candidate_multiplier must be >= 1",
            ));
        }
        Ok(())
    }
}

/// Load configuration from `path`, or from `nearfile.toml` in the working
/// directory when no path is given. A missing default file yields defaults;
/// a missing explicit file is an error.
pub fn load_config(path: Option<&Path>) -> Result<NearfileConfig> {
    let (path, required) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    };

    if !required && !path.exists() {
        tracing::debug!("no {} found, using defaults", DEFAULT_CONFIG_FILE);
        return Ok(NearfileConfig::default());
    }

    let content = std::fs::read_to_string(&path).map_err(|e| {
        NearfileError::config(format!("failed to read config file {}: {e}", path.display()))
    })?;
    let config = NearfileConfig::from_toml_str(&content)?;
    tracing::info!(path = %path.display(), "loaded configuration");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nearfile_embed::{DevicePreference, ProviderKind};
    use tempfile::tempdir;

    #[test]
    fn test_empty_config_is_all_defaults() {
        let config = NearfileConfig::from_toml_str("").unwrap();
        assert_eq!(config, NearfileConfig::default());
        assert_eq!(config.store.retention(), Duration::minutes(20));
        assert_eq!(config.chunking.sentences_per_chunk, 4);
        assert_eq!(config.embedding.batch_size, 32);
        assert_eq!(config.retrieval.default_k, 5);
        assert!(config.locator.excluded_dirs.contains(&".git".to_string()));
    }

    #[test]
    fn test_partial_sections() {
        let config = NearfileConfig::from_toml_str(
            r#"
            [store]
            retention_minutes = 5

            [embedding]
            provider = "hash"
            dimension = 64
            device = "cpu"

            [chunking]
            sentences_per_chunk = 6
            overlap_sentences = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.store.retention_minutes, 5);
        assert_eq!(config.store.path, PathBuf::from(".nearfile/index.db"));
        assert_eq!(config.embedding.provider, ProviderKind::Hash);
        assert_eq!(config.embedding.dimension, 64);
        assert_eq!(config.embedding.device, DevicePreference::Cpu);
        assert_eq!(config.chunking.sentences_per_chunk, 6);
        assert_eq!(config.chunking.fallback_chunk_chars, 800);
    }

    #[test]
    fn test_validation_errors() {
        let cases = [
            "[chunking]\noverlap_sentences = 4",
            "[locator]\nmin_score = 1.5",
            "[store]\nretention_minutes = 0",
            "[store]\nretention_minutes = 4611686018427387904",
            "[store]\nretention_minutes = 527041",
            "[retrieval]\ncandidate_multiplier = 0",
            "[ingest]\nconcurrency = 0",
            "[embedding]\nbatch_size = 0",
        ];
        for case in cases {
            let err = NearfileConfig::from_toml_str(case).unwrap_err();
            assert!(
                matches!(err, NearfileError::Config { .. }),
                "expected config error for {case:?}, got {err:?}"
            );
        }
    }

    #[test]
    fn test_retention_is_bounded() {
        let config =
            NearfileConfig::from_toml_str("[store]\nretention_minutes = 527040").unwrap();
        assert_eq!(config.store.retention(), Duration::days(366));

        let oversized = StoreConfig {
            retention_minutes: u64::MAX,
            ..StoreConfig::default()
        };
        assert_eq!(oversized.retention(), Duration::minutes(MAX_RETENTION_MINUTES as i64));
    }

    #[test]
    fn test_unparseable_config() {
        let err = NearfileConfig::from_toml_str("[store\npath = 3").unwrap_err();
        assert!(err.to_string().contains("failed to parse config"));
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[retrieval]\ndefault_k = 9\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.retrieval.default_k, 9);

        let missing = load_config(Some(&dir.path().join("absent.toml")));
        assert!(missing.is_err());
    }
}
