//! Engine configuration
//!
//! Every tunable has a named default. Configs are plain serde structs so they
//! can be loaded from a file, and [`EngineConfig::from_env`] layers `REVERIE_*`
//! environment overrides on top of the defaults.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::activation::ActivationConfig;
use crate::consolidation::DreamConfig;
use crate::error::{MemoryError, Result};
use crate::graph::ConnectionConfig;
use crate::scoring::ScoringConfig;
use crate::search::{DEFAULT_DIMENSIONS, VectorIndexConfig};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Default weight of the emotion match when an emotion filter is supplied
pub const DEFAULT_EMOTION_WEIGHT: f64 = 0.7;

/// Default over-fetch multiplier for emotion re-ranking
pub const DEFAULT_CANDIDATE_MULTIPLIER: usize = 4;

/// Default bound on a single collaborator call (30 seconds)
pub const DEFAULT_COLLABORATOR_TIMEOUT_MS: u64 = 30_000;

/// Default number of cached query embeddings
pub const DEFAULT_QUERY_CACHE_SIZE: usize = 100;

/// File name of the persisted state inside the data directory
pub const STATE_FILE_NAME: &str = "memory_state.json";

// ============================================================================
// RECALL CONFIG
// ============================================================================

/// Recall ranking parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RecallConfig {
    /// `w` in `(1 - w) * similarity + w * emotion_match`
    pub emotion_weight: f64,
    /// Candidates fetched per requested result when re-ranking
    pub candidate_multiplier: usize,
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self {
            emotion_weight: DEFAULT_EMOTION_WEIGHT,
            candidate_multiplier: DEFAULT_CANDIDATE_MULTIPLIER,
        }
    }
}

// ============================================================================
// ENGINE CONFIG
// ============================================================================

/// Top-level engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Embedding dimension, fixed for the lifetime of a store
    pub embedding_dim: usize,
    pub connection: ConnectionConfig,
    pub activation: ActivationConfig,
    pub scoring: ScoringConfig,
    pub recall: RecallConfig,
    pub dream: DreamConfig,
    /// HNSW parameters; `dimensions` is overridden by `embedding_dim`
    pub index: VectorIndexConfig,
    /// Bound on each embedding / summarizer / generator call
    pub collaborator_timeout_ms: u64,
    /// Cached query embeddings (0 disables the cache)
    pub query_cache_size: usize,
    /// Keep merged-away records one layer deep as history
    pub retain_superseded: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            embedding_dim: DEFAULT_DIMENSIONS,
            connection: ConnectionConfig::default(),
            activation: ActivationConfig::default(),
            scoring: ScoringConfig::default(),
            recall: RecallConfig::default(),
            dream: DreamConfig::default(),
            index: VectorIndexConfig::default(),
            collaborator_timeout_ms: DEFAULT_COLLABORATOR_TIMEOUT_MS,
            query_cache_size: DEFAULT_QUERY_CACHE_SIZE,
            retain_superseded: true,
        }
    }
}

fn env_override<T: FromStr>(name: &str, target: &mut T)
where
    T::Err: std::fmt::Display,
{
    if let Ok(raw) = std::env::var(name) {
        match raw.trim().parse::<T>() {
            Ok(value) => *target = value,
            Err(e) => tracing::warn!(var = name, value = %raw, "Ignoring invalid override: {}", e),
        }
    }
}

impl EngineConfig {
    /// Create a default config for a given embedding dimension
    pub fn with_dimensions(embedding_dim: usize) -> Self {
        Self {
            embedding_dim,
            ..Default::default()
        }
    }

    /// Defaults overridden by `REVERIE_*` environment variables
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Apply `REVERIE_*` environment overrides to this config
    pub fn apply_env(&mut self) {
        env_override("REVERIE_EMBEDDING_DIM", &mut self.embedding_dim);
        env_override("REVERIE_COLLABORATOR_TIMEOUT_MS", &mut self.collaborator_timeout_ms);
        env_override("REVERIE_QUERY_CACHE_SIZE", &mut self.query_cache_size);
        env_override("REVERIE_RETAIN_SUPERSEDED", &mut self.retain_superseded);
        env_override("REVERIE_EMBEDDING_THRESHOLD", &mut self.connection.embedding_threshold);
        env_override("REVERIE_EMOTION_THRESHOLD", &mut self.connection.emotion_threshold);
        env_override("REVERIE_EMOTION_WEIGHT", &mut self.recall.emotion_weight);
        env_override("REVERIE_STRENGTHEN_DELTA", &mut self.scoring.strengthen_delta);
        env_override("REVERIE_RETAIN_THRESHOLD", &mut self.dream.retain_threshold);
        env_override("REVERIE_FILTERED_POLICY", &mut self.dream.filtered_policy);
        env_override("REVERIE_MERGE_THRESHOLD", &mut self.dream.merge_threshold);
        env_override("REVERIE_REBUILD_AFTER_REMOVALS", &mut self.index.rebuild_after_removals);
    }

    /// Collaborator timeout as a [`Duration`]
    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_millis(self.collaborator_timeout_ms)
    }

    /// Index config with dimensions taken from `embedding_dim`
    pub fn index_config(&self) -> VectorIndexConfig {
        VectorIndexConfig {
            dimensions: self.embedding_dim,
            ..self.index.clone()
        }
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        fn unit(name: &str, value: f64) -> Result<()> {
            if !(0.0..=1.0).contains(&value) {
                return Err(MemoryError::InvalidInput(format!(
                    "{} must be in [0, 1], got {}",
                    name, value
                )));
            }
            Ok(())
        }

        if self.embedding_dim == 0 {
            return Err(MemoryError::InvalidInput(
                "embedding_dim must be non-zero".to_string(),
            ));
        }
        if self.collaborator_timeout_ms == 0 {
            return Err(MemoryError::InvalidInput(
                "collaborator_timeout_ms must be non-zero".to_string(),
            ));
        }

        unit("embedding_threshold", self.connection.embedding_threshold)?;
        unit("emotion_weight", self.recall.emotion_weight)?;
        unit("attenuation", self.activation.attenuation)?;
        unit("strengthen_delta", self.scoring.strengthen_delta)?;
        unit("retain_threshold", self.dream.retain_threshold)?;
        unit("retain_sample_rate", self.dream.retain_sample_rate)?;
        unit("long_term_importance", self.dream.long_term_importance)?;
        unit("merge_threshold", self.dream.merge_threshold)?;
        unit("scenario_importance", self.dream.scenario_importance)?;

        if !self.connection.emotion_threshold.is_finite() || self.connection.emotion_threshold < 0.0 {
            return Err(MemoryError::InvalidInput(
                "emotion_threshold must be a non-negative number".to_string(),
            ));
        }
        if !self.activation.floor.is_finite() || self.activation.floor < 0.0 {
            return Err(MemoryError::InvalidInput(
                "activation floor must be a non-negative number".to_string(),
            ));
        }
        if !self.dream.promotion_boost.is_finite() || self.dream.promotion_boost < 1.0 {
            return Err(MemoryError::InvalidInput(
                "promotion_boost must be at least 1.0".to_string(),
            ));
        }
        if self.dream.min_cluster_size < 2 {
            return Err(MemoryError::InvalidInput(
                "min_cluster_size must be at least 2".to_string(),
            ));
        }
        if self.dream.max_cluster_size < self.dream.min_cluster_size {
            return Err(MemoryError::InvalidInput(
                "max_cluster_size must not be below min_cluster_size".to_string(),
            ));
        }
        if self.recall.candidate_multiplier == 0 {
            return Err(MemoryError::InvalidInput(
                "candidate_multiplier must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Default location of the persisted state file
///
/// `REVERIE_DATA_DIR` wins, then the platform data directory.
pub fn default_state_path() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("REVERIE_DATA_DIR") {
        return Some(PathBuf::from(dir).join(STATE_FILE_NAME));
    }
    directories::ProjectDirs::from("com", "reverie", "core")
        .map(|dirs| dirs.data_dir().join(STATE_FILE_NAME))
}
