//! In-crate test doubles for the collaborator traits

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::collaborators::{CollaboratorError, Generator, Stance, Summarizer};
use crate::config::EngineConfig;
use crate::embeddings::{EmbeddingError, EmbeddingProvider, normalize};
use crate::engine::MemoryEngine;

pub(crate) const DIM: usize = 8;

/// Known texts map to fixed vectors; anything else gets a bag-of-words hash
#[derive(Default)]
pub(crate) struct FixtureEmbedder {
    fixed: HashMap<String, Vec<f32>>,
    pub(crate) calls: AtomicUsize,
}

impl FixtureEmbedder {
    pub(crate) fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.fixed.insert(text.to_string(), vector);
        self
    }
}

pub(crate) fn hashed_vector(text: &str) -> Vec<f32> {
    let mut v = vec![0.0_f32; DIM];
    for word in text.split_whitespace() {
        let h = word
            .bytes()
            .fold(7u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
        v[(h % DIM as u64) as usize] += 1.0;
    }
    normalize(&mut v);
    v
}

#[async_trait]
impl EmbeddingProvider for FixtureEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if text.is_empty() {
            return Err(EmbeddingError::InvalidInput("empty".to_string()));
        }
        Ok(self
            .fixed
            .get(text)
            .cloned()
            .unwrap_or_else(|| hashed_vector(text)))
    }

    fn dimensions(&self) -> usize {
        DIM
    }
}

/// Splits a cluster into two summaries
pub(crate) struct PairSummarizer;

#[async_trait]
impl Summarizer for PairSummarizer {
    async fn merge(&self, contents: &[String]) -> Result<Vec<String>, CollaboratorError> {
        let half = contents.len().div_ceil(2);
        Ok(vec![
            format!("summary: {}", contents[..half].join(" / ")),
            format!("summary: {}", contents[half..].join(" / ")),
        ])
    }
}

/// Returns a single summary, which the engine must reject
pub(crate) struct SingleSummarizer;

#[async_trait]
impl Summarizer for SingleSummarizer {
    async fn merge(&self, contents: &[String]) -> Result<Vec<String>, CollaboratorError> {
        Ok(vec![contents.join(" ")])
    }
}

/// Echoes the stance back
pub(crate) struct StanceGenerator;

#[async_trait]
impl Generator for StanceGenerator {
    async fn scenario(&self, context: &str, stance: Stance) -> Result<String, CollaboratorError> {
        Ok(format!("{} future after {} lines", stance, context.lines().count()))
    }
}

/// Succeeds for the positive stance only
pub(crate) struct HalfBrokenGenerator;

#[async_trait]
impl Generator for HalfBrokenGenerator {
    async fn scenario(&self, _context: &str, stance: Stance) -> Result<String, CollaboratorError> {
        match stance {
            Stance::Positive => Ok("things go well".to_string()),
            Stance::Negative => Err(CollaboratorError::Failed("model offline".to_string())),
        }
    }
}

/// Never answers in time
pub(crate) struct StalledGenerator;

#[async_trait]
impl Generator for StalledGenerator {
    async fn scenario(&self, _context: &str, _stance: Stance) -> Result<String, CollaboratorError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok("too late".to_string())
    }
}

pub(crate) fn test_config() -> EngineConfig {
    EngineConfig::with_dimensions(DIM)
}

pub(crate) fn engine_with(
    config: EngineConfig,
    embedder: Arc<FixtureEmbedder>,
    summarizer: Arc<dyn Summarizer>,
    generator: Arc<dyn Generator>,
) -> MemoryEngine {
    MemoryEngine::new(config, embedder, summarizer, generator).unwrap()
}

pub(crate) fn test_engine() -> MemoryEngine {
    engine_with(
        test_config(),
        Arc::new(FixtureEmbedder::default()),
        Arc::new(PairSummarizer),
        Arc::new(StanceGenerator),
    )
}

/// Unit vector along axis `i`, tilted toward the next axis
pub(crate) fn axis(i: usize, tilt: f32) -> Vec<f32> {
    let mut v = vec![0.0_f32; DIM];
    v[i] = 1.0;
    v[(i + 1) % DIM] = tilt;
    normalize(&mut v);
    v
}
