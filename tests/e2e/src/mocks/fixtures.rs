//! Test Data Factory
//!
//! Provides deterministic collaborators and data for journey tests:
//! - An embedder with pinned vectors for known texts
//! - Summarizer and generator stand-ins, healthy and failing
//! - Vectors with a chosen cosine similarity to a reference

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use reverie_core::embeddings::normalize;
use reverie_core::{
    AddMemoryInput, CollaboratorError, EmbeddingError, EmbeddingProvider, EmotionProfile,
    Generator, MemoryEngine, Stance, Summarizer,
};

/// Embedding dimension used by every e2e engine
pub const DIM: usize = 16;

/// Install a test subscriber once; honours `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

// ============================================================================
// EMBEDDER
// ============================================================================

/// Embedder returning pinned vectors for known texts and a word hash otherwise
#[derive(Default)]
pub struct MockEmbedder {
    pinned: Mutex<HashMap<String, Vec<f32>>>,
    calls: AtomicUsize,
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `text` embed to `vector`
    pub fn pin(&self, text: &str, vector: Vec<f32>) {
        if let Ok(mut pinned) = self.pinned.lock() {
            pinned.insert(text.to_string(), vector);
        }
    }

    /// Number of embed calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn hashed(text: &str) -> Vec<f32> {
        let mut v = vec![0.0_f32; DIM];
        for word in text.split_whitespace() {
            let h = word
                .to_lowercase()
                .bytes()
                .fold(17u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
            v[(h % DIM as u64) as usize] += 1.0;
        }
        normalize(&mut v);
        v
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("empty text".to_string()));
        }
        let pinned = self
            .pinned
            .lock()
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?
            .get(text)
            .cloned();
        Ok(pinned.unwrap_or_else(|| Self::hashed(text)))
    }

    fn dimensions(&self) -> usize {
        DIM
    }

    fn model_name(&self) -> &str {
        "mock-embedder"
    }
}

// ============================================================================
// SUMMARIZER & GENERATOR
// ============================================================================

/// Splits a cluster into a "gist" and a "details" summary
pub struct MockSummarizer;

#[async_trait]
impl Summarizer for MockSummarizer {
    async fn merge(&self, contents: &[String]) -> Result<Vec<String>, CollaboratorError> {
        if contents.len() < 2 {
            return Err(CollaboratorError::InvalidOutput(
                "need at least two memories".to_string(),
            ));
        }
        Ok(vec![
            format!("gist of {} memories: {}", contents.len(), contents[0]),
            format!("details: {}", contents[1..].join("; ")),
        ])
    }
}

/// Produces a one-line scenario naming its stance
pub struct MockGenerator;

#[async_trait]
impl Generator for MockGenerator {
    async fn scenario(&self, context: &str, stance: Stance) -> Result<String, CollaboratorError> {
        let first = context.lines().next().unwrap_or_default();
        Ok(match stance {
            Stance::Positive => format!("It works out: {}", first),
            Stance::Negative => format!("It goes wrong: {}", first),
        })
    }
}

/// Always fails
pub struct FailingGenerator;

#[async_trait]
impl Generator for FailingGenerator {
    async fn scenario(&self, _context: &str, _stance: Stance) -> Result<String, CollaboratorError> {
        Err(CollaboratorError::Failed("backend offline".to_string()))
    }
}

// ============================================================================
// DATA FACTORY
// ============================================================================

/// Factory for creating test data
pub struct TestDataFactory;

impl TestDataFactory {
    /// Unit vector along `axis`
    pub fn axis(axis: usize) -> Vec<f32> {
        let mut v = vec![0.0_f32; DIM];
        v[axis % DIM] = 1.0;
        v
    }

    /// Unit vector whose cosine similarity with `axis(base)` is `similarity`
    ///
    /// The remainder goes to `axis(other)`, which must differ from `base`.
    pub fn with_similarity(base: usize, other: usize, similarity: f32) -> Vec<f32> {
        let mut v = vec![0.0_f32; DIM];
        v[base % DIM] = similarity;
        v[other % DIM] = (1.0 - similarity * similarity).max(0.0).sqrt();
        v
    }

    /// Add a memory with an explicit embedding
    pub async fn create_memory(
        engine: &MemoryEngine,
        content: &str,
        importance: f64,
        embedding: Vec<f32>,
    ) -> String {
        engine
            .add_memory_with(AddMemoryInput::new(content, importance).with_embedding(embedding))
            .await
            .expect("Failed to add memory")
    }

    /// Add a memory with emotions and an explicit embedding
    pub async fn create_emotional_memory(
        engine: &MemoryEngine,
        content: &str,
        importance: f64,
        embedding: Vec<f32>,
        emotions: &[(&str, f64)],
    ) -> String {
        let profile =
            EmotionProfile::from_pairs(emotions.iter().copied()).expect("Invalid emotion profile");
        engine
            .add_memory_with(
                AddMemoryInput::new(content, importance)
                    .with_embedding(embedding)
                    .with_emotions(profile),
            )
            .await
            .expect("Failed to add memory")
    }

    /// Add `count` unrelated memories at one importance
    pub async fn create_batch(engine: &MemoryEngine, count: usize, importance: f64) -> Vec<String> {
        let mut ids = Vec::with_capacity(count);
        for i in 0..count {
            ids.push(
                Self::create_memory(engine, &format!("Test memory {}", i), importance, Self::axis(i))
                    .await,
            );
        }
        ids
    }

    /// Four near-identical memories about one topic, all similar above 0.85
    pub async fn create_duplicate_cluster(engine: &MemoryEngine, base: usize) -> Vec<String> {
        let mut ids = Vec::with_capacity(4);
        for (i, similarity) in [0.99_f32, 0.98, 0.97, 0.96].into_iter().enumerate() {
            ids.push(
                Self::create_memory(
                    engine,
                    &format!("morning standup notes, take {}", i + 1),
                    0.6,
                    Self::with_similarity(base, base + 1, similarity),
                )
                .await,
            );
        }
        ids
    }
}
