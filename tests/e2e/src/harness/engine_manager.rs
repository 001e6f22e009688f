//! Test Engine Manager
//!
//! Provides isolated engine instances for testing:
//! - A temporary state directory removed on drop
//! - Shared mock embedder so tests can pin vectors and count calls
//! - Save and reopen to exercise persistence

use std::path::{Path, PathBuf};
use std::sync::Arc;

use reverie_core::{EngineConfig, Generator, MemoryEngine, Summarizer};
use tempfile::TempDir;

use crate::mocks::{DIM, MockEmbedder, MockGenerator, MockSummarizer, init_tracing};

/// Manager for test engines
///
/// # Example
///
/// ```rust,ignore
/// let manager = TestEngineManager::new();
/// let id = TestDataFactory::create_memory(&manager.engine, "hello", 0.5, v).await;
/// manager.save();
/// let reopened = manager.reopen();
/// ```
pub struct TestEngineManager {
    /// The engine under test
    pub engine: MemoryEngine,
    /// Embedder shared by every engine this manager builds
    pub embedder: Arc<MockEmbedder>,
    config: EngineConfig,
    summarizer: Arc<dyn Summarizer>,
    generator: Arc<dyn Generator>,
    _temp_dir: TempDir,
    state_path: PathBuf,
}

impl Default for TestEngineManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TestEngineManager {
    /// Engine with default settings and healthy collaborators
    pub fn new() -> Self {
        Self::with_config(Self::default_config())
    }

    /// Default config at the e2e embedding dimension
    pub fn default_config() -> EngineConfig {
        EngineConfig::with_dimensions(DIM)
    }

    /// Engine with a custom config and healthy collaborators
    pub fn with_config(config: EngineConfig) -> Self {
        Self::with_collaborators(config, Arc::new(MockSummarizer), Arc::new(MockGenerator))
    }

    /// Engine with custom collaborators
    pub fn with_collaborators(
        config: EngineConfig,
        summarizer: Arc<dyn Summarizer>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        init_tracing();

        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let state_path = temp_dir.path().join("memory_state.json");
        let embedder = Arc::new(MockEmbedder::new());
        let engine = MemoryEngine::new(
            config.clone(),
            embedder.clone(),
            summarizer.clone(),
            generator.clone(),
        )
        .expect("Failed to create test engine");

        Self {
            engine,
            embedder,
            config,
            summarizer,
            generator,
            _temp_dir: temp_dir,
            state_path,
        }
    }

    /// Path of the state file inside the temp directory
    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    /// Save the engine to the state file
    pub fn save(&self) {
        self.engine
            .save_state(&self.state_path)
            .expect("Failed to save state");
    }

    /// A fresh engine with the same config, loaded from the state file
    pub fn reopen(&self) -> MemoryEngine {
        let engine = self.fresh_engine();
        engine
            .load_state(&self.state_path)
            .expect("Failed to load state");
        engine
    }

    /// A fresh, empty engine sharing this manager's collaborators
    pub fn fresh_engine(&self) -> MemoryEngine {
        MemoryEngine::new(
            self.config.clone(),
            self.embedder.clone(),
            self.summarizer.clone(),
            self.generator.clone(),
        )
        .expect("Failed to create test engine")
    }

    /// Number of live records
    pub fn record_count(&self) -> usize {
        self.engine
            .stats()
            .map(|s| s.total_records)
            .unwrap_or(0)
    }
}
