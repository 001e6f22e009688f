//! Local Semantic Embeddings
//!
//! Uses fastembed v5 for local inference with Nomic Embed Text v1.5
//! (ONNX, 768d → 256d Matryoshka, 8192 context). No external API calls.

use std::sync::{Mutex, OnceLock};

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use super::{EmbeddingError, EmbeddingProvider};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Embedding dimensions after Matryoshka truncation (768 → 256)
pub const EMBEDDING_DIMENSIONS: usize = 256;

/// Maximum text length for embedding (truncated if longer)
pub const MAX_TEXT_LENGTH: usize = 8192;

// ============================================================================
// GLOBAL MODEL
// ============================================================================

static EMBEDDING_MODEL_RESULT: OnceLock<Result<Mutex<TextEmbedding>, String>> = OnceLock::new();

/// Model cache directory: FASTEMBED_CACHE_PATH, else the platform cache directory
fn get_cache_dir() -> std::path::PathBuf {
    if let Ok(path) = std::env::var("FASTEMBED_CACHE_PATH") {
        return std::path::PathBuf::from(path);
    }

    if let Some(proj_dirs) = directories::ProjectDirs::from("com", "reverie", "core") {
        return proj_dirs.cache_dir().join("fastembed");
    }

    std::path::PathBuf::from(".fastembed_cache")
}

fn get_model() -> Result<std::sync::MutexGuard<'static, TextEmbedding>, EmbeddingError> {
    let result = EMBEDDING_MODEL_RESULT.get_or_init(|| {
        let cache_dir = get_cache_dir();
        if let Err(e) = std::fs::create_dir_all(&cache_dir) {
            tracing::warn!("Failed to create cache directory {:?}: {}", cache_dir, e);
        }

        let options = InitOptions::new(EmbeddingModel::NomicEmbedTextV15)
            .with_show_download_progress(false)
            .with_cache_dir(cache_dir);

        TextEmbedding::try_new(options)
            .map(Mutex::new)
            .map_err(|e| format!("Failed to initialize nomic-embed-text-v1.5: {}", e))
    });

    match result {
        Ok(model) => model
            .lock()
            .map_err(|e| EmbeddingError::ModelInit(format!("Lock poisoned: {}", e))),
        Err(err) => Err(EmbeddingError::ModelInit(err.clone())),
    }
}

fn embed_blocking(text: &str) -> Result<Vec<f32>, EmbeddingError> {
    if text.is_empty() {
        return Err(EmbeddingError::InvalidInput(
            "Text cannot be empty".to_string(),
        ));
    }

    let mut model = get_model()?;

    let text = match text.char_indices().nth(MAX_TEXT_LENGTH) {
        Some((cut, _)) => &text[..cut],
        None => text,
    };

    let embeddings = model
        .embed(vec![text], None)
        .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?;

    embeddings
        .into_iter()
        .next()
        .map(matryoshka_truncate)
        .ok_or_else(|| EmbeddingError::EmbeddingFailed("No embedding generated".to_string()))
}

/// Truncate to [`EMBEDDING_DIMENSIONS`] and L2-normalize
///
/// The first N dimensions of a Matryoshka embedding are themselves a valid
/// N-dimensional embedding.
pub fn matryoshka_truncate(mut vector: Vec<f32>) -> Vec<f32> {
    if vector.len() > EMBEDDING_DIMENSIONS {
        vector.truncate(EMBEDDING_DIMENSIONS);
    }
    super::normalize(&mut vector);
    vector
}

// ============================================================================
// PROVIDER
// ============================================================================

/// fastembed-backed [`EmbeddingProvider`]
///
/// The model is loaded lazily on first use and shared process-wide.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalEmbedder;

impl LocalEmbedder {
    /// Create a new local embedder
    pub fn new() -> Self {
        Self
    }

    /// Load (and download if needed) the model up front
    pub fn init(&self) -> Result<(), EmbeddingError> {
        get_model().map(|_| ())
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let text = text.to_string();
        tokio::task::spawn_blocking(move || embed_blocking(&text))
            .await
            .map_err(|e| EmbeddingError::EmbeddingFailed(format!("Embedding task failed: {}", e)))?
    }

    fn dimensions(&self) -> usize {
        EMBEDDING_DIMENSIONS
    }

    fn model_name(&self) -> &str {
        "nomic-ai/nomic-embed-text-v1.5"
    }
}
