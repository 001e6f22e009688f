//! Engine error types

use crate::memory::EmotionParseError;
use crate::search::VectorSearchError;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Memory engine error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// Embedding has the wrong number of dimensions for this store
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    /// Embedding provider failed or timed out
    #[error("Embedding provider unavailable: {0}")]
    EmbeddingUnavailable(String),
    /// Summarizer failed or timed out
    #[error("Summarizer unavailable: {0}")]
    SummarizerUnavailable(String),
    /// Scenario generator failed or timed out
    #[error("Generator unavailable: {0}")]
    GeneratorUnavailable(String),
    /// No live record with this id
    #[error("Record not found: {0}")]
    RecordNotFound(String),
    /// Persisted state cannot be loaded into this engine
    #[error("Incompatible state: {0}")]
    IncompatibleState(String),
    /// Emotion profile failed strict decoding
    #[error("Invalid emotion profile: {0}")]
    InvalidEmotionProfile(#[from] EmotionParseError),
    /// Caller supplied an unusable value
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// Vector index failure
    #[error("Vector index error: {0}")]
    Index(VectorSearchError),
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON encode/decode error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// A thread panicked while holding the state lock
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}

impl MemoryError {
    /// Whether the failed operation can be retried unchanged.
    ///
    /// Collaborator failures never commit partial state, so retrying them is safe.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MemoryError::EmbeddingUnavailable(_)
                | MemoryError::SummarizerUnavailable(_)
                | MemoryError::GeneratorUnavailable(_)
        )
    }
}

impl From<VectorSearchError> for MemoryError {
    fn from(err: VectorSearchError) -> Self {
        match err {
            VectorSearchError::InvalidDimensions(expected, actual) => {
                MemoryError::DimensionMismatch { expected, actual }
            }
            other => MemoryError::Index(other),
        }
    }
}

/// Engine result type
pub type Result<T> = std::result::Result<T, MemoryError>;
