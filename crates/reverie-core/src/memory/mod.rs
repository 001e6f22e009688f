//! Memory module - Core types and data structures
//!
//! Implements the tiered associative memory model with:
//! - Memory records carrying content, embedding and emotion profile
//! - Retention tiers (working, short-term, long-term)
//! - Importance (persistent) and activation (transient) scores

mod emotion;
mod record;

pub use emotion::{EmotionParseError, EmotionProfile};
pub use record::{AddMemoryInput, MemoryRecord, MemoryTier};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// RECALL RESULTS
// ============================================================================

/// A recalled record with its relevance scores
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecalledMemory {
    /// The record, after strengthening
    pub record: MemoryRecord,
    /// Cosine similarity between query and record embedding
    pub similarity: f64,
    /// Dot product with the emotion filter, when one was supplied
    pub emotional_score: Option<f64>,
    /// Final ranking score
    pub score: f64,
}

// ============================================================================
// MEMORY STATISTICS
// ============================================================================

/// Statistics about the memory store
#[non_exhaustive]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    /// Live records
    pub total_records: usize,
    /// Live records per tier
    pub working: usize,
    pub short_term: usize,
    pub long_term: usize,
    /// Live pinned records
    pub pinned: usize,
    /// Superseded records kept as history
    pub superseded: usize,
    /// Undirected edges in the connection graph
    pub edges: usize,
    /// Mean importance across live records
    pub average_importance: f64,
    /// Mean activation across live records
    pub average_activation: f64,
    /// Embedding dimension of the store
    pub embedding_dim: usize,
    /// Timestamp of the oldest live memory
    pub oldest_memory: Option<DateTime<Utc>>,
    /// Timestamp of the newest live memory
    pub newest_memory: Option<DateTime<Utc>>,
}
