//! # Reverie Core
//!
//! Tiered associative memory engine. Experiences are stored as records with an
//! embedding, an emotion profile and two scores, then kept, strengthened,
//! linked, faded and periodically reorganized:
//!
//! - **Vector recall**: HNSW nearest-neighbour search with USearch, optionally
//!   re-ranked by emotional match
//! - **Connection graph**: symmetric weighted links between similar or
//!   emotionally alike memories
//! - **Spreading activation**: recall lights up associated memories, with
//!   attenuation per hop
//! - **Decay & pruning**: importance fades daily, activation by half-life;
//!   unimportant memories can be pruned
//! - **Tiers**: Working → ShortTerm → LongTerm
//! - **Dreaming**: a consolidation cycle that filters fresh memories, promotes
//!   tiers, merges near-duplicates through a summarizer and imagines future
//!   scenarios through a generator
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use reverie_core::prelude::*;
//!
//! let engine = MemoryEngine::new(
//!     EngineConfig::from_env(),
//!     Arc::new(my_embedder),
//!     Arc::new(my_summarizer),
//!     Arc::new(my_generator),
//! )?;
//!
//! let joy = EmotionProfile::from_pairs([("joy", 0.9)])?;
//! engine.add_memory("Finished the marathon", 0.8, joy).await?;
//!
//! let hits = engine.recall_memory("running", 5, None).await?;
//!
//! let scheduler = DreamScheduler::spawn(engine.clone(), SchedulerConfig::default());
//! ```
//!
//! ## Feature Flags
//!
//! - `embeddings`: local embedding generation with fastembed
//! - `metal`: Metal acceleration for the local model on Apple Silicon

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod activation;
pub mod collaborators;
pub mod config;
pub mod consolidation;
pub mod embeddings;
pub mod engine;
pub mod error;
pub mod graph;
pub mod memory;
pub mod scoring;
pub mod search;
pub mod state;
pub mod store;

#[cfg(test)]
mod testing;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Memory types
pub use memory::{
    AddMemoryInput, EmotionParseError, EmotionProfile, MemoryRecord, MemoryStats, MemoryTier,
    RecalledMemory,
};

// Engine
pub use config::{EngineConfig, RecallConfig, default_state_path};
pub use engine::MemoryEngine;
pub use error::{MemoryError, Result};

// Graph & activation
pub use activation::{ActivatedMemory, ActivationConfig};
pub use graph::{ConnectionConfig, GraphEdge, GraphNode, MemoryGraph};

// Scoring
pub use scoring::{FadeReport, ImportanceScorer, ScoringConfig};

// Consolidation
pub use consolidation::{
    DreamConfig, DreamReport, DreamScheduler, DreamStage, FilteredPolicy, SchedulerCommand,
    SchedulerConfig, SchedulerHandle, StageResult,
};

// Collaborators
pub use collaborators::{CollaboratorError, Generator, Stance, Summarizer};
pub use embeddings::{EmbeddingError, EmbeddingProvider};

#[cfg(feature = "embeddings")]
#[cfg_attr(docsrs, doc(cfg(feature = "embeddings")))]
pub use embeddings::LocalEmbedder;

// Persistence
pub use state::{FORMAT_VERSION, MemorySnapshot, PersistedRecord};

// Search
pub use search::{VectorIndex, VectorIndexConfig, VectorIndexStats, VectorSearchError};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenience prelude for common imports
pub mod prelude {
    pub use crate::{
        AddMemoryInput, DreamReport, DreamScheduler, EmbeddingProvider, EmotionProfile,
        EngineConfig, Generator, MemoryEngine, MemoryError, MemoryRecord, MemoryTier,
        RecalledMemory, Result, SchedulerConfig, Stance, Summarizer,
    };
}
