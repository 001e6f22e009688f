//! Search Module
//!
//! Approximate nearest-neighbour search over record embeddings.

mod vector;

pub use vector::{
    DEFAULT_CONNECTIVITY, DEFAULT_DIMENSIONS, DEFAULT_EXPANSION_ADD, DEFAULT_EXPANSION_SEARCH,
    DEFAULT_REBUILD_AFTER_REMOVALS, VectorIndex, VectorIndexConfig, VectorIndexStats,
    VectorSearchError,
};
