//! Vector Index
//!
//! Uses USearch for HNSW (Hierarchical Navigable Small World) indexing.
//!
//! Features:
//! - Cosine distance, full-precision storage
//! - Exact re-scoring of candidates from the stored vectors
//! - Deterministic ordering: ascending distance, ties by insertion order
//! - Tombstoned removal with lazy rebuild after a configurable number of removals

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use crate::embeddings::cosine_similarity;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Default embedding dimensions
pub const DEFAULT_DIMENSIONS: usize = 256;

/// HNSW connectivity parameter (higher = better recall, more memory)
pub const DEFAULT_CONNECTIVITY: usize = 16;

/// HNSW expansion factor for index building
pub const DEFAULT_EXPANSION_ADD: usize = 128;

/// HNSW expansion factor for search (higher = better recall, slower)
pub const DEFAULT_EXPANSION_SEARCH: usize = 64;

/// Removals tolerated before the HNSW graph is rebuilt without tombstones
pub const DEFAULT_REBUILD_AFTER_REMOVALS: usize = 64;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Vector search error types
#[non_exhaustive]
#[derive(Debug, Clone)]
pub enum VectorSearchError {
    /// Failed to create the index
    IndexCreation(String),
    /// Failed to add a vector
    IndexAdd(String),
    /// Failed to search
    IndexSearch(String),
    /// Dimension mismatch (expected, got)
    InvalidDimensions(usize, usize),
}

impl std::fmt::Display for VectorSearchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VectorSearchError::IndexCreation(e) => write!(f, "Index creation failed: {}", e),
            VectorSearchError::IndexAdd(e) => write!(f, "Failed to add vector: {}", e),
            VectorSearchError::IndexSearch(e) => write!(f, "Search failed: {}", e),
            VectorSearchError::InvalidDimensions(expected, got) => {
                write!(f, "Invalid dimensions: expected {}, got {}", expected, got)
            }
        }
    }
}

impl std::error::Error for VectorSearchError {}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for vector index
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VectorIndexConfig {
    /// Number of dimensions
    pub dimensions: usize,
    /// HNSW connectivity parameter
    pub connectivity: usize,
    /// Expansion factor for adding vectors
    pub expansion_add: usize,
    /// Expansion factor for searching
    pub expansion_search: usize,
    /// Tombstones accumulated before a rebuild
    pub rebuild_after_removals: usize,
}

impl Default for VectorIndexConfig {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_DIMENSIONS,
            connectivity: DEFAULT_CONNECTIVITY,
            expansion_add: DEFAULT_EXPANSION_ADD,
            expansion_search: DEFAULT_EXPANSION_SEARCH,
            rebuild_after_removals: DEFAULT_REBUILD_AFTER_REMOVALS,
        }
    }
}

/// Index statistics
#[derive(Debug, Clone, Serialize)]
pub struct VectorIndexStats {
    /// Live vectors
    pub total_vectors: usize,
    /// Removed vectors still present in the HNSW graph
    pub tombstones: usize,
    /// Vector dimensions
    pub dimensions: usize,
    /// Number of rebuilds performed
    pub rebuilds: u64,
    /// Estimated memory usage in bytes
    pub memory_bytes: usize,
}

// ============================================================================
// VECTOR INDEX
// ============================================================================

/// HNSW vector index keyed by record id
///
/// Internal u64 keys are handed out in insertion order, so sorting on them
/// breaks distance ties stably.
pub struct VectorIndex {
    index: Index,
    config: VectorIndexConfig,
    key_to_id: HashMap<String, u64>,
    id_to_key: HashMap<u64, String>,
    vectors: HashMap<u64, Vec<f32>>,
    tombstones: usize,
    next_id: u64,
    rebuilds: u64,
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("dimensions", &self.config.dimensions)
            .field("live", &self.vectors.len())
            .field("tombstones", &self.tombstones)
            .finish()
    }
}

fn new_native_index(config: &VectorIndexConfig) -> Result<Index, VectorSearchError> {
    if config.dimensions == 0 {
        return Err(VectorSearchError::IndexCreation(
            "dimensions must be non-zero".to_string(),
        ));
    }

    let options = IndexOptions {
        dimensions: config.dimensions,
        metric: MetricKind::Cos,
        quantization: ScalarKind::F32,
        connectivity: config.connectivity,
        expansion_add: config.expansion_add,
        expansion_search: config.expansion_search,
        multi: false,
    };

    Index::new(&options).map_err(|e| VectorSearchError::IndexCreation(e.to_string()))
}

impl VectorIndex {
    /// Create a new vector index with default configuration
    pub fn new() -> Result<Self, VectorSearchError> {
        Self::with_config(VectorIndexConfig::default())
    }

    /// Create a new vector index with custom configuration
    pub fn with_config(config: VectorIndexConfig) -> Result<Self, VectorSearchError> {
        let index = new_native_index(&config)?;

        Ok(Self {
            index,
            config,
            key_to_id: HashMap::new(),
            id_to_key: HashMap::new(),
            vectors: HashMap::new(),
            tombstones: 0,
            next_id: 0,
            rebuilds: 0,
        })
    }

    /// Number of live vectors
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Check if the index is empty
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Get the dimensions of the index
    pub fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    /// Check if a key exists in the index
    pub fn contains(&self, key: &str) -> bool {
        self.key_to_id.contains_key(key)
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<(), VectorSearchError> {
        if vector.len() != self.config.dimensions {
            return Err(VectorSearchError::InvalidDimensions(
                self.config.dimensions,
                vector.len(),
            ));
        }
        Ok(())
    }

    /// usearch requires reserve() before add()
    fn ensure_capacity(&self) -> Result<(), VectorSearchError> {
        let capacity = self.index.capacity();
        if self.index.size() >= capacity {
            let new_capacity = std::cmp::max(capacity * 2, 16);
            self.index.reserve(new_capacity).map_err(|e| {
                VectorSearchError::IndexCreation(format!("Failed to reserve capacity: {}", e))
            })?;
        }
        Ok(())
    }

    /// Insert a vector, replacing any previous vector under the same key
    pub fn insert(&mut self, key: &str, vector: &[f32]) -> Result<(), VectorSearchError> {
        self.check_dimensions(vector)?;

        if self.contains(key) {
            self.remove(key);
        }

        self.ensure_capacity()?;

        let id = self.next_id;
        self.index
            .add(id, vector)
            .map_err(|e| VectorSearchError::IndexAdd(e.to_string()))?;
        self.next_id += 1;

        self.key_to_id.insert(key.to_string(), id);
        self.id_to_key.insert(id, key.to_string());
        self.vectors.insert(id, vector.to_vec());

        Ok(())
    }

    /// Remove a vector by key
    ///
    /// The HNSW entry is tombstoned; once `rebuild_after_removals` tombstones
    /// accumulate the graph is rebuilt from the live vectors. A failed rebuild
    /// keeps the tombstoned graph, which stays correct because stale keys are
    /// filtered out at search time.
    pub fn remove(&mut self, key: &str) -> bool {
        let Some(id) = self.key_to_id.remove(key) else {
            return false;
        };
        self.id_to_key.remove(&id);
        self.vectors.remove(&id);
        self.tombstones += 1;

        if self.tombstones >= self.config.rebuild_after_removals.max(1) {
            if let Err(e) = self.rebuild() {
                tracing::warn!("Vector index rebuild failed, keeping tombstones: {}", e);
            }
        }
        true
    }

    /// Rebuild the HNSW graph from live vectors, dropping tombstones
    pub fn rebuild(&mut self) -> Result<(), VectorSearchError> {
        let index = new_native_index(&self.config)?;
        index
            .reserve(std::cmp::max(self.vectors.len(), 16))
            .map_err(|e| VectorSearchError::IndexCreation(e.to_string()))?;

        let mut ids: Vec<u64> = self.vectors.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            if let Some(vector) = self.vectors.get(&id) {
                index
                    .add(id, vector)
                    .map_err(|e| VectorSearchError::IndexAdd(e.to_string()))?;
            }
        }

        self.index = index;
        self.tombstones = 0;
        self.rebuilds += 1;
        tracing::debug!(live = self.vectors.len(), "Vector index rebuilt");
        Ok(())
    }

    /// Nearest neighbours as `(key, cosine distance)`, ascending distance
    pub fn search(
        &self,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<(String, f32)>, VectorSearchError> {
        self.check_dimensions(query)?;

        if self.is_empty() || limit == 0 {
            return Ok(vec![]);
        }

        let fetch = (limit + self.tombstones).min(self.index.size());
        let matches = self
            .index
            .search(query, fetch)
            .map_err(|e| VectorSearchError::IndexSearch(e.to_string()))?;

        let mut hits: Vec<(u64, f32)> = matches
            .keys
            .iter()
            .filter_map(|id| {
                self.vectors
                    .get(id)
                    .map(|vector| (*id, 1.0 - cosine_similarity(query, vector)))
            })
            .collect();

        hits.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        hits.truncate(limit);

        Ok(hits
            .into_iter()
            .filter_map(|(id, distance)| self.id_to_key.get(&id).map(|k| (k.clone(), distance)))
            .collect())
    }

    /// Get index statistics
    pub fn stats(&self) -> VectorIndexStats {
        VectorIndexStats {
            total_vectors: self.len(),
            tombstones: self.tombstones,
            dimensions: self.config.dimensions,
            rebuilds: self.rebuilds,
            memory_bytes: self.index.serialized_length(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
