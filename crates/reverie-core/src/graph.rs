//! Connection Graph
//!
//! Weighted, undirected adjacency between live records. Edges are stored on
//! both endpoints (`A.connections[B] == B.connections[A]`) and a weight of zero
//! removes the edge rather than storing it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::embeddings::cosine_similarity;
use crate::error::{MemoryError, Result};
use crate::memory::{MemoryRecord, MemoryTier};
use crate::store::RecordStore;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Default embedding similarity above which records are linked
pub const DEFAULT_EMBEDDING_THRESHOLD: f64 = 0.7;

/// Default emotion dot product above which records are linked
pub const DEFAULT_EMOTION_THRESHOLD: f64 = 0.8;

/// Thresholds for automatic linking of new records
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConnectionConfig {
    /// Cosine similarity that qualifies an edge
    pub embedding_threshold: f64,
    /// Emotion-profile dot product that qualifies an edge
    pub emotion_threshold: f64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            embedding_threshold: DEFAULT_EMBEDDING_THRESHOLD,
            emotion_threshold: DEFAULT_EMOTION_THRESHOLD,
        }
    }
}

// ============================================================================
// GRAPH VIEW
// ============================================================================

/// An undirected edge, `a < b`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub a: String,
    pub b: String,
    pub weight: f64,
}

/// A node in the graph view
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub id: String,
    pub preview: String,
    pub tier: MemoryTier,
    pub importance: f64,
    pub activation: f64,
    pub degree: usize,
}

/// Snapshot of the whole connection graph
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

/// Union of the records' edges to nodes outside `exclude`, keeping the max weight
pub(crate) fn union_connections<'a, I>(records: I, exclude: &[String]) -> Vec<(String, f64)>
where
    I: IntoIterator<Item = &'a MemoryRecord>,
{
    let mut union: HashMap<String, f64> = HashMap::new();
    for record in records {
        for (neighbor, weight) in &record.connections {
            if exclude.contains(neighbor) {
                continue;
            }
            let entry = union.entry(neighbor.clone()).or_insert(0.0);
            *entry = entry.max(*weight);
        }
    }
    let mut union: Vec<(String, f64)> = union.into_iter().collect();
    union.sort_by(|a, b| a.0.cmp(&b.0));
    union
}

// ============================================================================
// GRAPH OPERATIONS
// ============================================================================

impl RecordStore {
    /// Set the weight of the edge between two live records
    ///
    /// Weights are clamped to 1.0; a non-positive weight removes the edge.
    /// Returns whether an edge exists afterwards.
    pub(crate) fn connect(&mut self, a: &str, b: &str, weight: f64) -> Result<bool> {
        for id in [a, b] {
            if !self.contains_live(id) {
                return Err(MemoryError::RecordNotFound(id.to_string()));
            }
        }
        if a == b {
            return Ok(false);
        }
        if !weight.is_finite() || weight <= 0.0 {
            self.disconnect(a, b);
            return Ok(false);
        }

        let weight = weight.min(1.0);
        for (from, to) in [(a, b), (b, a)] {
            if let Some(record) = self.get_mut(from) {
                record.connections.insert(to.to_string(), weight);
            }
        }
        Ok(true)
    }

    /// Remove the edge between two records, if any
    pub(crate) fn disconnect(&mut self, a: &str, b: &str) -> bool {
        let mut removed = false;
        for (from, to) in [(a, b), (b, a)] {
            if let Some(record) = self.get_mut(from) {
                removed |= record.connections.remove(to).is_some();
            }
        }
        removed
    }

    /// Remove every edge touching `id`
    pub(crate) fn detach(&mut self, id: &str) -> usize {
        let neighbors: Vec<String> = match self.get_mut(id) {
            Some(record) => record.connections.drain().map(|(n, _)| n).collect(),
            None => return 0,
        };
        for neighbor in &neighbors {
            if let Some(record) = self.get_mut(neighbor) {
                record.connections.remove(id);
            }
        }
        neighbors.len()
    }

    /// Neighbors of a record, strongest first
    pub fn neighbors(&self, id: &str) -> Vec<(String, f64)> {
        let mut neighbors: Vec<(String, f64)> = self
            .get(id)
            .map(|r| r.connections.iter().map(|(n, w)| (n.clone(), *w)).collect())
            .unwrap_or_default();
        neighbors.sort_by(|x, y| {
            y.1.partial_cmp(&x.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(x.0.cmp(&y.0))
        });
        neighbors
    }

    /// Every undirected edge once, sorted by endpoints
    pub fn edges(&self) -> Vec<GraphEdge> {
        let mut edges: Vec<GraphEdge> = self
            .live()
            .flat_map(|record| {
                record
                    .connections
                    .iter()
                    .filter(|(other, _)| record.id.as_str() < other.as_str())
                    .map(|(other, weight)| GraphEdge {
                        a: record.id.clone(),
                        b: other.clone(),
                        weight: *weight,
                    })
            })
            .collect();
        edges.sort_by(|x, y| x.a.cmp(&y.a).then(x.b.cmp(&y.b)));
        edges
    }

    /// Number of undirected edges
    pub fn edge_count(&self) -> usize {
        let endpoints: usize = self.live().map(|r| r.connections.len()).sum();
        endpoints / 2
    }

    /// Link `id` to every live record similar enough in embedding or emotion
    ///
    /// The edge weight is the larger qualifying score; an existing stronger
    /// edge is kept. Returns the number of edges created or strengthened.
    pub(crate) fn link_by_similarity(&mut self, id: &str, config: &ConnectionConfig) -> Result<usize> {
        let source = self
            .get_live(id)
            .ok_or_else(|| MemoryError::RecordNotFound(id.to_string()))?;

        let mut links: Vec<(String, f64)> = Vec::new();
        for other in self.live() {
            if other.id == source.id {
                continue;
            }
            let similarity = cosine_similarity(&source.embedding, &other.embedding) as f64;
            let emotional = source.emotion_profile.dot(&other.emotion_profile);

            let mut weight: Option<f64> = None;
            if similarity > config.embedding_threshold {
                weight = Some(similarity);
            }
            if emotional > config.emotion_threshold {
                weight = Some(weight.map_or(emotional, |w| w.max(emotional)));
            }
            if let Some(weight) = weight {
                let existing = source.connections.get(&other.id).copied().unwrap_or(0.0);
                if weight.min(1.0) > existing {
                    links.push((other.id.clone(), weight));
                }
            }
        }

        let mut linked = 0;
        for (other, weight) in links {
            if self.connect(id, &other, weight)? {
                linked += 1;
            }
        }
        Ok(linked)
    }

    /// Build a view of live nodes and their edges
    pub fn graph(&self) -> MemoryGraph {
        let mut nodes: Vec<GraphNode> = self
            .live()
            .map(|r| GraphNode {
                id: r.id.clone(),
                preview: r.preview(),
                tier: r.tier,
                importance: r.importance,
                activation: r.activation,
                degree: r.connections.len(),
            })
            .collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));

        MemoryGraph {
            nodes,
            edges: self.edges(),
        }
    }
}
