//! Spreading Activation
//!
//! Activating a record pushes a fraction of its strength along weighted
//! edges, breadth-first, so associated memories become easier to surface.
//! Strength is multiplied by edge weight and attenuation at every hop and
//! the spread stops at `max_depth` or once it falls below `floor`.

use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::error::{MemoryError, Result};
use crate::store::RecordStore;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Default number of hops
pub const DEFAULT_MAX_DEPTH: usize = 3;

/// Default per-hop attenuation
pub const DEFAULT_ATTENUATION: f64 = 0.5;

/// Default strength below which propagation stops
pub const DEFAULT_FLOOR: f64 = 0.1;

/// Spreading activation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ActivationConfig {
    /// Maximum hops from the source
    pub max_depth: usize,
    /// Multiplier applied per hop, on top of the edge weight
    pub attenuation: f64,
    /// Propagated strengths below this are dropped
    pub floor: f64,
}

impl Default for ActivationConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            attenuation: DEFAULT_ATTENUATION,
            floor: DEFAULT_FLOOR,
        }
    }
}

/// A record touched by a spread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivatedMemory {
    pub id: String,
    /// Activation after the spread
    pub activation: f64,
    /// Distance from the source
    pub hops: usize,
}

// ============================================================================
// SPREADING
// ============================================================================

/// Set `id`'s activation to `strength` and spread it through the graph
///
/// Returns every record touched, source first, in visiting order.
pub(crate) fn spread(
    store: &mut RecordStore,
    id: &str,
    strength: f64,
    config: &ActivationConfig,
) -> Result<Vec<ActivatedMemory>> {
    let strength = if strength.is_finite() {
        strength.max(0.0)
    } else {
        0.0
    };

    let source = store
        .get_live_mut(id)
        .ok_or_else(|| MemoryError::RecordNotFound(id.to_string()))?;
    source.activation = strength;

    let mut touched = vec![ActivatedMemory {
        id: id.to_string(),
        activation: strength,
        hops: 0,
    }];

    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(id.to_string());

    let mut queue: VecDeque<(String, f64, usize)> = VecDeque::new();
    queue.push_back((id.to_string(), strength, 0));

    while let Some((node, node_strength, hops)) = queue.pop_front() {
        if hops >= config.max_depth {
            continue;
        }

        for (neighbor, weight) in store.neighbors(&node) {
            if visited.contains(&neighbor) {
                continue;
            }
            let propagated = node_strength * weight * config.attenuation;
            if propagated < config.floor {
                continue;
            }
            let Some(record) = store.get_live_mut(&neighbor) else {
                continue;
            };

            record.activation = record.activation.max(propagated);
            touched.push(ActivatedMemory {
                id: neighbor.clone(),
                activation: record.activation,
                hops: hops + 1,
            });
            visited.insert(neighbor.clone());
            queue.push_back((neighbor, propagated, hops + 1));
        }
    }

    tracing::trace!(source = id, touched = touched.len(), "Activation spread");
    Ok(touched)
}
