//! Persisted state
//!
//! The store is saved as one versioned JSON document. Activation is transient
//! and not saved; edges are stored once per undirected pair. The HNSW graph is
//! rebuilt from record embeddings on load.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::engine::{MemoryEngine, MemoryState};
use crate::error::{MemoryError, Result};
use crate::graph::GraphEdge;
use crate::memory::{EmotionProfile, MemoryRecord, MemoryTier};
use crate::scoring::clamp_unit;
use crate::search::VectorIndex;
use crate::store::RecordStore;

/// Current persisted format version
pub const FORMAT_VERSION: u32 = 1;

// ============================================================================
// SNAPSHOT FORMAT
// ============================================================================

/// A record as persisted (no activation, no adjacency)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedRecord {
    pub id: String,
    pub content: String,
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub emotion_profile: EmotionProfile,
    pub importance: f64,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    #[serde(default)]
    pub access_count: u64,
    pub decayed_at: DateTime<Utc>,
    pub tier: MemoryTier,
    pub tier_entered_at: DateTime<Utc>,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub evaluated: bool,
    #[serde(default)]
    pub derived_from: Vec<String>,
    #[serde(default)]
    pub superseded_by: Option<String>,
}

impl From<&MemoryRecord> for PersistedRecord {
    fn from(record: &MemoryRecord) -> Self {
        Self {
            id: record.id.clone(),
            content: record.content.clone(),
            embedding: record.embedding.clone(),
            emotion_profile: record.emotion_profile.clone(),
            importance: record.importance,
            created_at: record.created_at,
            last_accessed_at: record.last_accessed_at,
            access_count: record.access_count,
            decayed_at: record.decayed_at,
            tier: record.tier,
            tier_entered_at: record.tier_entered_at,
            pinned: record.pinned,
            evaluated: record.evaluated,
            derived_from: record.derived_from.clone(),
            superseded_by: record.superseded_by.clone(),
        }
    }
}

impl From<PersistedRecord> for MemoryRecord {
    fn from(record: PersistedRecord) -> Self {
        Self {
            id: record.id,
            content: record.content,
            embedding: record.embedding,
            emotion_profile: record.emotion_profile,
            importance: clamp_unit(record.importance),
            activation: 0.0,
            created_at: record.created_at,
            last_accessed_at: record.last_accessed_at,
            access_count: record.access_count,
            decayed_at: record.decayed_at,
            tier: record.tier,
            tier_entered_at: record.tier_entered_at,
            pinned: record.pinned,
            evaluated: record.evaluated,
            connections: HashMap::new(),
            derived_from: record.derived_from,
            superseded_by: record.superseded_by,
        }
    }
}

/// The whole store as persisted
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorySnapshot {
    pub format_version: u32,
    pub embedding_dim: usize,
    pub saved_at: DateTime<Utc>,
    pub records: Vec<PersistedRecord>,
    pub edges: Vec<GraphEdge>,
}

impl MemorySnapshot {
    /// Read a snapshot from a JSON file
    pub fn read_from(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    /// Write the snapshot atomically (temp file + rename)
    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let tmp = temp_path(path);
        {
            let file = File::create(&tmp)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, self)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }

        if let Err(e) = std::fs::rename(&tmp, path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    fn into_state(self, engine: &MemoryEngine) -> Result<MemoryState> {
        let dim = engine.embedding_dim();

        if self.format_version > FORMAT_VERSION {
            return Err(MemoryError::IncompatibleState(format!(
                "format version {} is newer than supported version {}",
                self.format_version, FORMAT_VERSION
            )));
        }
        if self.embedding_dim != dim {
            return Err(MemoryError::IncompatibleState(format!(
                "state has embedding dimension {}, engine expects {}",
                self.embedding_dim, dim
            )));
        }

        let mut store = RecordStore::new();
        let mut index = VectorIndex::with_config(engine.config().index_config())?;

        for persisted in self.records {
            if persisted.embedding.len() != dim {
                return Err(MemoryError::IncompatibleState(format!(
                    "record {} has embedding dimension {}, expected {}",
                    persisted.id,
                    persisted.embedding.len(),
                    dim
                )));
            }
            if store.get(&persisted.id).is_some() {
                return Err(MemoryError::IncompatibleState(format!(
                    "duplicate record id {}",
                    persisted.id
                )));
            }

            let record = MemoryRecord::from(persisted);
            if record.is_live() {
                index.insert(&record.id, &record.embedding)?;
            }
            store.insert(record);
        }

        let mut skipped = 0;
        for edge in self.edges {
            if store.connect(&edge.a, &edge.b, edge.weight).is_err() {
                skipped += 1;
            }
        }
        if skipped > 0 {
            warn!(skipped, "Ignored edges referring to missing or superseded records");
        }

        Ok(MemoryState { store, index })
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "memory_state".into());
    name.push(".tmp");
    path.with_file_name(name)
}

// ============================================================================
// ENGINE PERSISTENCE
// ============================================================================

impl MemoryEngine {
    /// Capture the current store as a snapshot
    pub fn snapshot(&self) -> Result<MemorySnapshot> {
        let state = self.read_state()?;

        let mut records: Vec<PersistedRecord> =
            state.store.iter().map(PersistedRecord::from).collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        Ok(MemorySnapshot {
            format_version: FORMAT_VERSION,
            embedding_dim: self.embedding_dim(),
            saved_at: Utc::now(),
            records,
            edges: state.store.edges(),
        })
    }

    /// Save the store to `path`
    pub fn save_state(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let snapshot = self.snapshot()?;
        snapshot.write_to(path)?;
        info!(
            path = %path.display(),
            records = snapshot.records.len(),
            edges = snapshot.edges.len(),
            "Memory state saved"
        );
        Ok(())
    }

    /// Replace the store with the state saved at `path`
    ///
    /// On error the current store is left untouched. Returns the number of
    /// live records loaded.
    pub fn load_state(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let snapshot = MemorySnapshot::read_from(path)?;
        let loaded = snapshot.into_state(self)?;
        let live = loaded.store.len();

        *self.write_state()? = loaded;

        info!(path = %path.display(), records = live, "Memory state loaded");
        Ok(live)
    }
}
