//! Record Store
//!
//! Canonical set of memory records, keyed by id. Holds both live records and
//! superseded history; graph operations live in [`crate::graph`].

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::memory::{MemoryRecord, MemoryStats, MemoryTier};

/// In-memory record table
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    pub(crate) records: HashMap<String, MemoryRecord>,
}

impl RecordStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live records
    pub fn len(&self) -> usize {
        self.records.values().filter(|r| r.is_live()).count()
    }

    /// Check if the store holds no live records
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of records including superseded history
    pub fn total_len(&self) -> usize {
        self.records.len()
    }

    /// Get any record, live or superseded
    pub fn get(&self, id: &str) -> Option<&MemoryRecord> {
        self.records.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut MemoryRecord> {
        self.records.get_mut(id)
    }

    /// Get a live record
    pub fn get_live(&self, id: &str) -> Option<&MemoryRecord> {
        self.records.get(id).filter(|r| r.is_live())
    }

    pub(crate) fn get_live_mut(&mut self, id: &str) -> Option<&mut MemoryRecord> {
        self.records.get_mut(id).filter(|r| r.is_live())
    }

    /// Check if a live record exists
    pub fn contains_live(&self, id: &str) -> bool {
        self.get_live(id).is_some()
    }

    /// Iterate over live records
    pub fn live(&self) -> impl Iterator<Item = &MemoryRecord> {
        self.records.values().filter(|r| r.is_live())
    }

    pub(crate) fn live_mut(&mut self) -> impl Iterator<Item = &mut MemoryRecord> {
        self.records.values_mut().filter(|r| r.is_live())
    }

    /// Iterate over every record, including history
    pub fn iter(&self) -> impl Iterator<Item = &MemoryRecord> {
        self.records.values()
    }

    /// Ids of live records in a given tier, oldest first
    pub fn ids_in_tier(&self, tier: MemoryTier) -> Vec<String> {
        let mut records: Vec<&MemoryRecord> = self.live().filter(|r| r.tier == tier).collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        records.into_iter().map(|r| r.id.clone()).collect()
    }

    pub(crate) fn insert(&mut self, record: MemoryRecord) {
        self.records.insert(record.id.clone(), record);
    }

    /// Remove a record and every edge touching it
    pub(crate) fn remove(&mut self, id: &str) -> Option<MemoryRecord> {
        self.detach(id);
        self.records.remove(id)
    }

    /// Remove superseded records whose successor is `successor_id`
    ///
    /// History still named in another live record's `derived_from` is handed
    /// to that record instead of being removed. Returns the purged ids.
    pub(crate) fn purge_history_of(&mut self, successor_id: &str) -> Vec<String> {
        let stale: Vec<String> = self
            .records
            .values()
            .filter(|r| r.superseded_by.as_deref() == Some(successor_id))
            .map(|r| r.id.clone())
            .collect();

        let mut purged = Vec::with_capacity(stale.len());
        for id in stale {
            match self.heir_of(&id, successor_id) {
                Some(heir) => {
                    if let Some(record) = self.records.get_mut(&id) {
                        record.superseded_by = Some(heir);
                    }
                }
                None => {
                    self.records.remove(&id);
                    purged.push(id);
                }
            }
        }
        purged
    }

    /// Live record other than `successor_id` that derives from `id`
    fn heir_of(&self, id: &str, successor_id: &str) -> Option<String> {
        self.live()
            .filter(|r| r.id != successor_id && r.derived_from.iter().any(|d| d == id))
            .map(|r| r.id.clone())
            .min()
    }

    /// Turn a live record into history pointing at `successor_id`
    pub(crate) fn supersede(&mut self, id: &str, successor_id: &str) {
        self.detach(id);
        if let Some(record) = self.records.get_mut(id) {
            record.superseded_by = Some(successor_id.to_string());
            record.activation = 0.0;
        }
    }

    /// Aggregate statistics over the store
    pub fn stats(&self, embedding_dim: usize) -> MemoryStats {
        let mut stats = MemoryStats {
            embedding_dim,
            ..Default::default()
        };
        let mut importance_sum = 0.0;
        let mut activation_sum = 0.0;
        let mut oldest: Option<DateTime<Utc>> = None;
        let mut newest: Option<DateTime<Utc>> = None;

        for record in self.records.values() {
            if record.is_superseded() {
                stats.superseded += 1;
                continue;
            }
            stats.total_records += 1;
            match record.tier {
                MemoryTier::Working => stats.working += 1,
                MemoryTier::ShortTerm => stats.short_term += 1,
                MemoryTier::LongTerm => stats.long_term += 1,
            }
            if record.pinned {
                stats.pinned += 1;
            }
            importance_sum += record.importance;
            activation_sum += record.activation;
            oldest = Some(oldest.map_or(record.created_at, |t| t.min(record.created_at)));
            newest = Some(newest.map_or(record.created_at, |t| t.max(record.created_at)));
        }

        if stats.total_records > 0 {
            stats.average_importance = importance_sum / stats.total_records as f64;
            stats.average_activation = activation_sum / stats.total_records as f64;
        }
        stats.edges = self.edge_count();
        stats.oldest_memory = oldest;
        stats.newest_memory = newest;
        stats
    }
}
