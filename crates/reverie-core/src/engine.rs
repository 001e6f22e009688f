//! Memory Engine
//!
//! The query façade over the record store, vector index and connection graph.
//!
//! All state sits behind one readers-writer lock. Foreground calls take the
//! write lock once per call; embedding and other collaborator calls are made
//! before the lock is taken and their results committed afterwards.

use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use lru::LruCache;
use tracing::{debug, info};

use crate::activation::{self, ActivatedMemory};
use crate::collaborators::{Generator, Summarizer};
use crate::config::EngineConfig;
use crate::embeddings::EmbeddingProvider;
use crate::error::{MemoryError, Result};
use crate::graph::{MemoryGraph, union_connections};
use crate::memory::{
    AddMemoryInput, EmotionProfile, MemoryRecord, MemoryStats, MemoryTier, RecalledMemory,
};
use crate::scoring::{FadeReport, ImportanceScorer};
use crate::search::VectorIndex;
use crate::store::RecordStore;

// ============================================================================
// SHARED STATE
// ============================================================================

/// Everything guarded by the engine lock
#[derive(Debug)]
pub(crate) struct MemoryState {
    pub(crate) store: RecordStore,
    pub(crate) index: VectorIndex,
}

impl MemoryState {
    /// Add a new live record to the index and the store
    pub(crate) fn insert_record(&mut self, record: MemoryRecord) -> Result<()> {
        self.index.insert(&record.id, &record.embedding)?;
        self.store.insert(record);
        Ok(())
    }

    /// Hard-delete a live record along with its edges and history
    pub(crate) fn delete_record(&mut self, id: &str) -> Option<MemoryRecord> {
        let record = self.store.remove(id)?;
        self.index.remove(id);
        self.store.purge_history_of(id);
        Some(record)
    }

    /// Retire a live record in favour of `successor_id`
    ///
    /// Keeps it as history when `retain` is set, dropping any older history
    /// layer; otherwise deletes it.
    pub(crate) fn retire_record(&mut self, id: &str, successor_id: &str, retain: bool) {
        if retain {
            self.store.purge_history_of(id);
            self.store.supersede(id, successor_id);
            self.index.remove(id);
        } else {
            self.delete_record(id);
        }
    }
}

pub(crate) struct EngineInner {
    pub(crate) config: EngineConfig,
    pub(crate) scorer: ImportanceScorer,
    pub(crate) state: RwLock<MemoryState>,
    pub(crate) embedder: Arc<dyn EmbeddingProvider>,
    pub(crate) summarizer: Arc<dyn Summarizer>,
    pub(crate) generator: Arc<dyn Generator>,
    query_cache: Option<Mutex<LruCache<String, Vec<f32>>>>,
    pub(crate) dreaming: AtomicBool,
    pub(crate) interrupt: AtomicBool,
    pub(crate) cycles: AtomicU64,
}

// ============================================================================
// MEMORY ENGINE
// ============================================================================

/// Tiered associative memory store
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct MemoryEngine {
    pub(crate) inner: Arc<EngineInner>,
}

impl std::fmt::Debug for MemoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryEngine")
            .field("embedding_dim", &self.inner.config.embedding_dim)
            .field("model", &self.inner.embedder.model_name())
            .finish()
    }
}

impl MemoryEngine {
    /// Create an empty engine
    ///
    /// Fails if the config is invalid or the provider's dimension differs
    /// from `config.embedding_dim`.
    pub fn new(
        config: EngineConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        summarizer: Arc<dyn Summarizer>,
        generator: Arc<dyn Generator>,
    ) -> Result<Self> {
        config.validate()?;

        if embedder.dimensions() != config.embedding_dim {
            return Err(MemoryError::DimensionMismatch {
                expected: config.embedding_dim,
                actual: embedder.dimensions(),
            });
        }

        let index = VectorIndex::with_config(config.index_config())?;
        let query_cache =
            NonZeroUsize::new(config.query_cache_size).map(|size| Mutex::new(LruCache::new(size)));

        info!(
            embedding_dim = config.embedding_dim,
            model = embedder.model_name(),
            "Memory engine initialized"
        );

        Ok(Self {
            inner: Arc::new(EngineInner {
                scorer: ImportanceScorer::with_config(config.scoring.clone()),
                config,
                state: RwLock::new(MemoryState {
                    store: RecordStore::new(),
                    index,
                }),
                embedder,
                summarizer,
                generator,
                query_cache,
                dreaming: AtomicBool::new(false),
                interrupt: AtomicBool::new(false),
                cycles: AtomicU64::new(0),
            }),
        })
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Embedding dimension of the store
    pub fn embedding_dim(&self) -> usize {
        self.inner.config.embedding_dim
    }

    // ========================================================================
    // LOCKING & COLLABORATORS
    // ========================================================================

    pub(crate) fn read_state(&self) -> Result<RwLockReadGuard<'_, MemoryState>> {
        self.inner
            .state
            .read()
            .map_err(|e| MemoryError::LockPoisoned(e.to_string()))
    }

    pub(crate) fn write_state(&self) -> Result<RwLockWriteGuard<'_, MemoryState>> {
        self.inner
            .state
            .write()
            .map_err(|e| MemoryError::LockPoisoned(e.to_string()))
    }

    /// Await a collaborator call under the configured timeout
    pub(crate) async fn bounded<T, E, F>(&self, what: &str, call: F) -> std::result::Result<T, String>
    where
        E: std::fmt::Display,
        F: Future<Output = std::result::Result<T, E>>,
    {
        let timeout = self.inner.config.collaborator_timeout();
        match tokio::time::timeout(timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("{} timed out after {:?}", what, timeout)),
        }
    }

    pub(crate) fn check_dimensions(&self, embedding: &[f32]) -> Result<()> {
        if embedding.len() != self.inner.config.embedding_dim {
            return Err(MemoryError::DimensionMismatch {
                expected: self.inner.config.embedding_dim,
                actual: embedding.len(),
            });
        }
        if embedding.iter().any(|x| !x.is_finite()) {
            return Err(MemoryError::InvalidInput(
                "embedding contains non-finite values".to_string(),
            ));
        }
        Ok(())
    }

    /// Embed text through the provider, bounded by the collaborator timeout
    pub(crate) async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let embedding = self
            .bounded("embedding", self.inner.embedder.embed(text))
            .await
            .map_err(MemoryError::EmbeddingUnavailable)?;
        self.check_dimensions(&embedding)?;
        Ok(embedding)
    }

    async fn query_embedding(&self, query: &str) -> Result<Vec<f32>> {
        if let Some(cache) = &self.inner.query_cache {
            let mut cache = cache
                .lock()
                .map_err(|e| MemoryError::LockPoisoned(e.to_string()))?;
            if let Some(embedding) = cache.get(query) {
                return Ok(embedding.clone());
            }
        }

        let embedding = self.embed_text(query).await?;

        if let Some(cache) = &self.inner.query_cache {
            let mut cache = cache
                .lock()
                .map_err(|e| MemoryError::LockPoisoned(e.to_string()))?;
            cache.put(query.to_string(), embedding.clone());
        }
        Ok(embedding)
    }

    // ========================================================================
    // ADD
    // ========================================================================

    /// Store a new memory and link it to similar ones
    pub async fn add_memory(
        &self,
        content: &str,
        importance: f64,
        emotion_profile: EmotionProfile,
    ) -> Result<String> {
        self.add_memory_with(AddMemoryInput::new(content, importance).with_emotions(emotion_profile))
            .await
    }

    /// Store a new memory from full input
    pub async fn add_memory_with(&self, input: AddMemoryInput) -> Result<String> {
        if input.content.trim().is_empty() {
            return Err(MemoryError::InvalidInput(
                "content cannot be empty".to_string(),
            ));
        }
        if !input.importance.is_finite() {
            return Err(MemoryError::InvalidInput(format!(
                "importance must be finite, got {}",
                input.importance
            )));
        }

        let embedding = match input.embedding {
            Some(embedding) => {
                self.check_dimensions(&embedding)?;
                embedding
            }
            None => self.embed_text(&input.content).await?,
        };

        let mut record = MemoryRecord::new(
            input.content,
            embedding,
            input.emotion_profile,
            input.importance,
            Utc::now(),
        );
        record.pinned = input.pinned;
        let id = record.id.clone();

        let mut state = self.write_state()?;
        state.insert_record(record)?;
        let linked = state
            .store
            .link_by_similarity(&id, &self.inner.config.connection)?;

        debug!(id = %id, linked, "Memory added");
        Ok(id)
    }

    // ========================================================================
    // RECALL & ACTIVATION
    // ========================================================================

    /// Recall the `k` memories most relevant to `query`
    ///
    /// With an emotion filter, candidates are re-ranked by
    /// `(1 - w) * similarity + w * emotion_match`. Every returned record is
    /// strengthened and spreads activation to its neighbors.
    pub async fn recall_memory(
        &self,
        query: &str,
        k: usize,
        emotion_filter: Option<&EmotionProfile>,
    ) -> Result<Vec<RecalledMemory>> {
        if k == 0 {
            return Ok(vec![]);
        }
        let embedding = self.query_embedding(query).await?;
        self.recall_by_embedding(&embedding, k, emotion_filter)
    }

    /// Recall with a caller-supplied query embedding
    pub fn recall_by_embedding(
        &self,
        embedding: &[f32],
        k: usize,
        emotion_filter: Option<&EmotionProfile>,
    ) -> Result<Vec<RecalledMemory>> {
        self.check_dimensions(embedding)?;
        if k == 0 {
            return Ok(vec![]);
        }

        let config = &self.inner.config;
        let weight = config.recall.emotion_weight;
        let fetch = match emotion_filter {
            Some(_) => k.saturating_mul(config.recall.candidate_multiplier),
            None => k,
        };
        let now = Utc::now();

        let mut state = self.write_state()?;
        let hits = state.index.search(embedding, fetch)?;

        let mut ranked: Vec<(String, f64, Option<f64>, f64)> = hits
            .into_iter()
            .filter_map(|(id, distance)| {
                let record = state.store.get_live(&id)?;
                let similarity = (1.0 - distance as f64).clamp(-1.0, 1.0);
                let emotional = emotion_filter.map(|filter| filter.dot(&record.emotion_profile));
                let score = match emotional {
                    Some(emotional) => (1.0 - weight) * similarity + weight * emotional,
                    None => similarity,
                };
                Some((id, similarity, emotional, score))
            })
            .collect();

        // Stable: equal scores keep index order
        ranked.sort_by(|a, b| b.3.partial_cmp(&a.3).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(k);

        let store = &mut state.store;
        for (id, ..) in &ranked {
            if let Some(record) = store.get_live_mut(id) {
                self.inner.scorer.strengthen(record, now);
            }
        }
        for (id, ..) in &ranked {
            activation::spread(store, id, 1.0, &config.activation)?;
        }

        let results: Vec<RecalledMemory> = ranked
            .into_iter()
            .filter_map(|(id, similarity, emotional_score, score)| {
                store.get(&id).map(|record| RecalledMemory {
                    record: record.clone(),
                    similarity,
                    emotional_score,
                    score,
                })
            })
            .collect();

        debug!(k, returned = results.len(), "Recall complete");
        Ok(results)
    }

    /// Set a record's activation and spread it through the graph
    pub fn activate_memory(&self, id: &str, strength: f64) -> Result<Vec<ActivatedMemory>> {
        let mut state = self.write_state()?;
        activation::spread(&mut state.store, id, strength, &self.inner.config.activation)
    }

    // ========================================================================
    // DECAY & PRUNING
    // ========================================================================

    /// Remove every live, non-pinned, non-working record below `threshold`
    ///
    /// Returns the removed ids, sorted.
    pub fn prune_memories(&self, threshold: f64) -> Result<Vec<String>> {
        let mut state = self.write_state()?;

        let mut doomed: Vec<String> = state
            .store
            .live()
            .filter(|r| !r.pinned && r.tier != MemoryTier::Working && r.importance < threshold)
            .map(|r| r.id.clone())
            .collect();
        doomed.sort();

        for id in &doomed {
            state.delete_record(id);
        }

        if !doomed.is_empty() {
            info!(removed = doomed.len(), threshold, "Pruned memories");
        }
        Ok(doomed)
    }

    /// Decay importance and activation up to now
    pub fn fade_memories(&self, decay_rate: f64) -> Result<FadeReport> {
        self.fade_memories_at(decay_rate, Utc::now())
    }

    /// Decay importance and activation up to `now`
    ///
    /// `decay_rate` is the fraction of importance kept per day.
    pub fn fade_memories_at(&self, decay_rate: f64, now: DateTime<Utc>) -> Result<FadeReport> {
        if !(0.0..=1.0).contains(&decay_rate) {
            return Err(MemoryError::InvalidInput(format!(
                "decay_rate must be in [0, 1], got {}",
                decay_rate
            )));
        }

        let mut state = self.write_state()?;
        let report = self.inner.scorer.fade_store(&mut state.store, decay_rate, now);
        debug!(
            faded = report.records_faded,
            cleared = report.activations_cleared,
            "Memories faded"
        );
        Ok(report)
    }

    /// Add `delta` to a record's importance, clamped into [0, 1]
    ///
    /// Returns the new importance.
    pub fn update_importance(&self, id: &str, delta: f64) -> Result<f64> {
        if !delta.is_finite() {
            return Err(MemoryError::InvalidInput(format!(
                "delta must be finite, got {}",
                delta
            )));
        }
        let mut state = self.write_state()?;
        let record = state
            .store
            .get_live_mut(id)
            .ok_or_else(|| MemoryError::RecordNotFound(id.to_string()))?;
        record.importance = self.inner.scorer.adjust(record.importance, delta);
        Ok(record.importance)
    }

    // ========================================================================
    // LOOKUPS
    // ========================================================================

    /// Get a record by id, including superseded history
    pub fn get_memory(&self, id: &str) -> Result<Option<MemoryRecord>> {
        Ok(self.read_state()?.store.get(id).cloned())
    }

    fn collect_live<F, K>(&self, filter: F, sort_key: K) -> Result<Vec<MemoryRecord>>
    where
        F: Fn(&MemoryRecord) -> bool,
        K: Fn(&MemoryRecord) -> f64,
    {
        let state = self.read_state()?;
        let mut records: Vec<MemoryRecord> =
            state.store.live().filter(|r| filter(r)).cloned().collect();
        records.sort_by(|a, b| {
            sort_key(b)
                .partial_cmp(&sort_key(a))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.id.cmp(&b.id))
        });
        Ok(records)
    }

    /// Every live record, oldest first
    pub fn all_memories(&self) -> Result<Vec<MemoryRecord>> {
        let state = self.read_state()?;
        let mut records: Vec<MemoryRecord> = state.store.live().cloned().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(records)
    }

    /// The `n` most recently accessed live records
    pub fn recent_memories(&self, n: usize) -> Result<Vec<MemoryRecord>> {
        let state = self.read_state()?;
        let mut records: Vec<MemoryRecord> = state.store.live().cloned().collect();
        records.sort_by(|a, b| {
            b.last_accessed_at
                .cmp(&a.last_accessed_at)
                .then(b.created_at.cmp(&a.created_at))
                .then(a.id.cmp(&b.id))
        });
        records.truncate(n);
        Ok(records)
    }

    /// Live records with importance at or above `threshold`, most important first
    pub fn important_memories(&self, threshold: f64) -> Result<Vec<MemoryRecord>> {
        self.collect_live(|r| r.importance >= threshold, |r| r.importance)
    }

    /// Live records feeling `label` at or above `threshold`, strongest first
    pub fn emotional_memories(&self, label: &str, threshold: f64) -> Result<Vec<MemoryRecord>> {
        self.collect_live(
            |r| r.emotion_profile.contains(label) && r.emotion_profile.intensity(label) >= threshold,
            |r| r.emotion_profile.intensity(label),
        )
    }

    /// Live records with activation at or above `threshold`, most active first
    pub fn active_memories(&self, threshold: f64) -> Result<Vec<MemoryRecord>> {
        self.collect_live(|r| r.activation >= threshold, |r| r.activation)
    }

    /// Nodes and undirected edges of the connection graph
    pub fn memory_graph(&self) -> Result<MemoryGraph> {
        Ok(self.read_state()?.store.graph())
    }

    /// Store statistics
    pub fn stats(&self) -> Result<MemoryStats> {
        Ok(self.read_state()?.store.stats(self.inner.config.embedding_dim))
    }

    // ========================================================================
    // EXPLICIT MUTATIONS
    // ========================================================================

    /// Hard-delete a record, pinned or not
    ///
    /// Deleting a live record also removes its superseded history.
    pub fn forget_memory(&self, id: &str) -> Result<()> {
        let mut state = self.write_state()?;
        match state.store.get(id).map(|r| r.is_live()) {
            Some(true) => {
                state.delete_record(id);
            }
            Some(false) => {
                state.store.remove(id);
            }
            None => return Err(MemoryError::RecordNotFound(id.to_string())),
        }
        debug!(id, "Memory forgotten");
        Ok(())
    }

    /// Pin or unpin a live record
    pub fn set_pinned(&self, id: &str, pinned: bool) -> Result<()> {
        let mut state = self.write_state()?;
        let record = state
            .store
            .get_live_mut(id)
            .ok_or_else(|| MemoryError::RecordNotFound(id.to_string()))?;
        record.pinned = pinned;
        Ok(())
    }

    /// Replace two contradicting records with one resolved record
    ///
    /// The resolved record takes the higher tier and importance, the
    /// per-emotion max profile and both records' outside connections. Both
    /// originals are kept as superseded history. Returns the new id.
    pub async fn resolve_conflict(&self, a: &str, b: &str, resolved_content: &str) -> Result<String> {
        if a == b {
            return Err(MemoryError::InvalidInput(
                "cannot resolve a record against itself".to_string(),
            ));
        }
        if resolved_content.trim().is_empty() {
            return Err(MemoryError::InvalidInput(
                "resolved content cannot be empty".to_string(),
            ));
        }
        {
            let state = self.read_state()?;
            for id in [a, b] {
                if !state.store.contains_live(id) {
                    return Err(MemoryError::RecordNotFound(id.to_string()));
                }
            }
        }

        let embedding = self.embed_text(resolved_content).await?;
        let now = Utc::now();

        let mut state = self.write_state()?;
        let first = state
            .store
            .get_live(a)
            .cloned()
            .ok_or_else(|| MemoryError::RecordNotFound(a.to_string()))?;
        let second = state
            .store
            .get_live(b)
            .cloned()
            .ok_or_else(|| MemoryError::RecordNotFound(b.to_string()))?;

        let originals = vec![a.to_string(), b.to_string()];
        let external = union_connections([&first, &second], &originals);

        let mut record = MemoryRecord::new(
            resolved_content.to_string(),
            embedding,
            EmotionProfile::merged([&first.emotion_profile, &second.emotion_profile]),
            first.importance.max(second.importance),
            now,
        );
        record.enter_tier(first.tier.max(second.tier), now);
        record.pinned = first.pinned || second.pinned;
        record.evaluated = first.evaluated || second.evaluated;
        record.derived_from = originals.clone();
        let id = record.id.clone();

        state.insert_record(record)?;
        for original in &originals {
            state.retire_record(original, &id, true);
        }
        for (neighbor, weight) in external {
            if state.store.contains_live(&neighbor) {
                state.store.connect(&id, &neighbor, weight)?;
            }
        }

        info!(resolved = %id, a, b, "Conflict resolved");
        Ok(id)
    }
}
