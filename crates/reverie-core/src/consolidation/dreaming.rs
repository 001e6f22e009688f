//! Dream cycle stages
//!
//! Each stage takes the write lock for its own commit only. Summarizer,
//! generator and embedding calls happen with no lock held; their results are
//! committed after checking the inputs are still there and unchanged.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::{DreamConfig, DreamReport, DreamStage, FilteredPolicy, StageResult, sample_unit};
use crate::collaborators::Stance;
use crate::embeddings::cosine_similarity;
use crate::engine::MemoryEngine;
use crate::error::{MemoryError, Result};
use crate::graph::union_connections;
use crate::memory::{EmotionProfile, MemoryRecord, MemoryTier};
use crate::scoring::clamp_unit;
use crate::store::RecordStore;

/// Clears the dreaming and interrupt flags however the cycle ends
struct DreamingGuard<'a> {
    dreaming: &'a AtomicBool,
    interrupt: &'a AtomicBool,
}

impl Drop for DreamingGuard<'_> {
    fn drop(&mut self) {
        self.interrupt.store(false, Ordering::SeqCst);
        self.dreaming.store(false, Ordering::SeqCst);
    }
}

/// A cluster chosen for merging, with the contents it was chosen on
#[derive(Debug, Clone)]
struct MergePlan {
    members: Vec<String>,
    contents: Vec<String>,
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// Emotions attached to a synthesized scenario
fn scenario_emotions(stance: Stance) -> Result<EmotionProfile> {
    let profile = match stance {
        Stance::Positive => EmotionProfile::from_pairs([("anticipation", 0.7), ("joy", 0.3)])?,
        Stance::Negative => EmotionProfile::from_pairs([("anticipation", 0.7), ("fear", 0.3)])?,
    };
    Ok(profile)
}

/// Greedy search for cliques of similar, mutually connected long-term records
///
/// Seeds are visited oldest and least important first. A candidate joins a
/// cluster only if it is connected to, and similar enough to, every member.
fn find_clusters(store: &RecordStore, config: &DreamConfig) -> Vec<MergePlan> {
    let mut seeds: Vec<&MemoryRecord> = store
        .live()
        .filter(|r| r.tier == MemoryTier::LongTerm)
        .collect();
    seeds.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then(
                a.importance
                    .partial_cmp(&b.importance)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
            .then(a.id.cmp(&b.id))
    });

    let similarity =
        |a: &MemoryRecord, b: &MemoryRecord| cosine_similarity(&a.embedding, &b.embedding) as f64;

    let mut assigned: HashSet<String> = HashSet::new();
    let mut plans = Vec::new();

    for seed in seeds {
        if assigned.contains(&seed.id) {
            continue;
        }

        let mut candidates: Vec<(&MemoryRecord, f64)> = seed
            .connections
            .keys()
            .filter_map(|id| store.get_live(id))
            .filter(|r| r.tier == MemoryTier::LongTerm && !assigned.contains(&r.id))
            .map(|r| (r, similarity(seed, r)))
            .filter(|(_, s)| *s > config.merge_threshold)
            .collect();
        candidates.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.id.cmp(&b.0.id))
        });

        let mut cluster: Vec<&MemoryRecord> = vec![seed];
        for (candidate, _) in candidates {
            if cluster.len() >= config.max_cluster_size {
                break;
            }
            let fits = cluster.iter().all(|member| {
                member.connections.contains_key(&candidate.id)
                    && similarity(member, candidate) > config.merge_threshold
            });
            if fits {
                cluster.push(candidate);
            }
        }

        if cluster.len() >= config.min_cluster_size {
            for member in &cluster {
                assigned.insert(member.id.clone());
            }
            plans.push(MergePlan {
                members: cluster.iter().map(|r| r.id.clone()).collect(),
                contents: cluster.iter().map(|r| r.content.clone()).collect(),
            });
        }
    }

    plans
}

impl MemoryEngine {
    /// Whether a dream cycle is running
    pub fn is_dreaming(&self) -> bool {
        self.inner.dreaming.load(Ordering::SeqCst)
    }

    /// Ask the running cycle to stop after its current stage
    ///
    /// Returns `false` when no cycle is running.
    pub fn interrupt_dreaming(&self) -> bool {
        if !self.is_dreaming() {
            return false;
        }
        self.inner.interrupt.store(true, Ordering::SeqCst);
        info!("Dream cycle interrupt requested");
        true
    }

    /// Run filter, promote, merge and synthesize in order
    ///
    /// Retryable collaborator failures skip their stage and are noted in the
    /// report. A second call while a cycle runs returns a skipped report.
    pub async fn dream(&self) -> Result<DreamReport> {
        let mut report = DreamReport::new();

        if self
            .inner
            .dreaming
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Dream cycle already running, skipping");
            report.skipped = true;
            return Ok(report);
        }
        let _guard = DreamingGuard {
            dreaming: &self.inner.dreaming,
            interrupt: &self.inner.interrupt,
        };

        let cycle = self.inner.cycles.fetch_add(1, Ordering::SeqCst) + 1;
        let start = Instant::now();
        info!(cycle, "Dream cycle starting");

        for stage in DreamStage::ALL {
            if self.inner.interrupt.load(Ordering::SeqCst) {
                report.interrupted = true;
                info!(cycle, next_stage = %stage, "Dream cycle interrupted");
                break;
            }

            let outcome = match stage {
                DreamStage::Filter => self.filter_working(),
                DreamStage::Promote => self.promote_tiers(),
                DreamStage::Merge => self.merge_similar_memories().await,
                DreamStage::Synthesize => self.simulate_future_situations().await,
            };

            match outcome {
                Ok(result) => report.stages.push(result),
                Err(e) if e.is_retryable() => {
                    warn!(stage = %stage, "Dream stage skipped: {}", e);
                    let mut result = StageResult::new(stage);
                    result.actions.push(format!("skipped: {}", e));
                    report.stages.push(result);
                }
                Err(e) => return Err(e),
            }
        }

        report.duration_ms = elapsed_ms(start);
        info!(
            cycle,
            stages = report.stages.len(),
            created = report.total_created(),
            removed = report.total_removed(),
            interrupted = report.interrupted,
            duration_ms = report.duration_ms,
            "Dream cycle complete"
        );
        Ok(report)
    }

    // ========================================================================
    // FILTER
    // ========================================================================

    /// Triage working memories a cycle has not evaluated yet
    ///
    /// Records above `retain_threshold`, pinned records and a pseudo-random
    /// `retain_sample_rate` share of the rest are kept for promotion. The
    /// others are released to short-term or dropped per `filtered_policy`.
    pub fn filter_working(&self) -> Result<StageResult> {
        let start = Instant::now();
        let config = &self.inner.config.dream;
        let seed = self.inner.cycles.load(Ordering::SeqCst);
        let now = Utc::now();
        let mut result = StageResult::new(DreamStage::Filter);

        let mut state = self.write_state()?;
        let candidates: Vec<String> = state
            .store
            .ids_in_tier(MemoryTier::Working)
            .into_iter()
            .filter(|id| state.store.get(id).is_some_and(|r| !r.evaluated))
            .collect();
        result.records_processed = candidates.len();

        let mut kept = 0;
        for id in candidates {
            let keep = match state.store.get_live(&id) {
                Some(record) => {
                    record.pinned
                        || record.importance > config.retain_threshold
                        || sample_unit(&id, seed) < config.retain_sample_rate
                }
                None => continue,
            };

            if keep {
                if let Some(record) = state.store.get_live_mut(&id) {
                    record.evaluated = true;
                }
                kept += 1;
                continue;
            }

            match config.filtered_policy {
                FilteredPolicy::Release => {
                    if let Some(record) = state.store.get_live_mut(&id) {
                        record.evaluated = true;
                        record.enter_tier(MemoryTier::ShortTerm, now);
                    }
                    result.records_changed += 1;
                }
                FilteredPolicy::Drop => {
                    state.delete_record(&id);
                    result.records_removed += 1;
                }
            }
        }

        result.actions.push(format!(
            "kept {}, released {}, dropped {}",
            kept, result.records_changed, result.records_removed
        ));
        result.duration_ms = elapsed_ms(start);
        debug!(
            processed = result.records_processed,
            kept,
            released = result.records_changed,
            dropped = result.records_removed,
            "Filter stage complete"
        );
        Ok(result)
    }

    // ========================================================================
    // PROMOTE
    // ========================================================================

    /// Move evaluated working records to short-term and ripe short-term
    /// records to long-term
    ///
    /// Working → ShortTerm multiplies importance by `promotion_boost`.
    /// ShortTerm → LongTerm needs `long_term_after_secs` in tier or importance
    /// above `long_term_importance`. A record moves at most one tier per run.
    pub fn promote_tiers(&self) -> Result<StageResult> {
        let start = Instant::now();
        let config = &self.inner.config.dream;
        let now = Utc::now();
        let min_age = i64::try_from(config.long_term_after_secs).unwrap_or(i64::MAX);
        let mut result = StageResult::new(DreamStage::Promote);

        let mut state = self.write_state()?;
        let short_term = state.store.ids_in_tier(MemoryTier::ShortTerm);
        let working: Vec<String> = state
            .store
            .ids_in_tier(MemoryTier::Working)
            .into_iter()
            .filter(|id| state.store.get(id).is_some_and(|r| r.evaluated))
            .collect();
        result.records_processed = short_term.len() + working.len();

        let mut to_short = 0;
        for id in &working {
            if let Some(record) = state.store.get_live_mut(id) {
                record.importance = clamp_unit(record.importance * config.promotion_boost);
                record.enter_tier(MemoryTier::ShortTerm, now);
                to_short += 1;
            }
        }

        let mut to_long = 0;
        for id in &short_term {
            if let Some(record) = state.store.get_live_mut(id) {
                let ripe = record.time_in_tier(now).num_seconds() >= min_age
                    || record.importance > config.long_term_importance;
                if ripe {
                    record.enter_tier(MemoryTier::LongTerm, now);
                    to_long += 1;
                }
            }
        }

        result.records_changed = to_short + to_long;
        result.actions.push(format!(
            "{} to short-term, {} to long-term",
            to_short, to_long
        ));
        result.duration_ms = elapsed_ms(start);
        debug!(to_short, to_long, "Promote stage complete");
        Ok(result)
    }

    // ========================================================================
    // MERGE
    // ========================================================================

    /// Replace clusters of near-duplicate long-term memories with summaries
    ///
    /// Every qualifying cluster becomes at least two new long-term records.
    /// A cluster whose summarizer or embedding call fails, or which changed
    /// while the summarizer ran, is left as it was. Fails with
    /// `SummarizerUnavailable` when the summarizer failed for every cluster.
    pub async fn merge_similar_memories(&self) -> Result<StageResult> {
        let start = Instant::now();
        let mut result = StageResult::new(DreamStage::Merge);

        let plans = {
            let state = self.read_state()?;
            find_clusters(&state.store, &self.inner.config.dream)
        };
        result.records_processed = plans.iter().map(|p| p.members.len()).sum();
        let clusters = plans.len();
        let mut last_failure = None;
        let mut summarizer_failures = 0;

        for plan in plans {
            let size = plan.members.len();

            let outputs = match self
                .bounded("summarizer", self.inner.summarizer.merge(&plan.contents))
                .await
            {
                Ok(outputs) => outputs,
                Err(e) => {
                    warn!(size, "Cluster left unmerged, summarizer failed: {}", e);
                    result.actions.push(format!("cluster of {} skipped: {}", size, e));
                    summarizer_failures += 1;
                    last_failure = Some(e);
                    continue;
                }
            };
            let outputs: Vec<String> = outputs
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if outputs.len() < 2 {
                warn!(size, outputs = outputs.len(), "Cluster left unmerged, too few summaries");
                result.actions.push(format!(
                    "cluster of {} skipped: {} summaries",
                    size,
                    outputs.len()
                ));
                continue;
            }

            let mut embeddings = Vec::with_capacity(outputs.len());
            for text in &outputs {
                match self.embed_text(text).await {
                    Ok(embedding) => embeddings.push(embedding),
                    Err(e) => {
                        warn!(size, "Cluster left unmerged, embedding failed: {}", e);
                        result.actions.push(format!("cluster of {} skipped: {}", size, e));
                        break;
                    }
                }
            }
            if embeddings.len() != outputs.len() {
                continue;
            }

            match self.commit_merge(&plan, outputs, embeddings)? {
                Some(created) => {
                    result.records_changed += 1;
                    result.records_created += created.len();
                    result.records_removed += size;
                    result
                        .actions
                        .push(format!("merged {} records into {}", size, created.len()));
                }
                None => {
                    debug!(size, "Cluster changed during merge, skipped");
                    result
                        .actions
                        .push(format!("cluster of {} skipped: changed", size));
                }
            }
        }

        if clusters > 0 && summarizer_failures == clusters {
            if let Some(e) = last_failure {
                return Err(MemoryError::SummarizerUnavailable(e));
            }
        }

        result.duration_ms = elapsed_ms(start);
        info!(
            clusters = result.records_changed,
            created = result.records_created,
            retired = result.records_removed,
            "Merge stage complete"
        );
        Ok(result)
    }

    fn commit_merge(
        &self,
        plan: &MergePlan,
        outputs: Vec<String>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<Option<Vec<String>>> {
        let now = Utc::now();
        let mut state = self.write_state()?;

        let mut members: Vec<MemoryRecord> = Vec::with_capacity(plan.members.len());
        for (id, content) in plan.members.iter().zip(&plan.contents) {
            match state.store.get_live(id) {
                Some(record) if record.tier == MemoryTier::LongTerm && &record.content == content => {
                    members.push(record.clone())
                }
                _ => return Ok(None),
            }
        }

        let importance = members.iter().map(|r| r.importance).fold(0.0, f64::max);
        let emotions = EmotionProfile::merged(members.iter().map(|r| &r.emotion_profile));
        let external = union_connections(members.iter(), &plan.members);
        let pinned = members.iter().any(|r| r.pinned);

        let mut internal = Vec::new();
        for (i, a) in members.iter().enumerate() {
            for b in &members[i + 1..] {
                if let Some(weight) = a.connections.get(&b.id) {
                    internal.push(*weight);
                }
            }
        }
        let sibling_weight = if internal.is_empty() {
            self.inner.config.dream.merge_threshold
        } else {
            internal.iter().sum::<f64>() / internal.len() as f64
        };

        let mut created: Vec<String> = Vec::with_capacity(outputs.len());
        for (content, embedding) in outputs.into_iter().zip(embeddings) {
            let mut record = MemoryRecord::new(content, embedding, emotions.clone(), importance, now);
            record.enter_tier(MemoryTier::LongTerm, now);
            record.evaluated = true;
            record.pinned = pinned;
            record.derived_from = plan.members.clone();
            let id = record.id.clone();

            if let Err(e) = state.insert_record(record) {
                for done in &created {
                    state.delete_record(done);
                }
                return Err(e);
            }
            created.push(id);
        }

        let Some(successor) = created.first().cloned() else {
            return Ok(None);
        };
        for member in &plan.members {
            state.retire_record(member, &successor, self.inner.config.retain_superseded);
        }

        for id in &created {
            for (neighbor, weight) in &external {
                if state.store.contains_live(neighbor) {
                    state.store.connect(id, neighbor, *weight)?;
                }
            }
        }
        for (i, a) in created.iter().enumerate() {
            for b in &created[i + 1..] {
                state.store.connect(a, b, sibling_weight)?;
            }
        }

        Ok(Some(created))
    }

    // ========================================================================
    // SYNTHESIZE
    // ========================================================================

    /// Imagine a hopeful and a nightmare future from active and long-term
    /// memories, storing both as new working memories
    ///
    /// Both scenarios are stored or neither is.
    pub async fn simulate_future_situations(&self) -> Result<StageResult> {
        let start = Instant::now();
        let config = &self.inner.config.dream;
        let seed = self.inner.cycles.load(Ordering::SeqCst);
        let mut result = StageResult::new(DreamStage::Synthesize);

        let context_lines: Vec<String> = {
            let state = self.read_state()?;

            let mut active: Vec<&MemoryRecord> = state
                .store
                .live()
                .filter(|r| r.activation > 0.0 && r.activation >= config.active_threshold)
                .collect();
            active.sort_by(|a, b| {
                b.activation
                    .partial_cmp(&a.activation)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.id.cmp(&b.id))
            });
            let active_ids: HashSet<&str> = active.iter().map(|r| r.id.as_str()).collect();

            let mut sampled: Vec<&MemoryRecord> = state
                .store
                .live()
                .filter(|r| r.tier == MemoryTier::LongTerm && !active_ids.contains(r.id.as_str()))
                .collect();
            sampled.sort_by(|a, b| {
                sample_unit(&a.id, seed)
                    .partial_cmp(&sample_unit(&b.id, seed))
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.id.cmp(&b.id))
            });
            sampled.truncate(config.scenario_sample_size);

            active
                .into_iter()
                .chain(sampled)
                .map(|r| r.content.clone())
                .collect()
        };
        result.records_processed = context_lines.len();

        if context_lines.is_empty() {
            result.actions.push("no context, nothing to imagine".to_string());
            result.duration_ms = elapsed_ms(start);
            return Ok(result);
        }
        let context = context_lines.join("\n");

        let (positive, negative) = tokio::join!(
            self.bounded(
                "generator",
                self.inner.generator.scenario(&context, Stance::Positive)
            ),
            self.bounded(
                "generator",
                self.inner.generator.scenario(&context, Stance::Negative)
            ),
        );
        let scenarios = match (positive, negative) {
            (Ok(p), Ok(n)) => [(Stance::Positive, p), (Stance::Negative, n)],
            (Err(e), _) | (_, Err(e)) => return Err(MemoryError::GeneratorUnavailable(e)),
        };

        let mut prepared = Vec::with_capacity(2);
        for (stance, text) in scenarios {
            let text = text.trim().to_string();
            if text.is_empty() {
                return Err(MemoryError::GeneratorUnavailable(format!(
                    "empty {} scenario",
                    stance
                )));
            }
            let embedding = self.embed_text(&text).await?;
            prepared.push((stance, text, embedding));
        }

        let now = Utc::now();
        let mut state = self.write_state()?;
        let mut created: Vec<String> = Vec::with_capacity(2);
        for (stance, text, embedding) in prepared {
            let record = MemoryRecord::new(
                text,
                embedding,
                scenario_emotions(stance)?,
                config.scenario_importance,
                now,
            );
            let id = record.id.clone();
            if let Err(e) = state.insert_record(record) {
                for done in &created {
                    state.delete_record(done);
                }
                return Err(e);
            }
            created.push(id);
        }
        for id in &created {
            state
                .store
                .link_by_similarity(id, &self.inner.config.connection)?;
        }

        result.records_created = created.len();
        result
            .actions
            .push(format!("imagined 2 futures from {} memories", context_lines.len()));
        result.duration_ms = elapsed_ms(start);
        info!(context = context_lines.len(), "Synthesize stage complete");
        Ok(result)
    }
}

// ============================================================================
// TESTS
// ============================================================================
