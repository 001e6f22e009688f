//! Consolidation Module ("dreaming")
//!
//! Batch maintenance that reorganizes the store between foreground use:
//!
//! 1. **Filter**: decide which fresh working memories are worth keeping
//! 2. **Promote**: move records up the tiers
//! 3. **Merge**: condense clusters of near-duplicate long-term memories
//! 4. **Synthesize**: imagine a hopeful and a nightmare future scenario
//!
//! Stages are methods on [`crate::MemoryEngine`] and can be run one at a time;
//! [`crate::MemoryEngine::dream`] runs them in order. [`DreamScheduler`] drives
//! cycles on an interval from a background task.

mod dreaming;
mod scheduler;

pub use scheduler::{DreamScheduler, SchedulerCommand, SchedulerConfig, SchedulerHandle};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// DREAM CONFIG
// ============================================================================

/// Default importance above which a working memory is kept
pub const DEFAULT_RETAIN_THRESHOLD: f64 = 0.5;

/// Default fraction of below-threshold working memories kept anyway
pub const DEFAULT_RETAIN_SAMPLE_RATE: f64 = 0.1;

/// Default importance multiplier on promotion out of the working tier
pub const DEFAULT_PROMOTION_BOOST: f64 = 1.1;

/// Default time in short-term before promotion to long-term (24 hours)
pub const DEFAULT_LONG_TERM_AFTER_SECS: u64 = 24 * 3600;

/// Default importance that promotes straight to long-term
pub const DEFAULT_LONG_TERM_IMPORTANCE: f64 = 0.9;

/// Default smallest cluster worth merging
pub const DEFAULT_MIN_CLUSTER_SIZE: usize = 4;

/// Default largest cluster sent to the summarizer at once
pub const DEFAULT_MAX_CLUSTER_SIZE: usize = 8;

/// Default pairwise similarity required inside a merge cluster
pub const DEFAULT_MERGE_THRESHOLD: f64 = 0.85;

/// Default activation that puts a record in the scenario context
pub const DEFAULT_ACTIVE_THRESHOLD: f64 = 0.5;

/// Default number of long-term records sampled into the scenario context
pub const DEFAULT_SCENARIO_SAMPLE_SIZE: usize = 5;

/// Default importance of synthesized scenarios
pub const DEFAULT_SCENARIO_IMPORTANCE: f64 = 0.3;

/// What happens to working memories the filter does not keep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilteredPolicy {
    /// Move to short-term unboosted; pruning decides their fate
    #[default]
    Release,
    /// Delete immediately
    Drop,
}

impl std::str::FromStr for FilteredPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "release" => Ok(FilteredPolicy::Release),
            "drop" => Ok(FilteredPolicy::Drop),
            _ => Err(format!("Unknown filtered policy: {}", s)),
        }
    }
}

/// Configuration for the dream cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DreamConfig {
    /// Working memories above this importance are kept
    pub retain_threshold: f64,
    /// Probability that a below-threshold working memory is kept
    pub retain_sample_rate: f64,
    /// Fate of working memories that are not kept
    pub filtered_policy: FilteredPolicy,
    /// Importance multiplier for Working → ShortTerm
    pub promotion_boost: f64,
    /// Seconds in short-term before promotion to long-term
    pub long_term_after_secs: u64,
    /// Short-term importance that promotes immediately
    pub long_term_importance: f64,
    /// Smallest cluster that is merged
    pub min_cluster_size: usize,
    /// Largest cluster handed to the summarizer
    pub max_cluster_size: usize,
    /// Pairwise embedding similarity inside a cluster
    pub merge_threshold: f64,
    /// Activation needed to join the scenario context
    pub active_threshold: f64,
    /// Long-term records sampled into the scenario context
    pub scenario_sample_size: usize,
    /// Importance assigned to synthesized scenarios
    pub scenario_importance: f64,
}

impl Default for DreamConfig {
    fn default() -> Self {
        Self {
            retain_threshold: DEFAULT_RETAIN_THRESHOLD,
            retain_sample_rate: DEFAULT_RETAIN_SAMPLE_RATE,
            filtered_policy: FilteredPolicy::default(),
            promotion_boost: DEFAULT_PROMOTION_BOOST,
            long_term_after_secs: DEFAULT_LONG_TERM_AFTER_SECS,
            long_term_importance: DEFAULT_LONG_TERM_IMPORTANCE,
            min_cluster_size: DEFAULT_MIN_CLUSTER_SIZE,
            max_cluster_size: DEFAULT_MAX_CLUSTER_SIZE,
            merge_threshold: DEFAULT_MERGE_THRESHOLD,
            active_threshold: DEFAULT_ACTIVE_THRESHOLD,
            scenario_sample_size: DEFAULT_SCENARIO_SAMPLE_SIZE,
            scenario_importance: DEFAULT_SCENARIO_IMPORTANCE,
        }
    }
}

// ============================================================================
// STAGE RESULTS
// ============================================================================

/// Which dream stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DreamStage {
    /// Working-tier triage
    Filter,
    /// Tier promotion
    Promote,
    /// Cluster merging
    Merge,
    /// Future scenario synthesis
    Synthesize,
}

impl DreamStage {
    /// All stages in execution order
    pub const ALL: [DreamStage; 4] = [
        DreamStage::Filter,
        DreamStage::Promote,
        DreamStage::Merge,
        DreamStage::Synthesize,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DreamStage::Filter => "filter",
            DreamStage::Promote => "promote",
            DreamStage::Merge => "merge",
            DreamStage::Synthesize => "synthesize",
        }
    }
}

impl std::fmt::Display for DreamStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result from a single dream stage
///
/// Counter meaning per stage:
/// - filter: `records_changed` released, `records_removed` dropped
/// - promote: `records_changed` promoted
/// - merge: `records_changed` clusters merged, `records_created` replacements,
///   `records_removed` originals retired
/// - synthesize: `records_created` scenarios
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageResult {
    pub stage: DreamStage,
    pub duration_ms: u64,
    pub records_processed: usize,
    pub records_changed: usize,
    pub records_created: usize,
    pub records_removed: usize,
    pub actions: Vec<String>,
}

impl StageResult {
    pub(crate) fn new(stage: DreamStage) -> Self {
        Self {
            stage,
            duration_ms: 0,
            records_processed: 0,
            records_changed: 0,
            records_created: 0,
            records_removed: 0,
            actions: Vec::new(),
        }
    }
}

/// Report from a full dream cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DreamReport {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Stages that ran, in order
    pub stages: Vec<StageResult>,
    /// The cycle stopped early on request
    pub interrupted: bool,
    /// Another cycle was already running, nothing was done
    pub skipped: bool,
}

impl DreamReport {
    pub(crate) fn new() -> Self {
        Self {
            started_at: Utc::now(),
            duration_ms: 0,
            stages: Vec::new(),
            interrupted: false,
            skipped: false,
        }
    }

    /// Result for one stage, if it ran
    pub fn stage(&self, stage: DreamStage) -> Option<&StageResult> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    /// Records created across all stages
    pub fn total_created(&self) -> usize {
        self.stages.iter().map(|s| s.records_created).sum()
    }

    /// Records removed across all stages
    pub fn total_removed(&self) -> usize {
        self.stages.iter().map(|s| s.records_removed).sum()
    }
}

// ============================================================================
// SAMPLING
// ============================================================================

/// Deterministic pseudo-random value in [0, 1) for an id within a cycle
///
/// The same id and seed always give the same value, so a cycle can be
/// replayed in tests.
pub(crate) fn sample_unit(id: &str, seed: u64) -> f64 {
    let hash = id
        .bytes()
        .fold(seed ^ 0x9E37_79B9_7F4A_7C15, |acc, b| {
            acc.wrapping_mul(31).wrapping_add(b as u64)
        });
    // splitmix64 finalizer
    let mut z = hash.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^= z >> 31;
    (z >> 11) as f64 / (1u64 << 53) as f64
}
