//! Scoring & Decay
//!
//! Importance/activation arithmetic shared by the façade and consolidation:
//!
//! 1. **Fade**: importance × `decay_rate^elapsed_days`, measured from each
//!    record's `decayed_at` watermark so repeated fades never double count
//! 2. **Activation decay**: exponential with a configurable half-life
//! 3. **Strengthen**: recall bumps importance, access count and recency
//!
//! Importance is always clamped into [0, 1] and activation never goes negative.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::MemoryRecord;
use crate::store::RecordStore;

// ============================================================================
// SCORING CONFIG
// ============================================================================

/// Default importance added on recall
pub const DEFAULT_STRENGTHEN_DELTA: f64 = 0.1;

/// Default activation half-life (1 hour)
pub const DEFAULT_ACTIVATION_HALF_LIFE_SECS: u64 = 3600;

/// Activation below this snaps to zero
pub const ACTIVATION_EPSILON: f64 = 0.01;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Configuration for importance and activation arithmetic
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScoringConfig {
    /// Importance gained per recall
    pub strengthen_delta: f64,
    /// Activation half-life in seconds
    pub activation_half_life_secs: u64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            strengthen_delta: DEFAULT_STRENGTHEN_DELTA,
            activation_half_life_secs: DEFAULT_ACTIVATION_HALF_LIFE_SECS,
        }
    }
}

/// Outcome of a fade pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FadeReport {
    /// Records whose importance decreased
    pub records_faded: usize,
    /// Records whose activation reached zero during this pass
    pub activations_cleared: usize,
}

// ============================================================================
// IMPORTANCE SCORER
// ============================================================================

/// Importance and activation arithmetic
#[derive(Debug, Clone, Default)]
pub struct ImportanceScorer {
    config: ScoringConfig,
}

impl ImportanceScorer {
    /// Create a scorer with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with custom config
    pub fn with_config(config: ScoringConfig) -> Self {
        Self { config }
    }

    /// Multiplier for `elapsed_secs` of importance decay at `decay_rate` per day
    pub fn decay_factor(&self, decay_rate: f64, elapsed_secs: f64) -> f64 {
        if elapsed_secs <= 0.0 {
            return 1.0;
        }
        decay_rate
            .clamp(0.0, 1.0)
            .powf(elapsed_secs / SECONDS_PER_DAY)
            .clamp(0.0, 1.0)
    }

    /// Multiplier for `elapsed_secs` of activation decay
    pub fn activation_factor(&self, elapsed_secs: f64) -> f64 {
        if elapsed_secs <= 0.0 {
            return 1.0;
        }
        if self.config.activation_half_life_secs == 0 {
            return 0.0;
        }
        0.5_f64.powf(elapsed_secs / self.config.activation_half_life_secs as f64)
    }

    /// Add `delta` to an importance, clamped into [0, 1]
    pub fn adjust(&self, importance: f64, delta: f64) -> f64 {
        clamp_unit(importance + delta)
    }

    /// Apply decay to one live record up to `now`
    ///
    /// Pinned records keep their importance; activation decays regardless.
    pub fn fade_record(
        &self,
        record: &mut MemoryRecord,
        decay_rate: f64,
        now: DateTime<Utc>,
        report: &mut FadeReport,
    ) {
        let elapsed = (now - record.decayed_at).num_milliseconds() as f64 / 1000.0;
        if elapsed <= 0.0 {
            return;
        }

        if !record.pinned {
            let before = record.importance;
            record.importance = clamp_unit(before * self.decay_factor(decay_rate, elapsed));
            if record.importance < before {
                report.records_faded += 1;
            }
        }

        if record.activation > 0.0 {
            record.activation *= self.activation_factor(elapsed);
            if record.activation < ACTIVATION_EPSILON {
                record.activation = 0.0;
                report.activations_cleared += 1;
            }
        }

        record.decayed_at = now;
    }

    /// Fade every live record in the store
    pub fn fade_store(&self, store: &mut RecordStore, decay_rate: f64, now: DateTime<Utc>) -> FadeReport {
        let mut report = FadeReport::default();
        for record in store.live_mut() {
            self.fade_record(record, decay_rate, now, &mut report);
        }
        report
    }

    /// Strengthen a recalled record
    pub fn strengthen(&self, record: &mut MemoryRecord, now: DateTime<Utc>) {
        record.importance = self.adjust(record.importance, self.config.strengthen_delta);
        record.access_count = record.access_count.saturating_add(1);
        if now > record.last_accessed_at {
            record.last_accessed_at = now;
        }
    }
}

/// Clamp into [0, 1], mapping NaN to 0
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

// ============================================================================
// TESTS
// ============================================================================
