//! Memory Record - The fundamental unit of memory
//!
//! Each record represents one discrete experience with:
//! - Content and its embedding
//! - Emotional profile
//! - Importance (persistent) and activation (transient) scores
//! - Retention tier and access bookkeeping
//! - Symmetric weighted connections to related records

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::EmotionProfile;

// ============================================================================
// MEMORY TIERS
// ============================================================================

/// Coarse retention stage of a record
///
/// Promotion is monotonic: Working → ShortTerm → LongTerm.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum MemoryTier {
    /// Freshly added, protected from pruning until a dream cycle evaluates it
    #[default]
    Working,
    /// Survived filtering
    ShortTerm,
    /// Consolidated; eligible for merging
    LongTerm,
}

impl MemoryTier {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryTier::Working => "working",
            MemoryTier::ShortTerm => "short_term",
            MemoryTier::LongTerm => "long_term",
        }
    }
}

impl std::fmt::Display for MemoryTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MemoryTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "working" => Ok(MemoryTier::Working),
            "short_term" | "shortterm" => Ok(MemoryTier::ShortTerm),
            "long_term" | "longterm" => Ok(MemoryTier::LongTerm),
            _ => Err(format!("Unknown memory tier: {}", s)),
        }
    }
}

// ============================================================================
// MEMORY RECORD
// ============================================================================

/// A memory record in the store
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryRecord {
    /// Unique identifier (UUID v4)
    pub id: String,
    /// The textual payload
    pub content: String,
    /// Embedding vector, fixed dimension per store
    pub embedding: Vec<f32>,
    /// Emotion label → intensity
    pub emotion_profile: EmotionProfile,

    // ========== Scores ==========
    /// Persistent importance in [0, 1]
    pub importance: f64,
    /// Transient activation, >= 0
    pub activation: f64,

    // ========== Bookkeeping ==========
    /// When the record was created
    pub created_at: DateTime<Utc>,
    /// When the record was last recalled
    pub last_accessed_at: DateTime<Utc>,
    /// Number of recalls
    pub access_count: u64,
    /// Instant up to which importance decay has been applied
    pub decayed_at: DateTime<Utc>,

    // ========== Retention ==========
    /// Current tier
    pub tier: MemoryTier,
    /// When the record entered its current tier
    pub tier_entered_at: DateTime<Utc>,
    /// Exempt from pruning and fading
    pub pinned: bool,
    /// A dream cycle has evaluated this record
    pub evaluated: bool,

    // ========== Graph & history ==========
    /// Neighbor id → edge weight in (0, 1]
    pub connections: HashMap<String, f64>,
    /// Records this one was merged or resolved from
    pub derived_from: Vec<String>,
    /// Successor id when this record is history only
    pub superseded_by: Option<String>,
}

impl MemoryRecord {
    pub(crate) fn new(
        content: String,
        embedding: Vec<f32>,
        emotion_profile: EmotionProfile,
        importance: f64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content,
            embedding,
            emotion_profile,
            importance: importance.clamp(0.0, 1.0),
            activation: 0.0,
            created_at: now,
            last_accessed_at: now,
            access_count: 0,
            decayed_at: now,
            tier: MemoryTier::Working,
            tier_entered_at: now,
            pinned: false,
            evaluated: false,
            connections: HashMap::new(),
            derived_from: Vec::new(),
            superseded_by: None,
        }
    }

    /// Live records take part in recall, decay and consolidation
    pub fn is_live(&self) -> bool {
        self.superseded_by.is_none()
    }

    /// Check if the record has been replaced
    pub fn is_superseded(&self) -> bool {
        self.superseded_by.is_some()
    }

    /// Time spent in the current tier
    pub fn time_in_tier(&self, now: DateTime<Utc>) -> Duration {
        now - self.tier_entered_at
    }

    /// Move to a new tier, resetting the residence clock
    pub(crate) fn enter_tier(&mut self, tier: MemoryTier, now: DateTime<Utc>) {
        if tier != self.tier {
            self.tier = tier;
            self.tier_entered_at = now;
        }
    }

    /// Short preview for logs
    pub fn preview(&self) -> String {
        self.content.chars().take(40).collect()
    }
}

// ============================================================================
// INPUT TYPES
// ============================================================================

/// Input for creating a new memory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMemoryInput {
    /// The content to remember
    pub content: String,
    /// Initial importance in [0, 1]
    pub importance: f64,
    /// Emotional profile
    #[serde(default)]
    pub emotion_profile: EmotionProfile,
    /// Pre-computed embedding; the provider is called when absent
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    /// Exempt from pruning and fading
    #[serde(default)]
    pub pinned: bool,
}

impl AddMemoryInput {
    /// Create input with content and importance
    pub fn new(content: impl Into<String>, importance: f64) -> Self {
        Self {
            content: content.into(),
            importance,
            ..Default::default()
        }
    }

    /// Attach an emotion profile
    pub fn with_emotions(mut self, emotion_profile: EmotionProfile) -> Self {
        self.emotion_profile = emotion_profile;
        self
    }

    /// Supply the embedding instead of calling the provider
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Mark the record pinned
    pub fn pinned(mut self) -> Self {
        self.pinned = true;
        self
    }
}
