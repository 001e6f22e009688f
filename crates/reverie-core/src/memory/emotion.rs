//! Emotion profiles
//!
//! An emotion profile maps an emotion label ("joy", "fear", "anticipation", ...)
//! to an intensity in `[0, 1]`. Profiles are decoded strictly: malformed input
//! is an error, never a silent `{"neutral": 1.0}` fallback.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ============================================================================
// ERRORS
// ============================================================================

/// Failure to decode or validate an emotion profile
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EmotionParseError {
    /// Input was not valid JSON
    #[error("malformed emotion profile: {0}")]
    Malformed(String),
    /// Top-level JSON value was not an object
    #[error("emotion profile must be a JSON object")]
    NotAnObject,
    /// An intensity was not a number
    #[error("intensity for '{0}' is not a number")]
    NotANumber(String),
    /// An intensity was NaN or infinite
    #[error("intensity for '{0}' is not finite")]
    NonFinite(String),
    /// An intensity fell outside [0, 1]
    #[error("intensity for '{label}' out of range: {value}")]
    OutOfRange { label: String, value: f64 },
    /// Label was empty after trimming
    #[error("emotion label cannot be empty")]
    EmptyLabel,
}

// ============================================================================
// EMOTION PROFILE
// ============================================================================

/// Emotion label → intensity mapping with validated entries
///
/// Labels are stored lowercase and trimmed; iteration order is alphabetical.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, f64>",
    into = "BTreeMap<String, f64>"
)]
pub struct EmotionProfile {
    intensities: BTreeMap<String, f64>,
}

impl EmotionProfile {
    /// Create an empty profile
    pub fn new() -> Self {
        Self::default()
    }

    /// Strictly decode a profile from a JSON object such as `{"joy": 0.7}`
    pub fn parse(json: &str) -> Result<Self, EmotionParseError> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| EmotionParseError::Malformed(e.to_string()))?;

        let object = value.as_object().ok_or(EmotionParseError::NotAnObject)?;

        let mut profile = Self::new();
        for (label, raw) in object {
            let intensity = raw
                .as_f64()
                .ok_or_else(|| EmotionParseError::NotANumber(label.clone()))?;
            profile.insert(label, intensity)?;
        }
        Ok(profile)
    }

    /// Build a profile from `(label, intensity)` pairs
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self, EmotionParseError>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: AsRef<str>,
    {
        let mut profile = Self::new();
        for (label, intensity) in pairs {
            profile.insert(label.as_ref(), intensity)?;
        }
        Ok(profile)
    }

    /// Insert or replace one emotion
    pub fn insert(&mut self, label: &str, intensity: f64) -> Result<(), EmotionParseError> {
        let label = normalize_label(label)?;
        if !intensity.is_finite() {
            return Err(EmotionParseError::NonFinite(label));
        }
        if !(0.0..=1.0).contains(&intensity) {
            return Err(EmotionParseError::OutOfRange {
                label,
                value: intensity,
            });
        }
        self.intensities.insert(label, intensity);
        Ok(())
    }

    /// Intensity for a label, 0.0 when absent
    pub fn intensity(&self, label: &str) -> f64 {
        self.intensities
            .get(label.trim().to_lowercase().as_str())
            .copied()
            .unwrap_or(0.0)
    }

    /// Whether the label is present
    pub fn contains(&self, label: &str) -> bool {
        self.intensities
            .contains_key(label.trim().to_lowercase().as_str())
    }

    /// Number of emotions in the profile
    pub fn len(&self) -> usize {
        self.intensities.len()
    }

    /// Check if the profile is empty
    pub fn is_empty(&self) -> bool {
        self.intensities.is_empty()
    }

    /// Iterate `(label, intensity)` in label order
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.intensities.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Dot product over shared labels
    ///
    /// Not normalized: a profile with many strong emotions can exceed 1.0.
    pub fn dot(&self, other: &EmotionProfile) -> f64 {
        let (small, large) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        small
            .intensities
            .iter()
            .filter_map(|(label, a)| large.intensities.get(label).map(|b| a * b))
            .sum()
    }

    /// Per-emotion maximum of `self` and `other`, written into `self`
    pub fn merge_max(&mut self, other: &EmotionProfile) {
        for (label, intensity) in &other.intensities {
            let entry = self.intensities.entry(label.clone()).or_insert(0.0);
            if *intensity > *entry {
                *entry = *intensity;
            }
        }
    }

    /// Per-emotion maximum across many profiles
    pub fn merged<'a, I>(profiles: I) -> Self
    where
        I: IntoIterator<Item = &'a EmotionProfile>,
    {
        let mut merged = Self::new();
        for profile in profiles {
            merged.merge_max(profile);
        }
        merged
    }

    /// Strongest emotion, if any
    pub fn dominant(&self) -> Option<(&str, f64)> {
        self.iter()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
    }
}

fn normalize_label(label: &str) -> Result<String, EmotionParseError> {
    let label = label.trim().to_lowercase();
    if label.is_empty() {
        return Err(EmotionParseError::EmptyLabel);
    }
    Ok(label)
}

impl TryFrom<BTreeMap<String, f64>> for EmotionProfile {
    type Error = EmotionParseError;

    fn try_from(map: BTreeMap<String, f64>) -> Result<Self, Self::Error> {
        Self::from_pairs(map)
    }
}

impl From<EmotionProfile> for BTreeMap<String, f64> {
    fn from(profile: EmotionProfile) -> Self {
        profile.intensities
    }
}

// ============================================================================
// TESTS
// ============================================================================
