//! External collaborators used during consolidation
//!
//! The engine never writes prose itself. Merged summaries and hypothetical
//! future scenarios come from a [`Summarizer`] and a [`Generator`], usually
//! backed by a language model. Calls are bounded by the engine's collaborator
//! timeout and a failure never loses records.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Collaborator failure
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum CollaboratorError {
    /// The backend failed or refused the request
    #[error("collaborator failed: {0}")]
    Failed(String),
    /// The backend answered with something unusable
    #[error("invalid collaborator output: {0}")]
    InvalidOutput(String),
}

/// Framing of a synthesized future scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stance {
    /// Hopeful outcome
    Positive,
    /// Adversarial / nightmare outcome
    Negative,
}

impl Stance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stance::Positive => "positive",
            Stance::Negative => "negative",
        }
    }
}

impl std::fmt::Display for Stance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Condenses a cluster of similar memories.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Merge `contents` into replacement texts.
    ///
    /// Must return at least two outputs for two or more inputs; the engine
    /// treats fewer as a failure and leaves the cluster unmerged.
    async fn merge(&self, contents: &[String]) -> Result<Vec<String>, CollaboratorError>;
}

/// Imagines future situations from remembered context.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn scenario(&self, context: &str, stance: Stance) -> Result<String, CollaboratorError>;
}
