//! Profile lifecycle state

use serde::{Deserialize, Serialize};

/// Lifecycle state of a fingerprint profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileState {
    /// Freshly synthesized, never used against a target
    Pristine,
    /// In rotation with no adverse signals
    Healthy,
    /// Adverse signals observed, candidate for targeted mutation
    Suspicious,
    /// Burned; must undergo a major evolution before reuse
    Compromised,
    /// Post-major-evolution rest state, eligible for reactivation
    Dormant,
    /// A mutation is in progress; no concurrent mutation may start
    Evolving,
}

impl ProfileState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileState::Pristine => "pristine",
            ProfileState::Healthy => "healthy",
            ProfileState::Suspicious => "suspicious",
            ProfileState::Compromised => "compromised",
            ProfileState::Dormant => "dormant",
            ProfileState::Evolving => "evolving",
        }
    }

    /// Whether a profile in this state may be bound to a new context.
    pub fn acquirable(&self) -> bool {
        matches!(
            self,
            ProfileState::Pristine | ProfileState::Healthy | ProfileState::Dormant
        )
    }
}

impl std::fmt::Display for ProfileState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
