//! Context records
//!
//! The runtime binding of a profile to a live driver context. The pool
//! owns the record; the profile is referenced by id and resolved through
//! the profile manager, never owned (no back-reference cycles).

use mirage_types::{ContextHealth, ContextMetrics};
use std::time::Instant;

/// Pool-side record for one live context
#[derive(Debug, Clone)]
pub struct ContextRecord {
    pub context_id: String,
    pub browser_id: String,
    /// Weak reference: resolved through the ProfileManager
    pub profile_id: String,
    pub health: ContextHealth,
    pub metrics: ContextMetrics,
    pub created_at: Instant,
    /// Ids of live pages opened in the context
    pub pages: Vec<String>,
    /// TLS enhancement session bound at acquire time
    pub tls_session_id: Option<String>,
}

impl ContextRecord {
    pub fn new(
        context_id: impl Into<String>,
        browser_id: impl Into<String>,
        profile_id: impl Into<String>,
    ) -> Self {
        Self {
            context_id: context_id.into(),
            browser_id: browser_id.into(),
            profile_id: profile_id.into(),
            health: ContextHealth::Pristine,
            metrics: ContextMetrics::default(),
            created_at: Instant::now(),
            pages: Vec::new(),
            tls_session_id: None,
        }
    }

    /// One detection moves health a single step down the ladder:
    /// HEALTHY → SUSPICIOUS → DETECTED.
    pub fn degrade(&mut self) {
        self.health = match self.health {
            ContextHealth::Pristine | ContextHealth::Healthy | ContextHealth::Warming => {
                ContextHealth::Suspicious
            }
            ContextHealth::Suspicious | ContextHealth::Recovering => ContextHealth::Detected,
            ContextHealth::Detected | ContextHealth::Quarantine => self.health,
        };
    }

    /// Whether the record may be handed out for warm reuse.
    pub fn reusable(&self) -> bool {
        matches!(
            self.health,
            ContextHealth::Pristine | ContextHealth::Healthy | ContextHealth::Recovering
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degrade_walks_the_health_ladder() {
        let mut record = ContextRecord::new("c1", "b1", "p1");
        record.health = ContextHealth::Healthy;
        record.degrade();
        assert_eq!(record.health, ContextHealth::Suspicious);
        record.degrade();
        assert_eq!(record.health, ContextHealth::Detected);
        record.degrade();
        assert_eq!(record.health, ContextHealth::Detected);
    }

    #[test]
    fn quarantined_records_are_not_reusable() {
        let mut record = ContextRecord::new("c1", "b1", "p1");
        assert!(record.reusable());
        record.health = ContextHealth::Quarantine;
        assert!(!record.reusable());
    }
}
