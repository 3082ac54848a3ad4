//! Context health state and metrics
//!
//! A context record is the runtime binding of a profile to a live browser
//! context. The pool owns the record; the profile is referenced by id only
//! (relation plus lookup, never ownership).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Health of a live browser context
///
/// Quarantine is a context status. The pool maintains its own timestamped
/// quarantine queue; there is no pool-level quarantine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextHealth {
    Pristine,
    Healthy,
    Warming,
    Suspicious,
    Detected,
    Recovering,
    Quarantine,
}

impl ContextHealth {
    /// Health multiplier used by the browser scoring formula.
    pub fn score_multiplier(&self) -> f64 {
        match self {
            ContextHealth::Pristine => 1.1,
            ContextHealth::Healthy => 1.0,
            ContextHealth::Warming => 0.9,
            ContextHealth::Suspicious => 0.7,
            ContextHealth::Recovering => 0.5,
            ContextHealth::Detected => 0.3,
            ContextHealth::Quarantine => 0.1,
        }
    }
}

/// Rolling metrics for a single context
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextMetrics {
    /// Total requests issued through the context
    pub requests: u64,

    /// Requests that completed successfully
    pub successes: u64,

    /// Requests that failed
    pub failures: u64,

    /// Detections recorded against this context (by the pool, on release)
    pub detections: u64,

    /// Exponential moving average of response time in milliseconds
    pub avg_response_time_ms: f64,

    /// Bytes sent, per domain
    pub tx_bytes_by_domain: HashMap<String, u64>,

    /// Bytes received, per domain
    pub rx_bytes_by_domain: HashMap<String, u64>,

    /// Bytes served from the response cache instead of the network
    pub cached_bytes: u64,

    /// Bytes of requests refused by the resource blocker
    pub blocked_bytes: u64,
}

impl ContextMetrics {
    pub fn record_request(&mut self, success: bool, response_time_ms: f64) {
        self.requests += 1;
        if success {
            self.successes += 1;
        } else {
            self.failures += 1;
        }
        // EMA with alpha 0.2; first sample seeds the average.
        if self.requests == 1 {
            self.avg_response_time_ms = response_time_ms;
        } else {
            self.avg_response_time_ms =
                self.avg_response_time_ms * 0.8 + response_time_ms * 0.2;
        }
    }

    pub fn add_tx(&mut self, domain: &str, bytes: u64) {
        *self.tx_bytes_by_domain.entry(domain.to_string()).or_default() += bytes;
    }

    pub fn add_rx(&mut self, domain: &str, bytes: u64) {
        *self.rx_bytes_by_domain.entry(domain.to_string()).or_default() += bytes;
    }

    /// Total bytes moved over the network by this context.
    pub fn total_bytes(&self) -> u64 {
        self.tx_bytes_by_domain.values().sum::<u64>()
            + self.rx_bytes_by_domain.values().sum::<u64>()
    }

    pub fn success_rate(&self) -> f64 {
        if self.requests == 0 {
            return 1.0;
        }
        self.successes as f64 / self.requests as f64
    }

    pub fn detection_rate(&self) -> f64 {
        if self.requests == 0 {
            return 0.0;
        }
        (self.detections as f64 / self.requests as f64).min(1.0)
    }

    /// Top traffic domains by received bytes, heaviest first.
    pub fn top_domains(&self, limit: usize) -> Vec<(String, u64)> {
        let mut entries: Vec<(String, u64)> = self
            .rx_bytes_by_domain
            .iter()
            .map(|(d, b)| (d.clone(), *b))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        entries.truncate(limit);
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_track_bytes_per_domain() {
        let mut m = ContextMetrics::default();
        m.add_rx("example.com", 1000);
        m.add_rx("example.com", 500);
        m.add_tx("example.com", 200);
        m.add_rx("cdn.example.net", 4000);

        assert_eq!(m.total_bytes(), 5700);
        let top = m.top_domains(1);
        assert_eq!(top[0].0, "cdn.example.net");
    }

    #[test]
    fn success_rate_defaults_to_one() {
        let m = ContextMetrics::default();
        assert_eq!(m.success_rate(), 1.0);
        assert_eq!(m.detection_rate(), 0.0);
    }

    #[test]
    fn multipliers_rank_pristine_above_quarantine() {
        assert!(
            ContextHealth::Pristine.score_multiplier()
                > ContextHealth::Healthy.score_multiplier()
        );
        assert!(
            ContextHealth::Detected.score_multiplier()
                > ContextHealth::Quarantine.score_multiplier()
        );
        assert_eq!(ContextHealth::Quarantine.score_multiplier(), 0.1);
    }
}
