//! Detection event taxonomy

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Classified adversary action observed on a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionKind {
    Captcha,
    Cloudflare,
    RateLimit,
    Fingerprint,
    Behavioral,
    CdpDetection,
    IpBlock,
    SessionInvalid,
    Unknown,
}

impl DetectionKind {
    pub const ALL: &'static [DetectionKind] = &[
        DetectionKind::Captcha,
        DetectionKind::Cloudflare,
        DetectionKind::RateLimit,
        DetectionKind::Fingerprint,
        DetectionKind::Behavioral,
        DetectionKind::CdpDetection,
        DetectionKind::IpBlock,
        DetectionKind::SessionInvalid,
        DetectionKind::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionKind::Captcha => "captcha",
            DetectionKind::Cloudflare => "cloudflare",
            DetectionKind::RateLimit => "rate_limit",
            DetectionKind::Fingerprint => "fingerprint",
            DetectionKind::Behavioral => "behavioral",
            DetectionKind::CdpDetection => "cdp_detection",
            DetectionKind::IpBlock => "ip_block",
            DetectionKind::SessionInvalid => "session_invalid",
            DetectionKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for DetectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single classified detection, produced by the monitor and consumed by
/// the recovery scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionEvent {
    /// What the adversary appears to be doing
    pub kind: DetectionKind,

    /// Classifier confidence in [0, 1]
    pub confidence: f64,

    /// Raw indicators that triggered the classification
    pub indicators: Vec<String>,

    /// URL the signal was observed on
    pub url: String,

    /// When the signal was observed
    pub timestamp: DateTime<Utc>,

    /// Free-form detail map (header names, matched patterns, probe output)
    pub details: HashMap<String, String>,

    /// Page the monitor was watching
    pub page_id: String,
}

impl DetectionEvent {
    pub fn new(kind: DetectionKind, confidence: f64, url: impl Into<String>) -> Self {
        Self {
            kind,
            confidence: confidence.clamp(0.0, 1.0),
            indicators: Vec::new(),
            url: url.into(),
            timestamp: Utc::now(),
            details: HashMap::new(),
            page_id: String::new(),
        }
    }

    pub fn with_indicator(mut self, indicator: impl Into<String>) -> Self {
        self.indicators.push(indicator.into());
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn with_page(mut self, page_id: impl Into<String>) -> Self {
        self.page_id = page_id.into();
        self
    }
}

/// Monitoring intensity for a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorLevel {
    Low,
    Medium,
    High,
    Paranoid,
}

impl MonitorLevel {
    /// Period of the monitor loop at this level.
    pub fn check_interval(&self) -> Duration {
        match self {
            MonitorLevel::Low => Duration::from_secs(10),
            MonitorLevel::Medium => Duration::from_secs(5),
            MonitorLevel::High => Duration::from_secs(2),
            MonitorLevel::Paranoid => Duration::from_secs(1),
        }
    }

    /// Content scanning runs at MEDIUM and above.
    pub fn scans_content(&self) -> bool {
        *self >= MonitorLevel::Medium
    }

    /// JS probes and console analysis run at HIGH and above.
    pub fn runs_probes(&self) -> bool {
        *self >= MonitorLevel::High
    }

    /// Network timing analysis runs only at PARANOID.
    pub fn analyzes_network(&self) -> bool {
        *self == MonitorLevel::Paranoid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_order_by_intensity() {
        assert!(MonitorLevel::Low < MonitorLevel::Paranoid);
        assert!(MonitorLevel::High.runs_probes());
        assert!(!MonitorLevel::Medium.runs_probes());
        assert!(MonitorLevel::Medium.scans_content());
        assert!(MonitorLevel::Paranoid.analyzes_network());
        assert_eq!(MonitorLevel::High.check_interval(), Duration::from_secs(2));
    }

    #[test]
    fn confidence_is_clamped() {
        let event = DetectionEvent::new(DetectionKind::Captcha, 1.7, "https://x.test/");
        assert_eq!(event.confidence, 1.0);
    }
}
