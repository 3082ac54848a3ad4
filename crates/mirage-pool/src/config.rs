//! Pool configuration

use crate::interceptor::BlockingStages;
use mirage_types::MonitorLevel;
use std::time::Duration;

/// Configuration for the context pool
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum concurrently live browsers
    pub max_browsers: usize,

    /// Maximum in-use contexts per browser
    pub max_contexts_per_browser: usize,

    /// Global byte budget across all contexts, lifetime of the pool
    pub global_limit_mb: u64,

    /// Per-browser byte allowance before it stops receiving contexts
    pub per_browser_limit_mb: u64,

    /// Per-context byte allowance before the context is closed on release
    pub context_limit_mb: u64,

    /// Resource-blocking stage thresholds
    pub blocking: BlockingStages,

    /// Response cache capacity, pool-wide
    pub cache_capacity_mb: u64,

    /// Time a context spends in quarantine before re-entry
    pub quarantine_period: Duration,

    /// Browsers older than this are retired once idle
    pub browser_max_age: Duration,

    /// Period of the maintenance loop
    pub maintenance_interval: Duration,

    /// Monitor level attached to fresh acquisitions
    pub monitor_level: MonitorLevel,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_browsers: 3,
            max_contexts_per_browser: 4,
            global_limit_mb: 1_024,
            per_browser_limit_mb: 512,
            context_limit_mb: 100,
            blocking: BlockingStages::default(),
            cache_capacity_mb: 100,
            quarantine_period: Duration::from_secs(3_600),
            browser_max_age: Duration::from_secs(3 * 3_600),
            maintenance_interval: Duration::from_secs(30),
            monitor_level: MonitorLevel::High,
        }
    }
}

impl PoolConfig {
    pub fn global_limit_bytes(&self) -> u64 {
        self.global_limit_mb * 1024 * 1024
    }

    pub fn per_browser_limit_bytes(&self) -> u64 {
        self.per_browser_limit_mb * 1024 * 1024
    }

    pub fn context_limit_bytes(&self) -> u64 {
        self.context_limit_mb * 1024 * 1024
    }
}
