//! # Mirage Pool
//!
//! The fleet side of Mirage: a bounded population of live browsers, each
//! hosting stealth-configured contexts leased out through
//! [`ContextPool::acquire`] and scored on [`ContextPool::release`].
//! Resource discipline is built in: per-context staged resource blocking,
//! a pool-wide response cache, per-browser and global byte budgets, and a
//! timestamped quarantine queue for burned contexts.

pub mod cache;
pub mod config;
pub mod context;
pub mod interceptor;
pub mod pool;

pub use cache::{CacheEntry, CacheKeySource, CacheStats, ResponseCache};
pub use config::PoolConfig;
pub use context::ContextRecord;
pub use interceptor::{BlockingStages, ContextAccounting, Interceptor, TRACKER_HOSTS};
pub use pool::{
    AcquireOptions, Acquisition, ContextPool, PoolStatus, ReleaseOutcome,
};

/// The version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
