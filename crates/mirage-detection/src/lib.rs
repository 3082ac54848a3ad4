//! # Mirage Detection
//!
//! Real-time detection monitoring and recovery for Mirage contexts. A
//! [`PageMonitor`] watches one page at one of four intensity levels and
//! classifies what the far side is doing (challenges, blocks,
//! fingerprinting, cadence analysis) into [`mirage_types::DetectionEvent`]
//! values. The shared [`EventEmitter`] deduplicates and fans events out to
//! subscribers; the [`RecoveryScheduler`] answers them with per-kind
//! action recipes.

pub mod emitter;
pub mod monitor;
pub mod patterns;
pub mod recovery;

pub use emitter::{EventCallback, EventEmitter};
pub use monitor::{PageMonitor, PROBE_SCRIPT};
pub use patterns::{scan, ContentPattern, CONSOLE_PATTERNS, CONTENT_PATTERNS};
pub use recovery::{
    NoHooks, RecoveryHooks, RecoveryScheduler, RecoveryStats, RecoveryTarget,
};

/// The version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
