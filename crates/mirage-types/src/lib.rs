//! # Mirage Types
//!
//! Shared domain types for the Mirage stealth fleet manager. This crate
//! defines the fingerprint component model, the profile and context state
//! machines, the detection-event taxonomy and the typed error surface that
//! every other Mirage crate builds on. It carries no runtime machinery of
//! its own.

pub mod behavior;
pub mod component;
pub mod context;
pub mod detection;
pub mod errors;
pub mod profile;
pub mod recovery;

pub use behavior::BehavioralModel;
pub use component::{
    ComponentCategory, ComponentName, ComponentValue, Fingerprint, FingerprintComponent,
    RESOLUTION_ORDER,
};
pub use context::{ContextHealth, ContextMetrics};
pub use detection::{DetectionEvent, DetectionKind, MonitorLevel};
pub use errors::{AcquireError, DriverError, MirageError, PersistError};
pub use profile::ProfileState;
pub use recovery::{RecoveryAction, RecoveryOutcome};

/// The version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
