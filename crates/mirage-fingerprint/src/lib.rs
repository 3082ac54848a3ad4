//! # Mirage Fingerprint
//!
//! Fingerprint synthesis and evolution for the Mirage fleet manager. The
//! crate owns the static identity catalog, the top-down synthesizer with
//! its idempotent consistency pass, the risk-driven mutation engine, the
//! profile store and the persistence layer (snapshots and sealed session
//! files).
//!
//! ## Usage
//!
//! ```rust
//! use mirage_fingerprint::{SeedConstraints, Synthesizer};
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//!
//! let synth = Synthesizer::new();
//! let mut rng = StdRng::seed_from_u64(1);
//! let seed = SeedConstraints::default().os("Windows").browser("Chrome");
//! let fingerprint = synth.generate(&seed, &mut rng);
//! assert!(fingerprint.user_agent().unwrap().contains("Chrome"));
//! ```

pub mod catalog;
pub mod mutation;
pub mod persist;
pub mod profile;
pub mod sampling;
pub mod synthesizer;

pub use catalog::{Catalog, TlsFamily, CATALOG_VERSION};
pub use mutation::{ChangeSet, ForceLevel, MutationEngine};
pub use persist::{
    fingerprint_hash, load_snapshot, save_snapshot, ProfileSnapshot, ProfileStats, SessionCookie,
    SessionData, SessionStore, Snapshot, StaticBinding, SNAPSHOT_SCHEMA_VERSION,
};
pub use profile::{MutationRecord, Profile, ProfileManager};
pub use sampling::weighted_indices;
pub use synthesizer::{exposed_device_memory, SeedConstraints, Synthesizer};

/// The version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
