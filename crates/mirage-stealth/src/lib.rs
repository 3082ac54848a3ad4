//! # Mirage Stealth
//!
//! Renders fingerprints into everything a context presents to the
//! outside world: the pre-navigation init script that disguises
//! automation, the outbound header plan with browser-correct ordering,
//! the TLS profile bound to the context's session, per-domain request
//! pacing, and human-behavior simulation primitives.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use mirage_stealth::{HeaderPlan, InitScript};
//! # use mirage_types::Fingerprint;
//! # fn demo(fingerprint: &Fingerprint) {
//! let script = InitScript::render(fingerprint);
//! let mut rng = rand::thread_rng();
//! let headers = HeaderPlan::for_fingerprint(fingerprint, &mut rng);
//! # let _ = (script, headers);
//! # }
//! ```

pub mod behavior;
pub mod headers;
pub mod injection;
pub mod rate_limiter;
pub mod tls;

pub use behavior::{BehaviorSimulator, MousePath, Point, ScrollAction};
pub use headers::HeaderPlan;
pub use injection::{InitScript, StealthInjector};
pub use rate_limiter::{
    DomainSnapshot, HumanPacing, RateLimitConfig, RateLimitStrategy, RateLimiter,
};
pub use tls::{is_grease, BrowserArchetype, H2Priority, TlsProfile, TlsRotator};

/// The version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
