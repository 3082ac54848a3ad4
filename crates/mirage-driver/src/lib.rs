//! # Mirage Driver
//!
//! Minimal abstraction over a headless browser control library. The core
//! never talks to a concrete driver; it consumes the traits defined here
//! (launch, contexts with init scripts and route interception, pages with
//! navigation, input and event subscriptions). A deterministic in-memory
//! [`mock::MockDriver`] backs the test suites of the pool and detection
//! crates.

pub mod events;
pub mod mock;
pub mod traits;

pub use events::{
    ConsoleEvent, ConsoleLevel, DialogEvent, PageErrorEvent, RequestEvent, ResourceType,
    ResponseEvent, RouteDecision, RouteRequest,
};
pub use mock::{MockDriver, MockResponse};
pub use traits::{
    BrowserHandle, ContextHandle, ContextOptions, Driver, LaunchOptions, PageHandle, RouteHandler,
};

/// The version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
