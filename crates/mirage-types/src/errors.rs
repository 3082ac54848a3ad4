//! Typed error surface
//!
//! Recoverable-propagated failures cross component boundaries as values of
//! these types; recoverable-local failures never leave the component that
//! observed them. Only fatal conditions (driver disconnected, catalog or
//! snapshot I/O at startup) unwind further than one layer.

use thiserror::Error;

/// Why an `acquire` call could not hand out a context
#[derive(Debug, Error)]
pub enum AcquireError {
    /// The pool's global byte budget would be exceeded
    #[error("global data budget exceeded: {used_bytes} of {limit_bytes} bytes used")]
    BudgetExceeded { used_bytes: u64, limit_bytes: u64 },

    /// No browser is in a state eligible for new contexts
    #[error("no healthy browser available")]
    NoHealthyBrowser,

    /// The underlying driver is gone; the pool is shutting down
    #[error("driver unavailable: {0}")]
    DriverUnavailable(#[from] DriverError),
}

/// Failure talking to the browser driver
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("driver disconnected")]
    Disconnected,

    #[error("browser launch failed: {0}")]
    LaunchFailed(String),

    #[error("page operation failed: {0}")]
    PageOperation(String),

    #[error("script evaluation failed: {0}")]
    Evaluation(String),

    #[error("route interception failed: {0}")]
    Interception(String),

    #[error("cdp session failed: {0}")]
    Cdp(String),
}

/// Failure persisting or restoring profile state
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("snapshot io: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encode: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("unsupported snapshot schema version {0}")]
    SchemaVersion(u32),

    #[error("session blob rejected: {0}")]
    SessionRejected(String),

    #[error("seal/unseal failed: {0}")]
    Crypto(String),
}

/// Top-level error aggregating every Mirage failure domain
#[derive(Debug, Error)]
pub enum MirageError {
    #[error(transparent)]
    Acquire(#[from] AcquireError),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error("shutdown in progress")]
    ShuttingDown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_error_reports_both_sides() {
        let err = AcquireError::BudgetExceeded {
            used_bytes: 11 * 1024 * 1024,
            limit_bytes: 10 * 1024 * 1024,
        };
        let msg = err.to_string();
        assert!(msg.contains("11534336"));
        assert!(msg.contains("10485760"));
    }

    #[test]
    fn driver_errors_convert_into_acquire_errors() {
        let err: AcquireError = DriverError::Disconnected.into();
        assert!(matches!(err, AcquireError::DriverUnavailable(_)));
    }
}
