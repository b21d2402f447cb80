//! # Stampsync
//!
//! Allocation and reconciliation engine for crowd-classified stamp catalogs.
//!
//! Stampsync exposes locally generated labeled items ("stamps") to an external
//! crowd-classification platform and folds the platform's classification
//! results back into a local SQLite database. The local database and the
//! remote catalog are loosely coupled stores of the same logical entities;
//! the engine converges them idempotently, one sync cycle at a time, while
//! protecting two global invariants the platform itself does not enforce:
//!
//! - no item is ever duplicated across the remote catalog, and
//! - no item belongs to more than one group at any time.
//!
//! ## Example
//!
//! ```rust,ignore
//! use stampsync::{LocalStore, SyncMode, SyncOrchestrator};
//!
//! let store = LocalStore::open(&config.database_path)?;
//! let orchestrator = SyncOrchestrator::new(&store, &catalog, &config);
//! let report = orchestrator.run(SyncMode::Sync, scope)?;
//! println!("{}", report.summary());
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod catalog;
pub mod config;
pub mod fingerprint;
pub mod models;
pub mod observability;
pub mod services;
pub mod storage;

// Re-exports for convenience
pub use catalog::{CatalogClient, RemoteGroup, RemoteItem, Scope};
pub use config::StampsyncConfig;
pub use models::{Group, Item, MembershipChange, WeightChange};
pub use services::{
    AllocationEngine, ClassificationIngest, ReconciliationEngine, SyncMode, SyncOrchestrator,
    SyncReport,
};
pub use storage::LocalStore;

/// Error type for stampsync operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `TransientRemote` | Network failures, rate limits, 5xx responses; retried with backoff, then deferred to the next cycle |
/// | `RejectedOperation` | Remote validation failures (e.g. duplicate group name); never retried, logged and skipped |
/// | `InvariantViolation` | Weights not summing to 1, an item found in two remote groups, a lost membership update |
/// | `Configuration` | Missing reducer mapping, malformed bucket count, unreadable config file; fatal at startup |
/// | `Storage` | `SQLite` operations fail |
#[derive(Debug, ThisError)]
pub enum Error {
    /// A remote call failed in a way that is worth retrying.
    ///
    /// Raised when:
    /// - The catalog API is unreachable or times out
    /// - The platform responds with 429 or a 5xx status
    #[error("transient remote failure in '{operation}': {cause}")]
    TransientRemote {
        /// The catalog operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// The remote platform rejected an operation outright.
    ///
    /// Raised when:
    /// - The platform responds with a 4xx validation error
    /// - An entity referenced by the request does not exist remotely
    ///
    /// Never retried; the affected item or group is skipped and surfaced in
    /// the sync report.
    #[error("remote rejected '{operation}': {cause}")]
    RejectedOperation {
        /// The catalog operation that was rejected.
        operation: String,
        /// The platform's stated reason.
        cause: String,
    },

    /// A global invariant the engine exists to protect was found broken.
    ///
    /// Raised when:
    /// - Selection weights do not sum to 1, or their count mismatches the
    ///   configured bucket count
    /// - An item is observed in more than one remote group simultaneously
    /// - A compare-and-set membership write finds the record already changed
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Configuration is missing or malformed.
    ///
    /// Fatal at startup; no core operation proceeds without validated
    /// configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A local store operation failed.
    #[error("storage operation '{operation}' failed: {cause}")]
    Storage {
        /// The store operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

impl Error {
    /// Builds a [`Error::Storage`] from a rusqlite error.
    pub fn storage(operation: impl Into<String>, err: &rusqlite::Error) -> Self {
        Self::Storage {
            operation: operation.into(),
            cause: err.to_string(),
        }
    }

    /// Returns true when the error is worth retrying with backoff.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::TransientRemote { .. })
    }
}

/// Result type alias for stampsync operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::TransientRemote {
            operation: "list_items".to_string(),
            cause: "connection reset".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "transient remote failure in 'list_items': connection reset"
        );

        let err = Error::InvariantViolation("weights sum to 0.9".to_string());
        assert_eq!(err.to_string(), "invariant violation: weights sum to 0.9");

        let err = Error::Configuration("num_priority_groups must be >= 1".to_string());
        assert!(err.to_string().starts_with("configuration error"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(
            Error::TransientRemote {
                operation: "x".to_string(),
                cause: "y".to_string(),
            }
            .is_transient()
        );
        assert!(
            !Error::RejectedOperation {
                operation: "x".to_string(),
                cause: "y".to_string(),
            }
            .is_transient()
        );
        assert!(!Error::InvariantViolation("z".to_string()).is_transient());
    }
}
