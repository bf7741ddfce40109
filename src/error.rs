//! Error types for the placement engine.
//!
//! Every fallible public operation returns [`Result<T, WaycaError>`]. No
//! partial group-tree mutation is ever left behind by a failed call; see the
//! rollback discussion on [`crate::group::Group::add_group`].

use thiserror::Error;

/// The error type returned by fallible operations in this crate.
#[derive(Debug, Error)]
pub enum WaycaError {
    /// A request carried an out-of-range count, an unrecognised topology
    /// flag combination, or a group level that was not strictly finer than
    /// its parent's.
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// Human-readable description of what was wrong.
        reason: String,
    },

    /// The topology oracle could not answer the query, either because the
    /// platform lacks the requested topology level (e.g. no CCL) or because
    /// it failed to initialise.
    #[error("topology unavailable: {reason}")]
    TopologyUnavailable {
        /// Human-readable description of what was unavailable.
        reason: String,
    },

    /// A delete was requested for a thread or child group that is not a
    /// member of the target group.
    #[error("not found: {reason}")]
    NotFound {
        /// What was being looked up.
        reason: String,
    },

    /// A parent group had no room left to satisfy a child's resource
    /// request at the moment the request was made.
    #[error("resource exhausted: {reason}")]
    ResourceExhausted {
        /// Human-readable description of the exhaustion.
        reason: String,
    },

    /// The [`crate::binder::Binder`] rejected a bind request. The load table
    /// is left unmodified when this error is returned.
    #[error("bind failed for pid {pid}: {reason}")]
    Bind {
        /// The OS thread id the binder was asked to bind.
        pid: i32,
        /// Reason reported by the binder.
        reason: String,
    },

    /// A managed-thread static map string could not be parsed.
    #[error("failed to parse managed-thread map: {reason}")]
    Parse {
        /// Human-readable description of the parse failure.
        reason: String,
    },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, WaycaError>;
