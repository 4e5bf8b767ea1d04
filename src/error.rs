//! Error types for the region core.

use thiserror::Error;

use crate::Id;

/// Errors returned by map, region and persistence operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed identifiers or self-referential requests.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A referenced entity does not exist.
    #[error("{kind} not found ({key})")]
    NotFound {
        /// What kind of entity was looked up.
        kind: &'static str,
        /// The missing identifier, rendered.
        key: String,
    },

    /// The entity (edge, knowledge in progress, city on a cell...) is already present.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The routing table has no entry for the pair.
    #[error("no route from {src} to {dst}")]
    NoRoute {
        /// Source cell.
        src: Id,
        /// Destination cell.
        dst: Id,
    },

    /// The cost exceeds the available stock.
    #[error("insufficient resources")]
    InsufficientResources,

    /// The actor does not control the target.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// A prerequisite or mutual-exclusion rule is violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A structural invariant is broken. Fatal when raised at load time.
    #[error("consistency check failed: {0}")]
    Consistency(String),

    /// Underlying I/O failure in the persistence layer.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed persisted record.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for [`Error::NotFound`].
    pub fn not_found(kind: &'static str, key: impl std::fmt::Display) -> Self {
        Self::NotFound {
            kind,
            key: key.to_string(),
        }
    }

    /// Shorthand for [`Error::Consistency`].
    pub fn consistency(message: impl Into<String>) -> Self {
        Self::Consistency(message.into())
    }
}

/// Result alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
