//! Learnboard error types

use thiserror::Error;

use crate::identity::AuthError;

/// Learnboard error type
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Authentication error (shown inline to the user)
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Document store error
    #[error("Store error: {0}")]
    Store(String),

    /// Referenced document does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Cluster delete stopped after some resource deletions failed.
    /// The cluster document is left in place so the call can be repeated.
    #[error("Cascade delete of cluster {cluster_id} incomplete: {remaining} resource(s) left")]
    CascadeIncomplete { cluster_id: String, remaining: usize },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for Learnboard operations
pub type Result<T> = std::result::Result<T, Error>;
