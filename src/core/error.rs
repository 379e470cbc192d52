//! Error types for pool operations.

use thiserror::Error;

/// Errors produced by the pool and its allocs.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Admission refused: free capacity, after reclaiming expired allocs,
    /// still cannot cover the request.
    #[error("offer expired")]
    OfferExpired,
    /// Operation against an alloc that is no longer registered under its id.
    #[error("alloc {0} expired")]
    AllocExpired(String),
    /// Lookup of an unknown id.
    #[error("{kind} {id}: does not exist")]
    NotExist {
        /// What was looked up ("offer" or "alloc").
        kind: &'static str,
        /// The id that was not found.
        id: String,
    },
    /// The pool has been stopped and accepts no further work.
    #[error("shutting down")]
    ShuttingDown,
    /// Filesystem failure, surfaced verbatim.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// State or metadata (de)serialization failure.
    #[error("state encoding: {0}")]
    State(#[from] serde_json::Error),
    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// Container daemon failure with context.
    #[error("runtime: {0}")]
    Runtime(String),
}

impl PoolError {
    /// Whether the error denotes something that does not (or no longer)
    /// exists: unknown ids, expired offers, and expired allocs.
    pub fn is_not_exist(&self) -> bool {
        matches!(
            self,
            Self::OfferExpired | Self::AllocExpired(_) | Self::NotExist { .. }
        )
    }

    /// Whether the error is a missing-file I/O error.
    pub(crate) fn is_not_found(&self) -> bool {
        matches!(self, Self::Io(err) if err.kind() == std::io::ErrorKind::NotFound)
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
