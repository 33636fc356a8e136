//! Error types for docsync operations

use thiserror::Error;

/// Cache tier errors: network transport and payload codec failures.
///
/// These are propagated unchanged to the caller. There is no retry, no
/// circuit breaking, and no silent fallback to stale data anywhere in
/// this crate; callers needing resilience wrap the tier implementations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TierError {
    #[error("network cache transport failure on {key}: {reason}")]
    Transport { key: String, reason: String },

    #[error("failed to encode document payload: {reason}")]
    Encode { reason: String },

    #[error("corrupt payload under {key}: {reason}")]
    Decode { key: String, reason: String },
}

/// Durable store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Another writer committed first while concurrency enforcement was
    /// requested. Surfaced unchanged; the caller decides what to do.
    #[error("concurrent update conflict: committed version {committed:?} does not match checkout baseline {baseline:?}")]
    ConcurrencyConflict {
        baseline: Option<String>,
        committed: Option<String>,
    },

    #[error("store backend failure: {reason}")]
    Backend { reason: String },
}

/// Master error type for all docsync operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DocSyncError {
    /// The caller attempted to mutate the instance currently published
    /// in the local cache. Always a usage bug, never transient.
    #[error("a cached read-only instance must not be used for mutation")]
    CachedInstanceMutation,

    #[error("cache tier error: {0}")]
    Tier(#[from] TierError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type alias for docsync operations.
pub type DocSyncResult<T> = Result<T, DocSyncError>;

// =============================================================================
// TESTS
// =============================================================================
