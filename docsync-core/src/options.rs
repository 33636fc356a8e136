//! Per-document cache configuration.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Configuration for one document type's cache entries.
///
/// The payload key addresses the serialized document in both cache
/// tiers; the identifier key addresses its version token in the network
/// cache only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentCacheOptions {
    /// Network/local cache key for the serialized document.
    pub payload_key: String,
    /// Network cache key for the current version identifier.
    pub identifier_key: String,
    /// Entries expire at this wall-clock instant.
    pub absolute_expiration: Option<DateTime<Utc>>,
    /// Entries expire this long after being written.
    pub absolute_expiration_relative_to_now: Option<Duration>,
    /// Entries expire this long after their last access.
    pub sliding_expiration: Option<Duration>,
    /// Ask the store to detect concurrent modification on update.
    pub enforce_concurrency_on_update: bool,
    /// Re-read the store after a write-through and invalidate the
    /// identifier key if a newer revision was committed meanwhile.
    pub check_consistency_after_write: bool,
}

impl DocumentCacheOptions {
    /// Create options with the given cache keys and no expiration.
    pub fn new(payload_key: impl Into<String>, identifier_key: impl Into<String>) -> Self {
        Self {
            payload_key: payload_key.into(),
            identifier_key: identifier_key.into(),
            absolute_expiration: None,
            absolute_expiration_relative_to_now: None,
            sliding_expiration: None,
            enforce_concurrency_on_update: false,
            check_consistency_after_write: false,
        }
    }

    /// Set an absolute wall-clock expiration.
    pub fn with_absolute_expiration(mut self, at: DateTime<Utc>) -> Self {
        self.absolute_expiration = Some(at);
        self
    }

    /// Set an absolute expiration relative to write time.
    pub fn with_absolute_expiration_relative_to_now(mut self, after: Duration) -> Self {
        self.absolute_expiration_relative_to_now = Some(after);
        self
    }

    /// Set a sliding expiration.
    pub fn with_sliding_expiration(mut self, window: Duration) -> Self {
        self.sliding_expiration = Some(window);
        self
    }

    /// Enable or disable optimistic-concurrency enforcement on update.
    pub fn with_enforced_concurrency(mut self, enforce: bool) -> Self {
        self.enforce_concurrency_on_update = enforce;
        self
    }

    /// Enable or disable the post-write consistency re-check.
    pub fn with_consistency_check(mut self, check: bool) -> Self {
        self.check_consistency_after_write = check;
        self
    }

    /// Resolve the expiration policy for entries written now.
    pub fn expiry(&self) -> CacheExpiry {
        let absolute_at = self.absolute_expiration.or_else(|| {
            self.absolute_expiration_relative_to_now
                .and_then(|after| slide(Utc::now(), after))
        });
        CacheExpiry {
            absolute_at,
            sliding: self.sliding_expiration,
        }
    }
}

/// Resolved expiration policy handed to the cache tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheExpiry {
    /// Hard deadline regardless of access.
    pub absolute_at: Option<DateTime<Utc>>,
    /// Window extended on each access.
    pub sliding: Option<Duration>,
}

impl CacheExpiry {
    /// An expiry that never evicts.
    pub fn never() -> Self {
        Self::default()
    }

    /// Deadline for an entry last touched at `now`.
    ///
    /// The sliding window never extends past the absolute deadline.
    pub fn deadline_from(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let slid = self.sliding.and_then(|window| slide(now, window));
        match (slid, self.absolute_at) {
            (Some(s), Some(a)) => Some(s.min(a)),
            (s, a) => s.or(a),
        }
    }
}

fn slide(from: DateTime<Utc>, by: Duration) -> Option<DateTime<Utc>> {
    chrono::Duration::from_std(by)
        .ok()
        .and_then(|d| from.checked_add_signed(d))
}
