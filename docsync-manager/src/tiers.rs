//! Tier contracts.
//!
//! The manager composes three collaborators it does not own (a durable
//! store, a shared network cache, and a process-local cache) plus the
//! codec that moves documents in and out of the network tier's
//! byte-oriented storage. Each is a seam; the in-memory implementations
//! in [`crate::memory`] serve single-node deployments and tests.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;

use docsync_core::{CacheExpiry, DocSyncResult, Document, SharedDocument};

/// Fallback used to synthesize a document on a miss.
pub type DocumentFactory<D> = Arc<dyn Fn() -> D + Send + Sync>;

/// Callback invoked by the store once a write is durably committed.
pub type AfterWrite<D> =
    Box<dyn FnOnce(SharedDocument<D>) -> BoxFuture<'static, DocSyncResult<()>> + Send>;

/// An immutable snapshot read from the store.
#[derive(Debug, Clone)]
pub struct StoreRead<D> {
    /// The snapshot.
    pub document: SharedDocument<D>,
    /// Whether the snapshot is safe to publish into the cache tiers.
    ///
    /// A document synthesized by a miss fallback inside the store has
    /// not been committed and must not be cached.
    pub cacheable: bool,
}

impl<D> StoreRead<D> {
    /// A committed snapshot, safe to cache.
    pub fn cacheable(document: SharedDocument<D>) -> Self {
        Self {
            document,
            cacheable: true,
        }
    }

    /// A synthesized document that must not be cached.
    pub fn transient(document: SharedDocument<D>) -> Self {
        Self {
            document,
            cacheable: false,
        }
    }
}

/// The authoritative persistence layer.
///
/// Persistence and transaction mechanics are the implementation's
/// concern; the manager only requests concurrency enforcement and
/// supplies the callback to run after commit. Conflict detection under
/// `enforce_concurrency` is signaled with
/// [`StoreError::ConcurrencyConflict`](docsync_core::StoreError).
#[async_trait]
pub trait DocumentStore<D: Document>: Send + Sync {
    /// Get a document intended for in-place editing.
    ///
    /// The returned handle must never be the instance a previous
    /// [`get_immutable`](DocumentStore::get_immutable) published.
    async fn get_mutable(
        &self,
        factory: Option<DocumentFactory<D>>,
    ) -> DocSyncResult<SharedDocument<D>>;

    /// Get an immutable snapshot and its cacheability verdict.
    async fn get_immutable(
        &self,
        factory: Option<DocumentFactory<D>>,
    ) -> DocSyncResult<StoreRead<D>>;

    /// Commit an updated document, then run `after_write`.
    ///
    /// `after_write` must be invoked only once the document is durably
    /// committed, never on a failed or conflicted write.
    async fn update(
        &self,
        document: SharedDocument<D>,
        enforce_concurrency: bool,
        after_write: AfterWrite<D>,
    ) -> DocSyncResult<()>;
}

/// Byte-oriented key/value cache shared across nodes.
#[async_trait]
pub trait NetworkCache: Send + Sync {
    /// Whether this is a real external cache shared between processes.
    ///
    /// An in-process stand-in returns `false`, and the resolver then
    /// skips the payload fetch: payload bytes cannot outlive the
    /// process, so only the identifier key is meaningful.
    fn is_distributed(&self) -> bool;

    /// Read the raw value under a key.
    async fn get_bytes(&self, key: &str) -> DocSyncResult<Option<Vec<u8>>>;

    /// Write a value with the given expiration policy.
    async fn set_bytes(&self, key: &str, bytes: Vec<u8>, expiry: &CacheExpiry)
        -> DocSyncResult<()>;

    /// Remove a key.
    async fn remove(&self, key: &str) -> DocSyncResult<()>;

    /// Extend a key's sliding expiration without reading it.
    async fn refresh(&self, key: &str) -> DocSyncResult<()>;
}

/// Per-process in-memory object cache.
///
/// Access is synchronous and never suspends; every other tier access is
/// a suspension point.
pub trait LocalCache<D: Document>: Send + Sync {
    /// Get the published document under a key, if present and live.
    fn get(&self, key: &str) -> Option<SharedDocument<D>>;

    /// Publish a document under a key.
    fn set(&self, key: &str, document: SharedDocument<D>, expiry: &CacheExpiry);
}

/// Codec for moving documents across the network tier.
///
/// Must round-trip the version identifier exactly.
pub trait DocumentCodec<D: Document>: Send + Sync {
    /// Serialize a document to bytes.
    fn encode(&self, document: &D) -> DocSyncResult<Vec<u8>>;

    /// Deserialize a document; `key` provides error context.
    fn decode(&self, bytes: &[u8], key: &str) -> DocSyncResult<D>;
}
