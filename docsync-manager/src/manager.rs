//! The document manager: coherent reads and writes across three tiers.
//!
//! Reads resolve scoped cell -> identifier-validated local cache ->
//! network payload -> store; writes go to the store (or, in volatile
//! mode, to the caches after commit) and then refresh both cache tiers.
//! The identifier key in the network cache is the sole staleness fence;
//! payload and identifier are never trusted independently.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use docsync_core::{
    decode_token, encode_token, mint_token, DocSyncError, DocSyncResult, Document,
    DocumentCacheOptions, OperationScope, SharedDocument,
};

use crate::tiers::{
    AfterWrite, DocumentCodec, DocumentFactory, DocumentStore, LocalCache, NetworkCache, StoreRead,
};

// ============================================================================
// STATS
// ============================================================================

/// Counters for the tiered read path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoherenceStats {
    /// Reads satisfied by the operation scope, no I/O.
    pub scope_hits: u64,
    /// Reads satisfied by the local cache after identifier validation.
    pub local_hits: u64,
    /// Reads satisfied by decoding the network payload.
    pub network_hits: u64,
    /// Reads that fell through to the caller's fallback or the store.
    pub misses: u64,
    /// Payloads rejected because their identifier no longer matched.
    pub stale_rejections: u64,
    /// Identifier keys removed by the post-write consistency re-check.
    pub consistency_invalidations: u64,
}

impl CoherenceStats {
    /// Fraction of reads answered by any cache tier (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let hits = self.scope_hits + self.local_hits + self.network_hits;
        let total = hits + self.misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
struct StatCounters {
    scope_hits: AtomicU64,
    local_hits: AtomicU64,
    network_hits: AtomicU64,
    misses: AtomicU64,
    stale_rejections: AtomicU64,
    consistency_invalidations: AtomicU64,
}

impl StatCounters {
    fn snapshot(&self) -> CoherenceStats {
        CoherenceStats {
            scope_hits: self.scope_hits.load(Ordering::Relaxed),
            local_hits: self.local_hits.load(Ordering::Relaxed),
            network_hits: self.network_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stale_rejections: self.stale_rejections.load(Ordering::Relaxed),
            consistency_invalidations: self.consistency_invalidations.load(Ordering::Relaxed),
        }
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

// ============================================================================
// TIER SET: RESOLVER AND WRITE-THROUGH
// ============================================================================

/// The cache tiers and codec shared by both mode policies.
struct TierSet<D: Document> {
    network: Arc<dyn NetworkCache>,
    local: Arc<dyn LocalCache<D>>,
    codec: Arc<dyn DocumentCodec<D>>,
    options: DocumentCacheOptions,
    stats: StatCounters,
}

impl<D: Document> TierSet<D> {
    /// Resolve a read through the tiers, remembering a hit in the scope.
    async fn resolve(
        &self,
        scope: &OperationScope<D>,
    ) -> DocSyncResult<Option<SharedDocument<D>>> {
        if let Some(document) = scope.resolved() {
            bump(&self.stats.scope_hits);
            return Ok(Some(document));
        }
        let Some(document) = self.resolve_tiers().await? else {
            return Ok(None);
        };
        scope.set_resolved(document.clone());
        Ok(Some(document))
    }

    /// Resolve against the cache tiers alone (no operation scope).
    ///
    /// The identifier key is read first: absent means nothing is
    /// published. The local cache counts only when its document carries
    /// the published identifier; otherwise the payload is fetched,
    /// decoded, and cross-checked against the identifier read before
    /// it, so a racing overwrite yields a miss rather than a mismatched
    /// pair.
    async fn resolve_tiers(&self) -> DocSyncResult<Option<SharedDocument<D>>> {
        let identifier_key = &self.options.identifier_key;
        let payload_key = &self.options.payload_key;

        let Some(id_bytes) = self.network.get_bytes(identifier_key).await? else {
            debug!(key = %identifier_key, "no published identifier, cache miss");
            bump(&self.stats.misses);
            return Ok(None);
        };
        let published = decode_token(&id_bytes, identifier_key)?;

        if let Some(local) = self.local.get(payload_key) {
            if local.version() == published.as_deref() {
                if self.network.is_distributed() && self.options.sliding_expiration.is_some() {
                    self.network.refresh(payload_key).await?;
                }
                debug!(key = %payload_key, "local cache hit");
                bump(&self.stats.local_hits);
                return Ok(Some(local));
            }
        }

        if !self.network.is_distributed() {
            // Payload bytes never left this process; nothing further to check.
            bump(&self.stats.misses);
            return Ok(None);
        }

        let Some(payload) = self.network.get_bytes(payload_key).await? else {
            bump(&self.stats.misses);
            return Ok(None);
        };
        let decoded = self.codec.decode(&payload, payload_key)?;
        if decoded.version() != published.as_deref() {
            // The identifier was overwritten after the payload fetch;
            // safer to miss than to serve a mismatched pair.
            debug!(
                key = %payload_key,
                payload_version = ?decoded.version(),
                published = ?published,
                "stale payload rejected"
            );
            bump(&self.stats.stale_rejections);
            bump(&self.stats.misses);
            return Ok(None);
        }

        let document = SharedDocument::new(decoded);
        self.local
            .set(payload_key, document.clone(), &self.options.expiry());
        debug!(key = %payload_key, "network cache hit");
        bump(&self.stats.network_hits);
        Ok(Some(document))
    }

    /// Publish a document into both cache tiers.
    ///
    /// With `check_consistency_after_write` set and a store available,
    /// the store snapshot is re-read afterwards; a different identifier
    /// means another process committed meanwhile, and the identifier
    /// key is removed so every reader reloads through the store.
    async fn write_through(
        &self,
        store: Option<&dyn DocumentStore<D>>,
        document: &SharedDocument<D>,
    ) -> DocSyncResult<()> {
        let expiry = self.options.expiry();
        let payload = self.codec.encode(document)?;

        self.network
            .set_bytes(&self.options.payload_key, payload, &expiry)
            .await?;
        self.network
            .set_bytes(
                &self.options.identifier_key,
                encode_token(document.version()),
                &expiry,
            )
            .await?;
        self.local
            .set(&self.options.payload_key, document.clone(), &expiry);
        debug!(
            key = %self.options.payload_key,
            version = ?document.version(),
            "document written through"
        );

        if self.options.check_consistency_after_write {
            if let Some(store) = store {
                let snapshot = store.get_immutable(None).await?;
                if snapshot.document.version() != document.version() {
                    debug!(
                        key = %self.options.identifier_key,
                        published = ?document.version(),
                        committed = ?snapshot.document.version(),
                        "newer revision committed during write-through, invalidating identifier"
                    );
                    bump(&self.stats.consistency_invalidations);
                    self.network.remove(&self.options.identifier_key).await?;
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// MODE POLICIES
// ============================================================================

/// One mode's resolver/writer behavior, selected at construction.
#[async_trait]
trait ModePolicy<D: Document>: Send + Sync {
    async fn acquire_mutable(
        &self,
        tiers: &Arc<TierSet<D>>,
        scope: &OperationScope<D>,
        factory: Option<DocumentFactory<D>>,
    ) -> DocSyncResult<SharedDocument<D>>;

    async fn load_on_miss(
        &self,
        factory: Option<DocumentFactory<D>>,
    ) -> DocSyncResult<StoreRead<D>>;

    async fn commit_update(
        &self,
        tiers: &Arc<TierSet<D>>,
        scope: &OperationScope<D>,
        document: SharedDocument<D>,
    ) -> DocSyncResult<()>;

    /// Store consulted by the post-write consistency re-check.
    fn recheck_store(&self) -> Option<&dyn DocumentStore<D>>;
}

/// Durable mode: the store is authoritative.
struct DurablePolicy<D: Document> {
    store: Arc<dyn DocumentStore<D>>,
}

#[async_trait]
impl<D: Document> ModePolicy<D> for DurablePolicy<D> {
    async fn acquire_mutable(
        &self,
        tiers: &Arc<TierSet<D>>,
        _scope: &OperationScope<D>,
        factory: Option<DocumentFactory<D>>,
    ) -> DocSyncResult<SharedDocument<D>> {
        let mut checkout = self.store.get_mutable(factory).await?;
        if let Some(published) = tiers.local.get(&tiers.options.payload_key) {
            if SharedDocument::same_instance(&checkout, &published) {
                return Err(DocSyncError::CachedInstanceMutation);
            }
        }
        checkout.make_mut().set_version(None);
        Ok(checkout)
    }

    async fn load_on_miss(
        &self,
        factory: Option<DocumentFactory<D>>,
    ) -> DocSyncResult<StoreRead<D>> {
        self.store.get_immutable(factory).await
    }

    async fn commit_update(
        &self,
        tiers: &Arc<TierSet<D>>,
        _scope: &OperationScope<D>,
        document: SharedDocument<D>,
    ) -> DocSyncResult<()> {
        let enforce = tiers.options.enforce_concurrency_on_update;
        let write_tiers = Arc::clone(tiers);
        let recheck = Arc::clone(&self.store);
        let after_write: AfterWrite<D> = Box::new(move |committed| {
            Box::pin(async move {
                write_tiers
                    .write_through(Some(recheck.as_ref()), &committed)
                    .await
            })
        });
        self.store.update(document, enforce, after_write).await
    }

    fn recheck_store(&self) -> Option<&dyn DocumentStore<D>> {
        Some(self.store.as_ref())
    }
}

/// Volatile mode: the cache tiers are the only storage.
struct VolatilePolicy;

#[async_trait]
impl<D: Document> ModePolicy<D> for VolatilePolicy {
    async fn acquire_mutable(
        &self,
        tiers: &Arc<TierSet<D>>,
        scope: &OperationScope<D>,
        factory: Option<DocumentFactory<D>>,
    ) -> DocSyncResult<SharedDocument<D>> {
        if let Some(mut existing) = scope.volatile_document() {
            existing.make_mut().set_version(None);
            scope.set_volatile(existing.clone());
            return Ok(existing);
        }
        // Network cache, then factory, then default construction.
        let document = match tiers.resolve_tiers().await? {
            Some(published) => published.into_inner(),
            None => factory.map(|f| f()).unwrap_or_default(),
        };
        let mut handle = SharedDocument::new(document);
        handle.make_mut().set_version(None);
        scope.set_volatile(handle.clone());
        Ok(handle)
    }

    async fn load_on_miss(
        &self,
        factory: Option<DocumentFactory<D>>,
    ) -> DocSyncResult<StoreRead<D>> {
        let document = factory.map(|f| f()).unwrap_or_default();
        Ok(StoreRead::cacheable(SharedDocument::new(document)))
    }

    async fn commit_update(
        &self,
        tiers: &Arc<TierSet<D>>,
        scope: &OperationScope<D>,
        document: SharedDocument<D>,
    ) -> DocSyncResult<()> {
        // Visible to later reads and mutations in this operation now;
        // published to the tiers only once the unit of work commits.
        scope.set_volatile(document.clone());
        scope.set_resolved(document.clone());

        let write_tiers = Arc::clone(tiers);
        scope.on_commit(Box::new(move || {
            Box::pin(async move { write_tiers.write_through(None, &document).await })
        }));
        Ok(())
    }

    fn recheck_store(&self) -> Option<&dyn DocumentStore<D>> {
        None
    }
}

// ============================================================================
// DOCUMENT MANAGER
// ============================================================================

/// Keeps one logical document coherent across the three storage tiers.
///
/// Constructed in one of two modes:
///
/// - [`durable`](DocumentManager::durable): a store is authoritative;
///   the caches accelerate reads and the identifier key fences
///   staleness across processes.
/// - [`volatile`](DocumentManager::volatile): the cache tiers are the
///   only storage; updates publish after the unit of work commits.
pub struct DocumentManager<D: Document> {
    tiers: Arc<TierSet<D>>,
    mode: Arc<dyn ModePolicy<D>>,
}

impl<D: Document> DocumentManager<D> {
    /// A manager backed by a durable store.
    pub fn durable(
        store: Arc<dyn DocumentStore<D>>,
        network: Arc<dyn NetworkCache>,
        local: Arc<dyn LocalCache<D>>,
        codec: Arc<dyn DocumentCodec<D>>,
        options: DocumentCacheOptions,
    ) -> Self {
        Self {
            tiers: Arc::new(TierSet {
                network,
                local,
                codec,
                options,
                stats: StatCounters::default(),
            }),
            mode: Arc::new(DurablePolicy { store }),
        }
    }

    /// A manager for a volatile document with no backing store.
    pub fn volatile(
        network: Arc<dyn NetworkCache>,
        local: Arc<dyn LocalCache<D>>,
        codec: Arc<dyn DocumentCodec<D>>,
        options: DocumentCacheOptions,
    ) -> Self {
        Self {
            tiers: Arc::new(TierSet {
                network,
                local,
                codec,
                options,
                stats: StatCounters::default(),
            }),
            mode: Arc::new(VolatilePolicy),
        }
    }

    /// The configuration this manager was built with.
    pub fn options(&self) -> &DocumentCacheOptions {
        &self.tiers.options
    }

    /// Snapshot of the read-path counters.
    pub fn stats(&self) -> CoherenceStats {
        self.tiers.stats.snapshot()
    }

    /// Get a document intended for in-place editing.
    ///
    /// The returned handle is never the instance published in the local
    /// cache, and its version identifier is cleared: it has not been
    /// saved under a new version yet. A store that hands back the live
    /// cached instance is a usage bug and fails with
    /// [`DocSyncError::CachedInstanceMutation`].
    pub async fn get_mutable(
        &self,
        scope: &OperationScope<D>,
        factory: Option<DocumentFactory<D>>,
    ) -> DocSyncResult<SharedDocument<D>> {
        self.mode.acquire_mutable(&self.tiers, scope, factory).await
    }

    /// Get the shared read-only document.
    ///
    /// Resolves through the tiers; on a miss the mode's source (store
    /// or factory) supplies the document, which is written through both
    /// cache tiers when cacheable. All calls within one operation scope
    /// return the identical instance.
    pub async fn get_immutable(
        &self,
        scope: &OperationScope<D>,
        factory: Option<DocumentFactory<D>>,
    ) -> DocSyncResult<SharedDocument<D>> {
        if let Some(document) = self.tiers.resolve(scope).await? {
            return Ok(document);
        }
        let read = self.mode.load_on_miss(factory).await?;
        if read.cacheable {
            self.tiers
                .write_through(self.mode.recheck_store(), &read.document)
                .await?;
        }
        scope.set_resolved(read.document.clone());
        Ok(read.document)
    }

    /// Commit an updated document.
    ///
    /// The document must be a distinct instance obtained via
    /// [`get_mutable`](DocumentManager::get_mutable); passing the live
    /// cached instance fails with
    /// [`DocSyncError::CachedInstanceMutation`]. A fresh version token
    /// is minted if none is set. Durable mode delegates to the store
    /// and publishes to the caches once the store commits; volatile
    /// mode publishes when the operation scope commits.
    pub async fn update(
        &self,
        scope: &OperationScope<D>,
        mut document: SharedDocument<D>,
    ) -> DocSyncResult<()> {
        if let Some(published) = self.tiers.local.get(&self.tiers.options.payload_key) {
            if SharedDocument::same_instance(&document, &published) {
                return Err(DocSyncError::CachedInstanceMutation);
            }
        }
        if document.version().is_none() {
            document.make_mut().set_version(Some(mint_token()));
        }
        self.mode.commit_update(&self.tiers, scope, document).await
    }
}

// ============================================================================
// TESTS
// ============================================================================
