//! In-memory tier implementations.
//!
//! These back single-node deployments and tests. The network cache
//! stand-in covers both capability-flag behaviors: `shared()` acts like
//! a real external cache, `standalone()` like the in-process
//! pass-through whose payload bytes never leave the process.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use docsync_core::{CacheExpiry, DocSyncResult, Document, SharedDocument, StoreError};

use crate::tiers::{
    AfterWrite, DocumentFactory, DocumentStore, LocalCache, NetworkCache, StoreRead,
};

// ============================================================================
// NETWORK CACHE
// ============================================================================

#[derive(Debug, Clone)]
struct NetworkEntry {
    bytes: Vec<u8>,
    expiry: CacheExpiry,
    deadline: Option<DateTime<Utc>>,
}

impl NetworkEntry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.deadline.map_or(true, |d| now < d)
    }
}

/// In-memory byte cache implementing the network tier contract.
#[derive(Debug)]
pub struct InMemoryNetworkCache {
    distributed: bool,
    entries: tokio::sync::RwLock<HashMap<String, NetworkEntry>>,
}

impl InMemoryNetworkCache {
    /// Behave like a real external cache shared between processes.
    pub fn shared() -> Self {
        Self {
            distributed: true,
            entries: tokio::sync::RwLock::new(HashMap::new()),
        }
    }

    /// Behave like the single-node in-process stand-in.
    pub fn standalone() -> Self {
        Self {
            distributed: false,
            entries: tokio::sync::RwLock::new(HashMap::new()),
        }
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = Utc::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|e| e.is_live(now))
            .count()
    }

    /// True if no live entries remain.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl NetworkCache for InMemoryNetworkCache {
    fn is_distributed(&self) -> bool {
        self.distributed
    }

    async fn get_bytes(&self, key: &str) -> DocSyncResult<Option<Vec<u8>>> {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        match entries.get_mut(key) {
            Some(entry) if entry.is_live(now) => {
                if entry.expiry.sliding.is_some() {
                    entry.deadline = entry.expiry.deadline_from(now);
                }
                Ok(Some(entry.bytes.clone()))
            }
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_bytes(
        &self,
        key: &str,
        bytes: Vec<u8>,
        expiry: &CacheExpiry,
    ) -> DocSyncResult<()> {
        let entry = NetworkEntry {
            bytes,
            expiry: *expiry,
            deadline: expiry.deadline_from(Utc::now()),
        };
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn remove(&self, key: &str) -> DocSyncResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn refresh(&self, key: &str) -> DocSyncResult<()> {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(key) {
            if entry.is_live(now) && entry.expiry.sliding.is_some() {
                entry.deadline = entry.expiry.deadline_from(now);
            }
        }
        Ok(())
    }
}

// ============================================================================
// LOCAL CACHE
// ============================================================================

struct LocalEntry<D> {
    document: SharedDocument<D>,
    expiry: CacheExpiry,
    deadline: Option<DateTime<Utc>>,
}

/// In-memory object cache implementing the local tier contract.
pub struct InMemoryLocalCache<D> {
    entries: Mutex<HashMap<String, LocalEntry<D>>>,
}

impl<D> InMemoryLocalCache<D> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Drop an entry; used by tests to simulate local eviction.
    pub fn evict(&self, key: &str) {
        self.entries.lock().unwrap().remove(key);
    }
}

impl<D> Default for InMemoryLocalCache<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Document> LocalCache<D> for InMemoryLocalCache<D> {
    fn get(&self, key: &str) -> Option<SharedDocument<D>> {
        let now = Utc::now();
        let mut entries = self.entries.lock().unwrap();
        match entries.get_mut(key) {
            Some(entry) if entry.deadline.map_or(true, |d| now < d) => {
                if entry.expiry.sliding.is_some() {
                    entry.deadline = entry.expiry.deadline_from(now);
                }
                Some(entry.document.clone())
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn set(&self, key: &str, document: SharedDocument<D>, expiry: &CacheExpiry) {
        let entry = LocalEntry {
            document,
            expiry: *expiry,
            deadline: expiry.deadline_from(Utc::now()),
        };
        self.entries.lock().unwrap().insert(key.to_string(), entry);
    }
}

// ============================================================================
// DOCUMENT STORE
// ============================================================================

struct StoreState<D> {
    committed: Option<SharedDocument<D>>,
    /// Committed version observed at the most recent `get_mutable`.
    /// An enforced update conflicts when the committed version has
    /// moved past this baseline.
    checkout_baseline: Option<Option<String>>,
}

impl<D> Default for StoreState<D> {
    fn default() -> Self {
        Self {
            committed: None,
            checkout_baseline: None,
        }
    }
}

/// Single-slot in-memory document store with optimistic concurrency.
pub struct InMemoryDocumentStore<D> {
    state: tokio::sync::RwLock<StoreState<D>>,
}

impl<D: Document> InMemoryDocumentStore<D> {
    pub fn new() -> Self {
        Self {
            state: tokio::sync::RwLock::new(StoreState::default()),
        }
    }

    /// Commit a document directly, bypassing callbacks; for tests and
    /// for simulating another process's write.
    pub async fn seed(&self, document: D) {
        self.state.write().await.committed = Some(SharedDocument::new(document));
    }

    /// The currently committed snapshot.
    pub async fn committed(&self) -> Option<SharedDocument<D>> {
        self.state.read().await.committed.clone()
    }
}

impl<D: Document> Default for InMemoryDocumentStore<D> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<D: Document> DocumentStore<D> for InMemoryDocumentStore<D> {
    async fn get_mutable(
        &self,
        factory: Option<DocumentFactory<D>>,
    ) -> DocSyncResult<SharedDocument<D>> {
        let mut state = self.state.write().await;
        match &state.committed {
            Some(committed) => {
                let baseline = committed.version().map(str::to_string);
                // Always a fresh handle, never the committed instance.
                let checkout = SharedDocument::new((**committed).clone());
                state.checkout_baseline = Some(baseline);
                Ok(checkout)
            }
            None => {
                state.checkout_baseline = Some(None);
                let document = factory.map(|f| f()).unwrap_or_default();
                Ok(SharedDocument::new(document))
            }
        }
    }

    async fn get_immutable(
        &self,
        factory: Option<DocumentFactory<D>>,
    ) -> DocSyncResult<StoreRead<D>> {
        let state = self.state.read().await;
        match &state.committed {
            Some(committed) => Ok(StoreRead::cacheable(committed.clone())),
            None => {
                let document = factory.map(|f| f()).unwrap_or_default();
                Ok(StoreRead::transient(SharedDocument::new(document)))
            }
        }
    }

    async fn update(
        &self,
        document: SharedDocument<D>,
        enforce_concurrency: bool,
        after_write: AfterWrite<D>,
    ) -> DocSyncResult<()> {
        {
            let mut state = self.state.write().await;
            if enforce_concurrency {
                if let Some(baseline) = &state.checkout_baseline {
                    let committed = state
                        .committed
                        .as_ref()
                        .and_then(|d| d.version().map(str::to_string));
                    if committed != *baseline {
                        return Err(StoreError::ConcurrencyConflict {
                            baseline: baseline.clone(),
                            committed,
                        }
                        .into());
                    }
                }
            }
            state.committed = Some(document.clone());
        }
        // Lock released: the callback may read the store again.
        after_write(document).await
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use docsync_core::DocSyncError;
    use docsync_test_utils::{note, versioned_note, NoteDocument};
    use std::sync::Arc;
    use std::time::Duration;

    fn no_op_after_write() -> AfterWrite<NoteDocument> {
        Box::new(|_| Box::pin(async { Ok(()) }))
    }

    #[tokio::test]
    async fn test_network_cache_set_get_remove() {
        let cache = InMemoryNetworkCache::shared();
        let expiry = CacheExpiry::never();

        cache.set_bytes("k", b"v".to_vec(), &expiry).await.unwrap();
        assert_eq!(cache.get_bytes("k").await.unwrap(), Some(b"v".to_vec()));

        cache.remove("k").await.unwrap();
        assert_eq!(cache.get_bytes("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_network_cache_absolute_expiration() {
        let cache = InMemoryNetworkCache::shared();
        let expiry = CacheExpiry {
            absolute_at: Some(Utc::now() - chrono::Duration::seconds(1)),
            sliding: None,
        };

        cache.set_bytes("k", b"v".to_vec(), &expiry).await.unwrap();
        assert_eq!(cache.get_bytes("k").await.unwrap(), None);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_network_cache_refresh_extends_sliding_deadline() {
        let cache = InMemoryNetworkCache::shared();
        let expiry = CacheExpiry {
            absolute_at: None,
            sliding: Some(Duration::from_secs(60)),
        };

        cache.set_bytes("k", b"v".to_vec(), &expiry).await.unwrap();
        let before = cache.entries.read().await.get("k").unwrap().deadline;

        tokio::time::sleep(Duration::from_millis(10)).await;
        cache.refresh("k").await.unwrap();
        let after = cache.entries.read().await.get("k").unwrap().deadline;

        assert!(after > before);
    }

    #[tokio::test]
    async fn test_network_cache_capability_flag() {
        assert!(InMemoryNetworkCache::shared().is_distributed());
        assert!(!InMemoryNetworkCache::standalone().is_distributed());
    }

    #[test]
    fn test_local_cache_returns_same_handle() {
        let cache = InMemoryLocalCache::new();
        let doc = SharedDocument::new(note("body"));

        cache.set("k", doc.clone(), &CacheExpiry::never());
        let got = cache.get("k").unwrap();

        assert!(SharedDocument::same_instance(&got, &doc));
    }

    #[test]
    fn test_local_cache_expired_entry_is_absent() {
        let cache = InMemoryLocalCache::new();
        let expiry = CacheExpiry {
            absolute_at: Some(Utc::now() - chrono::Duration::seconds(1)),
            sliding: None,
        };

        cache.set("k", SharedDocument::new(note("body")), &expiry);
        assert!(cache.get("k").is_none());
    }

    #[tokio::test]
    async fn test_store_get_mutable_is_never_committed_instance() {
        let store = InMemoryDocumentStore::new();
        store.seed(versioned_note("body", "v1")).await;

        let committed = store.committed().await.unwrap();
        let checkout = store.get_mutable(None).await.unwrap();

        assert!(!SharedDocument::same_instance(&committed, &checkout));
        assert_eq!(checkout.version(), Some("v1"));
    }

    #[tokio::test]
    async fn test_store_empty_get_mutable_uses_factory() {
        let store: InMemoryDocumentStore<NoteDocument> = InMemoryDocumentStore::new();
        let factory: DocumentFactory<NoteDocument> = Arc::new(|| note("from factory"));

        let checkout = store.get_mutable(Some(factory)).await.unwrap();
        assert_eq!(checkout.body, "from factory");
    }

    #[tokio::test]
    async fn test_store_fallback_snapshot_is_not_cacheable() {
        let store: InMemoryDocumentStore<NoteDocument> = InMemoryDocumentStore::new();
        let factory: DocumentFactory<NoteDocument> = Arc::new(|| note("fresh"));

        let read = store.get_immutable(Some(factory)).await.unwrap();
        assert!(!read.cacheable);

        store.seed(versioned_note("body", "v1")).await;
        let read = store.get_immutable(None).await.unwrap();
        assert!(read.cacheable);
    }

    #[tokio::test]
    async fn test_store_enforced_update_conflicts_on_moved_version() {
        let store = InMemoryDocumentStore::new();
        store.seed(versioned_note("body", "v1")).await;

        // Two checkouts from the same baseline.
        let first = store.get_mutable(None).await.unwrap();
        let second = store.get_mutable(None).await.unwrap();

        let mut winner = first;
        winner.make_mut().set_version(Some("v2".to_string()));
        store
            .update(winner, true, no_op_after_write())
            .await
            .unwrap();

        let mut loser = second;
        loser.make_mut().set_version(Some("v3".to_string()));
        let result = store.update(loser, true, no_op_after_write()).await;

        assert!(matches!(
            result,
            Err(DocSyncError::Store(StoreError::ConcurrencyConflict { .. }))
        ));
    }

    #[tokio::test]
    async fn test_store_unenforced_update_ignores_race() {
        let store = InMemoryDocumentStore::new();
        store.seed(versioned_note("body", "v1")).await;

        let _first = store.get_mutable(None).await.unwrap();
        let second = store.get_mutable(None).await.unwrap();

        store
            .update(
                SharedDocument::new(versioned_note("other", "v2")),
                false,
                no_op_after_write(),
            )
            .await
            .unwrap();

        let mut stale = second;
        stale.make_mut().set_version(Some("v3".to_string()));
        store
            .update(stale, false, no_op_after_write())
            .await
            .unwrap();

        let committed = store.committed().await.unwrap();
        assert_eq!(committed.version(), Some("v3"));
    }

    #[tokio::test]
    async fn test_store_after_write_runs_on_commit() {
        let store = InMemoryDocumentStore::new();
        let seen: Arc<Mutex<Option<Option<String>>>> = Arc::new(Mutex::new(None));

        let sink = Arc::clone(&seen);
        let after: AfterWrite<NoteDocument> = Box::new(move |doc| {
            Box::pin(async move {
                *sink.lock().unwrap() = Some(doc.version().map(str::to_string));
                Ok(())
            })
        });

        store
            .update(SharedDocument::new(versioned_note("body", "v1")), false, after)
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), Some(Some("v1".to_string())));
    }
}
