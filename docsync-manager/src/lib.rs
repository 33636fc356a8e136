//! docsync Manager - Tiered Document Coherency
//!
//! Keeps one logical document consistent across a durable store, a
//! shared network cache, and a process-local cache. The network
//! identifier key fences staleness; the core contracts live in
//! docsync-core.

pub mod codec;
pub mod manager;
pub mod memory;
pub mod tiers;

pub use codec::JsonDocumentCodec;
pub use manager::{CoherenceStats, DocumentManager};

// Re-export the in-memory tiers for single-node deployments and tests
pub use memory::{InMemoryDocumentStore, InMemoryLocalCache, InMemoryNetworkCache};

// Re-export the tier contracts for external backends
pub use tiers::{
    AfterWrite, DocumentCodec, DocumentFactory, DocumentStore, LocalCache, NetworkCache, StoreRead,
};
