//! docsync core - document contract and shared primitives
//!
//! Defines the document abstraction synchronized across storage tiers,
//! the version-token encoding used as the staleness fence, the error
//! taxonomy, per-document cache options, and the operation scope that
//! carries per-operation state and commit hooks.

pub mod document;
pub mod error;
pub mod options;
pub mod scope;
pub mod version;

pub use document::{Document, SharedDocument};
pub use error::{DocSyncError, DocSyncResult, StoreError, TierError};
pub use options::{CacheExpiry, DocumentCacheOptions};
pub use scope::{CommitHook, OperationScope};
pub use version::{decode_token, encode_token, mint_token, NULL_SENTINEL};
