//! Document contract and shared document handles.
//!
//! A document is the single logical entity kept coherent across the
//! storage tiers. Documents cross the manager boundary as
//! [`SharedDocument`] handles so that "is this the live cached object"
//! can be answered by pointer identity instead of incidental object
//! comparison.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};

/// Contract for types that can be synchronized across tiers.
///
/// # Implementation Requirements
///
/// - `version()` must return the token assigned by the last committed
///   update, or `None` for a document that has never been saved
/// - `set_version()` must store the token verbatim; it is opaque and
///   never parsed
/// - Implementations must be `Clone`, `Default`, `Serialize`, and
///   `DeserializeOwned` so they can cross the byte-oriented network
///   tier and be synthesized on a miss
/// - Implementations must be `Send + Sync + 'static` for async
///   compatibility
pub trait Document:
    Clone + Default + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Get the current version token, if the document has been saved.
    fn version(&self) -> Option<&str>;

    /// Replace the version token.
    fn set_version(&mut self, version: Option<String>);
}

/// Shared handle to a document published in or resolved from the caches.
///
/// The local cache publishes one `SharedDocument` per payload key, and
/// every read within an operation scope observes the same handle. The
/// manager compares handles with [`SharedDocument::same_instance`] to
/// reject mutation of a live cached instance, the core invariant that
/// keeps the local tier race-free without locking.
pub struct SharedDocument<D>(Arc<D>);

impl<D> SharedDocument<D> {
    /// Wrap an owned document in a fresh handle.
    pub fn new(document: D) -> Self {
        Self(Arc::new(document))
    }

    /// Whether two handles refer to the identical in-memory instance.
    pub fn same_instance(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}

impl<D: Clone> SharedDocument<D> {
    /// Mutable access to the document, cloning if the handle is shared.
    pub fn make_mut(&mut self) -> &mut D {
        Arc::make_mut(&mut self.0)
    }

    /// Unwrap into an owned document, cloning if the handle is shared.
    pub fn into_inner(self) -> D {
        Arc::unwrap_or_clone(self.0)
    }
}

impl<D> Clone for SharedDocument<D> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<D> Deref for SharedDocument<D> {
    type Target = D;

    fn deref(&self) -> &D {
        &self.0
    }
}

impl<D> From<D> for SharedDocument<D> {
    fn from(document: D) -> Self {
        Self::new(document)
    }
}

impl<D: fmt::Debug> fmt::Debug for SharedDocument<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SharedDocument").field(&self.0).finish()
    }
}

impl<D: PartialEq> PartialEq for SharedDocument<D> {
    fn eq(&self, other: &Self) -> bool {
        *self.0 == *other.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Memo {
        body: String,
        version: Option<String>,
    }

    impl Document for Memo {
        fn version(&self) -> Option<&str> {
            self.version.as_deref()
        }

        fn set_version(&mut self, version: Option<String>) {
            self.version = version;
        }
    }

    #[test]
    fn test_same_instance_tracks_identity_not_equality() {
        let memo = Memo {
            body: "hello".to_string(),
            version: None,
        };
        let a = SharedDocument::new(memo.clone());
        let b = a.clone();
        let c = SharedDocument::new(memo);

        assert!(SharedDocument::same_instance(&a, &b));
        assert!(!SharedDocument::same_instance(&a, &c));
        // Equal content, distinct instances.
        assert_eq!(a, c);
    }

    #[test]
    fn test_make_mut_detaches_shared_handle() {
        let mut a = SharedDocument::new(Memo {
            body: "original".to_string(),
            version: Some("v1".to_string()),
        });
        let b = a.clone();

        a.make_mut().body = "edited".to_string();

        assert_eq!(a.body, "edited");
        assert_eq!(b.body, "original");
        assert!(!SharedDocument::same_instance(&a, &b));
    }

    #[test]
    fn test_into_inner_returns_document() {
        let handle = SharedDocument::new(Memo {
            body: "owned".to_string(),
            version: None,
        });
        let memo = handle.into_inner();
        assert_eq!(memo.body, "owned");
    }
}
