//! Operation scope: per-operation cells and commit hooks.
//!
//! One `OperationScope` lives for one unit of work (a web request, a
//! job run). It guarantees that repeated reads observe the identical
//! document instance without re-hitting the network tier, and it owns
//! the list of side effects deferred until the unit of work commits.

use std::fmt;
use std::sync::Mutex;

use futures_util::future::BoxFuture;

use crate::document::SharedDocument;
use crate::error::DocSyncResult;

/// Deferred side effect run after a successful commit.
pub type CommitHook = Box<dyn FnOnce() -> BoxFuture<'static, DocSyncResult<()>> + Send>;

/// Per-operation state for the document manager.
///
/// The scoped cell holds the single document instance resolved for
/// read-only access this operation. The volatile cell is the sole
/// mutable reference point in volatile mode, where no durable store
/// exists. Commit hooks run in registration order on [`commit`] and are
/// discarded, never run, on [`rollback`].
///
/// [`commit`]: OperationScope::commit
/// [`rollback`]: OperationScope::rollback
pub struct OperationScope<D> {
    resolved: Mutex<Option<SharedDocument<D>>>,
    volatile: Mutex<Option<SharedDocument<D>>>,
    commit_hooks: Mutex<Vec<CommitHook>>,
}

impl<D> OperationScope<D> {
    /// Create an empty scope for a new unit of work.
    pub fn new() -> Self {
        Self {
            resolved: Mutex::new(None),
            volatile: Mutex::new(None),
            commit_hooks: Mutex::new(Vec::new()),
        }
    }

    /// The document resolved for read-only access this operation.
    pub fn resolved(&self) -> Option<SharedDocument<D>> {
        self.resolved.lock().unwrap().clone()
    }

    /// Publish the resolved read-only document for this operation.
    pub fn set_resolved(&self, document: SharedDocument<D>) {
        *self.resolved.lock().unwrap() = Some(document);
    }

    /// The volatile-mode mutable document, if resolved this operation.
    pub fn volatile_document(&self) -> Option<SharedDocument<D>> {
        self.volatile.lock().unwrap().clone()
    }

    /// Remember the volatile-mode mutable document.
    pub fn set_volatile(&self, document: SharedDocument<D>) {
        *self.volatile.lock().unwrap() = Some(document);
    }

    /// Register a side effect to run after the unit of work commits.
    pub fn on_commit(&self, hook: CommitHook) {
        self.commit_hooks.lock().unwrap().push(hook);
    }

    /// Number of hooks awaiting commit.
    pub fn pending_hooks(&self) -> usize {
        self.commit_hooks.lock().unwrap().len()
    }

    /// Commit the unit of work: run hooks in registration order.
    ///
    /// A failing hook aborts the run; hooks registered after it are
    /// dropped with the scope.
    pub async fn commit(&self) -> DocSyncResult<()> {
        let hooks: Vec<CommitHook> = self.commit_hooks.lock().unwrap().drain(..).collect();
        for hook in hooks {
            hook().await?;
        }
        Ok(())
    }

    /// Abandon the unit of work: discard the cells and the hooks
    /// without running them.
    pub fn rollback(&self) {
        *self.resolved.lock().unwrap() = None;
        *self.volatile.lock().unwrap() = None;
        self.commit_hooks.lock().unwrap().clear();
    }
}

impl<D> Default for OperationScope<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> fmt::Debug for OperationScope<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationScope")
            .field("resolved", &self.resolved.lock().unwrap().is_some())
            .field("volatile", &self.volatile.lock().unwrap().is_some())
            .field("pending_hooks", &self.pending_hooks())
            .finish()
    }
}
