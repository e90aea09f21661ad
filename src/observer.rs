//! Weak-observation seam between the finalization core and the host memory manager.

use crate::error::FinalizeResult;
use crate::identity::ObjectId;

/// Callback delivered once when an observed object becomes unreachable.
pub type ReclaimCallback = Box<dyn FnOnce() + Send + Sync + 'static>;

/// Host facility that reports loss of reachability without keeping objects alive.
///
/// Implementations must deliver each registered callback at most once, and
/// must not hold a strong reference to the observed object.
pub trait WeakObserver: Send + Sync {
    /// Registers `callback` to run when the object `id` is reclaimed.
    ///
    /// Fails with [`FinalizeError::UnknownObject`](crate::FinalizeError::UnknownObject)
    /// if `id` is not a live object of this observer.
    fn observe(&self, id: ObjectId, callback: ReclaimCallback) -> FinalizeResult<()>;

    /// Drops every callback registered for `id` without running it.
    ///
    /// Returns the number of callbacks discarded.
    fn forget(&self, id: ObjectId) -> usize;
}
