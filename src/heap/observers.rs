//! Per-object table of reclaim callbacks.

use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{FinalizeError, FinalizeResult};
use crate::identity::ObjectId;
use crate::observer::ReclaimCallback;

/// Tracks every live object of a heap together with the callbacks waiting for its reclamation.
///
/// An entry exists from allocation until reclamation; observing an identity
/// without an entry fails, so a callback can never be parked on an object
/// that is already gone.
pub(crate) struct ObserverTable {
    /// Map from live object to callbacks observing it
    callbacks_by_object: DashMap<ObjectId, Vec<ReclaimCallback>>,
    /// Total callbacks registered
    total_observed: AtomicUsize,
    /// Total callbacks discarded via `forget`
    total_forgotten: AtomicUsize,
}

impl ObserverTable {
    pub(crate) fn new() -> Self {
        Self {
            callbacks_by_object: DashMap::new(),
            total_observed: AtomicUsize::new(0),
            total_forgotten: AtomicUsize::new(0),
        }
    }

    /// Starts tracking a freshly allocated object.
    pub(crate) fn track(&self, id: ObjectId) {
        self.callbacks_by_object.insert(id, Vec::new());
    }

    pub(crate) fn observe(&self, id: ObjectId, callback: ReclaimCallback) -> FinalizeResult<()> {
        match self.callbacks_by_object.get_mut(&id) {
            Some(mut callbacks) => {
                callbacks.push(callback);
                self.total_observed.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            None => Err(FinalizeError::UnknownObject { id }),
        }
    }

    /// Stops tracking `id` and hands back its callbacks.
    ///
    /// Returns `None` if the object was not tracked.
    pub(crate) fn untrack(&self, id: ObjectId) -> Option<Vec<ReclaimCallback>> {
        self.callbacks_by_object
            .remove(&id)
            .map(|(_, callbacks)| callbacks)
    }

    /// Discards the callbacks parked on `id` without running them.
    ///
    /// The callbacks are dropped after the shard lock is released: they may
    /// own the last handle to another object of the same heap, whose
    /// reclamation needs the table again.
    pub(crate) fn forget(&self, id: ObjectId) -> usize {
        let taken = self
            .callbacks_by_object
            .get_mut(&id)
            .map(|mut callbacks| std::mem::take(&mut *callbacks));
        let forgotten = taken.as_ref().map_or(0, Vec::len);
        drop(taken);
        if forgotten > 0 {
            self.total_forgotten.fetch_add(forgotten, Ordering::Relaxed);
        }
        forgotten
    }

    pub(crate) fn is_tracked(&self, id: ObjectId) -> bool {
        self.callbacks_by_object.contains_key(&id)
    }

    /// Number of objects currently tracked
    pub(crate) fn live_count(&self) -> usize {
        self.callbacks_by_object.len()
    }

    /// Number of callbacks parked on `id`
    pub(crate) fn callbacks_for(&self, id: ObjectId) -> usize {
        self.callbacks_by_object
            .get(&id)
            .map(|callbacks| callbacks.len())
            .unwrap_or(0)
    }

    pub(crate) fn total_observed(&self) -> usize {
        self.total_observed.load(Ordering::Relaxed)
    }

    pub(crate) fn total_forgotten(&self) -> usize {
        self.total_forgotten.load(Ordering::Relaxed)
    }
}
