//! Host memory manager
//!
//! The heap hands out [`Gc`] handles and implements the
//! [`WeakObserver`](crate::observer::WeakObserver) seam: when the last strong
//! handle to an object is dropped the object is unreachable, and every
//! callback registered for its identity is delivered exactly once.
//!
//! ## Collector modes
//!
//! - [`CollectorMode::Inline`]: notifications run on the dropping thread,
//!   the way a reference-counting runtime reclaims.
//! - [`CollectorMode::Deferred`]: notifications wait for [`Heap::collect`],
//!   the way a tracing collector only notices garbage at collection time.
//! - [`CollectorMode::Background`]: notifications run on a dedicated
//!   collector thread.

mod collector;
mod gc;
mod observers;

pub use gc::{Gc, WeakGc};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::config::{CollectorMode, FinalizeConfig};
use crate::error::FinalizeResult;
use crate::identity::ObjectId;
use crate::observer::{ReclaimCallback, WeakObserver};
use collector::{BackgroundCollector, DeferredQueue, Notification};
use observers::ObserverTable;

static GLOBAL_HEAP: Lazy<Heap> = Lazy::new(Heap::new);

pub(crate) struct HeapInner {
    mode: CollectorMode,
    observers: ObserverTable,
    deferred: DeferredQueue,
    background: Option<BackgroundCollector>,
    /// Notifications queued but not yet delivered
    pending: Arc<AtomicUsize>,
    allocated: AtomicUsize,
    reclaimed: AtomicUsize,
}

impl HeapInner {
    /// Called by the last strong handle of `id` as it goes away.
    pub(crate) fn reclaim(&self, id: ObjectId) {
        let Some(callbacks) = self.observers.untrack(id) else {
            return;
        };
        self.reclaimed.fetch_add(1, Ordering::Relaxed);

        if callbacks.is_empty() {
            return;
        }
        let notification = Notification { id, callbacks };
        tracing::debug!(%id, mode = ?self.mode, "object reclaimed");

        match (self.mode, &self.background) {
            (CollectorMode::Deferred, _) => {
                self.pending.fetch_add(1, Ordering::AcqRel);
                self.deferred.push(notification);
            }
            (CollectorMode::Background, Some(background)) => {
                self.pending.fetch_add(1, Ordering::AcqRel);
                if let Err(notification) = background.submit(notification) {
                    self.pending.fetch_sub(1, Ordering::AcqRel);
                    notification.deliver();
                }
            }
            _ => notification.deliver(),
        }
    }
}

impl Drop for HeapInner {
    fn drop(&mut self) {
        if let Some(background) = &self.background {
            background.shutdown();
        }
        self.deferred.drain(&self.pending);
    }
}

/// A managed heap whose objects report their reclamation to observers.
///
/// `Heap` is a cheap handle; clones share the same object table. Managed
/// objects keep their heap alive, so dropping every `Heap` handle does not
/// lose pending notifications.
///
/// # Examples
///
/// ```
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::sync::Arc;
/// use finalguard::{Heap, WeakObserver};
///
/// let heap = Heap::new();
/// let obj = heap.alloc([0u8; 16]);
///
/// let reclaimed = Arc::new(AtomicBool::new(false));
/// let flag = Arc::clone(&reclaimed);
/// heap.observe(obj.id(), Box::new(move || flag.store(true, Ordering::Release)))
///     .unwrap();
///
/// drop(obj);
/// assert!(reclaimed.load(Ordering::Acquire));
/// ```
#[derive(Clone)]
pub struct Heap {
    inner: Arc<HeapInner>,
}

impl Heap {
    /// Creates an inline-mode heap.
    pub fn new() -> Self {
        Self::with_config(&FinalizeConfig::default())
    }

    pub fn with_config(config: &FinalizeConfig) -> Self {
        let pending = Arc::new(AtomicUsize::new(0));
        let mut mode = config.collector_mode;

        let background = if mode == CollectorMode::Background {
            match BackgroundCollector::spawn(
                &config.collector_thread_name,
                config.notification_capacity,
                Arc::clone(&pending),
            ) {
                Ok(collector) => Some(collector),
                Err(error) => {
                    tracing::warn!(%error, "failed to spawn collector thread, delivering inline");
                    mode = CollectorMode::Inline;
                    None
                }
            }
        } else {
            None
        };

        Self {
            inner: Arc::new(HeapInner {
                mode,
                observers: ObserverTable::new(),
                deferred: DeferredQueue::new(),
                background,
                pending,
                allocated: AtomicUsize::new(0),
                reclaimed: AtomicUsize::new(0),
            }),
        }
    }

    /// Process-wide inline heap used by [`Binder::global`](crate::Binder::global).
    pub fn global() -> &'static Heap {
        &GLOBAL_HEAP
    }

    /// Allocates a managed object with a fresh identity.
    pub fn alloc<T>(&self, value: T) -> Gc<T> {
        let id = ObjectId::next();
        self.inner.observers.track(id);
        self.inner.allocated.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(%id, type_name = std::any::type_name::<T>(), "allocated");
        Gc::new(id, Arc::clone(&self.inner), value)
    }

    /// Effective collector mode; `Background` degrades to `Inline` if no thread could be spawned.
    pub fn mode(&self) -> CollectorMode {
        self.inner.mode
    }

    /// Delivers notifications held back in [`CollectorMode::Deferred`].
    ///
    /// Returns the number of reclaimed objects processed. Other modes have
    /// nothing queued here and return 0.
    pub fn collect(&self) -> usize {
        let delivered = self.inner.deferred.drain(&self.inner.pending);
        if delivered > 0 {
            tracing::debug!(delivered, "collection delivered reclaim notifications");
        }
        delivered
    }

    /// Delivers every notification queued so far, whatever the mode.
    pub fn flush(&self) {
        if let Some(background) = &self.inner.background {
            background.flush();
        }
        self.collect();
    }

    /// Stops the background collector after draining it, then drains the deferred queue.
    ///
    /// Later reclamations are delivered on the dropping thread.
    pub fn shutdown(&self) {
        if let Some(background) = &self.inner.background {
            background.shutdown();
        }
        self.collect();
    }

    /// Whether `id` is a live object of this heap.
    pub fn is_tracked(&self, id: ObjectId) -> bool {
        self.inner.observers.is_tracked(id)
    }

    /// Number of callbacks waiting for `id` to be reclaimed.
    pub fn observer_count(&self, id: ObjectId) -> usize {
        self.inner.observers.callbacks_for(id)
    }

    pub fn stats(&self) -> HeapStats {
        HeapStats {
            allocated: self.inner.allocated.load(Ordering::Relaxed),
            reclaimed: self.inner.reclaimed.load(Ordering::Relaxed),
            live: self.inner.observers.live_count(),
            pending_notifications: self.inner.pending.load(Ordering::Acquire),
            total_observed: self.inner.observers.total_observed(),
            total_forgotten: self.inner.observers.total_forgotten(),
        }
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl WeakObserver for Heap {
    fn observe(&self, id: ObjectId, callback: ReclaimCallback) -> FinalizeResult<()> {
        self.inner.observers.observe(id, callback)
    }

    fn forget(&self, id: ObjectId) -> usize {
        self.inner.observers.forget(id)
    }
}

impl std::fmt::Debug for Heap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Heap")
            .field("mode", &self.inner.mode)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Statistics for a heap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapStats {
    /// Objects allocated since creation
    pub allocated: usize,
    /// Objects reclaimed since creation
    pub reclaimed: usize,
    /// Objects currently reachable
    pub live: usize,
    /// Reclaim notifications queued but not yet delivered
    pub pending_notifications: usize,
    /// Callbacks ever registered
    pub total_observed: usize,
    /// Callbacks discarded without running
    pub total_forgotten: usize,
}

#[cfg(test)]
mod tests;
