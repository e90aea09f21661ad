//! Process-wide table of pending guards.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use super::guard::{FireOutcome, Guard, Trigger};
use super::sink::{CapturedFailure, ErrorSink, LogSink};
use crate::error::{FinalizeError, FinalizeResult};
use crate::identity::ObjectId;

static GLOBAL_REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub(crate) struct RegistryInner {
    /// Pending guards by target identity
    entries: Mutex<HashMap<ObjectId, Arc<Guard>>>,
    /// Set once by the shutdown sweep, under the `entries` lock
    closed: AtomicBool,
    sink: ArcSwap<Arc<dyn ErrorSink>>,
    total_registered: AtomicUsize,
    fired_manual: AtomicUsize,
    fired_collector: AtomicUsize,
    fired_shutdown: AtomicUsize,
    failures: AtomicUsize,
}

impl RegistryInner {
    /// Bookkeeping for the guard that just won its compare-and-swap.
    pub(crate) fn on_consumed(&self, guard: &Guard, trigger: Trigger) {
        let id = guard.id();
        {
            let mut entries = self.entries.lock();
            if entries
                .get(&id)
                .is_some_and(|entry| std::ptr::eq(Arc::as_ptr(entry), guard))
            {
                entries.remove(&id);
            }
        }

        let counter = match trigger {
            Trigger::Manual => &self.fired_manual,
            Trigger::Collector => &self.fired_collector,
            Trigger::Shutdown => &self.fired_shutdown,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(%id, %trigger, "guard unregistered on consumption");
    }

    pub(crate) fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn report(&self, failure: CapturedFailure) {
        self.sink.load().report(failure);
    }
}

/// Table mapping each live target identity to its pending [`Guard`].
///
/// The table is the only shared mutable structure of the finalization core.
/// Its lock covers insertions and removals only; cleanup actions always run
/// with the lock released. An entry exists for exactly as long as its guard
/// is pending: whichever trigger consumes the guard removes it.
///
/// `Registry` is a cheap handle. [`Registry::global`] is the instance swept
/// by the process exit hook; [`Registry::new`] creates an isolated one.
///
/// # Examples
///
/// ```
/// use finalguard::{Guard, ObjectId, Registry};
///
/// let registry = Registry::new();
/// let id = ObjectId::next();
/// let guard = registry.new_guard(id, "Buffer", Box::new(|| Ok(())));
/// registry.register(id, guard).unwrap();
/// assert!(registry.contains(id));
///
/// let report = registry.sweep_all();
/// assert_eq!(report.fired, 1);
/// assert!(registry.is_empty());
/// ```
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                entries: Mutex::new(HashMap::new()),
                closed: AtomicBool::new(false),
                sink: ArcSwap::from_pointee(Arc::new(LogSink) as Arc<dyn ErrorSink>),
                total_registered: AtomicUsize::new(0),
                fired_manual: AtomicUsize::new(0),
                fired_collector: AtomicUsize::new(0),
                fired_shutdown: AtomicUsize::new(0),
                failures: AtomicUsize::new(0),
            }),
        }
    }

    /// The process-wide registry swept by the exit hook.
    pub fn global() -> &'static Registry {
        &GLOBAL_REGISTRY
    }

    /// Replaces the error sink, returning the registry for chaining.
    pub fn with_error_sink(self, sink: Arc<dyn ErrorSink>) -> Self {
        self.set_error_sink(sink);
        self
    }

    /// Replaces the error sink used for collector and shutdown failures.
    pub fn set_error_sink(&self, sink: Arc<dyn ErrorSink>) {
        self.inner.sink.store(Arc::new(sink));
    }

    /// Creates a guard whose consumption is booked against this registry.
    ///
    /// The guard is not inserted; see [`Registry::register`].
    pub fn new_guard(
        &self,
        id: ObjectId,
        type_name: &'static str,
        action: super::guard::Action,
    ) -> Arc<Guard> {
        Guard::with_registry(id, type_name, action, Arc::downgrade(&self.inner))
    }

    /// Inserts a pending guard under `id`.
    ///
    /// Fails with [`FinalizeError::DuplicateRegistration`] if `id` already has
    /// a pending guard, and with [`FinalizeError::RegistryClosed`] once the
    /// shutdown sweep has run.
    pub fn register(&self, id: ObjectId, guard: Arc<Guard>) -> FinalizeResult<()> {
        let mut entries = self.inner.entries.lock();
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(FinalizeError::RegistryClosed);
        }
        if entries.contains_key(&id) {
            return Err(FinalizeError::DuplicateRegistration { id });
        }
        entries.insert(id, guard);
        drop(entries);

        self.inner.total_registered.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(%id, "guard registered");
        Ok(())
    }

    /// Removes the entry for `id` if present. Idempotent.
    pub fn unregister(&self, id: ObjectId) -> Option<Arc<Guard>> {
        self.inner.entries.lock().remove(&id)
    }

    /// Fires every pending guard and closes the registry.
    ///
    /// Runs once; later calls return an empty report. Guards fire in no
    /// particular order. A failing or panicking action is reported to the
    /// error sink and the sweep moves on to the next entry.
    pub fn sweep_all(&self) -> SweepReport {
        let drained: Vec<Arc<Guard>> = {
            let mut entries = self.inner.entries.lock();
            if self.inner.closed.swap(true, Ordering::AcqRel) {
                return SweepReport::default();
            }
            entries.drain().map(|(_, guard)| guard).collect()
        };

        let mut report = SweepReport::default();
        for guard in drained {
            match guard.fire_detached(Trigger::Shutdown) {
                FireOutcome::Completed => report.fired += 1,
                FireOutcome::Failed => {
                    report.fired += 1;
                    report.failed += 1;
                }
                FireOutcome::AlreadyConsumed => report.skipped += 1,
            }
        }

        tracing::info!(
            fired = report.fired,
            failed = report.failed,
            skipped = report.skipped,
            "shutdown sweep complete"
        );
        report
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.inner.entries.lock().contains_key(&id)
    }

    /// Pending guard for `id`, if any.
    pub fn get(&self, id: ObjectId) -> Option<Arc<Guard>> {
        self.inner.entries.lock().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.lock().is_empty()
    }

    /// Whether the shutdown sweep has run.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            total_registered: self.inner.total_registered.load(Ordering::Relaxed),
            fired_manual: self.inner.fired_manual.load(Ordering::Relaxed),
            fired_collector: self.inner.fired_collector.load(Ordering::Relaxed),
            fired_shutdown: self.inner.fired_shutdown.load(Ordering::Relaxed),
            failures: self.inner.failures.load(Ordering::Relaxed),
            pending: self.len(),
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("pending", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Outcome of [`Registry::sweep_all`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Guards whose action ran during the sweep, failed or not
    pub fired: usize,
    /// Actions that returned an error or panicked
    pub failed: usize,
    /// Guards consumed by another trigger while the sweep was running
    pub skipped: usize,
}

/// Statistics for a registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    /// Guards ever registered
    pub total_registered: usize,
    /// Guards consumed by manual invocation
    pub fired_manual: usize,
    /// Guards consumed by the collector
    pub fired_collector: usize,
    /// Guards consumed by the shutdown sweep
    pub fired_shutdown: usize,
    /// Actions that returned an error or panicked
    pub failures: usize,
    /// Guards currently pending
    pub pending: usize,
}

impl RegistryStats {
    pub fn total_fired(&self) -> usize {
        self.fired_manual + self.fired_collector + self.fired_shutdown
    }
}
