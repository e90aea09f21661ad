//! Test utilities for finalization tests
//!
//! Shared fixtures so unit tests, integration tests and benchmarks build
//! heaps, binders and counted resources the same way.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config::{CollectorMode, FinalizeConfig};
use crate::finalization::{Action, Binder, Finalize, GuardSlot, Registry};
use crate::heap::Heap;

/// Counts how many times the actions it hands out have run.
///
/// # Examples
///
/// ```
/// use finalguard::test_utils::FireCounter;
///
/// let counter = FireCounter::new();
/// let action = counter.action();
/// action().unwrap();
/// assert_eq!(counter.count(), 1);
/// ```
#[derive(Clone, Debug, Default)]
pub struct FireCounter {
    fired: Arc<AtomicUsize>,
}

impl FireCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.fired.load(Ordering::SeqCst)
    }

    /// Action that increments the counter and succeeds.
    pub fn action(&self) -> Action {
        let fired = Arc::clone(&self.fired);
        Box::new(move || {
            fired.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    /// Action that increments the counter and then returns `message` as an error.
    pub fn failing_action(&self, message: &'static str) -> Action {
        let fired = Arc::clone(&self.fired);
        Box::new(move || {
            fired.fetch_add(1, Ordering::SeqCst);
            Err(message.into())
        })
    }

    /// Action that increments the counter and then panics.
    pub fn panicking_action(&self) -> Action {
        let fired = Arc::clone(&self.fired);
        Box::new(move || {
            fired.fetch_add(1, Ordering::SeqCst);
            panic!("cleanup action panicked on purpose");
        })
    }
}

/// A finalizable resource whose cleanup bumps a [`FireCounter`].
#[derive(Debug)]
pub struct CountedResource {
    pub label: &'static str,
    counter: FireCounter,
    guard: GuardSlot,
}

impl CountedResource {
    pub fn new(label: &'static str, counter: &FireCounter) -> Self {
        Self {
            label,
            counter: counter.clone(),
            guard: GuardSlot::new(),
        }
    }
}

impl Finalize for CountedResource {
    fn cleanup_action(&self) -> Action {
        self.counter.action()
    }

    crate::guard_slot!(guard);
}

/// A type that never reserved a guard slot.
#[derive(Debug, Default)]
pub struct SlotlessResource;

impl Finalize for SlotlessResource {
    fn cleanup_action(&self) -> Action {
        Box::new(|| Ok(()))
    }
}

/// Binder over a fresh heap in `mode` and a fresh, isolated registry.
pub fn isolated_binder(mode: CollectorMode) -> Binder {
    let heap = Heap::with_config(&FinalizeConfig {
        collector_mode: mode,
        ..FinalizeConfig::default()
    });
    Binder::new(heap, Registry::new())
}
