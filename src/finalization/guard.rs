//! The exactly-once cleanup unit.

use std::fmt;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::registry::RegistryInner;
use super::sink::{CapturedFailure, ErrorSink, LogSink};
use crate::error::{ActionError, FinalizeError, FinalizeResult};
use crate::identity::ObjectId;

/// A zero-argument cleanup procedure.
///
/// Actions own the resources they release. They must not capture a strong
/// handle to the object they clean up after, or that object would never
/// become unreachable.
pub type Action = Box<dyn FnOnce() -> Result<(), ActionError> + Send + 'static>;

/// The event that attempted to fire a guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// User code called the cleanup method.
    Manual,
    /// The host heap reported the target unreachable.
    Collector,
    /// The registry was swept at process shutdown.
    Shutdown,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Manual => write!(f, "manual"),
            Trigger::Collector => write!(f, "collector"),
            Trigger::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// Result of a detached (collector or shutdown) firing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FireOutcome {
    AlreadyConsumed,
    Completed,
    Failed,
}

/// One cleanup action bound to one target object.
///
/// A guard moves from pending to consumed exactly once. Every trigger source
/// goes through the same compare-and-swap on `consumed`; the winner runs the
/// action and every later attempt is a silent no-op.
///
/// The guard records the target's identity only, never a handle to it.
///
/// # Examples
///
/// ```
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
/// use finalguard::{Guard, ObjectId};
///
/// let runs = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&runs);
/// let guard = Guard::new(ObjectId::next(), "Socket", Box::new(move || {
///     counter.fetch_add(1, Ordering::SeqCst);
///     Ok(())
/// }));
///
/// assert!(guard.fire().unwrap());
/// assert!(!guard.fire().unwrap());
/// assert_eq!(runs.load(Ordering::SeqCst), 1);
/// ```
pub struct Guard {
    id: ObjectId,
    type_name: &'static str,
    consumed: AtomicBool,
    action: Mutex<Option<Action>>,
    registry: Weak<RegistryInner>,
}

impl Guard {
    /// Creates a guard that is not tracked by any registry.
    pub fn new(id: ObjectId, type_name: &'static str, action: Action) -> Arc<Self> {
        Self::with_registry(id, type_name, action, Weak::new())
    }

    pub(crate) fn with_registry(
        id: ObjectId,
        type_name: &'static str,
        action: Action,
        registry: Weak<RegistryInner>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            type_name,
            consumed: AtomicBool::new(false),
            action: Mutex::new(Some(action)),
            registry,
        })
    }

    /// Identity of the target this guard cleans up after.
    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is_pending(&self) -> bool {
        !self.consumed.load(Ordering::Acquire)
    }

    pub fn is_consumed(&self) -> bool {
        self.consumed.load(Ordering::Acquire)
    }

    /// Fires the guard on behalf of a manual caller.
    ///
    /// Returns `Ok(true)` if this call ran the action, `Ok(false)` if the
    /// guard was already consumed. An error returned by the action is
    /// propagated as [`FinalizeError::ActionFailure`]; the guard stays
    /// consumed either way. A panicking action unwinds into the caller.
    pub fn fire(&self) -> FinalizeResult<bool> {
        self.fire_as(Trigger::Manual)
    }

    fn fire_as(&self, trigger: Trigger) -> FinalizeResult<bool> {
        let Some(action) = self.consume(trigger) else {
            tracing::trace!(id = %self.id, %trigger, "guard already consumed");
            return Ok(false);
        };

        tracing::debug!(id = %self.id, %trigger, type_name = self.type_name, "running cleanup action");
        match catch_unwind(AssertUnwindSafe(action)) {
            Ok(Ok(())) => Ok(true),
            Ok(Err(source)) => {
                self.record_failure();
                Err(FinalizeError::ActionFailure {
                    id: self.id,
                    source,
                })
            }
            Err(payload) => {
                self.record_failure();
                resume_unwind(payload)
            }
        }
    }

    fn record_failure(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.record_failure();
        }
    }

    /// Fires the guard where no caller can receive a failure.
    ///
    /// Errors and panics are captured and reported to the registry's error
    /// sink, or logged when the guard has no registry.
    pub(crate) fn fire_detached(&self, trigger: Trigger) -> FireOutcome {
        let error = match catch_unwind(AssertUnwindSafe(|| self.fire_as(trigger))) {
            Ok(Ok(true)) => return FireOutcome::Completed,
            Ok(Ok(false)) => return FireOutcome::AlreadyConsumed,
            Ok(Err(error)) => error,
            // Already counted by `fire_as` before it resumed the unwind.
            Err(payload) => FinalizeError::from_panic(self.id, payload),
        };

        let failure = CapturedFailure {
            id: self.id,
            type_name: self.type_name,
            trigger,
            error,
        };
        match self.registry.upgrade() {
            Some(registry) => registry.report(failure),
            None => LogSink.report(failure),
        }
        FireOutcome::Failed
    }

    /// Marks the guard consumed without running its action.
    ///
    /// Used to roll back an attachment that could not be completed. Returns
    /// `false` if the guard had already been consumed.
    pub(crate) fn disarm(&self) -> bool {
        if self
            .consumed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        drop(self.action.lock().take());
        true
    }

    /// The single transition `Pending -> Consumed`.
    ///
    /// Only the caller that wins the compare-and-swap receives the action.
    fn consume(&self, trigger: Trigger) -> Option<Action> {
        self.consumed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;

        let action = self.action.lock().take();
        if let Some(registry) = self.registry.upgrade() {
            registry.on_consumed(self, trigger);
        }
        action
    }
}

impl fmt::Debug for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guard")
            .field("id", &self.id)
            .field("type_name", &self.type_name)
            .field("consumed", &self.is_consumed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Barrier;
    use std::thread;

    fn counting_guard(counter: &Arc<AtomicUsize>) -> Arc<Guard> {
        let counter = Arc::clone(counter);
        Guard::new(
            ObjectId::next(),
            "Counter",
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        )
    }

    #[test]
    fn fire_runs_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let guard = counting_guard(&counter);

        assert!(guard.is_pending());
        assert!(guard.fire().unwrap());
        assert!(guard.is_consumed());
        for _ in 0..5 {
            assert!(!guard.fire().unwrap());
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failure_propagates_once_then_noop() {
        let guard = Guard::new(ObjectId::next(), "Failing", Box::new(|| Err("busy".into())));

        let err = guard.fire().unwrap_err();
        assert!(matches!(err, FinalizeError::ActionFailure { .. }));
        assert!(guard.is_consumed());
        assert!(!guard.fire().unwrap());
    }

    #[test]
    fn detached_fire_swallows_panics() {
        let guard = Guard::new(ObjectId::next(), "Panicky", Box::new(|| panic!("boom")));

        assert_eq!(guard.fire_detached(Trigger::Collector), FireOutcome::Failed);
        assert!(guard.is_consumed());
        assert_eq!(
            guard.fire_detached(Trigger::Shutdown),
            FireOutcome::AlreadyConsumed
        );
    }

    #[test]
    fn disarm_prevents_action() {
        let counter = Arc::new(AtomicUsize::new(0));
        let guard = counting_guard(&counter);

        assert!(guard.disarm());
        assert!(!guard.disarm());
        assert!(!guard.fire().unwrap());
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn racing_triggers_fire_once() {
        for _ in 0..50 {
            let counter = Arc::new(AtomicUsize::new(0));
            let guard = counting_guard(&counter);
            let barrier = Arc::new(Barrier::new(3));

            let handles: Vec<_> = [Trigger::Manual, Trigger::Collector, Trigger::Shutdown]
                .into_iter()
                .map(|trigger| {
                    let guard = Arc::clone(&guard);
                    let barrier = Arc::clone(&barrier);
                    thread::spawn(move || {
                        barrier.wait();
                        match trigger {
                            Trigger::Manual => guard.fire().unwrap(),
                            other => guard.fire_detached(other) == FireOutcome::Completed,
                        }
                    })
                })
                .collect();

            let winners = handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|ran| *ran)
                .count();

            assert_eq!(winners, 1);
            assert_eq!(counter.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn trigger_display() {
        assert_eq!(Trigger::Manual.to_string(), "manual");
        assert_eq!(Trigger::Collector.to_string(), "collector");
        assert_eq!(Trigger::Shutdown.to_string(), "shutdown");
    }
}
