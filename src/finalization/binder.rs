//! Attachment of guards to managed objects.

use std::any::type_name;
use std::sync::Arc;

use once_cell::sync::Lazy;

use super::guard::{Action, Guard, Trigger};
use super::registry::Registry;
use super::shutdown::install_exit_hook;
use super::slot::GuardSlot;
use crate::config::FinalizeConfig;
use crate::error::{ActionError, FinalizeError, FinalizeResult};
use crate::heap::{Gc, Heap};
use crate::observer::WeakObserver;

static GLOBAL_BINDER: Lazy<Binder> = Lazy::new(|| {
    if FinalizeConfig::default().install_exit_hook {
        install_exit_hook();
    }
    Binder::new(Heap::global().clone(), Registry::global().clone())
});

/// A type with a designated cleanup action.
///
/// Implementors reserve a [`GuardSlot`] field and build their action from
/// the resources they own. The action must not capture a handle to the
/// object itself.
///
/// # Examples
///
/// ```
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::sync::Arc;
/// use finalguard::{guard_slot, Action, Binder, Finalize, GuardSlot, Heap, Registry};
///
/// struct Connection {
///     closed: Arc<AtomicBool>,
///     guard: GuardSlot,
/// }
///
/// impl Finalize for Connection {
///     fn cleanup_action(&self) -> Action {
///         let closed = Arc::clone(&self.closed);
///         Box::new(move || {
///             closed.store(true, Ordering::Release);
///             Ok(())
///         })
///     }
///
///     guard_slot!(guard);
/// }
///
/// let heap = Heap::new();
/// let binder = Binder::new(heap, Registry::new());
/// let closed = Arc::new(AtomicBool::new(false));
/// let conn = binder
///     .alloc(Connection { closed: Arc::clone(&closed), guard: GuardSlot::new() })
///     .unwrap();
///
/// assert!(conn.finalize().unwrap());
/// assert!(!conn.finalize().unwrap());
/// assert!(closed.load(Ordering::Acquire));
/// ```
pub trait Finalize {
    /// Builds the cleanup action for this instance.
    fn cleanup_action(&self) -> Action;

    /// Slot that holds this instance's guard. Types without one cannot be attached.
    fn guard_slot(&self) -> Option<&GuardSlot> {
        None
    }

    /// Runs the cleanup action now, if no other trigger has.
    ///
    /// Returns `Ok(true)` when this call ran the action and `Ok(false)` when
    /// the guard had already been consumed. Action errors are returned as
    /// [`FinalizeError::ActionFailure`].
    fn finalize(&self) -> FinalizeResult<bool> {
        let type_name = type_name::<Self>();
        let slot = self
            .guard_slot()
            .ok_or(FinalizeError::UnsupportedTarget { type_name })?;
        let guard = slot.get().ok_or(FinalizeError::NotAttached { type_name })?;
        guard.fire()
    }
}

/// Binds guards to managed objects.
///
/// For every attachment the binder creates one [`Guard`], inserts it in the
/// [`Registry`] (shutdown trigger), registers a reclaim callback with the
/// heap (collector trigger) and stores it in the target's [`GuardSlot`]
/// (manual trigger). It never keeps a handle to the target.
#[derive(Clone, Debug)]
pub struct Binder {
    heap: Heap,
    registry: Registry,
}

impl Binder {
    pub fn new(heap: Heap, registry: Registry) -> Self {
        Self { heap, registry }
    }

    /// Binder over [`Heap::global`] and [`Registry::global`].
    ///
    /// The first call installs the process exit hook unless
    /// [`FinalizeConfig::install_exit_hook`] is disabled.
    pub fn global() -> &'static Binder {
        &GLOBAL_BINDER
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Allocates `value` and attaches its own cleanup action.
    ///
    /// The slot is checked before anything is allocated, so a type without
    /// one fails with [`FinalizeError::UnsupportedTarget`] and leaves no
    /// object or guard behind.
    pub fn alloc<T: Finalize>(&self, value: T) -> FinalizeResult<Gc<T>> {
        if value.guard_slot().is_none() {
            return Err(FinalizeError::UnsupportedTarget {
                type_name: type_name::<T>(),
            });
        }
        let action = value.cleanup_action();
        let target = self.heap.alloc(value);
        self.attach(&target, action)?;
        Ok(target)
    }

    /// Attaches `action` to an already allocated target.
    pub fn attach<T: Finalize>(&self, target: &Gc<T>, action: Action) -> FinalizeResult<Arc<Guard>> {
        let type_name = type_name::<T>();
        let id = target.id();
        let slot = target
            .guard_slot()
            .ok_or(FinalizeError::UnsupportedTarget { type_name })?;
        if slot.is_bound() {
            return Err(FinalizeError::DuplicateRegistration { id });
        }

        let guard = self.registry.new_guard(id, type_name, action);
        self.registry.register(id, Arc::clone(&guard))?;

        let observed = Arc::clone(&guard);
        let callback = Box::new(move || {
            observed.fire_detached(Trigger::Collector);
        });
        if let Err(error) = self.heap.observe(id, callback) {
            self.roll_back(&guard, "observer rejected target");
            return Err(error);
        }

        if slot.bind(Arc::clone(&guard)).is_err() {
            // Lost a race with a concurrent attach on the same slot.
            self.roll_back(&guard, "slot bound concurrently");
            return Err(FinalizeError::DuplicateRegistration { id });
        }

        tracing::debug!(%id, type_name, "guard attached");
        Ok(guard)
    }

    /// Convenience over [`Binder::attach`] that boxes the closure.
    pub fn attach_with<T, F>(&self, target: &Gc<T>, action: F) -> FinalizeResult<Arc<Guard>>
    where
        T: Finalize,
        F: FnOnce() -> Result<(), ActionError> + Send + 'static,
    {
        self.attach(target, Box::new(action))
    }

    /// Undoes a partial attachment. The observer callback, if registered,
    /// finds the guard consumed and does nothing.
    fn roll_back(&self, guard: &Arc<Guard>, reason: &'static str) {
        let id = guard.id();
        self.registry.unregister(id);
        guard.disarm();
        tracing::warn!(%id, type_name = guard.type_name(), reason, "attachment rolled back");
    }
}
