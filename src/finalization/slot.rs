//! Per-instance storage for a target's guard handle.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use super::guard::Guard;

/// Write-once field that a finalizable type reserves for its guard.
///
/// The slot holds the target's only strong edge to its guard and is dropped
/// with the target. Types expose it through
/// [`Finalize::guard_slot`](crate::Finalize::guard_slot), usually via the
/// [`guard_slot!`](crate::guard_slot) macro.
#[derive(Default)]
pub struct GuardSlot {
    guard: OnceCell<Arc<Guard>>,
}

impl GuardSlot {
    pub const fn new() -> Self {
        Self {
            guard: OnceCell::new(),
        }
    }

    pub fn get(&self) -> Option<&Arc<Guard>> {
        self.guard.get()
    }

    pub fn is_bound(&self) -> bool {
        self.guard.get().is_some()
    }

    /// Stores `guard`; hands it back if the slot was already bound.
    pub(crate) fn bind(&self, guard: Arc<Guard>) -> Result<(), Arc<Guard>> {
        self.guard.set(guard)
    }
}

impl fmt::Debug for GuardSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.guard.get() {
            Some(guard) => f.debug_tuple("GuardSlot").field(guard).finish(),
            None => f.write_str("GuardSlot(<unbound>)"),
        }
    }
}
