//! # finalguard
//!
//! Exactly-once cleanup for managed objects.
//!
//! A language-level finalizer may run zero or more times, at an unspecified
//! point, or never. That is too weak a contract for releasing file handles,
//! locks, native buffers or sockets. `finalguard` binds one cleanup action to
//! one object and guarantees the action runs exactly once, whichever of these
//! happens first:
//!
//! - the object becomes unreachable (collector trigger),
//! - user code asks for cleanup explicitly (manual trigger),
//! - the process exits with the object still alive (shutdown trigger).
//!
//! ## Example
//!
//! ```rust
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//! use finalguard::{guard_slot, Action, Binder, Finalize, GuardSlot, Heap, Registry};
//!
//! struct NativeBuffer {
//!     released: Arc<AtomicUsize>,
//!     guard: GuardSlot,
//! }
//!
//! impl Finalize for NativeBuffer {
//!     fn cleanup_action(&self) -> Action {
//!         let released = Arc::clone(&self.released);
//!         Box::new(move || {
//!             released.fetch_add(1, Ordering::SeqCst);
//!             Ok(())
//!         })
//!     }
//!
//!     guard_slot!(guard);
//! }
//!
//! let binder = Binder::new(Heap::new(), Registry::new());
//! let released = Arc::new(AtomicUsize::new(0));
//!
//! let buffer = binder
//!     .alloc(NativeBuffer { released: Arc::clone(&released), guard: GuardSlot::new() })
//!     .unwrap();
//! buffer.finalize().unwrap();   // manual trigger runs the action
//! drop(buffer);                 // collector trigger is now a no-op
//! binder.registry().sweep_all(); // so is the shutdown sweep
//!
//! assert_eq!(released.load(Ordering::SeqCst), 1);
//! ```
//!
//! ## Layout
//!
//! - [`heap`]: the host memory manager, [`Gc`] handles and the
//!   [`WeakObserver`] implementation.
//! - [`finalization`]: guards, the registry, the binder and the exit hook.

pub mod config;
pub mod error;
pub mod finalization;
pub mod heap;
pub mod identity;
mod macros;
pub mod observer;
pub mod test_utils;

pub use config::{CollectorMode, FinalizeConfig};
pub use error::{ActionError, FinalizeError, FinalizeResult};
pub use finalization::{
    exit_hook_installed, install_exit_hook, Action, Binder, CapturedFailure, ErrorSink, Finalize,
    Guard, GuardSlot, LogSink, RecordingSink, Registry, RegistryStats, ShutdownGuard, SweepReport,
    Trigger,
};
pub use heap::{Gc, Heap, HeapStats, WeakGc};
pub use identity::ObjectId;
pub use observer::{ReclaimCallback, WeakObserver};
