//! Exactly-once finalization
//!
//! A [`Guard`] wraps one cleanup action for one managed object and can be
//! fired from three independent trigger sources:
//!
//! - **Collector**: the host heap reports the object unreachable.
//! - **Manual**: user code calls [`Finalize::finalize`] on the object.
//! - **Shutdown**: [`Registry::sweep_all`] runs at process exit.
//!
//! Whichever trigger arrives first runs the action; every later attempt is a
//! no-op. The [`Binder`] wires a new guard into all three paths at
//! construction time.

// Submodules
pub mod binder;
pub mod guard;
pub mod registry;
pub mod shutdown;
pub mod sink;
pub mod slot;

// Re-export public APIs
pub use binder::{Binder, Finalize};
pub use guard::{Action, Guard, Trigger};
pub use registry::{Registry, RegistryStats, SweepReport};
pub use shutdown::{exit_hook_installed, install_exit_hook, ShutdownGuard};
pub use sink::{CapturedFailure, ErrorSink, LogSink, RecordingSink};
pub use slot::GuardSlot;
