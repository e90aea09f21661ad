//! Process-exit flush of pending guards.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};

use super::registry::{Registry, SweepReport};

static EXIT_HOOK_INSTALLED: AtomicBool = AtomicBool::new(false);

extern "C" fn run_exit_sweep() {
    // Unwinding out of an `extern "C"` function aborts the process.
    let _ = catch_unwind(AssertUnwindSafe(|| {
        Registry::global().sweep_all();
    }));
}

/// Registers the exit callback that sweeps [`Registry::global`].
///
/// Idempotent: returns `true` only for the call that installed the hook.
pub fn install_exit_hook() -> bool {
    if EXIT_HOOK_INSTALLED.swap(true, Ordering::AcqRel) {
        return false;
    }

    // SAFETY: `run_exit_sweep` is a plain `extern "C" fn()` that never unwinds.
    let rc = unsafe { libc::atexit(run_exit_sweep) };
    if rc != 0 {
        EXIT_HOOK_INSTALLED.store(false, Ordering::Release);
        tracing::warn!(rc, "atexit registration failed, pending guards will not be swept at exit");
        return false;
    }

    tracing::info!("exit hook installed for the global registry");
    true
}

pub fn exit_hook_installed() -> bool {
    EXIT_HOOK_INSTALLED.load(Ordering::Acquire)
}

/// Sweeps a registry when dropped.
///
/// For programs that want the shutdown flush at a known point, typically the
/// end of `main`, rather than inside the exit callback.
///
/// # Examples
///
/// ```
/// use finalguard::{Registry, ShutdownGuard};
///
/// let registry = Registry::new();
/// {
///     let _shutdown = ShutdownGuard::new(registry.clone());
/// }
/// assert!(registry.is_closed());
/// ```
#[derive(Debug)]
#[must_use = "the registry is swept when this guard is dropped"]
pub struct ShutdownGuard {
    registry: Option<Registry>,
}

impl ShutdownGuard {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry: Some(registry),
        }
    }

    /// Sweeps now and returns the report instead of waiting for drop.
    pub fn sweep(mut self) -> SweepReport {
        self.registry
            .take()
            .map(|registry| registry.sweep_all())
            .unwrap_or_default()
    }
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.take() {
            registry.sweep_all();
        }
    }
}
