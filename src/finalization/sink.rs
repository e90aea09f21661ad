//! Side channel for cleanup failures that have no caller to return to.

use parking_lot::Mutex;

use super::guard::Trigger;
use crate::error::FinalizeError;
use crate::identity::ObjectId;

/// A cleanup failure captured on the collector or shutdown path.
#[derive(Debug)]
pub struct CapturedFailure {
    pub id: ObjectId,
    pub type_name: &'static str,
    pub trigger: Trigger,
    pub error: FinalizeError,
}

/// Receives failures that collector-driven and shutdown triggers must not raise.
///
/// Implementations run on whatever thread fired the guard, possibly the
/// collector thread or the process exit path, and must not panic.
pub trait ErrorSink: Send + Sync {
    fn report(&self, failure: CapturedFailure);
}

impl<F> ErrorSink for F
where
    F: Fn(CapturedFailure) + Send + Sync,
{
    fn report(&self, failure: CapturedFailure) {
        self(failure)
    }
}

/// Default sink: emits one `tracing` error event per failure.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ErrorSink for LogSink {
    fn report(&self, failure: CapturedFailure) {
        tracing::error!(
            id = %failure.id,
            trigger = %failure.trigger,
            type_name = failure.type_name,
            error = %failure.error,
            "cleanup action failed"
        );
    }
}

/// Keeps captured failures in memory for later inspection.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use finalguard::{Registry, RecordingSink};
///
/// let sink = Arc::new(RecordingSink::new());
/// let registry = Registry::new().with_error_sink(sink.clone());
/// assert!(sink.is_empty());
/// # drop(registry);
/// ```
#[derive(Debug, Default)]
pub struct RecordingSink {
    failures: Mutex<Vec<CapturedFailure>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.failures.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.lock().is_empty()
    }

    /// Removes and returns every failure recorded so far.
    pub fn take(&self) -> Vec<CapturedFailure> {
        std::mem::take(&mut *self.failures.lock())
    }
}

impl ErrorSink for RecordingSink {
    fn report(&self, failure: CapturedFailure) {
        self.failures.lock().push(failure);
    }
}
