//! Error types for finalguard.

use crate::identity::ObjectId;
use thiserror::Error;

/// Error returned by a user-supplied cleanup action.
pub type ActionError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while binding or firing a guard.
///
/// # Examples
///
/// ```
/// use finalguard::error::{FinalizeError, FinalizeResult};
///
/// let closed = FinalizeError::RegistryClosed;
/// assert_eq!(closed.to_string(), "registry already swept at shutdown");
///
/// let unsupported = FinalizeError::UnsupportedTarget { type_name: "Socket" };
/// assert!(unsupported.to_string().contains("Socket"));
///
/// let ok: FinalizeResult<bool> = Ok(true);
/// assert!(ok.is_ok());
/// ```
#[derive(Error, Debug)]
pub enum FinalizeError {
    /// The target type reserves no slot for its guard handle.
    #[error("type `{type_name}` has no guard slot")]
    UnsupportedTarget { type_name: &'static str },

    /// The identity already has a live guard, or the slot is already bound.
    #[error("object {id} already has a pending guard")]
    DuplicateRegistration { id: ObjectId },

    /// Manual invocation on a value that was never attached.
    #[error("no guard is bound to this `{type_name}`")]
    NotAttached { type_name: &'static str },

    /// Attachment attempted after the shutdown sweep.
    #[error("registry already swept at shutdown")]
    RegistryClosed,

    /// The weak observer does not track this identity.
    #[error("object {id} is not tracked by the heap")]
    UnknownObject { id: ObjectId },

    /// The cleanup action returned an error.
    #[error("cleanup action for object {id} failed: {source}")]
    ActionFailure {
        id: ObjectId,
        #[source]
        source: ActionError,
    },

    /// The cleanup action panicked.
    #[error("cleanup action for object {id} panicked: {message}")]
    ActionPanicked { id: ObjectId, message: String },
}

impl FinalizeError {
    /// Returns `true` for failures raised by the user's action rather than the binding machinery.
    pub fn is_action_failure(&self) -> bool {
        matches!(
            self,
            FinalizeError::ActionFailure { .. } | FinalizeError::ActionPanicked { .. }
        )
    }

    /// Builds an [`FinalizeError::ActionPanicked`] from a `catch_unwind` payload.
    pub(crate) fn from_panic(id: ObjectId, payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        FinalizeError::ActionPanicked { id, message }
    }
}

/// Result type for finalization operations
pub type FinalizeResult<T> = Result<T, FinalizeError>;
