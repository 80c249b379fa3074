//! Spindle Error Types
//!
//! Every registry, factory, option and monitor operation fails with exactly
//! one of these kinds. Nothing here is retried internally.

use crate::handle::Handle;
use crate::native::{self, NativeError};
use thiserror::Error;

/// Main error type for Spindle operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpindleError {
    /// Handle is unknown, already closed, or invalidated by its context
    #[error("Invalid handle: {0}")]
    InvalidHandle(Handle),

    /// Handle does not name a live context
    #[error("Invalid context: {0}")]
    InvalidContext(Handle),

    /// The engine could not allocate the resource
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Option id outside the supported option space
    #[error("Unknown option id: {0}")]
    UnknownOption(i32),

    /// The engine rejected the call
    #[error("Native failure (code {code}): {message}")]
    NativeFailure { code: i32, message: String },

    /// Context already has an observer attached
    #[error("Context {0} is already monitored")]
    AlreadyMonitored(Handle),
}

/// Result type alias for Spindle operations
pub type Result<T> = std::result::Result<T, SpindleError>;

impl SpindleError {
    /// Translate a native failure reported while operating on `handle`.
    ///
    /// Allocation failures become `ResourceExhausted`, stale native
    /// resources become `InvalidHandle`, everything else is surfaced as
    /// `NativeFailure` with the original code.
    pub fn from_native(handle: Handle, err: NativeError) -> Self {
        match err.code {
            native::ENOMEM | native::EMFILE => Self::ResourceExhausted(err.message),
            native::ENOTSOCK | native::EFAULT | native::ETERM => Self::InvalidHandle(handle),
            code => Self::NativeFailure {
                code,
                message: err.message,
            },
        }
    }

    /// Native error code, if this error came from the engine.
    #[must_use]
    pub const fn native_code(&self) -> Option<i32> {
        match self {
            Self::NativeFailure { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Check if this error means the handle itself is unusable
    #[must_use]
    pub const fn is_handle_error(&self) -> bool {
        matches!(self, Self::InvalidHandle(_) | Self::InvalidContext(_))
    }
}
