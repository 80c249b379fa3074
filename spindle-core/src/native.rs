//! Capability interface to the messaging engine.
//!
//! Everything the core knows about the engine goes through [`NativeEngine`].
//! Engines identify their resources by [`RawHandle`] values; the
//! [`HandleRegistry`](crate::registry::HandleRegistry) maps those to the
//! never-reused [`Handle`](crate::handle::Handle)s it hands out.

use crate::endpoint::Endpoint;
use crate::monitor::EventSink;
use crate::options::OptionId;
use crate::socket_type::SocketType;
use thiserror::Error;

/// Engine-side identifier of a context or socket.
///
/// Unique among live resources of one engine; may be reused after the
/// resource is destroyed.
pub type RawHandle = u64;

pub const ENOENT: i32 = 2;
pub const ENOMEM: i32 = 12;
pub const EFAULT: i32 = 14;
pub const EINVAL: i32 = 22;
pub const EMFILE: i32 = 24;
pub const ENOTSOCK: i32 = 88;
pub const EPROTONOSUPPORT: i32 = 93;
pub const EADDRINUSE: i32 = 98;
/// Context was terminated (ZeroMQ-style errno past the system range).
pub const ETERM: i32 = 156_384_765;

/// Failure reported by the engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} (errno {code})")]
pub struct NativeError {
    pub code: i32,
    pub message: String,
}

impl NativeError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

pub type NativeResult<T> = std::result::Result<T, NativeError>;

/// Handle-based calls into a messaging engine.
///
/// Implementations must be callable from any thread. They must not call
/// back into the registry that drives them, and they must release the
/// [`EventSink`] of a context when that context is terminated.
pub trait NativeEngine: Send + Sync {
    /// Allocate a new context.
    fn context_new(&self) -> NativeResult<RawHandle>;

    /// Terminate a context. Sockets still attached to it are destroyed.
    fn context_term(&self, context: RawHandle) -> NativeResult<()>;

    /// Create a socket of the given pattern inside `context`.
    fn socket_new(&self, context: RawHandle, socket_type: SocketType) -> NativeResult<RawHandle>;

    /// Destroy a socket.
    fn socket_close(&self, socket: RawHandle) -> NativeResult<()>;

    /// Read an integer option of a context or socket.
    fn get_option(&self, target: RawHandle, option: OptionId) -> NativeResult<i32>;

    /// Write an integer option of a context or socket.
    fn set_option(&self, target: RawHandle, option: OptionId, value: i32) -> NativeResult<()>;

    /// Route lifecycle events of `context` and its sockets into `sink`.
    fn install_monitor(&self, context: RawHandle, sink: EventSink) -> NativeResult<()>;

    fn bind(&self, socket: RawHandle, endpoint: &Endpoint) -> NativeResult<()>;

    fn unbind(&self, socket: RawHandle, endpoint: &Endpoint) -> NativeResult<()>;

    fn connect(&self, socket: RawHandle, endpoint: &Endpoint) -> NativeResult<()>;

    fn disconnect(&self, socket: RawHandle, endpoint: &Endpoint) -> NativeResult<()>;
}
