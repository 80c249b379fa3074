//! Socket handle.

use std::fmt;
use std::sync::Arc;

use spindle_core::error::{Result, SpindleError};
use spindle_core::handle::Handle;
use spindle_core::options::OptionId;
use spindle_core::registry::HandleRegistry;
use spindle_core::socket_type::SocketType;
use tracing::warn;

/// A socket created by [`Context::socket`](crate::Context::socket) or one
/// of the pattern helpers.
///
/// Closing the owning context invalidates the socket; dropping it closes
/// it if it is still live.
pub struct Socket {
    registry: Arc<HandleRegistry>,
    handle: Handle,
    socket_type: SocketType,
    closed: bool,
}

impl Socket {
    pub(crate) fn new(registry: Arc<HandleRegistry>, handle: Handle, socket_type: SocketType) -> Self {
        Self {
            registry,
            handle,
            socket_type,
            closed: false,
        }
    }

    /// Handle of this socket in its registry.
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// Pattern this socket was created with.
    pub fn socket_type(&self) -> SocketType {
        self.socket_type
    }

    /// Whether the socket is still open (not closed through its context).
    pub fn is_live(&self) -> bool {
        self.registry.is_live(self.handle)
    }

    /// Close the socket.
    ///
    /// Fails with [`SpindleError::InvalidHandle`] if the context already
    /// closed it.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.registry.close(self.handle)
    }

    /// Read any supported option by id.
    pub fn get(&self, option: impl Into<i32>) -> Result<i32> {
        self.registry.options().get(self.handle, option)
    }

    /// Write any supported option by id.
    pub fn set(&self, option: impl Into<i32>, value: i32) -> Result<()> {
        self.registry.options().set(self.handle, option, value)
    }

    /// Apply `(option, value)` pairs in order, stopping at the first failure.
    pub fn configure<I, K>(&self, pairs: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, i32)>,
        K: Into<i32>,
    {
        self.registry.options().configure_batch(self.handle, pairs)
    }

    /// Outbound high water mark.
    pub fn send_hwm(&self) -> Result<i32> {
        self.get(OptionId::SendHwm)
    }

    /// Set the outbound high water mark.
    pub fn set_send_hwm(&self, hwm: i32) -> Result<()> {
        self.set(OptionId::SendHwm, hwm)
    }

    /// Inbound high water mark.
    pub fn recv_hwm(&self) -> Result<i32> {
        self.get(OptionId::RecvHwm)
    }

    /// Set the inbound high water mark.
    pub fn set_recv_hwm(&self, hwm: i32) -> Result<()> {
        self.set(OptionId::RecvHwm, hwm)
    }

    /// Linger period in milliseconds (-1 waits forever).
    pub fn linger(&self) -> Result<i32> {
        self.get(OptionId::Linger)
    }

    /// Set the linger period in milliseconds.
    pub fn set_linger(&self, millis: i32) -> Result<()> {
        self.set(OptionId::Linger, millis)
    }

    /// Bind to an endpoint such as `tcp://127.0.0.1:5555` or `inproc://name`.
    pub fn bind(&self, endpoint: &str) -> Result<()> {
        self.registry.wiring().bind(self.handle, endpoint)
    }

    /// Release a bound endpoint.
    pub fn unbind(&self, endpoint: &str) -> Result<()> {
        self.registry.wiring().unbind(self.handle, endpoint)
    }

    /// Connect to an endpoint.
    pub fn connect(&self, endpoint: &str) -> Result<()> {
        self.registry.wiring().connect(self.handle, endpoint)
    }

    /// Drop a connection made with [`connect`](Self::connect).
    pub fn disconnect(&self, endpoint: &str) -> Result<()> {
        self.registry.wiring().disconnect(self.handle, endpoint)
    }
}

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket")
            .field("handle", &self.handle)
            .field("socket_type", &self.socket_type)
            .finish_non_exhaustive()
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        match self.registry.close(self.handle) {
            // already closed along with its context
            Ok(()) | Err(SpindleError::InvalidHandle(_)) => {}
            Err(err) => warn!(socket = %self.handle, %err, "socket close on drop failed"),
        }
    }
}
