//! Context handle with socket helpers, option accessors and monitoring.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use spindle_core::error::{Result, SpindleError};
use spindle_core::handle::Handle;
use spindle_core::monitor::MonitorEvent;
use spindle_core::options::{ContextOptions, OptionId};
use spindle_core::registry::HandleRegistry;
use spindle_core::socket_type::SocketType;
use tracing::warn;

use crate::socket::Socket;

/// Process-wide registry used by [`Context::new`].
static DEFAULT_REGISTRY: Lazy<Arc<HandleRegistry>> =
    Lazy::new(|| Arc::new(HandleRegistry::local()));

/// An open messaging context.
///
/// Dropping the context closes it, which also closes every socket created
/// from it. [`Socket`] values outlive that fine; their calls then fail with
/// [`SpindleError::InvalidHandle`].
pub struct Context {
    registry: Arc<HandleRegistry>,
    handle: Handle,
    closed: bool,
}

impl Context {
    /// Open a context on the process-wide in-process engine.
    pub fn new() -> Result<Self> {
        Self::with_registry(Arc::clone(&DEFAULT_REGISTRY))
    }

    /// Open a context on a specific registry (and therefore engine).
    pub fn with_registry(registry: Arc<HandleRegistry>) -> Result<Self> {
        let handle = registry.open()?;
        Ok(Self {
            registry,
            handle,
            closed: false,
        })
    }

    /// Open a context and apply `options` in order.
    ///
    /// If an option is rejected the context is closed again and the
    /// rejection is returned.
    pub fn with_options(options: &ContextOptions) -> Result<Self> {
        let ctx = Self::new()?;
        ctx.configure(options)?;
        Ok(ctx)
    }

    /// Handle of this context in its registry.
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// Registry owning this context.
    pub fn registry(&self) -> &Arc<HandleRegistry> {
        &self.registry
    }

    /// Close the context and every socket created from it.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.registry.close(self.handle)
    }

    // ---- sockets ----

    /// Create a socket of any pattern.
    pub fn socket(&self, socket_type: SocketType) -> Result<Socket> {
        let handle = self.registry.factory().create(self.handle, socket_type)?;
        Ok(Socket::new(Arc::clone(&self.registry), handle, socket_type))
    }

    /// Create a PAIR socket.
    pub fn pair(&self) -> Result<Socket> {
        self.socket(SocketType::Pair)
    }

    /// Create a REQ socket.
    pub fn req(&self) -> Result<Socket> {
        self.socket(SocketType::Req)
    }

    /// Create a REP socket.
    pub fn rep(&self) -> Result<Socket> {
        self.socket(SocketType::Rep)
    }

    /// Create a DEALER socket.
    pub fn dealer(&self) -> Result<Socket> {
        self.socket(SocketType::Dealer)
    }

    /// Create a ROUTER socket.
    pub fn router(&self) -> Result<Socket> {
        self.socket(SocketType::Router)
    }

    /// Create a PULL socket.
    pub fn pull(&self) -> Result<Socket> {
        self.socket(SocketType::Pull)
    }

    /// Create a PUSH socket.
    pub fn push(&self) -> Result<Socket> {
        self.socket(SocketType::Push)
    }

    /// Create a PUB socket.
    pub fn publisher(&self) -> Result<Socket> {
        self.socket(SocketType::Pub)
    }

    /// Create a SUB socket.
    pub fn subscriber(&self) -> Result<Socket> {
        self.socket(SocketType::Sub)
    }

    /// Create an XPUB socket.
    pub fn xpub(&self) -> Result<Socket> {
        self.socket(SocketType::XPub)
    }

    /// Create an XSUB socket.
    pub fn xsub(&self) -> Result<Socket> {
        self.socket(SocketType::XSub)
    }

    /// Number of live sockets in this context.
    pub fn socket_count(&self) -> Result<usize> {
        self.registry.sockets(self.handle).map(|s| s.len())
    }

    // ---- options ----

    /// Read any supported option by id.
    pub fn get(&self, option: impl Into<i32>) -> Result<i32> {
        self.registry.options().get(self.handle, option)
    }

    /// Write any supported option by id.
    pub fn set(&self, option: impl Into<i32>, value: i32) -> Result<()> {
        self.registry.options().set(self.handle, option, value)
    }

    /// Apply a [`ContextOptions`] batch. Stops at the first rejected option.
    pub fn configure(&self, options: &ContextOptions) -> Result<()> {
        self.registry
            .options()
            .configure_batch(self.handle, options.pairs())
    }

    /// Number of I/O threads.
    pub fn io_threads(&self) -> Result<i32> {
        self.get(OptionId::IoThreads)
    }

    /// Set the number of I/O threads.
    pub fn set_io_threads(&self, threads: i32) -> Result<()> {
        self.set(OptionId::IoThreads, threads)
    }

    /// Maximum number of sockets.
    pub fn max_sockets(&self) -> Result<i32> {
        self.get(OptionId::MaxSockets)
    }

    /// Set the maximum number of sockets.
    pub fn set_max_sockets(&self, max: i32) -> Result<()> {
        self.set(OptionId::MaxSockets, max)
    }

    /// Largest value [`set_max_sockets`](Self::set_max_sockets) accepts.
    pub fn socket_limit(&self) -> Result<i32> {
        self.get(OptionId::SocketLimit)
    }

    /// Scheduling policy of the I/O threads (-1 for the OS default).
    pub fn thread_sched_policy(&self) -> Result<i32> {
        self.get(OptionId::ThreadSchedPolicy)
    }

    /// Set the scheduling policy of the I/O threads.
    pub fn set_thread_sched_policy(&self, policy: i32) -> Result<()> {
        self.set(OptionId::ThreadSchedPolicy, policy)
    }

    /// Maximum message size in bytes.
    pub fn max_msg_size(&self) -> Result<i32> {
        self.get(OptionId::MaxMsgSize)
    }

    /// Set the maximum message size in bytes.
    pub fn set_max_msg_size(&self, size: i32) -> Result<()> {
        self.set(OptionId::MaxMsgSize, size)
    }

    /// Size of the engine's message structure.
    pub fn msg_t_size(&self) -> Result<i32> {
        self.get(OptionId::MsgTSize)
    }

    /// Whether IPv6 is enabled for new sockets.
    pub fn ipv6(&self) -> Result<bool> {
        self.get(OptionId::Ipv6).map(|v| v != 0)
    }

    /// Enable or disable IPv6 for new sockets.
    pub fn set_ipv6(&self, enabled: bool) -> Result<()> {
        self.set(OptionId::Ipv6, i32::from(enabled))
    }

    /// Whether termination waits for pending messages.
    pub fn blocky(&self) -> Result<bool> {
        self.get(OptionId::Blocky).map(|v| v != 0)
    }

    /// Set whether termination waits for pending messages.
    pub fn set_blocky(&self, enabled: bool) -> Result<()> {
        self.set(OptionId::Blocky, i32::from(enabled))
    }

    // ---- monitoring ----

    /// Register `observer` for every lifecycle event of this context's
    /// sockets.
    ///
    /// The observer runs on a dedicated thread, one event at a time. Keep
    /// it short: time spent in the observer delays every later event. It
    /// stays registered until the context is closed and receives
    /// [`EventKind::MonitorStopped`](spindle_core::monitor::EventKind) last.
    ///
    /// # Errors
    ///
    /// [`SpindleError::AlreadyMonitored`] if an observer is already attached.
    pub fn monitor<F>(&self, observer: F) -> Result<()>
    where
        F: FnMut(MonitorEvent) + Send + 'static,
    {
        self.registry.monitor().attach(self.handle, observer)
    }

    /// Like [`monitor`](Self::monitor), limited to the event kinds in `mask`.
    pub fn monitor_filtered<F>(&self, mask: u16, observer: F) -> Result<()>
    where
        F: FnMut(MonitorEvent) + Send + 'static,
    {
        self.registry
            .monitor()
            .attach_filtered(self.handle, mask, observer)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("handle", &self.handle)
            .field("closed", &self.closed)
            .finish()
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        match self.registry.close(self.handle) {
            Ok(()) | Err(SpindleError::InvalidHandle(_)) => {}
            Err(err) => warn!(context = %self.handle, %err, "context close on drop failed"),
        }
    }
}
