//! Socket creation.

use tracing::debug;

use crate::error::{Result, SpindleError};
use crate::handle::Handle;
use crate::registry::{Entry, HandleRegistry};
use crate::socket_type::SocketType;

/// Creates sockets inside live contexts.
///
/// Obtained from [`HandleRegistry::factory`]. The factory only tags the new
/// handle with its pattern; send/receive turn-taking is enforced above it.
pub struct SocketFactory<'a> {
    registry: &'a HandleRegistry,
}

impl<'a> SocketFactory<'a> {
    pub(crate) fn new(registry: &'a HandleRegistry) -> Self {
        Self { registry }
    }

    /// Create a socket of `socket_type` in `context`.
    ///
    /// The socket starts with a copy of the context's option values.
    ///
    /// # Errors
    ///
    /// `InvalidContext` if `context` is closed, unknown or not a context.
    /// `ResourceExhausted` if the context reached its `MaxSockets` limit.
    pub fn create(&self, context: Handle, socket_type: SocketType) -> Result<Handle> {
        let handle = self.registry.next_handle()?;

        // Held across the engine call so a concurrent close cannot orphan
        // the new socket.
        let mut state = self.registry.state.lock();
        let Some(Entry::Context { raw: context_raw, .. }) = state.entries.get(&context) else {
            return Err(SpindleError::InvalidContext(context));
        };

        let raw = self
            .registry
            .engine()
            .socket_new(*context_raw, socket_type)
            .map_err(|e| match SpindleError::from_native(handle, e) {
                SpindleError::InvalidHandle(_) => SpindleError::InvalidContext(context),
                other => other,
            })?;

        self.registry.names.insert(raw, handle);
        state.entries.insert(
            handle,
            Entry::Socket {
                raw,
                context,
                socket_type,
            },
        );
        if let Some(Entry::Context { sockets, .. }) = state.entries.get_mut(&context) {
            sockets.insert(handle);
        }
        debug!(%context, socket = %handle, %socket_type, raw, "socket created");
        Ok(handle)
    }
}
