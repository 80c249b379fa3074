//! Endpoint attachment for sockets: bind, unbind, connect, disconnect.
//!
//! These calls only record attachments with the engine; the engine reports
//! the outcome through the context's monitor feed.

use tracing::debug;

use crate::endpoint::Endpoint;
use crate::error::{Result, SpindleError};
use crate::handle::Handle;
use crate::native::{NativeEngine, NativeError, NativeResult, RawHandle};
use crate::registry::{Entry, HandleRegistry};

/// Obtained from [`HandleRegistry::wiring`].
pub struct Wiring<'a> {
    registry: &'a HandleRegistry,
}

impl<'a> Wiring<'a> {
    pub(crate) fn new(registry: &'a HandleRegistry) -> Self {
        Self { registry }
    }

    /// Bind `socket` to `endpoint`.
    ///
    /// # Errors
    ///
    /// `InvalidHandle` for a dead or non-socket handle. `NativeFailure` for
    /// a malformed endpoint (`EINVAL`/`EPROTONOSUPPORT`) or an endpoint
    /// already bound in the same context (`EADDRINUSE`).
    pub fn bind(&self, socket: Handle, endpoint: &str) -> Result<()> {
        self.apply(socket, endpoint, "bind", |engine, raw, ep| engine.bind(raw, ep))
    }

    pub fn unbind(&self, socket: Handle, endpoint: &str) -> Result<()> {
        self.apply(socket, endpoint, "unbind", |engine, raw, ep| engine.unbind(raw, ep))
    }

    pub fn connect(&self, socket: Handle, endpoint: &str) -> Result<()> {
        self.apply(socket, endpoint, "connect", |engine, raw, ep| engine.connect(raw, ep))
    }

    pub fn disconnect(&self, socket: Handle, endpoint: &str) -> Result<()> {
        self.apply(socket, endpoint, "disconnect", |engine, raw, ep| {
            engine.disconnect(raw, ep)
        })
    }

    fn apply<F>(&self, socket: Handle, endpoint: &str, op: &'static str, call: F) -> Result<()>
    where
        F: FnOnce(&dyn NativeEngine, RawHandle, &Endpoint) -> NativeResult<()>,
    {
        let raw = match self.registry.state.lock().entries.get(&socket) {
            Some(Entry::Socket { raw, .. }) => *raw,
            _ => return Err(SpindleError::InvalidHandle(socket)),
        };
        let parsed = Endpoint::parse(endpoint)
            .map_err(|e| SpindleError::from_native(socket, NativeError::from(e)))?;

        call(self.registry.engine(), raw, &parsed)
            .map_err(|e| SpindleError::from_native(socket, e))?;
        debug!(%socket, endpoint = %parsed, op, "endpoint updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::{EADDRINUSE, EINVAL, ENOENT, EPROTONOSUPPORT};
    use crate::socket_type::SocketType;

    #[test]
    fn test_bind_rules() {
        let registry = HandleRegistry::local();
        let ctx = registry.open().unwrap();
        let a = registry.factory().create(ctx, SocketType::Rep).unwrap();
        let b = registry.factory().create(ctx, SocketType::Rep).unwrap();

        registry.wiring().bind(a, "inproc://svc").unwrap();
        let err = registry.wiring().bind(b, "inproc://svc").unwrap_err();
        assert_eq!(err.native_code(), Some(EADDRINUSE));

        registry.wiring().unbind(a, "inproc://svc").unwrap();
        registry.wiring().bind(b, "inproc://svc").unwrap();

        let err = registry.wiring().unbind(a, "inproc://svc").unwrap_err();
        assert_eq!(err.native_code(), Some(ENOENT));
    }

    #[test]
    fn test_endpoint_errors() {
        let registry = HandleRegistry::local();
        let ctx = registry.open().unwrap();
        let sock = registry.factory().create(ctx, SocketType::Push).unwrap();

        let err = registry.wiring().connect(sock, "udp://1.2.3.4:5").unwrap_err();
        assert_eq!(err.native_code(), Some(EPROTONOSUPPORT));
        let err = registry.wiring().connect(sock, "inproc://").unwrap_err();
        assert_eq!(err.native_code(), Some(EINVAL));

        // contexts cannot be wired
        assert_eq!(
            registry.wiring().bind(ctx, "inproc://x"),
            Err(SpindleError::InvalidHandle(ctx))
        );
    }

    #[test]
    fn test_disconnect_requires_connection() {
        let registry = HandleRegistry::local();
        let ctx = registry.open().unwrap();
        let sock = registry.factory().create(ctx, SocketType::Dealer).unwrap();

        let err = registry.wiring().disconnect(sock, "tcp://127.0.0.1:5555").unwrap_err();
        assert_eq!(err.native_code(), Some(ENOENT));

        registry.wiring().connect(sock, "tcp://127.0.0.1:5555").unwrap();
        registry.wiring().disconnect(sock, "tcp://127.0.0.1:5555").unwrap();
    }
}
