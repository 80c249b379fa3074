//! In-process engine.
//!
//! `LocalEngine` keeps contexts, sockets, option tables and endpoint
//! attachments in memory. It performs no I/O: connecting to an endpoint
//! bound by a compatible socket of the same context counts as an
//! established connection, anything else is reported as delayed.

use std::sync::atomic::{AtomicU64, Ordering};

use hashbrown::{HashMap, HashSet};
use parking_lot::Mutex;

use crate::endpoint::Endpoint;
use crate::monitor::{EventKind, EventSink};
use crate::native::{
    NativeEngine, NativeError, NativeResult, RawHandle, EADDRINUSE, EFAULT, EINVAL, EMFILE,
    ENOENT, ENOTSOCK,
};
use crate::options::{OptionId, OptionTable};
use crate::socket_type::SocketType;

#[derive(Default)]
struct LocalContext {
    options: OptionTable,
    sockets: HashSet<RawHandle>,
    bound: HashMap<Endpoint, RawHandle>,
    sink: Option<EventSink>,
}

impl LocalContext {
    fn emit(&self, source: RawHandle, kind: EventKind, endpoint: &Endpoint) {
        if let Some(sink) = &self.sink {
            sink.emit(source, kind, &endpoint.to_string(), 0);
        }
    }
}

struct LocalSocket {
    context: RawHandle,
    socket_type: SocketType,
    options: OptionTable,
    bound: Vec<Endpoint>,
    connected: Vec<Endpoint>,
}

#[derive(Default)]
struct LocalState {
    contexts: HashMap<RawHandle, LocalContext>,
    sockets: HashMap<RawHandle, LocalSocket>,
}

impl LocalState {
    /// Socket and its context, both mutable.
    fn socket_mut(
        &mut self,
        socket: RawHandle,
    ) -> NativeResult<(&mut LocalSocket, &mut LocalContext)> {
        let sock = self
            .sockets
            .get_mut(&socket)
            .ok_or_else(|| NativeError::new(ENOTSOCK, format!("no socket {socket}")))?;
        let ctx = self
            .contexts
            .get_mut(&sock.context)
            .ok_or_else(|| NativeError::new(EFAULT, format!("socket {socket} has no context")))?;
        Ok((sock, ctx))
    }

    /// Compatible socket bound to `endpoint` in `ctx`, if any.
    fn bound_peer(&self, ctx: &LocalContext, endpoint: &Endpoint, ty: SocketType) -> Option<RawHandle> {
        let peer = *ctx.bound.get(endpoint)?;
        let peer_type = self.sockets.get(&peer)?.socket_type;
        ty.is_compatible(peer_type).then_some(peer)
    }
}

/// In-memory [`NativeEngine`].
pub struct LocalEngine {
    state: Mutex<LocalState>,
    next_raw: AtomicU64,
    context_limit: Option<usize>,
}

impl Default for LocalEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalEngine {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LocalState::default()),
            next_raw: AtomicU64::new(0x1000),
            context_limit: None,
        }
    }

    /// Engine refusing to hold more than `limit` contexts at once.
    pub fn with_context_limit(limit: usize) -> Self {
        Self {
            context_limit: Some(limit),
            ..Self::new()
        }
    }

    /// Live contexts and sockets.
    pub fn resource_count(&self) -> usize {
        let state = self.state.lock();
        state.contexts.len() + state.sockets.len()
    }

    fn alloc(&self) -> RawHandle {
        self.next_raw.fetch_add(1, Ordering::Relaxed)
    }
}

impl NativeEngine for LocalEngine {
    fn context_new(&self) -> NativeResult<RawHandle> {
        let mut state = self.state.lock();
        if let Some(limit) = self.context_limit {
            if state.contexts.len() >= limit {
                return Err(NativeError::new(EMFILE, format!("context limit {limit} reached")));
            }
        }
        let raw = self.alloc();
        state.contexts.insert(raw, LocalContext::default());
        Ok(raw)
    }

    fn context_term(&self, context: RawHandle) -> NativeResult<()> {
        let mut state = self.state.lock();
        let ctx = state
            .contexts
            .remove(&context)
            .ok_or_else(|| NativeError::new(EFAULT, format!("no context {context}")))?;
        for socket in &ctx.sockets {
            state.sockets.remove(socket);
        }
        Ok(())
    }

    fn socket_new(&self, context: RawHandle, socket_type: SocketType) -> NativeResult<RawHandle> {
        let mut state = self.state.lock();
        let raw = self.alloc();
        let ctx = state
            .contexts
            .get_mut(&context)
            .ok_or_else(|| NativeError::new(EFAULT, format!("no context {context}")))?;

        let max = ctx.options.get(OptionId::MaxSockets);
        if ctx.sockets.len() >= usize::try_from(max).unwrap_or(0) {
            return Err(NativeError::new(EMFILE, format!("context {context} reached {max} sockets")));
        }
        ctx.sockets.insert(raw);
        let options = ctx.options.clone();

        state.sockets.insert(
            raw,
            LocalSocket {
                context,
                socket_type,
                options,
                bound: Vec::new(),
                connected: Vec::new(),
            },
        );
        Ok(raw)
    }

    fn socket_close(&self, socket: RawHandle) -> NativeResult<()> {
        let mut state = self.state.lock();
        let sock = state
            .sockets
            .remove(&socket)
            .ok_or_else(|| NativeError::new(ENOTSOCK, format!("no socket {socket}")))?;
        let Some(ctx) = state.contexts.get_mut(&sock.context) else {
            return Ok(());
        };
        ctx.sockets.remove(&socket);
        for endpoint in &sock.bound {
            ctx.bound.remove(endpoint);
            ctx.emit(socket, EventKind::Closed, endpoint);
        }
        for endpoint in &sock.connected {
            ctx.emit(socket, EventKind::Disconnected, endpoint);
        }
        Ok(())
    }

    fn get_option(&self, target: RawHandle, option: OptionId) -> NativeResult<i32> {
        let state = self.state.lock();
        if let Some(sock) = state.sockets.get(&target) {
            return Ok(sock.options.get(option));
        }
        state
            .contexts
            .get(&target)
            .map(|ctx| ctx.options.get(option))
            .ok_or_else(|| NativeError::new(EFAULT, format!("no resource {target}")))
    }

    fn set_option(&self, target: RawHandle, option: OptionId, value: i32) -> NativeResult<()> {
        let mut state = self.state.lock();
        if let Some(sock) = state.sockets.get_mut(&target) {
            return sock.options.set(option, value);
        }
        state
            .contexts
            .get_mut(&target)
            .ok_or_else(|| NativeError::new(EFAULT, format!("no resource {target}")))?
            .options
            .set(option, value)
    }

    fn install_monitor(&self, context: RawHandle, sink: EventSink) -> NativeResult<()> {
        let mut state = self.state.lock();
        let ctx = state
            .contexts
            .get_mut(&context)
            .ok_or_else(|| NativeError::new(EFAULT, format!("no context {context}")))?;
        if ctx.sink.is_some() {
            return Err(NativeError::new(EINVAL, format!("context {context} already has a monitor")));
        }
        ctx.sink = Some(sink);
        Ok(())
    }

    fn bind(&self, socket: RawHandle, endpoint: &Endpoint) -> NativeResult<()> {
        let mut state = self.state.lock();
        let (sock, ctx) = state.socket_mut(socket)?;
        if ctx.bound.contains_key(endpoint) {
            return Err(NativeError::new(EADDRINUSE, format!("{endpoint} already bound")));
        }
        ctx.bound.insert(endpoint.clone(), socket);
        sock.bound.push(endpoint.clone());
        ctx.emit(socket, EventKind::Listening, endpoint);
        Ok(())
    }

    fn unbind(&self, socket: RawHandle, endpoint: &Endpoint) -> NativeResult<()> {
        let mut state = self.state.lock();
        let (sock, ctx) = state.socket_mut(socket)?;
        let Some(pos) = sock.bound.iter().position(|ep| ep == endpoint) else {
            return Err(NativeError::new(ENOENT, format!("{endpoint} not bound by socket {socket}")));
        };
        sock.bound.remove(pos);
        ctx.bound.remove(endpoint);
        ctx.emit(socket, EventKind::Closed, endpoint);
        Ok(())
    }

    fn connect(&self, socket: RawHandle, endpoint: &Endpoint) -> NativeResult<()> {
        let mut state = self.state.lock();
        let (sock, _) = state.socket_mut(socket)?;
        sock.connected.push(endpoint.clone());
        let (socket_type, context) = (sock.socket_type, sock.context);

        let Some(ctx) = state.contexts.get(&context) else {
            return Err(NativeError::new(EFAULT, format!("socket {socket} has no context")));
        };
        match state.bound_peer(ctx, endpoint, socket_type) {
            Some(peer) => {
                ctx.emit(socket, EventKind::Connected, endpoint);
                ctx.emit(peer, EventKind::Accepted, endpoint);
            }
            None => ctx.emit(socket, EventKind::ConnectDelayed, endpoint),
        }
        Ok(())
    }

    fn disconnect(&self, socket: RawHandle, endpoint: &Endpoint) -> NativeResult<()> {
        let mut state = self.state.lock();
        let (sock, _) = state.socket_mut(socket)?;
        let Some(pos) = sock.connected.iter().position(|ep| ep == endpoint) else {
            return Err(NativeError::new(ENOENT, format!("socket {socket} not connected to {endpoint}")));
        };
        sock.connected.remove(pos);
        let (socket_type, context) = (sock.socket_type, sock.context);

        let Some(ctx) = state.contexts.get(&context) else {
            return Err(NativeError::new(EFAULT, format!("socket {socket} has no context")));
        };
        ctx.emit(socket, EventKind::Disconnected, endpoint);
        if let Some(peer) = state.bound_peer(ctx, endpoint, socket_type) {
            ctx.emit(peer, EventKind::Disconnected, endpoint);
        }
        Ok(())
    }
}
