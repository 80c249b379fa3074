//! Handle registry.
//!
//! The registry owns every context and socket handle it issues. It maps
//! handles to engine resources, remembers which sockets belong to which
//! context, and guarantees each resource is destroyed exactly once: an
//! entry is removed under the registry lock before the engine is asked to
//! destroy it, so a second `close` of the same handle always fails with
//! `InvalidHandle`.
//!
//! The other components ([`SocketFactory`], [`OptionStore`],
//! [`EventMonitor`], [`Wiring`]) borrow the registry and are obtained from
//! it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use hashbrown::{HashMap, HashSet};
use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use crate::error::{Result, SpindleError};
use crate::factory::SocketFactory;
use crate::handle::{Handle, HandleKind};
use crate::local::LocalEngine;
use crate::monitor::{EventMonitor, MonitorSlot};
use crate::native::{self, NativeEngine, RawHandle};
use crate::options::OptionStore;
use crate::socket_type::SocketType;
use crate::wiring::Wiring;

pub(crate) enum Entry {
    Context {
        raw: RawHandle,
        sockets: HashSet<Handle>,
        monitor: Option<MonitorSlot>,
    },
    Socket {
        raw: RawHandle,
        context: Handle,
        socket_type: SocketType,
    },
}

impl Entry {
    fn raw(&self) -> RawHandle {
        match self {
            Entry::Context { raw, .. } | Entry::Socket { raw, .. } => *raw,
        }
    }

    fn kind(&self) -> HandleKind {
        match self {
            Entry::Context { .. } => HandleKind::Context,
            Entry::Socket { .. } => HandleKind::Socket,
        }
    }
}

#[derive(Default)]
pub(crate) struct RegistryState {
    pub(crate) entries: HashMap<Handle, Entry>,
}

/// Owner of all context and socket handles for one engine.
pub struct HandleRegistry {
    engine: Arc<dyn NativeEngine>,
    pub(crate) state: Mutex<RegistryState>,
    /// Raw-to-handle index shared with monitor sinks.
    pub(crate) names: Arc<DashMap<RawHandle, Handle>>,
    next_id: AtomicU64,
}

impl HandleRegistry {
    pub fn new(engine: Arc<dyn NativeEngine>) -> Self {
        Self {
            engine,
            state: Mutex::new(RegistryState::default()),
            names: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registry backed by a fresh in-process [`LocalEngine`].
    pub fn local() -> Self {
        Self::new(Arc::new(LocalEngine::new()))
    }

    pub fn engine(&self) -> &dyn NativeEngine {
        self.engine.as_ref()
    }

    pub fn factory(&self) -> SocketFactory<'_> {
        SocketFactory::new(self)
    }

    pub fn options(&self) -> OptionStore<'_> {
        OptionStore::new(self)
    }

    pub fn monitor(&self) -> EventMonitor<'_> {
        EventMonitor::new(self)
    }

    pub fn wiring(&self) -> Wiring<'_> {
        Wiring::new(self)
    }

    /// Open a new context.
    ///
    /// # Errors
    ///
    /// `ResourceExhausted` if the engine cannot allocate one.
    pub fn open(&self) -> Result<Handle> {
        let handle = self.next_handle()?;
        let raw = self
            .engine
            .context_new()
            .map_err(|e| SpindleError::from_native(handle, e))?;

        self.names.insert(raw, handle);
        self.state.lock().entries.insert(
            handle,
            Entry::Context {
                raw,
                sockets: HashSet::new(),
                monitor: None,
            },
        );
        debug!(%handle, raw, "context opened");
        Ok(handle)
    }

    /// Close a context or socket.
    ///
    /// Closing a context closes all of its sockets, terminates the context
    /// and then stops its monitor (delivering `MonitorStopped`). Every
    /// child is closed even if one fails; the first failure is returned.
    ///
    /// # Errors
    ///
    /// `InvalidHandle` if the handle is unknown or already closed.
    pub fn close(&self, handle: Handle) -> Result<()> {
        let entry = {
            let mut state = self.state.lock();
            let entry = state
                .entries
                .remove(&handle)
                .ok_or(SpindleError::InvalidHandle(handle))?;

            match entry {
                Entry::Socket { raw, context, .. } => {
                    if let Some(Entry::Context { sockets, .. }) = state.entries.get_mut(&context) {
                        sockets.remove(&handle);
                    }
                    Closing::Socket { raw }
                }
                Entry::Context {
                    raw,
                    sockets,
                    monitor,
                } => {
                    let children = sockets
                        .into_iter()
                        .filter_map(|child| state.entries.remove(&child).map(|e| (child, e.raw())))
                        .collect();
                    Closing::Context {
                        raw,
                        children,
                        monitor,
                    }
                }
            }
        };

        match entry {
            Closing::Socket { raw } => {
                let result = match self.engine.socket_close(raw) {
                    // a concurrent context close destroyed it first
                    Err(err) if matches!(err.code, native::ENOTSOCK | native::ETERM) => {
                        trace!(%handle, raw, %err, "socket already destroyed by its context");
                        Ok(())
                    }
                    other => other,
                };
                self.names.remove(&raw);
                debug!(%handle, raw, "socket closed");
                result.map_err(|e| SpindleError::from_native(handle, e))
            }
            Closing::Context {
                raw,
                children,
                monitor,
            } => {
                let mut first_err = None;
                for (child, child_raw) in children {
                    if let Err(err) = self.engine.socket_close(child_raw) {
                        warn!(context = %handle, socket = %child, %err, "socket close failed during context teardown");
                        first_err.get_or_insert(SpindleError::from_native(child, err));
                    }
                    self.names.remove(&child_raw);
                }

                if let Err(err) = self.engine.context_term(raw) {
                    warn!(context = %handle, %err, "context termination failed");
                    first_err.get_or_insert(SpindleError::from_native(handle, err));
                }
                self.names.remove(&raw);

                if let Some(slot) = monitor {
                    slot.stop(handle);
                }
                debug!(%handle, raw, "context closed");
                first_err.map_or(Ok(()), Err)
            }
        }
    }

    /// Kind of a live handle.
    pub fn kind(&self, handle: Handle) -> Result<HandleKind> {
        self.state
            .lock()
            .entries
            .get(&handle)
            .map(Entry::kind)
            .ok_or(SpindleError::InvalidHandle(handle))
    }

    pub fn is_live(&self, handle: Handle) -> bool {
        self.state.lock().entries.contains_key(&handle)
    }

    /// Context a socket was created from.
    pub fn parent(&self, socket: Handle) -> Result<Handle> {
        match self.state.lock().entries.get(&socket) {
            Some(Entry::Socket { context, .. }) => Ok(*context),
            _ => Err(SpindleError::InvalidHandle(socket)),
        }
    }

    /// Pattern a socket was created with.
    pub fn socket_type(&self, socket: Handle) -> Result<SocketType> {
        match self.state.lock().entries.get(&socket) {
            Some(Entry::Socket { socket_type, .. }) => Ok(*socket_type),
            _ => Err(SpindleError::InvalidHandle(socket)),
        }
    }

    /// Live sockets of a context, in handle order.
    pub fn sockets(&self, context: Handle) -> Result<Vec<Handle>> {
        match self.state.lock().entries.get(&context) {
            Some(Entry::Context { sockets, .. }) => {
                let mut handles: Vec<Handle> = sockets.iter().copied().collect();
                handles.sort_unstable();
                Ok(handles)
            }
            _ => Err(SpindleError::InvalidContext(context)),
        }
    }

    /// Number of live handles.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn raw(&self, handle: Handle) -> Result<RawHandle> {
        self.state
            .lock()
            .entries
            .get(&handle)
            .map(Entry::raw)
            .ok_or(SpindleError::InvalidHandle(handle))
    }

    pub(crate) fn next_handle(&self) -> Result<Handle> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Handle::from_raw(id)
            .ok_or_else(|| SpindleError::ResourceExhausted("handle space exhausted".into()))
    }
}

impl Drop for HandleRegistry {
    fn drop(&mut self) {
        let contexts: Vec<Handle> = self
            .state
            .get_mut()
            .entries
            .iter()
            .filter(|(_, entry)| matches!(entry, Entry::Context { .. }))
            .map(|(handle, _)| *handle)
            .collect();

        for context in contexts {
            if let Err(err) = self.close(context) {
                warn!(%context, %err, "failed to close context on registry drop");
            }
        }
    }
}

enum Closing {
    Socket {
        raw: RawHandle,
    },
    Context {
        raw: RawHandle,
        children: SmallVec<[(Handle, RawHandle); 8]>,
        monitor: Option<MonitorSlot>,
    },
}
