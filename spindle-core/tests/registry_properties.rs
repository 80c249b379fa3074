//! Lifecycle properties of contexts, sockets and monitors

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use spindle_core::monitor::EventSink;
use spindle_core::native::{self, NativeError, NativeResult, RawHandle};
use spindle_core::prelude::*;

/// `LocalEngine` with injectable failures.
#[derive(Default)]
struct FaultyEngine {
    inner: LocalEngine,
    reject_monitor: bool,
    // socket_close reports the socket as already gone
    stale_sockets: bool,
}

impl NativeEngine for FaultyEngine {
    fn context_new(&self) -> NativeResult<RawHandle> {
        self.inner.context_new()
    }

    fn context_term(&self, context: RawHandle) -> NativeResult<()> {
        self.inner.context_term(context)
    }

    fn socket_new(&self, context: RawHandle, socket_type: SocketType) -> NativeResult<RawHandle> {
        self.inner.socket_new(context, socket_type)
    }

    fn socket_close(&self, socket: RawHandle) -> NativeResult<()> {
        self.inner.socket_close(socket)?;
        if self.stale_sockets {
            return Err(NativeError::new(native::ENOTSOCK, "socket destroyed with its context"));
        }
        Ok(())
    }

    fn get_option(&self, target: RawHandle, option: OptionId) -> NativeResult<i32> {
        self.inner.get_option(target, option)
    }

    fn set_option(&self, target: RawHandle, option: OptionId, value: i32) -> NativeResult<()> {
        self.inner.set_option(target, option, value)
    }

    fn install_monitor(&self, context: RawHandle, sink: EventSink) -> NativeResult<()> {
        if self.reject_monitor {
            return Err(NativeError::new(native::EINVAL, "monitoring unsupported"));
        }
        self.inner.install_monitor(context, sink)
    }

    fn bind(&self, socket: RawHandle, endpoint: &Endpoint) -> NativeResult<()> {
        self.inner.bind(socket, endpoint)
    }

    fn unbind(&self, socket: RawHandle, endpoint: &Endpoint) -> NativeResult<()> {
        self.inner.unbind(socket, endpoint)
    }

    fn connect(&self, socket: RawHandle, endpoint: &Endpoint) -> NativeResult<()> {
        self.inner.connect(socket, endpoint)
    }

    fn disconnect(&self, socket: RawHandle, endpoint: &Endpoint) -> NativeResult<()> {
        self.inner.disconnect(socket, endpoint)
    }
}

/// Closes a socket of the registry when dropped, like the facade's `Socket`.
struct SocketGuard {
    registry: Arc<HandleRegistry>,
    socket: Handle,
}

impl Drop for SocketGuard {
    fn drop(&mut self) {
        let _ = self.registry.close(self.socket);
    }
}

#[test]
fn test_request_socket_walkthrough() {
    let registry = HandleRegistry::local();

    let h1 = registry.open().unwrap();
    let h2 = registry.factory().create(h1, SocketType::Req).unwrap();
    registry.options().set(h2, 1, 5).unwrap();
    assert_eq!(registry.options().get(h2, 1), Ok(5));

    registry.close(h1).unwrap();
    assert_eq!(registry.options().get(h2, 1), Err(SpindleError::InvalidHandle(h2)));
}

#[test]
fn test_every_socket_closes_exactly_once() {
    let registry = HandleRegistry::local();
    let ctx = registry.open().unwrap();

    for ty in SocketType::ALL {
        let sock = registry.factory().create(ctx, ty).unwrap();
        assert!(registry.close(sock).is_ok());
        assert_eq!(registry.close(sock), Err(SpindleError::InvalidHandle(sock)));
    }
    registry.close(ctx).unwrap();
}

#[test]
fn test_context_close_invalidates_all_sockets() {
    let engine = Arc::new(LocalEngine::new());
    let registry = HandleRegistry::new(engine.clone());
    let ctx = registry.open().unwrap();
    let socks: Vec<Handle> = SocketType::ALL
        .into_iter()
        .map(|ty| registry.factory().create(ctx, ty).unwrap())
        .collect();
    assert_eq!(engine.resource_count(), 12);

    registry.close(ctx).unwrap();
    assert_eq!(engine.resource_count(), 0);
    for sock in socks {
        assert_eq!(
            registry.options().get(sock, OptionId::Linger),
            Err(SpindleError::InvalidHandle(sock))
        );
        assert_eq!(registry.close(sock), Err(SpindleError::InvalidHandle(sock)));
    }
}

#[test]
fn test_open_fails_when_engine_is_exhausted() {
    let registry = HandleRegistry::new(Arc::new(LocalEngine::with_context_limit(2)));
    let first = registry.open().unwrap();
    registry.open().unwrap();

    assert!(matches!(registry.open(), Err(SpindleError::ResourceExhausted(_))));

    registry.close(first).unwrap();
    assert!(registry.open().is_ok());
}

#[test]
fn test_concurrent_close_succeeds_once() {
    let registry = Arc::new(HandleRegistry::local());
    let ctx = registry.open().unwrap();
    let sock = registry.factory().create(ctx, SocketType::Pair).unwrap();

    let workers: Vec<_> = (0..8)
        .map(|_| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || registry.close(sock).is_ok())
        })
        .collect();
    let successes = workers
        .into_iter()
        .map(|w| w.join().unwrap())
        .filter(|ok| *ok)
        .count();
    assert_eq!(successes, 1);
}

#[test]
fn test_attach_twice_fails() {
    let registry = HandleRegistry::local();
    let ctx = registry.open().unwrap();

    registry.monitor().attach(ctx, |_| {}).unwrap();
    assert_eq!(
        registry.monitor().attach(ctx, |_| {}),
        Err(SpindleError::AlreadyMonitored(ctx))
    );
}

#[test]
fn test_attach_requires_context() {
    let registry = HandleRegistry::local();
    let ctx = registry.open().unwrap();
    let sock = registry.factory().create(ctx, SocketType::Sub).unwrap();

    assert_eq!(
        registry.monitor().attach(sock, |_| {}),
        Err(SpindleError::InvalidContext(sock))
    );
    registry.close(ctx).unwrap();
    assert_eq!(
        registry.monitor().attach(ctx, |_| {}),
        Err(SpindleError::InvalidContext(ctx))
    );
}

#[test]
fn test_events_arrive_in_order_on_delivery_thread() {
    let registry = HandleRegistry::local();
    let ctx = registry.open().unwrap();
    let (tx, rx) = flume::unbounded();
    let caller = thread::current().id();

    registry
        .monitor()
        .attach(ctx, move |event: MonitorEvent| {
            assert_ne!(thread::current().id(), caller);
            tx.send(event).unwrap();
        })
        .unwrap();

    let rep = registry.factory().create(ctx, SocketType::Rep).unwrap();
    let req = registry.factory().create(ctx, SocketType::Req).unwrap();
    registry.wiring().bind(rep, "inproc://echo").unwrap();
    registry.wiring().connect(req, "inproc://echo").unwrap();
    registry.wiring().disconnect(req, "inproc://echo").unwrap();
    registry.close(ctx).unwrap();

    let events: Vec<(Handle, EventKind)> = rx.try_iter().map(|e| (e.source, e.kind)).collect();
    assert_eq!(
        events,
        vec![
            (rep, EventKind::Listening),
            (req, EventKind::Connected),
            (rep, EventKind::Accepted),
            (req, EventKind::Disconnected),
            (rep, EventKind::Disconnected),
            (rep, EventKind::Closed),
            (ctx, EventKind::MonitorStopped),
        ]
    );
}

#[test]
fn test_connect_without_peer_is_delayed() {
    let registry = HandleRegistry::local();
    let ctx = registry.open().unwrap();
    let (tx, rx) = flume::unbounded();
    registry
        .monitor()
        .attach(ctx, move |event: MonitorEvent| tx.send(event).unwrap())
        .unwrap();

    let push = registry.factory().create(ctx, SocketType::Push).unwrap();
    let router = registry.factory().create(ctx, SocketType::Router).unwrap();
    registry.wiring().bind(router, "tcp://127.0.0.1:7001").unwrap();
    // PUSH cannot talk to ROUTER
    registry.wiring().connect(push, "tcp://127.0.0.1:7001").unwrap();
    registry.wiring().connect(push, "inproc://nobody").unwrap();
    registry.close(push).unwrap();
    registry.close(ctx).unwrap();

    let events: Vec<MonitorEvent> = rx.try_iter().collect();
    let kinds: Vec<EventKind> = events.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::Listening,
            EventKind::ConnectDelayed,
            EventKind::ConnectDelayed,
            EventKind::Disconnected,
            EventKind::Disconnected,
            EventKind::Closed,
            EventKind::MonitorStopped,
        ]
    );
    assert_eq!(events[1].address, "tcp://127.0.0.1:7001");
    assert_eq!(events[2].address, "inproc://nobody");
}

#[test]
fn test_filtered_monitor() {
    let registry = HandleRegistry::local();
    let ctx = registry.open().unwrap();
    let (tx, rx) = flume::unbounded();
    let mask = EventKind::Listening.code() | EventKind::Closed.code();
    registry
        .monitor()
        .attach_filtered(ctx, mask, move |event: MonitorEvent| tx.send(event.kind).unwrap())
        .unwrap();

    let pull = registry.factory().create(ctx, SocketType::Pull).unwrap();
    let push = registry.factory().create(ctx, SocketType::Push).unwrap();
    registry.wiring().bind(pull, "inproc://sink").unwrap();
    registry.wiring().connect(push, "inproc://sink").unwrap();
    registry.wiring().unbind(pull, "inproc://sink").unwrap();
    registry.close(ctx).unwrap();

    let kinds: Vec<EventKind> = rx.try_iter().collect();
    assert_eq!(kinds, vec![EventKind::Listening, EventKind::Closed]);
}

#[test]
fn test_observer_may_close_its_own_context() {
    let registry = Arc::new(HandleRegistry::local());
    let ctx = registry.open().unwrap();
    let (tx, rx) = flume::unbounded();

    let inner = Arc::clone(&registry);
    registry
        .monitor()
        .attach(ctx, move |event: MonitorEvent| {
            if event.kind == EventKind::Listening {
                let _ = tx.send(inner.close(ctx));
            }
        })
        .unwrap();

    let sock = registry.factory().create(ctx, SocketType::Pub).unwrap();
    registry.wiring().bind(sock, "inproc://news").unwrap();

    assert_eq!(rx.recv_timeout(std::time::Duration::from_secs(5)), Ok(Ok(())));
    assert!(!registry.is_live(ctx));
    assert!(!registry.is_live(sock));
}

#[test]
fn test_rejected_attach_releases_observer_handles() {
    let registry = Arc::new(HandleRegistry::new(Arc::new(FaultyEngine {
        reject_monitor: true,
        ..FaultyEngine::default()
    })));
    let ctx = registry.open().unwrap();
    let sock = registry.factory().create(ctx, SocketType::Dealer).unwrap();

    let guard = SocketGuard {
        registry: Arc::clone(&registry),
        socket: sock,
    };
    let (tx, rx) = flume::bounded(1);
    let attacher = Arc::clone(&registry);
    thread::spawn(move || {
        let result = attacher.monitor().attach(ctx, move |_| {
            let _ = &guard;
        });
        let _ = tx.send(result);
    });

    let result = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("attach did not return");
    assert_eq!(result.unwrap_err().native_code(), Some(native::EINVAL));
    // observer was dropped before attach returned
    assert!(!registry.is_live(sock));
    assert!(registry.is_live(ctx));
    registry.close(ctx).unwrap();
}

#[test]
fn test_socket_destroyed_by_engine_still_closes_once() {
    let registry = HandleRegistry::new(Arc::new(FaultyEngine {
        stale_sockets: true,
        ..FaultyEngine::default()
    }));
    let ctx = registry.open().unwrap();
    let sock = registry.factory().create(ctx, SocketType::Router).unwrap();

    assert_eq!(registry.close(sock), Ok(()));
    assert_eq!(registry.close(sock), Err(SpindleError::InvalidHandle(sock)));
    assert!(registry.sockets(ctx).unwrap().is_empty());
    registry.close(ctx).unwrap();
}
