//! Socket event monitoring.
//!
//! An observer attached to a context receives lifecycle events
//! (connections, disconnections, binds, closes) for every socket of that
//! context. Events travel from the engine through an [`EventSink`] into a
//! flume channel drained by one delivery thread per monitored context, so
//! observer calls never overlap.
//!
//! The observer runs on the delivery thread, not on the caller's thread.
//! Observers should return quickly: a slow observer delays every event
//! queued behind it.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use dashmap::DashMap;
use tracing::{debug, error, trace, warn};

use crate::error::{Result, SpindleError};
use crate::handle::Handle;
use crate::native::RawHandle;
use crate::registry::{Entry, HandleRegistry};

/// Kinds of monitor events. Each kind is one bit of an event mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum EventKind {
    /// Connection to a peer established.
    Connected = 0x0001,
    /// Connect issued, no peer available yet.
    ConnectDelayed = 0x0002,
    /// Connect is being retried.
    ConnectRetried = 0x0004,
    /// Socket is listening on an endpoint.
    Listening = 0x0008,
    /// Bind failed.
    BindFailed = 0x0010,
    /// Incoming connection accepted.
    Accepted = 0x0020,
    /// Incoming connection could not be accepted.
    AcceptFailed = 0x0040,
    /// Endpoint closed.
    Closed = 0x0080,
    /// Endpoint could not be closed.
    CloseFailed = 0x0100,
    /// Peer connection lost.
    Disconnected = 0x0200,
    /// Monitor detached; always the last event delivered.
    MonitorStopped = 0x0400,
}

/// Mask selecting every event kind.
pub const ALL_EVENTS: u16 = 0xFFFF;

impl EventKind {
    const ALL: [EventKind; 11] = [
        Self::Connected,
        Self::ConnectDelayed,
        Self::ConnectRetried,
        Self::Listening,
        Self::BindFailed,
        Self::Accepted,
        Self::AcceptFailed,
        Self::Closed,
        Self::CloseFailed,
        Self::Disconnected,
        Self::MonitorStopped,
    ];

    /// Numeric event code, also the kind's mask bit.
    #[inline]
    #[must_use]
    pub const fn code(self) -> u16 {
        self as u16
    }

    #[must_use]
    pub fn from_code(code: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code() == code)
    }

    /// Whether `mask` selects this kind.
    #[inline]
    #[must_use]
    pub const fn is_in(self, mask: u16) -> bool {
        mask & self.code() != 0
    }
}

/// One event, handed to the observer exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorEvent {
    /// Socket (or, for `MonitorStopped`, context) the event is about.
    pub source: Handle,
    pub kind: EventKind,
    /// Endpoint the event concerns, empty when there is none.
    pub address: String,
    /// Kind-specific detail value.
    pub details: i64,
}

impl fmt::Display for MonitorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            EventKind::Connected => write!(f, "{} connected to {}", self.source, self.address),
            EventKind::ConnectDelayed => {
                write!(f, "{} connect to {} delayed", self.source, self.address)
            }
            EventKind::ConnectRetried => {
                write!(f, "{} retrying connect to {}", self.source, self.address)
            }
            EventKind::Listening => write!(f, "{} listening on {}", self.source, self.address),
            EventKind::BindFailed => {
                write!(f, "{} bind to {} failed ({})", self.source, self.address, self.details)
            }
            EventKind::Accepted => {
                write!(f, "{} accepted connection on {}", self.source, self.address)
            }
            EventKind::AcceptFailed => {
                write!(f, "{} accept on {} failed ({})", self.source, self.address, self.details)
            }
            EventKind::Closed => write!(f, "{} closed {}", self.source, self.address),
            EventKind::CloseFailed => {
                write!(f, "{} close of {} failed ({})", self.source, self.address, self.details)
            }
            EventKind::Disconnected => {
                write!(f, "{} disconnected from {}", self.source, self.address)
            }
            EventKind::MonitorStopped => write!(f, "{} monitor stopped", self.source),
        }
    }
}

enum Feed {
    Event(MonitorEvent),
    Stop,
}

/// Engine-side entry point of a context's monitor feed.
///
/// Engines call [`EventSink::emit`] with their own raw handles; the sink
/// translates them to registry handles, applies the event mask and queues
/// the event for delivery. Emitting never blocks.
#[derive(Clone)]
pub struct EventSink {
    tx: flume::Sender<Feed>,
    names: Arc<DashMap<RawHandle, Handle>>,
    mask: u16,
}

impl EventSink {
    /// Queue an event about engine resource `source`.
    ///
    /// Events for resources the registry does not know are dropped.
    pub fn emit(&self, source: RawHandle, kind: EventKind, address: &str, details: i64) {
        if !kind.is_in(self.mask) {
            return;
        }
        let Some(source) = self.names.get(&source).map(|entry| *entry.value()) else {
            warn!(raw = source, ?kind, "dropping event for unknown resource");
            return;
        };
        let event = MonitorEvent {
            source,
            kind,
            address: address.to_string(),
            details,
        };
        trace!(%event, "monitor event");
        if self.tx.send(Feed::Event(event)).is_err() {
            trace!("monitor feed closed");
        }
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("mask", &format_args!("{:#06x}", self.mask))
            .finish_non_exhaustive()
    }
}

/// Registry-side state of an attached monitor.
pub(crate) struct MonitorSlot {
    tx: flume::Sender<Feed>,
    mask: u16,
    thread: Option<JoinHandle<()>>,
}

impl MonitorSlot {
    /// Deliver `MonitorStopped` (if selected) and wait for the delivery
    /// thread to drain, unless called from that thread.
    pub(crate) fn stop(mut self, context: Handle) {
        if EventKind::MonitorStopped.is_in(self.mask) {
            let stopped = Feed::Event(MonitorEvent {
                source: context,
                kind: EventKind::MonitorStopped,
                address: String::new(),
                details: 0,
            });
            if self.tx.send(stopped).is_err() {
                warn!(%context, "monitor stopped event not delivered");
            }
        }
        if self.tx.send(Feed::Stop).is_err() {
            trace!(%context, "monitor feed already closed");
        }

        let Some(thread) = self.thread.take() else {
            return;
        };
        if thread.thread().id() == thread::current().id() {
            // closing from inside the observer; the loop ends on Stop
            return;
        }
        if thread.join().is_err() {
            error!(%context, "monitor delivery thread panicked");
        }
    }
}

/// Observer registration for contexts.
///
/// Obtained from [`HandleRegistry::monitor`].
pub struct EventMonitor<'a> {
    registry: &'a HandleRegistry,
}

impl<'a> EventMonitor<'a> {
    pub(crate) fn new(registry: &'a HandleRegistry) -> Self {
        Self { registry }
    }

    /// Attach `observer` to every event of `context`.
    ///
    /// # Errors
    ///
    /// `InvalidContext` if `context` is not a live context,
    /// `AlreadyMonitored` if an observer is already attached,
    /// `ResourceExhausted` if the delivery thread cannot be started.
    pub fn attach<F>(&self, context: Handle, observer: F) -> Result<()>
    where
        F: FnMut(MonitorEvent) + Send + 'static,
    {
        self.attach_filtered(context, ALL_EVENTS, observer)
    }

    /// Attach `observer` to the event kinds selected by `mask`.
    pub fn attach_filtered<F>(&self, context: Handle, mask: u16, observer: F) -> Result<()>
    where
        F: FnMut(MonitorEvent) + Send + 'static,
    {
        let (tx, rx) = flume::unbounded();
        let thread = spawn_delivery(context, rx, observer)
            .map_err(|e| SpindleError::ResourceExhausted(format!("monitor thread: {e}")))?;
        // mask stays 0 until installed so a failed attach sends no stop event
        let mut slot = MonitorSlot {
            tx,
            mask: 0,
            thread: Some(thread),
        };

        let mut state = self.registry.state.lock();
        let failure = match state.entries.get_mut(&context) {
            Some(Entry::Context {
                monitor: Some(_), ..
            }) => SpindleError::AlreadyMonitored(context),
            Some(Entry::Context { raw, monitor, .. }) => {
                let sink = EventSink {
                    tx: slot.tx.clone(),
                    names: Arc::clone(&self.registry.names),
                    mask,
                };
                match self.registry.engine().install_monitor(*raw, sink) {
                    Ok(()) => {
                        slot.mask = mask;
                        *monitor = Some(slot);
                        drop(state);
                        debug!(%context, mask = format_args!("{mask:#06x}"), "monitor attached");
                        return Ok(());
                    }
                    Err(err) => SpindleError::from_native(context, err),
                }
            }
            _ => SpindleError::InvalidContext(context),
        };

        // the observer may own handles of this registry; drop it unlocked
        drop(state);
        slot.stop(context);
        Err(failure)
    }
}

fn spawn_delivery<F>(
    context: Handle,
    rx: flume::Receiver<Feed>,
    mut observer: F,
) -> std::io::Result<JoinHandle<()>>
where
    F: FnMut(MonitorEvent) + Send + 'static,
{
    thread::Builder::new()
        .name(format!("spindle-monitor-{}", context.as_raw()))
        .spawn(move || {
            for feed in rx.iter() {
                let Feed::Event(event) = feed else {
                    break;
                };
                let kind = event.kind;
                if panic::catch_unwind(AssertUnwindSafe(|| observer(event))).is_err() {
                    error!(%context, ?kind, "monitor observer panicked");
                }
            }
            debug!(%context, "monitor delivery finished");
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink_for(names: &[(RawHandle, u64)], mask: u16) -> (EventSink, flume::Receiver<Feed>) {
        let map = DashMap::new();
        for &(raw, handle) in names {
            map.insert(raw, Handle::from_raw(handle).unwrap());
        }
        let (tx, rx) = flume::unbounded();
        let sink = EventSink {
            tx,
            names: Arc::new(map),
            mask,
        };
        (sink, rx)
    }

    fn next_event(rx: &flume::Receiver<Feed>) -> Option<MonitorEvent> {
        match rx.try_recv() {
            Ok(Feed::Event(event)) => Some(event),
            _ => None,
        }
    }

    #[test]
    fn test_event_codes() {
        assert_eq!(EventKind::Connected.code(), 0x0001);
        assert_eq!(EventKind::MonitorStopped.code(), 0x0400);
        assert_eq!(EventKind::from_code(0x0200), Some(EventKind::Disconnected));
        assert_eq!(EventKind::from_code(0x0003), None);
    }

    #[test]
    fn test_sink_translates_raw_handles() {
        let (sink, rx) = sink_for(&[(100, 7)], ALL_EVENTS);
        sink.emit(100, EventKind::Listening, "inproc://jobs", 0);

        let event = next_event(&rx).unwrap();
        assert_eq!(event.source, Handle::from_raw(7).unwrap());
        assert_eq!(event.kind, EventKind::Listening);
        assert_eq!(event.to_string(), "#7 listening on inproc://jobs");
    }

    #[test]
    fn test_sink_applies_mask_and_drops_unknown() {
        let mask = EventKind::Connected.code() | EventKind::Disconnected.code();
        let (sink, rx) = sink_for(&[(1, 1)], mask);

        sink.emit(1, EventKind::Listening, "inproc://a", 0);
        sink.emit(2, EventKind::Connected, "inproc://a", 0);
        sink.emit(1, EventKind::Disconnected, "inproc://a", 0);

        assert_eq!(next_event(&rx).map(|e| e.kind), Some(EventKind::Disconnected));
        assert!(next_event(&rx).is_none());
    }

    #[test]
    fn test_delivery_survives_observer_panic() {
        let (tx, rx) = flume::unbounded();
        let (seen_tx, seen_rx) = flume::unbounded();
        let context = Handle::from_raw(1).unwrap();

        let thread = spawn_delivery(context, rx, move |event: MonitorEvent| {
            if event.details == 1 {
                panic!("observer failure");
            }
            seen_tx.send(event.details).unwrap();
        })
        .unwrap();

        for details in 0..3 {
            tx.send(Feed::Event(MonitorEvent {
                source: context,
                kind: EventKind::Closed,
                address: String::new(),
                details,
            }))
            .unwrap();
        }
        let slot = MonitorSlot {
            tx,
            mask: 0,
            thread: Some(thread),
        };
        slot.stop(context);

        let seen: Vec<i64> = seen_rx.try_iter().collect();
        assert_eq!(seen, vec![0, 2]);
    }
}
