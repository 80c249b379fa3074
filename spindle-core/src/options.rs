//! Integer configuration options for contexts and sockets
//!
//! This module defines the supported option-id space (numbered after
//! libzmq's `zmq_ctx_set`/`zmq_setsockopt` ids), the [`OptionStore`] that
//! reads and writes them through the engine, and the [`ContextOptions`]
//! builder used to configure a context in one call.

use std::fmt;
use std::ops::RangeInclusive;

use hashbrown::HashMap;
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::error::{Result, SpindleError};
use crate::handle::Handle;
use crate::native::{NativeError, EINVAL};
use crate::registry::HandleRegistry;

/// Supported option ids.
///
/// The same id space is accepted on contexts and sockets. Sockets start
/// with a copy of their context's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum OptionId {
    /// Number of I/O threads (ZMQ_IO_THREADS)
    IoThreads = 1,
    /// Maximum number of sockets per context (ZMQ_MAX_SOCKETS)
    MaxSockets = 2,
    /// Largest value `MaxSockets` may take, read-only (ZMQ_SOCKET_LIMIT)
    SocketLimit = 3,
    /// Scheduling policy for I/O threads, -1 leaves the OS default (ZMQ_THREAD_SCHED_POLICY)
    ThreadSchedPolicy = 4,
    /// Maximum message size in bytes (ZMQ_MAX_MSGSZ)
    MaxMsgSize = 5,
    /// Size of the native message struct, read-only (ZMQ_MSG_T_SIZE)
    MsgTSize = 6,
    /// Linger period in milliseconds, -1 waits forever (ZMQ_LINGER)
    Linger = 17,
    /// Reconnect interval in milliseconds (ZMQ_RECONNECT_IVL)
    ReconnectIvl = 18,
    /// Pending connection backlog (ZMQ_BACKLOG)
    Backlog = 19,
    /// Upper bound for reconnect backoff in milliseconds (ZMQ_RECONNECT_IVL_MAX)
    ReconnectIvlMax = 21,
    /// Outbound high water mark in messages (ZMQ_SNDHWM)
    SendHwm = 23,
    /// Inbound high water mark in messages (ZMQ_RCVHWM)
    RecvHwm = 24,
    /// Receive timeout in milliseconds, -1 blocks (ZMQ_RCVTIMEO)
    RecvTimeout = 27,
    /// Send timeout in milliseconds, -1 blocks (ZMQ_SNDTIMEO)
    SendTimeout = 28,
    /// Queue only to completed connections (ZMQ_IMMEDIATE)
    Immediate = 39,
    /// Enable IPv6 (ZMQ_IPV6)
    Ipv6 = 42,
    /// Handshake timeout in milliseconds (ZMQ_HANDSHAKE_IVL)
    HandshakeIvl = 66,
    /// Block context termination on pending messages (ZMQ_BLOCKY)
    Blocky = 70,
    /// Connect timeout in milliseconds, 0 uses the OS default (ZMQ_CONNECT_TIMEOUT)
    ConnectTimeout = 79,
}

impl OptionId {
    /// Every supported option, in id order.
    pub const ALL: [OptionId; 19] = [
        Self::IoThreads,
        Self::MaxSockets,
        Self::SocketLimit,
        Self::ThreadSchedPolicy,
        Self::MaxMsgSize,
        Self::MsgTSize,
        Self::Linger,
        Self::ReconnectIvl,
        Self::Backlog,
        Self::ReconnectIvlMax,
        Self::SendHwm,
        Self::RecvHwm,
        Self::RecvTimeout,
        Self::SendTimeout,
        Self::Immediate,
        Self::Ipv6,
        Self::HandshakeIvl,
        Self::Blocky,
        Self::ConnectTimeout,
    ];

    /// Look up an option by its numeric id.
    #[must_use]
    pub fn from_raw(id: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|option| option.as_raw() == id)
    }

    #[inline]
    #[must_use]
    pub const fn as_raw(self) -> i32 {
        self as i32
    }

    /// Value a fresh context starts with.
    #[must_use]
    pub const fn default_value(self) -> i32 {
        match self {
            Self::IoThreads => 1,
            Self::MaxSockets => 1023,
            Self::SocketLimit => 65535,
            Self::ThreadSchedPolicy => -1,
            Self::MaxMsgSize => i32::MAX,
            Self::MsgTSize => 64,
            Self::Linger => -1,
            Self::ReconnectIvl => 100,
            Self::Backlog => 100,
            Self::ReconnectIvlMax => 0,
            Self::SendHwm | Self::RecvHwm => 1000,
            Self::RecvTimeout | Self::SendTimeout => -1,
            Self::Immediate | Self::Ipv6 => 0,
            Self::HandshakeIvl => 30_000,
            Self::Blocky => 1,
            Self::ConnectTimeout => 0,
        }
    }

    /// Accepted values, or `None` for read-only options.
    #[must_use]
    pub fn range(self) -> Option<RangeInclusive<i32>> {
        match self {
            Self::SocketLimit | Self::MsgTSize => None,
            Self::IoThreads => Some(0..=1024),
            Self::MaxSockets => Some(1..=65535),
            Self::ThreadSchedPolicy
            | Self::Linger
            | Self::ReconnectIvl
            | Self::RecvTimeout
            | Self::SendTimeout => Some(-1..=i32::MAX),
            Self::MaxMsgSize
            | Self::Backlog
            | Self::ReconnectIvlMax
            | Self::SendHwm
            | Self::RecvHwm
            | Self::HandshakeIvl
            | Self::ConnectTimeout => Some(0..=i32::MAX),
            Self::Immediate | Self::Ipv6 | Self::Blocky => Some(0..=1),
        }
    }

    #[must_use]
    pub fn is_writable(self) -> bool {
        self.range().is_some()
    }

    /// Check `value` the way an engine would before storing it.
    pub fn validate(self, value: i32) -> std::result::Result<(), NativeError> {
        match self.range() {
            None => Err(NativeError::new(EINVAL, format!("{self} is read-only"))),
            Some(range) if !range.contains(&value) => Err(NativeError::new(
                EINVAL,
                format!("{self} out of range: {value} not in {range:?}"),
            )),
            Some(_) => Ok(()),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IoThreads => "IO_THREADS",
            Self::MaxSockets => "MAX_SOCKETS",
            Self::SocketLimit => "SOCKET_LIMIT",
            Self::ThreadSchedPolicy => "THREAD_SCHED_POLICY",
            Self::MaxMsgSize => "MAX_MSGSZ",
            Self::MsgTSize => "MSG_T_SIZE",
            Self::Linger => "LINGER",
            Self::ReconnectIvl => "RECONNECT_IVL",
            Self::Backlog => "BACKLOG",
            Self::ReconnectIvlMax => "RECONNECT_IVL_MAX",
            Self::SendHwm => "SNDHWM",
            Self::RecvHwm => "RCVHWM",
            Self::RecvTimeout => "RCVTIMEO",
            Self::SendTimeout => "SNDTIMEO",
            Self::Immediate => "IMMEDIATE",
            Self::Ipv6 => "IPV6",
            Self::HandshakeIvl => "HANDSHAKE_IVL",
            Self::Blocky => "BLOCKY",
            Self::ConnectTimeout => "CONNECT_TIMEOUT",
        }
    }
}

impl From<OptionId> for i32 {
    fn from(option: OptionId) -> Self {
        option.as_raw()
    }
}

impl fmt::Display for OptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-resource option values, for engines that keep options in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionTable {
    values: HashMap<OptionId, i32>,
}

impl Default for OptionTable {
    fn default() -> Self {
        Self {
            values: OptionId::ALL
                .into_iter()
                .map(|option| (option, option.default_value()))
                .collect(),
        }
    }
}

impl OptionTable {
    #[must_use]
    pub fn get(&self, option: OptionId) -> i32 {
        self.values
            .get(&option)
            .copied()
            .unwrap_or_else(|| option.default_value())
    }

    /// Validate and store a value.
    pub fn set(&mut self, option: OptionId, value: i32) -> std::result::Result<(), NativeError> {
        option.validate(value)?;
        self.values.insert(option, value);
        Ok(())
    }
}

/// Typed get/set of integer options on registry handles.
///
/// Obtained from [`HandleRegistry::options`].
pub struct OptionStore<'a> {
    registry: &'a HandleRegistry,
}

impl<'a> OptionStore<'a> {
    pub(crate) fn new(registry: &'a HandleRegistry) -> Self {
        Self { registry }
    }

    /// Read option `option` of a context or socket.
    ///
    /// # Errors
    ///
    /// `InvalidHandle` if the handle is not live, `UnknownOption` if the id
    /// is outside the supported set, `NativeFailure` if the engine refuses.
    pub fn get(&self, handle: Handle, option: impl Into<i32>) -> Result<i32> {
        let id = option.into();
        let raw = self.registry.raw(handle)?;
        let option = OptionId::from_raw(id).ok_or(SpindleError::UnknownOption(id))?;

        let value = self
            .registry
            .engine()
            .get_option(raw, option)
            .map_err(|e| SpindleError::from_native(handle, e))?;
        trace!(%handle, %option, value, "get option");
        Ok(value)
    }

    /// Write option `option` of a context or socket.
    ///
    /// Range checks are left to the engine; a rejected value surfaces as
    /// `NativeFailure`.
    pub fn set(&self, handle: Handle, option: impl Into<i32>, value: i32) -> Result<()> {
        let id = option.into();
        let raw = self.registry.raw(handle)?;
        let option = OptionId::from_raw(id).ok_or(SpindleError::UnknownOption(id))?;

        self.registry
            .engine()
            .set_option(raw, option, value)
            .map_err(|e| SpindleError::from_native(handle, e))?;
        trace!(%handle, %option, value, "set option");
        Ok(())
    }

    /// Apply `(option, value)` pairs in order.
    ///
    /// Stops at the first failure and returns it. Options applied before the
    /// failing entry stay applied.
    pub fn configure_batch<I, K>(&self, handle: Handle, pairs: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, i32)>,
        K: Into<i32>,
    {
        for (index, (option, value)) in pairs.into_iter().enumerate() {
            let id = option.into();
            if let Err(err) = self.set(handle, id, value) {
                debug!(%handle, index, option = id, %err, "batch configuration stopped");
                return Err(err);
            }
        }
        Ok(())
    }
}

/// Context-level configuration applied at open time.
///
/// Unset fields keep the engine's defaults.
///
/// # Examples
///
/// ```
/// use spindle_core::options::{ContextOptions, OptionId};
///
/// let opts = ContextOptions::new()
///     .with_io_threads(2)
///     .with_ipv6(true);
///
/// let pairs = opts.pairs();
/// assert_eq!(pairs[0], (OptionId::IoThreads, 2));
/// assert_eq!(pairs[1], (OptionId::Ipv6, 1));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextOptions {
    /// I/O thread count (ZMQ_IO_THREADS)
    pub io_threads: Option<i32>,

    /// Socket limit for the context (ZMQ_MAX_SOCKETS)
    pub max_sockets: Option<i32>,

    /// I/O thread scheduling policy (ZMQ_THREAD_SCHED_POLICY)
    pub thread_sched_policy: Option<i32>,

    /// Largest accepted message (ZMQ_MAX_MSGSZ)
    pub max_msg_size: Option<i32>,

    /// IPv6 on sockets of this context (ZMQ_IPV6)
    pub ipv6: Option<bool>,

    /// Wait for pending messages on termination (ZMQ_BLOCKY)
    pub blocky: Option<bool>,
}

impl ContextOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_io_threads(mut self, threads: i32) -> Self {
        self.io_threads = Some(threads);
        self
    }

    pub fn with_max_sockets(mut self, max: i32) -> Self {
        self.max_sockets = Some(max);
        self
    }

    pub fn with_thread_sched_policy(mut self, policy: i32) -> Self {
        self.thread_sched_policy = Some(policy);
        self
    }

    pub fn with_max_msg_size(mut self, size: i32) -> Self {
        self.max_msg_size = Some(size);
        self
    }

    pub fn with_ipv6(mut self, enabled: bool) -> Self {
        self.ipv6 = Some(enabled);
        self
    }

    pub fn with_blocky(mut self, enabled: bool) -> Self {
        self.blocky = Some(enabled);
        self
    }

    /// The configured options as an ordered batch for
    /// [`OptionStore::configure_batch`].
    #[must_use]
    pub fn pairs(&self) -> SmallVec<[(OptionId, i32); 6]> {
        let mut pairs: SmallVec<[(OptionId, i32); 6]> = SmallVec::new();
        let mut push = |option: OptionId, value: Option<i32>| {
            if let Some(value) = value {
                pairs.push((option, value));
            }
        };
        push(OptionId::IoThreads, self.io_threads);
        push(OptionId::MaxSockets, self.max_sockets);
        push(OptionId::ThreadSchedPolicy, self.thread_sched_policy);
        push(OptionId::MaxMsgSize, self.max_msg_size);
        push(OptionId::Ipv6, self.ipv6.map(i32::from));
        push(OptionId::Blocky, self.blocky.map(i32::from));
        pairs
    }
}
