//! Opaque handles for contexts and sockets.

use std::fmt;
use std::num::NonZeroU64;

/// Opaque identifier for a context or socket owned by a
/// [`HandleRegistry`](crate::registry::HandleRegistry).
///
/// Handles are allocated from a monotonically increasing counter and are
/// never reused by the registry that issued them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(NonZeroU64);

impl Handle {
    /// Build a handle from its raw value. Returns `None` for zero.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Option<Self> {
        match NonZeroU64::new(raw) {
            Some(id) => Some(Self(id)),
            None => None,
        }
    }

    /// Raw numeric value of the handle.
    #[inline]
    #[must_use]
    pub const fn as_raw(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What kind of resource a handle refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    Context,
    Socket,
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Context => f.write_str("context"),
            Self::Socket => f.write_str("socket"),
        }
    }
}
