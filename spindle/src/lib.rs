//! # Spindle
//!
//! Context and socket handles for message-queue sockets, with one helper per
//! messaging pattern, typed option accessors and a monitor callback.
//!
//! ## Architecture
//!
//! - **`spindle-core`**: handle registry, socket factory, option store,
//!   event monitor and the engine capability trait
//! - **`spindle`**: RAII `Context`/`Socket` wrappers (this crate)
//!
//! ## Quick Start
//!
//! ```rust
//! use spindle::prelude::*;
//!
//! # fn main() -> spindle::Result<()> {
//! let ctx = Context::new()?;
//! ctx.set_io_threads(2)?;
//!
//! ctx.monitor(|event| println!("{event}"))?;
//!
//! let server = ctx.rep()?;
//! server.bind("inproc://echo")?;
//!
//! let client = ctx.req()?;
//! client.set_send_hwm(10)?;
//! client.connect("inproc://echo")?;
//!
//! ctx.close()?;
//! // sockets die with their context
//! assert!(client.send_hwm().is_err());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod context;
pub mod dev_tracing;
mod socket;

pub use context::Context;
pub use socket::Socket;

// Re-export core types
pub use spindle_core::error::{Result, SpindleError};
pub use spindle_core::handle::{Handle, HandleKind};
pub use spindle_core::local::LocalEngine;
pub use spindle_core::monitor::{EventKind, MonitorEvent, ALL_EVENTS};
pub use spindle_core::native::NativeEngine;
pub use spindle_core::options::{ContextOptions, OptionId};
pub use spindle_core::registry::HandleRegistry;
pub use spindle_core::socket_type::SocketType;

/// Convenient imports.
///
/// # Example
///
/// ```rust
/// use spindle::prelude::*;
///
/// // Now you have:
/// // - Context, Socket, SocketType
/// // - ContextOptions, OptionId
/// // - EventKind, MonitorEvent
/// ```
pub mod prelude {
    pub use super::{
        Context, ContextOptions, EventKind, MonitorEvent, OptionId, Socket, SocketType,
        SpindleError,
    };
}
