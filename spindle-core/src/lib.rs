//! Spindle Core
//!
//! This crate contains the engine-agnostic building blocks behind the
//! `spindle` API:
//! - Opaque handles and their owner (`handle`, `registry`)
//! - Socket creation per messaging pattern (`factory`, `socket_type`)
//! - Integer option access and batch configuration (`options`)
//! - Asynchronous lifecycle event delivery (`monitor`)
//! - Endpoint parsing and attachment (`endpoint`, `wiring`)
//! - The engine capability boundary and an in-process engine (`native`, `local`)
//! - Error types (`error`)

#![deny(unsafe_code)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
pub mod endpoint;
pub mod error;
pub mod factory;
pub mod handle;
pub mod local;
pub mod monitor;
pub mod native;
pub mod options;
pub mod registry;
pub mod socket_type;
pub mod wiring;

// A small prelude to make downstream crates ergonomic.
pub mod prelude {
    pub use crate::endpoint::Endpoint;
    pub use crate::error::{Result, SpindleError};
    pub use crate::handle::{Handle, HandleKind};
    pub use crate::local::LocalEngine;
    pub use crate::monitor::{EventKind, MonitorEvent, ALL_EVENTS};
    pub use crate::native::NativeEngine;
    pub use crate::options::{ContextOptions, OptionId};
    pub use crate::registry::HandleRegistry;
    pub use crate::socket_type::SocketType;
}
