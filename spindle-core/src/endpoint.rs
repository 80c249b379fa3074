//! Endpoint addresses accepted by bind/connect.
//!
//! The core only validates and records endpoints; it never opens a
//! transport for them.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use crate::native::{NativeError, EINVAL, EPROTONOSUPPORT};

/// Transport endpoint address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// `tcp://host:port`
    Tcp(SocketAddr),
    /// `ipc:///path/to/socket`
    #[cfg(unix)]
    Ipc(PathBuf),
    /// `inproc://name`
    Inproc(String),
}

impl Endpoint {
    /// Parse an endpoint from a string.
    ///
    /// # Examples
    ///
    /// ```
    /// use spindle_core::endpoint::Endpoint;
    ///
    /// let endpoint = Endpoint::parse("tcp://127.0.0.1:5555").unwrap();
    /// assert_eq!(endpoint.scheme(), "tcp");
    ///
    /// let endpoint = Endpoint::parse("inproc://workers").unwrap();
    /// assert_eq!(endpoint.to_string(), "inproc://workers");
    /// ```
    pub fn parse(s: &str) -> Result<Self, EndpointError> {
        s.parse()
    }

    /// Transport scheme without the `://` separator.
    #[must_use]
    pub fn scheme(&self) -> &'static str {
        match self {
            Endpoint::Tcp(_) => "tcp",
            #[cfg(unix)]
            Endpoint::Ipc(_) => "ipc",
            Endpoint::Inproc(_) => "inproc",
        }
    }
}

impl FromStr for Endpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(addr) = s.strip_prefix("tcp://") {
            addr.parse::<SocketAddr>()
                .map(Endpoint::Tcp)
                .map_err(|_| EndpointError::InvalidTcpAddress(addr.to_string()))
        } else if let Some(path) = s.strip_prefix("ipc://") {
            #[cfg(unix)]
            {
                if path.is_empty() {
                    return Err(EndpointError::EmptyIpcPath);
                }
                Ok(Endpoint::Ipc(PathBuf::from(path)))
            }
            #[cfg(not(unix))]
            {
                let _ = path;
                Err(EndpointError::IpcNotSupported)
            }
        } else if let Some(name) = s.strip_prefix("inproc://") {
            if name.is_empty() {
                Err(EndpointError::EmptyInprocName)
            } else {
                Ok(Endpoint::Inproc(name.to_string()))
            }
        } else {
            Err(EndpointError::InvalidScheme(s.to_string()))
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp(addr) => write!(f, "tcp://{addr}"),
            #[cfg(unix)]
            Endpoint::Ipc(path) => write!(f, "ipc://{}", path.display()),
            Endpoint::Inproc(name) => write!(f, "inproc://{name}"),
        }
    }
}

/// Errors that can occur when parsing endpoints.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EndpointError {
    #[error("Invalid scheme in endpoint: {0} (expected tcp://, ipc://, or inproc://)")]
    InvalidScheme(String),

    #[error("Invalid TCP address: {0}")]
    InvalidTcpAddress(String),

    #[error("inproc name cannot be empty")]
    EmptyInprocName,

    #[error("ipc path cannot be empty")]
    EmptyIpcPath,

    #[error("IPC transport not supported on this platform")]
    IpcNotSupported,
}

impl From<EndpointError> for NativeError {
    fn from(err: EndpointError) -> Self {
        let code = match err {
            EndpointError::InvalidScheme(_) | EndpointError::IpcNotSupported => EPROTONOSUPPORT,
            _ => EINVAL,
        };
        NativeError::new(code, err.to_string())
    }
}
