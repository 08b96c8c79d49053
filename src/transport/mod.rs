//! # Transport
//!
//! Fire-and-forget OSC plumbing between the dispatch engine and the game client.
//!
//! ```text
//! transport/
//! ├── osc.rs       - OSC 1.0 message/bundle codec
//! ├── sender.rs    - UDP parameter sender (implements ParameterSink)
//! └── listener.rs  - inbound avatar-change listener
//! ```
//!
//! Outbound traffic never waits for an acknowledgement and is never retried. The
//! only inbound traffic we care about is the context-change notification, which is
//! forwarded into the driver loop through a channel so that resynchronisation runs
//! on the same task that owns the per-action state.

pub mod listener;
pub mod osc;
pub mod sender;

#[cfg(test)]
pub mod recording;

use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};

/// Address root every outbound parameter is published under.
pub const AVATAR_PARAMETERS_PREFIX: &str = "/avatar/parameters/";

/// Address of the inbound avatar-change notification.
pub const AVATAR_CHANGE_ADDRESS: &str = "/avatar/change";

/// A single value as it goes on the wire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamValue {
    Bool(bool),
    Int(i32),
    Float(f32),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(v) => write!(f, "{}", v),
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{:.4}", v),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Int(value)
    }
}

impl From<f32> for ParamValue {
    fn from(value: f32) -> Self {
        ParamValue::Float(value)
    }
}

/// Outbound side of the transport.
///
/// Implementations must not block and must not fail loudly: a lost datagram is an
/// accepted outcome, so errors are logged and swallowed inside the sink.
pub trait ParameterSink: Send {
    /// Publishes `value` under `parameter` (without the namespace root).
    fn send_parameter(&mut self, parameter: &str, value: ParamValue);
}

/// A context-change notification received from the game client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextChange {
    pub context_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Port {0} is already bound by another process")]
    BindConflict(u16),

    #[error("Socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed OSC packet: {0}")]
    Decode(String),
}

/// Resolves a host name or IP literal to the first matching socket address.
pub fn resolve(host: &str, port: u16) -> Result<SocketAddr, TransportError> {
    (host, port).to_socket_addrs()?.next().ok_or_else(|| {
        TransportError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("could not resolve {}:{}", host, port),
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_hostnames_and_ipv6_literals() {
        let addr = resolve("127.0.0.1", 9001).unwrap();
        assert_eq!(addr, SocketAddr::from(([127, 0, 0, 1], 9001)));

        let addr = resolve("localhost", 9001).unwrap();
        assert!(addr.ip().is_loopback());
        assert_eq!(addr.port(), 9001);

        let addr = resolve("::1", 9001).unwrap();
        assert!(addr.is_ipv6());
        assert!(addr.ip().is_loopback());
    }
}
