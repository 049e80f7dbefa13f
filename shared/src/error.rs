//! Error types shared by the client and server network cores

use std::net::SocketAddr;
use thiserror::Error;

/// Failures while framing, reading or writing a single connection.
///
/// Every variant is fatal to the connection it occurred on. Nothing here is
/// ever resynchronized: the connection is torn down and the owning core
/// reports the disconnect through its usual channels.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Header too short: got {len} bytes, need {expected}")]
    ShortHeader { len: usize, expected: usize },

    #[error("Unknown message type tag: {0}")]
    UnknownMessageType(i32),

    #[error("Unknown module tag: {0}")]
    UnknownModule(i32),

    #[error("Invalid body length in header: {0}")]
    InvalidBodyLength(i32),

    #[error("Message too large: {size} bytes exceeds maximum {max_size} bytes")]
    MessageTooLarge { size: usize, max_size: usize },

    #[error("Body serialization error: {0}")]
    Serialization(#[from] bincode::Error),
}

impl ProtocolError {
    /// Returns true for the ways a peer ordinarily goes away (clean EOF,
    /// reset, abort, broken pipe) as opposed to genuine failures.
    pub fn is_disconnect(&self) -> bool {
        use std::io::ErrorKind;

        match self {
            ProtocolError::ConnectionClosed => true,
            ProtocolError::Io(e) => matches!(
                e.kind(),
                ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}

/// Errors surfaced by network core constructors.
///
/// The public operations of the cores never return these; they log and
/// report failure through booleans, options or empty collections instead.
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not resolve address: {0}")]
    Resolve(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}
