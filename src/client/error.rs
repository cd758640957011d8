//! Client error types
//!
//! None of these are returned to callers of the manager's operations; they
//! travel to subscribers as the payload of [`Event::Error`](super::Event::Error).

use thiserror::Error;

use crate::protocol::ProtocolError;

/// Errors raised by a transport implementation
#[derive(Error, Debug)]
pub enum TransportError {
    /// Endpoint could not be turned into a connection request
    #[error("Invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// Connection or handshake failed
    #[error("Connection failed: {0}")]
    Connect(String),

    /// Writing a frame failed
    #[error("Send failed: {0}")]
    Send(String),

    /// Reading a frame failed
    #[error("Receive failed: {0}")]
    Receive(String),
}

/// Error payload delivered to `error` subscribers
#[derive(Error, Debug)]
pub enum ClientError {
    /// Network or transport failure
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Frame could not be decoded or interpreted
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl ClientError {
    /// True for failures of the underlying connection
    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Transport(_))
    }
}
