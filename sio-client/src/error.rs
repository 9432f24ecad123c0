//! Error types for the Socket.IO client
//!
//! Handshake and transport errors end a session; parse errors never reach
//! this layer (the offending frame is dropped and logged).

use sio_common::{HandshakeError, MessageId};
use thiserror::Error;

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Failure reported by the transport collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Receive failed: {0}")]
    Receive(String),

    #[error("Transport closed")]
    Closed,
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => Self::Closed,
            other => Self::Connect(other.to_string()),
        }
    }
}

/// A pending call was cancelled before its acknowledgement arrived.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Call {id} cancelled before an acknowledgement arrived")]
pub struct CallCancelled {
    pub id: MessageId,
}

/// Client error types
#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error(transparent)]
    Cancelled(#[from] CallCancelled),

    #[error("Session is closed")]
    SessionClosed,

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
