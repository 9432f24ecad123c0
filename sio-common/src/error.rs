//! Error types for the Socket.IO 1.x protocol layer

use thiserror::Error;

/// A transport text message that could not be turned into a [`Frame`](crate::Frame).
///
/// Parse errors are local: the offending message is dropped and the session
/// keeps running.
#[derive(Error, Debug)]
pub enum ProtocolParseError {
    #[error("Malformed frame: {0}")]
    Malformed(String),

    #[error("Event payload has no name")]
    MissingEventName,

    #[error("Arguments are not a JSON array")]
    InvalidArgs,

    #[error("JSON decode error: {0}")]
    JsonDecode(#[from] serde_json::Error),
}

/// Failure of the HTTP bootstrap call that precedes the transport upgrade.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("Handshake rejected with HTTP status {0}")]
    Rejected(u16),

    #[error("Malformed handshake response: {0}")]
    MalformedResponse(String),

    #[error("Server does not offer the websocket transport (offered: {0})")]
    UnsupportedTransport(String),

    #[error("Handshake request failed: {0}")]
    Request(String),
}

pub type ProtocolResult<T> = Result<T, ProtocolParseError>;
pub type HandshakeResult<T> = Result<T, HandshakeError>;
