//! Handshake response parsing
//!
//! The HTTP bootstrap call answers with a plain-text body of four
//! colon-separated fields:
//! `sessionId:heartbeatTimeoutSeconds:connectionTimeoutSeconds:transports`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{HandshakeError, HandshakeResult};

/// Protocol revision in the handshake and transport paths (`/socket.io/1/`).
pub const PROTOCOL_VERSION: u8 = 1;

/// The only transport this client upgrades to.
pub const WEBSOCKET_TRANSPORT: &str = "websocket";

/// Subtracted from the server's heartbeat timeout so ours fires first.
pub const HEARTBEAT_SAFETY_MARGIN_MS: u32 = 500;

/// Session parameters negotiated by the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionParams {
    pub session_id: String,
    /// `None` when the server disabled heartbeats (empty or zero field).
    pub heartbeat_interval_ms: Option<u32>,
    /// `None` when the server sent no connection timeout.
    pub connection_timeout_ms: Option<u32>,
    pub transports: Vec<String>,
}

impl SessionParams {
    /// Parse a handshake response body.
    pub fn parse(body: &str) -> HandshakeResult<Self> {
        let fields: Vec<&str> = body.trim().split(':').collect();
        let [session_id, heartbeat, timeout, transports] = fields.as_slice() else {
            return Err(HandshakeError::MalformedResponse(format!(
                "expected 4 fields, got {}",
                fields.len()
            )));
        };

        if session_id.is_empty() {
            return Err(HandshakeError::MalformedResponse("empty session id".into()));
        }

        let heartbeat_interval_ms = parse_seconds(heartbeat, "heartbeat timeout")?
            .map(|ms| ms.saturating_sub(HEARTBEAT_SAFETY_MARGIN_MS))
            .filter(|ms| *ms > 0);
        let connection_timeout_ms = parse_seconds(timeout, "connection timeout")?;

        let transports = transports
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect();

        Ok(Self {
            session_id: session_id.to_string(),
            heartbeat_interval_ms,
            connection_timeout_ms,
            transports,
        })
    }

    pub fn supports(&self, transport: &str) -> bool {
        self.transports.iter().any(|t| t == transport)
    }

    pub fn heartbeat_interval(&self) -> Option<Duration> {
        self.heartbeat_interval_ms
            .map(|ms| Duration::from_millis(u64::from(ms)))
    }

    pub fn connection_timeout(&self) -> Option<Duration> {
        self.connection_timeout_ms
            .map(|ms| Duration::from_millis(u64::from(ms)))
    }
}

/// Seconds field to milliseconds; empty or zero disables the timer.
fn parse_seconds(field: &str, what: &str) -> HandshakeResult<Option<u32>> {
    let field = field.trim();
    if field.is_empty() {
        return Ok(None);
    }

    let seconds: u32 = field
        .parse()
        .map_err(|_| HandshakeError::MalformedResponse(format!("invalid {}: {:?}", what, field)))?;
    let ms = seconds
        .checked_mul(1000)
        .ok_or_else(|| HandshakeError::MalformedResponse(format!("{} out of range: {}", what, seconds)))?;

    Ok(Some(ms).filter(|ms| *ms > 0))
}
