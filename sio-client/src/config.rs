//! Client configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Whether an emit without a continuation asks the peer for an
/// acknowledgement.
///
/// Emits with a continuation always send `id+` regardless of this policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmitAckPolicy {
    /// `5:N+::...`: the peer acknowledges with data that is discarded locally.
    #[default]
    DataAck,
    /// `5:N::...`: the peer acknowledges automatically, without data.
    AutoAck,
    /// `5:::...`: no id, nothing is acknowledged.
    NoAck,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Endpoint (namespace) to request. Defaults to the path of the URL
    /// passed to `open`.
    pub endpoint: Option<String>,
    pub handshake_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub emit_ack_policy: EmitAckPolicy,
    /// Capacity of the session command channel.
    pub command_buffer: usize,
    /// Capacity of the notification broadcast channel.
    pub event_buffer: usize,
    /// Use `https://` and `wss://` even for `ws://` URLs.
    pub secure: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            handshake_timeout_ms: 10_000,
            connect_timeout_ms: 10_000,
            emit_ack_policy: EmitAckPolicy::default(),
            command_buffer: 64,
            event_buffer: 256,
            secure: false,
        }
    }
}

impl ClientConfig {
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_emit_ack_policy(mut self, policy: EmitAckPolicy) -> Self {
        self.emit_ack_policy = policy;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}
