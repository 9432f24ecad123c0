//! Session states and the notifications a session publishes

use serde::{Deserialize, Serialize};

/// Lifecycle of a [`Session`](crate::Session).
///
/// `Idle -> HandshakePending -> TransportConnecting -> Connected`, ending in
/// `Disconnected` (local close or peer close) or `Failed` (handshake,
/// transport or liveness failure). `open` is accepted again from `Idle`,
/// `Disconnected` and `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    HandshakePending,
    TransportConnecting,
    Connected,
    Disconnected,
    Failed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::HandshakePending => "handshake_pending",
            Self::TransportConnecting => "transport_connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
        }
    }

    pub fn can_open(&self) -> bool {
        matches!(self, Self::Idle | Self::Disconnected | Self::Failed)
    }

    /// Whether a transport link exists in this state.
    pub fn is_linked(&self) -> bool {
        matches!(self, Self::TransportConnecting | Self::Connected)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a session ended in [`SessionState::Failed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    Transport(String),
    /// No inbound traffic within the negotiated connection timeout (ms).
    LivenessTimeout(u32),
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(msg) => write!(f, "transport error: {}", msg),
            Self::LivenessTimeout(ms) => write!(f, "no traffic for {}ms", ms),
        }
    }
}

/// Notifications published by a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Connected(String),
    Disconnected(String),
    Message(String),
    JsonMessage(String),
    Error { reason: String, advice: String },
    HeartbeatReceived,
    Noop(String),
    /// The peer closed the transport without a local `close`.
    TransportClosed,
    Failed(FailureReason),
}
