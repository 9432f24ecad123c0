//! Core types for the Socket.IO 1.x text protocol

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message id carried by frames that expect an acknowledgement.
///
/// Ids start at 1; 0 never appears on a decoded [`Frame`] and means "no id".
pub type MessageId = u32;

/// The nine frame types of the protocol, numbered by their wire digit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameType {
    Disconnect,
    Connect,
    Heartbeat,
    Message,
    JsonMessage,
    Event,
    Ack,
    Error,
    Noop,
}

impl FrameType {
    pub fn as_digit(&self) -> u8 {
        match self {
            Self::Disconnect => 0,
            Self::Connect => 1,
            Self::Heartbeat => 2,
            Self::Message => 3,
            Self::JsonMessage => 4,
            Self::Event => 5,
            Self::Ack => 6,
            Self::Error => 7,
            Self::Noop => 8,
        }
    }

    pub fn from_digit(digit: u8) -> Option<Self> {
        match digit {
            0 => Some(Self::Disconnect),
            1 => Some(Self::Connect),
            2 => Some(Self::Heartbeat),
            3 => Some(Self::Message),
            4 => Some(Self::JsonMessage),
            5 => Some(Self::Event),
            6 => Some(Self::Ack),
            7 => Some(Self::Error),
            8 => Some(Self::Noop),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnect => "disconnect",
            Self::Connect => "connect",
            Self::Heartbeat => "heartbeat",
            Self::Message => "message",
            Self::JsonMessage => "json_message",
            Self::Event => "event",
            Self::Ack => "ack",
            Self::Error => "error",
            Self::Noop => "noop",
        }
    }
}

impl std::fmt::Display for FrameType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Type-specific body of a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Disconnect,
    Connect,
    Heartbeat,
    /// Plain text, passed through verbatim
    Message(String),
    /// Raw JSON text, not decoded further
    JsonMessage(String),
    Event {
        name: String,
        args: Vec<Value>,
    },
    /// Acknowledgement of the frame with id `ack_id`. `args` is `None` when
    /// the peer returned nothing.
    Ack {
        ack_id: MessageId,
        args: Option<Vec<Value>>,
    },
    Error {
        reason: String,
        advice: String,
    },
    Noop(String),
}

impl Packet {
    pub fn frame_type(&self) -> FrameType {
        match self {
            Self::Disconnect => FrameType::Disconnect,
            Self::Connect => FrameType::Connect,
            Self::Heartbeat => FrameType::Heartbeat,
            Self::Message(_) => FrameType::Message,
            Self::JsonMessage(_) => FrameType::JsonMessage,
            Self::Event { .. } => FrameType::Event,
            Self::Ack { .. } => FrameType::Ack,
            Self::Error { .. } => FrameType::Error,
            Self::Noop(_) => FrameType::Noop,
        }
    }
}

/// One unit of the wire protocol: `type:[id][+]:[endpoint]:[data]`.
///
/// `ack_requested` is the explicit `+` marker and is only meaningful when
/// `id` is present. A frame with an id and no marker asks for an automatic
/// acknowledgement; with the marker it asks for one carrying the handler's
/// return value.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub id: Option<MessageId>,
    pub ack_requested: bool,
    pub endpoint: String,
    pub packet: Packet,
}

impl Frame {
    pub fn new(packet: Packet) -> Self {
        Self {
            id: None,
            ack_requested: false,
            endpoint: String::new(),
            packet,
        }
    }

    pub fn connect(endpoint: impl Into<String>) -> Self {
        Self::new(Packet::Connect).with_endpoint(endpoint)
    }

    pub fn disconnect(endpoint: impl Into<String>) -> Self {
        Self::new(Packet::Disconnect).with_endpoint(endpoint)
    }

    pub fn heartbeat() -> Self {
        Self::new(Packet::Heartbeat)
    }

    pub fn message(text: impl Into<String>) -> Self {
        Self::new(Packet::Message(text.into()))
    }

    pub fn event(name: impl Into<String>, args: Vec<Value>) -> Self {
        Self::new(Packet::Event {
            name: name.into(),
            args,
        })
    }

    pub fn ack(ack_id: MessageId, args: Option<Vec<Value>>) -> Self {
        Self::new(Packet::Ack { ack_id, args })
    }

    pub fn error(reason: impl Into<String>, advice: impl Into<String>) -> Self {
        Self::new(Packet::Error {
            reason: reason.into(),
            advice: advice.into(),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Attach a message id. Id 0 clears the id and the `+` marker.
    pub fn with_id(mut self, id: MessageId, ack_requested: bool) -> Self {
        if id == 0 {
            self.id = None;
            self.ack_requested = false;
        } else {
            self.id = Some(id);
            self.ack_requested = ack_requested;
        }
        self
    }

    pub fn frame_type(&self) -> FrameType {
        self.packet.frame_type()
    }

    /// Id the receiver must acknowledge automatically, without a payload.
    pub fn auto_ack_id(&self) -> Option<MessageId> {
        self.id.filter(|_| !self.ack_requested)
    }

    /// Id the receiver must acknowledge with the handler's return value.
    pub fn manual_ack_id(&self) -> Option<MessageId> {
        self.id.filter(|_| self.ack_requested)
    }
}
