//! Socket.IO 1.x Client
//!
//! Opens a session against a Socket.IO 1.x server, emits events with
//! optional acknowledgement callbacks, dispatches server events to
//! subscribed handlers and keeps the session alive with heartbeats.
//!
//! # Architecture
//!
//! ```text
//! Session (handle, Clone)
//!     ↓ Command channel
//! Session actor (one task)
//!     ├── HandshakeNegotiator ── HttpFetch (reqwest)
//!     ├── Dispatcher ── MessageIdAllocator
//!     ├── heartbeat Interval + liveness watchdog
//!     └── TransportLink ── Connector (tokio-tungstenite)
//!     ↓ watch (state) / broadcast (SessionEvent)
//! Application
//! ```
//!
//! # Session Lifecycle
//!
//! 1. `open(url)` - HTTP handshake, then the WebSocket transport connects
//! 2. Server sends `1::<endpoint>` - session is `Connected`, heartbeats start
//! 3. `emit`/`call`/`on` exchange events until `close()` or a failure
//!
//! # Example
//!
//! ```no_run
//! use serde_json::json;
//! use sio_client::{ClientConfig, ClientResult, Session};
//!
//! async fn greet() -> ClientResult<()> {
//!     let session = Session::new(ClientConfig::default());
//!     session.on("news", |args| {
//!         println!("news: {:?}", args);
//!         Some(json!("thanks"))
//!     }).await?;
//!
//!     session.open("ws://localhost:9000").await?;
//!     session.wait_connected().await?;
//!
//!     let reply = session.call("hello", vec![json!("world")]).await?;
//!     println!("server replied {:?}", reply);
//!     session.close().await
//! }
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handshake;
pub mod id;
pub mod session;
pub mod state;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use config::{ClientConfig, EmitAckPolicy};
pub use dispatcher::{AckContinuation, Dispatch, Dispatcher, EventHandler};
pub use error::{CallCancelled, ClientError, ClientResult, TransportError};
pub use handshake::{HandshakeNegotiator, HttpFetch, HttpReply, ReqwestFetch, SocketUrl};
pub use id::MessageIdAllocator;
pub use session::Session;
pub use state::{FailureReason, SessionEvent, SessionState};
pub use transport::{Connector, FrameSink, TransportEvent, TransportLink, WsConnector};

pub use sio_common::{Frame, FrameType, HandshakeError, MessageId, Packet, SessionParams};
