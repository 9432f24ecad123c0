//! Text-frame transport collaborator
//!
//! A [`Connector`] opens a [`TransportLink`]: a sink for outbound text frames
//! and a channel of inbound [`TransportEvent`]s. The WebSocket implementation
//! runs a reader task that forwards frames into that channel, so the session
//! actor consumes transport input from a single queue.

use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::error::TransportError;

/// Capacity of the inbound frame channel of a link.
const INBOUND_BUFFER: usize = 256;

/// Lifecycle and data notifications from a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Text(String),
    /// The peer closed the connection.
    Closed,
    Error(TransportError),
}

#[async_trait]
pub trait FrameSink: Send {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    async fn close(&mut self) -> Result<(), TransportError>;
}

/// An open transport connection.
pub struct TransportLink {
    pub sink: Box<dyn FrameSink>,
    pub events: mpsc::Receiver<TransportEvent>,
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<TransportLink, TransportError>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// [`Connector`] backed by `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<TransportLink, TransportError> {
        let (ws_stream, _) = connect_async(url).await.map_err(TransportError::from)?;
        info!("WebSocket connected: {}", url);

        let (write, mut read) = ws_stream.split();
        let (tx, rx) = mpsc::channel(INBOUND_BUFFER);

        let reader = tokio::spawn(async move {
            while let Some(msg) = read.next().await {
                let event = match msg {
                    Ok(Message::Text(text)) => TransportEvent::Text(text),
                    Ok(Message::Binary(data)) => {
                        debug!("Ignoring binary message ({} bytes)", data.len());
                        continue;
                    }
                    Ok(Message::Close(frame)) => {
                        debug!("WebSocket closed by server: {:?}", frame);
                        break;
                    }
                    Ok(_) => continue,
                    Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => break,
                    Err(e) => {
                        warn!("WebSocket receive error: {}", e);
                        let _ = tx
                            .send(TransportEvent::Error(TransportError::Receive(e.to_string())))
                            .await;
                        return;
                    }
                };
                if tx.send(event).await.is_err() {
                    // Link dropped by the session.
                    return;
                }
            }
            let _ = tx.send(TransportEvent::Closed).await;
        });

        Ok(TransportLink {
            sink: Box::new(WsSink { write, reader }),
            events: rx,
        })
    }
}

struct WsSink {
    write: SplitSink<WsStream, Message>,
    reader: JoinHandle<()>,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.write
            .send(Message::Text(text))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        let result = self.write.send(Message::Close(None)).await;
        self.reader.abort();
        match result {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(TransportError::Send(e.to_string())),
        }
    }
}

impl Drop for WsSink {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
