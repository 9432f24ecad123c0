//! In-memory collaborators for unit tests

use async_trait::async_trait;
use parking_lot::Mutex;
use sio_common::{HandshakeError, HandshakeResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::handshake::{HttpFetch, HttpReply};
use crate::transport::{Connector, FrameSink, TransportEvent, TransportLink};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

/// Answers every GET with the same canned reply.
pub struct FakeHttp {
    reply: HandshakeResult<HttpReply>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl FakeHttp {
    pub fn new(status: u16, body: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(HttpReply {
                status,
                body: body.to_string(),
            }),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(HandshakeError::Request(message.to_string())),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl HttpFetch for FakeHttp {
    async fn get(&self, url: &str, headers: &[(&str, &str)]) -> HandshakeResult<HttpReply> {
        self.requests.lock().push(RecordedRequest {
            url: url.to_string(),
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        });
        self.reply.clone()
    }
}

/// The server side of a fake transport link.
pub struct FakePeer {
    pub url: String,
    sent: mpsc::UnboundedReceiver<String>,
    inbound: mpsc::Sender<TransportEvent>,
}

impl FakePeer {
    /// Deliver a text frame to the session.
    pub async fn push(&self, text: &str) {
        self.inbound
            .send(TransportEvent::Text(text.to_string()))
            .await
            .expect("session dropped the link");
    }

    pub async fn deliver(&self, event: TransportEvent) {
        self.inbound.send(event).await.expect("session dropped the link");
    }

    /// Refuse every further frame, as a peer whose socket broke mid-write.
    pub fn stop_reading(&mut self) {
        self.sent.close();
    }

    /// Next frame written by the session; `None` once the sink is closed.
    pub async fn next_sent(&mut self) -> Option<String> {
        self.sent.recv().await
    }
}

/// Hands each new link's peer side to the test through a channel.
pub struct FakeConnector {
    peers: mpsc::UnboundedSender<FakePeer>,
    failure: Option<TransportError>,
    attempts: AtomicUsize,
}

impl FakeConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<FakePeer>) {
        let (peers, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            peers,
            failure: None,
            attempts: AtomicUsize::new(0),
        });
        (connector, rx)
    }

    pub fn failing(error: TransportError) -> Arc<Self> {
        let (peers, _) = mpsc::unbounded_channel();
        Arc::new(Self {
            peers,
            failure: Some(error),
            attempts: AtomicUsize::new(0),
        })
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, url: &str) -> Result<TransportLink, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }

        let (sent_tx, sent) = mpsc::unbounded_channel();
        let (inbound, events) = mpsc::channel(64);
        self.peers
            .send(FakePeer {
                url: url.to_string(),
                sent,
                inbound,
            })
            .map_err(|_| TransportError::Connect("no test peer listening".into()))?;

        Ok(TransportLink {
            sink: Box::new(FakeSink { sent: Some(sent_tx) }),
            events,
        })
    }
}

struct FakeSink {
    sent: Option<mpsc::UnboundedSender<String>>,
}

#[async_trait]
impl FrameSink for FakeSink {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        let sent = self.sent.as_ref().ok_or(TransportError::Closed)?;
        sent.send(text)
            .map_err(|_| TransportError::Send("peer went away".into()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.sent.take();
        Ok(())
    }
}
