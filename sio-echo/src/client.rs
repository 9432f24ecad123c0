//! Echo client session wiring

use anyhow::{anyhow, Result};
use serde_json::{json, Value};
use sio_client::{ClientConfig, Session, SessionEvent};
use tokio::time::{timeout, Duration};
use tracing::info;

/// A session subscribed to the echo server's events.
pub struct EchoClient {
    session: Session,
    timeout_ms: u64,
}

impl EchoClient {
    /// Open a session against `url` and wait until the endpoint is connected.
    pub async fn connect(url: &str, config: ClientConfig, timeout_ms: u64) -> Result<Self> {
        info!("Connecting to {}", url);
        let session = Session::new(config);

        session
            .on("news", |args| {
                let args = Value::Array(args);
                info!("Got news from server: {}", args);
                Some(json!("Message was delivered."))
            })
            .await?;
        session
            .on("event from server", |args| {
                let args = Value::Array(args);
                info!("Got event from server with data {}", args);
                None
            })
            .await?;

        session.open(url).await?;
        timeout(Duration::from_millis(timeout_ms), session.wait_connected())
            .await
            .map_err(|_| anyhow!("Not connected after {}ms", timeout_ms))??;

        info!(
            "Session {} connected",
            session.session_id().unwrap_or_default()
        );
        Ok(Self {
            session,
            timeout_ms,
        })
    }

    /// Emit the two greeting events and log the server's replies.
    pub async fn greet(&self) -> Result<Vec<Vec<Value>>> {
        let mut replies = Vec::new();
        let greetings = [
            ("event with 2 arguments", vec![json!(1), json!("Hello socket.io")]),
            (
                "event with a json object",
                vec![json!({"number": 1, "message": "Hello socket.io"})],
            ),
        ];

        for (event, args) in greetings {
            let reply = timeout(Duration::from_millis(self.timeout_ms), self.session.call(event, args))
                .await
                .map_err(|_| anyhow!("No reply to '{}' after {}ms", event, self.timeout_ms))??;
            let shown = Value::Array(reply.clone());
            info!("Got reply from {}: {}", event, shown);
            replies.push(reply);
        }

        Ok(replies)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub async fn close(&self) -> Result<()> {
        self.session.close().await?;
        Ok(())
    }
}

/// One log line per session notification.
pub fn describe(event: &SessionEvent) -> String {
    match event {
        SessionEvent::Connected(endpoint) => format!("Connected to endpoint {:?}", endpoint),
        SessionEvent::Disconnected(endpoint) => format!("Disconnected from endpoint {:?}", endpoint),
        SessionEvent::Message(text) => format!("Message received: {}", text),
        SessionEvent::JsonMessage(text) => format!("JSON message received: {}", text),
        SessionEvent::Error { reason, advice } => {
            format!("Error received: {} (advice {})", reason, advice)
        }
        SessionEvent::HeartbeatReceived => "Received heartbeat".to_string(),
        SessionEvent::Noop(_) => "Noop received".to_string(),
        SessionEvent::TransportClosed => "Transport closed by server".to_string(),
        SessionEvent::Failed(reason) => format!("Session failed: {}", reason),
    }
}
