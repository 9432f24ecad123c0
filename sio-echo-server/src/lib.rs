// MIT License
//
// Copyright (c) 2025 Mike Chambers
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

//! Socket.IO 1.x echo server
//!
//! Serves the handshake at `/socket.io/1/` and the WebSocket transport at
//! `/socket.io/1/websocket/:sid`. Every connection is greeted with a connect
//! frame and two events; afterwards the server answers heartbeats, echoes
//! messages and acknowledges events.

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sio_common::{decode, encode, Frame, Packet};
use std::{sync::Arc, time::Instant};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Timeouts advertised in the handshake body, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EchoConfig {
    pub heartbeat_timeout: u32,
    pub close_timeout: u32,
}

impl Default for EchoConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout: 60,
            close_timeout: 30,
        }
    }
}

#[derive(Debug, Clone)]
struct SessionInfo {
    created: Instant,
    connected: bool,
}

#[derive(Clone)]
pub struct EchoState {
    sessions: Arc<DashMap<String, SessionInfo>>,
    start_time: Instant,
    config: EchoConfig,
}

impl EchoState {
    pub fn new(config: EchoConfig) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            start_time: Instant::now(),
            config,
        }
    }

    fn create_session(&self) -> String {
        let sid = Uuid::new_v4().simple().to_string();
        self.sessions.insert(
            sid.clone(),
            SessionInfo {
                created: Instant::now(),
                connected: false,
            },
        );
        debug!("Handshake issued session {}", sid);
        sid
    }

    fn mark_connected(&self, sid: &str) {
        if let Some(mut session) = self.sessions.get_mut(sid) {
            session.connected = true;
            debug!(
                "Session {} upgraded after {}ms",
                sid,
                session.created.elapsed().as_millis()
            );
        }
    }

    fn remove_session(&self, sid: &str) {
        if self.sessions.remove(sid).is_some() {
            info!("Session {} disconnected and cleaned up", sid);
        }
    }

    /// Handshake response body for a new session.
    fn handshake_body(&self, sid: &str) -> String {
        format!(
            "{}:{}:{}:websocket,xhr-polling",
            sid, self.config.heartbeat_timeout, self.config.close_timeout
        )
    }

    fn get_status(&self) -> StatusResponse {
        let connected = self.sessions.iter().filter(|s| s.connected).count();
        StatusResponse {
            status: "running".to_string(),
            sessions: self.sessions.len(),
            connected,
            uptime: self.start_time.elapsed().as_secs(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub sessions: usize,
    pub connected: usize,
    pub uptime: u64,
}

/// Frames sent to every client right after the upgrade.
pub fn greeting() -> Vec<Frame> {
    vec![
        Frame::connect(""),
        Frame::event("news", vec![json!(1), json!("world")]).with_id(1, true),
        Frame::event(
            "event from server",
            vec![json!({"attribute1": "hello", "attribute2": "world!"})],
        ),
    ]
}

/// Frames to send back in answer to one inbound frame.
pub fn reply_to(frame: &Frame) -> Vec<Frame> {
    let mut replies = Vec::new();

    if let Some(id) = frame.auto_ack_id() {
        replies.push(Frame::ack(id, None));
    }

    match &frame.packet {
        Packet::Connect => replies.push(Frame::connect(frame.endpoint.clone())),
        Packet::Heartbeat => replies.push(Frame::heartbeat()),
        Packet::Message(text) => {
            replies.push(Frame::message(text.clone()).with_endpoint(frame.endpoint.clone()))
        }
        Packet::Event { name, .. } => {
            if let Some(id) = frame.manual_ack_id() {
                replies.push(Frame::ack(id, Some(vec![json!(ack_text(name))])));
            }
        }
        _ => {}
    }

    replies
}

fn ack_text(event: &str) -> String {
    match event {
        "event with 2 arguments" => "Okay received your event with 2 arguments".to_string(),
        "event with a json object" => "Okay received your json object.".to_string(),
        other => format!("Okay received your event {}", other),
    }
}

pub fn router(state: EchoState) -> Router {
    Router::new()
        .route("/status", get(status_handler))
        .route("/socket.io/1/", get(handshake_handler))
        .route("/socket.io/1/websocket/:sid", get(websocket_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the echo protocol on `listener` until the process ends.
pub async fn serve(listener: TcpListener, state: EchoState) -> std::io::Result<()> {
    axum::serve(listener, router(state)).await
}

async fn handshake_handler(State(state): State<EchoState>) -> String {
    let sid = state.create_session();
    state.handshake_body(&sid)
}

async fn status_handler(State(state): State<EchoState>) -> Json<StatusResponse> {
    Json(state.get_status())
}

async fn websocket_handler(
    Path(sid): Path<String>,
    State(state): State<EchoState>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if !state.sessions.contains_key(&sid) {
        warn!("Upgrade for unknown session {}", sid);
        return StatusCode::NOT_FOUND.into_response();
    }

    match ws {
        Ok(ws) => ws.on_upgrade(move |socket| async move {
            if let Err(e) = handle_socket(socket, state, sid).await {
                error!("WebSocket error: {}", e);
            }
        }),
        Err(rejection) => rejection.into_response(),
    }
}

async fn handle_socket(socket: WebSocket, state: EchoState, sid: String) -> anyhow::Result<()> {
    state.mark_connected(&sid);
    info!("User connected: {}", sid);

    let result = echo(socket, &sid).await;

    state.remove_session(&sid);
    result
}

async fn echo(socket: WebSocket, sid: &str) -> anyhow::Result<()> {
    let (mut sender, mut receiver) = socket.split();

    for frame in greeting() {
        sender.send(Message::Text(encode(&frame))).await?;
    }

    while let Some(msg) = receiver.next().await {
        match msg? {
            Message::Text(text) => {
                debug!("Received from {}: {}", sid, text);
                let frame = match decode(&text) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!("Failed to parse frame {:?}: {}", text, e);
                        continue;
                    }
                };

                if matches!(frame.packet, Packet::Disconnect) {
                    debug!("Client {} sent disconnect", sid);
                    break;
                }

                for reply in reply_to(&frame) {
                    sender.send(Message::Text(encode(&reply))).await?;
                }
            }
            Message::Close(_) => {
                debug!("Client {} sent close message", sid);
                break;
            }
            _ => {}
        }
    }

    Ok(())
}
