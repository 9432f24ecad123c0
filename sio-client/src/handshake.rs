//! HTTP bootstrap handshake
//!
//! `negotiate` performs the one-shot GET against `/socket.io/1/` and turns
//! the colon-delimited body into [`SessionParams`]. The HTTP call itself goes
//! through [`HttpFetch`] so the negotiator can be driven by a fake in tests.

use async_trait::async_trait;
use sio_common::{HandshakeError, HandshakeResult, SessionParams, PROTOCOL_VERSION, WEBSOCKET_TRANSPORT};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{ClientError, ClientResult};

/// Raw HTTP response as seen by the negotiator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

/// One-shot HTTP GET collaborator.
#[async_trait]
pub trait HttpFetch: Send + Sync {
    async fn get(&self, url: &str, headers: &[(&str, &str)]) -> HandshakeResult<HttpReply>;
}

/// [`HttpFetch`] backed by `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestFetch {
    client: reqwest::Client,
}

impl ReqwestFetch {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HttpFetch for ReqwestFetch {
    async fn get(&self, url: &str, headers: &[(&str, &str)]) -> HandshakeResult<HttpReply> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| HandshakeError::Request(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| HandshakeError::Request(e.to_string()))?;

        Ok(HttpReply { status, body })
    }
}

/// A server address plus the endpoint requested through the URL path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketUrl {
    pub host: String,
    pub port: u16,
    pub secure: bool,
    /// URL path without a trailing `/`; `""` for the default endpoint.
    pub endpoint: String,
}

impl SocketUrl {
    /// Parse a `ws`, `wss`, `http` or `https` URL. `force_secure` upgrades
    /// plain schemes to their TLS counterparts.
    pub fn parse(raw: &str, force_secure: bool) -> ClientResult<Self> {
        let url = Url::parse(raw).map_err(|e| ClientError::InvalidUrl(format!("{}: {}", raw, e)))?;

        let secure = match url.scheme() {
            "ws" | "http" => force_secure,
            "wss" | "https" => true,
            other => {
                return Err(ClientError::InvalidUrl(format!(
                    "unsupported scheme '{}' in {}",
                    other, raw
                )))
            }
        };

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ClientError::InvalidUrl(format!("missing host in {}", raw)))?
            .to_string();

        let port = match url.port() {
            Some(port) => port,
            None if secure => 443,
            None => 80,
        };

        let endpoint = url.path().trim_end_matches('/').to_string();

        Ok(Self {
            host,
            port,
            secure,
            endpoint,
        })
    }

    pub fn handshake_url(&self, timestamp_ms: i64) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!(
            "{}://{}:{}/socket.io/{}/?t={}",
            scheme, self.host, self.port, PROTOCOL_VERSION, timestamp_ms
        )
    }

    pub fn transport_url(&self, session_id: &str) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!(
            "{}://{}:{}/socket.io/{}/{}/{}",
            scheme, self.host, self.port, PROTOCOL_VERSION, WEBSOCKET_TRANSPORT, session_id
        )
    }
}

pub struct HandshakeNegotiator {
    http: Arc<dyn HttpFetch>,
}

impl HandshakeNegotiator {
    pub fn new(http: Arc<dyn HttpFetch>) -> Self {
        Self { http }
    }

    pub async fn negotiate(&self, url: &SocketUrl) -> HandshakeResult<SessionParams> {
        let request_url = url.handshake_url(chrono::Utc::now().timestamp_millis());
        debug!("Handshake request: GET {}", request_url);

        let reply = self
            .http
            .get(&request_url, &[("Accept", "*/*"), ("Connection", "close")])
            .await?;

        if reply.status != 200 {
            warn!("Handshake rejected with status {}: {}", reply.status, reply.body);
            return Err(HandshakeError::Rejected(reply.status));
        }

        let params = SessionParams::parse(&reply.body)?;
        if !params.supports(WEBSOCKET_TRANSPORT) {
            warn!("Server offers no websocket transport: {:?}", params.transports);
            return Err(HandshakeError::UnsupportedTransport(params.transports.join(",")));
        }

        info!(
            "Handshake complete: session {} (heartbeat {:?}ms, timeout {:?}ms)",
            params.session_id, params.heartbeat_interval_ms, params.connection_timeout_ms
        );
        Ok(params)
    }
}
