//! Session handle and the actor that owns all protocol state
//!
//! Every [`Session`] method becomes a [`Command`] on one channel. A single
//! task owns the dispatcher, the id allocator, the transport sink and both
//! timers, and consumes commands, transport events and timer ticks in one
//! `select!` loop. Frames are handled in arrival order and writes never
//! interleave.

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use sio_common::{decode, encode, Frame, HandshakeError, MessageId, SessionParams};
use std::future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{self, Instant, Interval, MissedTickBehavior, Sleep};
use tracing::{debug, error, info, warn};

use crate::config::ClientConfig;
use crate::dispatcher::{AckContinuation, Dispatcher, EventHandler};
use crate::error::{CallCancelled, ClientError, ClientResult, TransportError};
use crate::handshake::{HandshakeNegotiator, HttpFetch, ReqwestFetch, SocketUrl};
use crate::state::{FailureReason, SessionEvent, SessionState};
use crate::transport::{Connector, FrameSink, TransportEvent, WsConnector};

enum Command {
    Open {
        url: String,
        reply: oneshot::Sender<ClientResult<()>>,
    },
    Subscribe {
        event: String,
        handler: EventHandler,
    },
    Unsubscribe {
        event: String,
    },
    Emit {
        event: String,
        args: Vec<Value>,
        continuation: Option<AckContinuation>,
        reply: oneshot::Sender<ClientResult<Option<MessageId>>>,
    },
    Send {
        text: String,
        reply: oneshot::Sender<ClientResult<()>>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to a Socket.IO session.
///
/// Cheap to clone; all clones drive the same session. The session is closed
/// when the last handle is dropped.
#[derive(Clone)]
pub struct Session {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<SessionState>,
    events: broadcast::Sender<SessionEvent>,
    params: Arc<RwLock<Option<SessionParams>>>,
}

impl Session {
    /// Create a session using reqwest for the handshake and tokio-tungstenite
    /// for the transport. Must be called from within a Tokio runtime.
    pub fn new(config: ClientConfig) -> Self {
        Self::with_transport(config, Arc::new(ReqwestFetch::new()), Arc::new(WsConnector))
    }

    /// Create a session over custom HTTP and transport collaborators.
    pub fn with_transport(
        config: ClientConfig,
        http: Arc<dyn HttpFetch>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let (commands, command_rx) = mpsc::channel(config.command_buffer.max(1));
        let (state_tx, state) = watch::channel(SessionState::Idle);
        let (events, _) = broadcast::channel(config.event_buffer.max(1));
        let params = Arc::new(RwLock::new(None));

        let actor = Actor {
            dispatcher: Dispatcher::new(config.emit_ack_policy),
            negotiator: HandshakeNegotiator::new(http),
            connector,
            config,
            state: state_tx,
            events: events.clone(),
            params: params.clone(),
            link: None,
        };
        tokio::spawn(actor.run(command_rx));

        Self {
            commands,
            state,
            events,
            params,
        }
    }

    /// Handshake with the server at `url` and open the transport.
    ///
    /// Returns once the transport is connected; the session becomes
    /// `Connected` when the server confirms the endpoint (see
    /// [`wait_connected`](Self::wait_connected)).
    pub async fn open(&self, url: &str) -> ClientResult<()> {
        let (reply, rx) = oneshot::channel();
        self.send_command(Command::Open {
            url: url.to_string(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| ClientError::SessionClosed)?
    }

    /// Subscribe `handler` to `event`, replacing any previous handler. The
    /// handler's return value answers events that request a data ack.
    pub async fn on<F>(&self, event: impl Into<String>, handler: F) -> ClientResult<()>
    where
        F: FnMut(Vec<Value>) -> Option<Value> + Send + 'static,
    {
        self.send_command(Command::Subscribe {
            event: event.into(),
            handler: Box::new(handler),
        })
        .await
    }

    pub async fn off(&self, event: impl Into<String>) -> ClientResult<()> {
        self.send_command(Command::Unsubscribe {
            event: event.into(),
        })
        .await
    }

    /// Emit `event` without a continuation. Returns the message id, if the
    /// configured ack policy assigned one.
    pub async fn emit(&self, event: impl Into<String>, args: Vec<Value>) -> ClientResult<Option<MessageId>> {
        self.emit_inner(event.into(), args, None).await
    }

    /// Emit `event` and run `continuation` once with the ack's values, or
    /// with [`CallCancelled`] if the session ends first. The continuation is
    /// not run when this returns an error.
    pub async fn emit_with_ack<F>(
        &self,
        event: impl Into<String>,
        args: Vec<Value>,
        continuation: F,
    ) -> ClientResult<MessageId>
    where
        F: FnOnce(Result<Vec<Value>, CallCancelled>) + Send + 'static,
    {
        self.emit_inner(event.into(), args, Some(Box::new(continuation)))
            .await?
            .ok_or_else(|| ClientError::InvalidState("emit with ack produced no message id".into()))
    }

    /// Emit `event` with a single serialized argument.
    pub async fn emit_value<T: Serialize>(
        &self,
        event: impl Into<String>,
        value: &T,
    ) -> ClientResult<Option<MessageId>> {
        let arg = serde_json::to_value(value)?;
        self.emit(event, vec![arg]).await
    }

    /// Emit `event` and wait for the acknowledgement.
    pub async fn call(&self, event: impl Into<String>, args: Vec<Value>) -> ClientResult<Vec<Value>> {
        let (tx, rx) = oneshot::channel();
        self.emit_with_ack(event, args, move |result| {
            let _ = tx.send(result);
        })
        .await?;

        match rx.await {
            Ok(result) => result.map_err(ClientError::from),
            Err(_) => Err(ClientError::SessionClosed),
        }
    }

    /// Send a plain MESSAGE frame on the session endpoint.
    pub async fn send(&self, text: impl Into<String>) -> ClientResult<()> {
        let (reply, rx) = oneshot::channel();
        self.send_command(Command::Send {
            text: text.into(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| ClientError::SessionClosed)?
    }

    /// Close the transport and cancel outstanding calls. A failed session
    /// moves to `Disconnected`; closing an already closed session does
    /// nothing.
    pub async fn close(&self) -> ClientResult<()> {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Command::Close { reply }).await.is_err() {
            return Ok(());
        }
        let _ = rx.await;
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Subscribe to session notifications.
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn session_id(&self) -> Option<String> {
        self.params.read().as_ref().map(|p| p.session_id.clone())
    }

    pub fn params(&self) -> Option<SessionParams> {
        self.params.read().clone()
    }

    /// Wait until the session is `Connected`. Fails if it reaches
    /// `Disconnected` or `Failed` first, including when it is already in one
    /// of those states.
    pub async fn wait_connected(&self) -> ClientResult<()> {
        let mut state = self.state.clone();
        let reached = *state
            .wait_for(|s| {
                matches!(
                    s,
                    SessionState::Connected | SessionState::Disconnected | SessionState::Failed
                )
            })
            .await
            .map_err(|_| ClientError::SessionClosed)?;

        match reached {
            SessionState::Connected => Ok(()),
            other => Err(ClientError::InvalidState(format!("session ended {}", other))),
        }
    }

    async fn emit_inner(
        &self,
        event: String,
        args: Vec<Value>,
        continuation: Option<AckContinuation>,
    ) -> ClientResult<Option<MessageId>> {
        let (reply, rx) = oneshot::channel();
        self.send_command(Command::Emit {
            event,
            args,
            continuation,
            reply,
        })
        .await?;
        rx.await.map_err(|_| ClientError::SessionClosed)?
    }

    async fn send_command(&self, command: Command) -> ClientResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ClientError::SessionClosed)
    }
}

struct Watchdog {
    timeout: Duration,
    sleep: Pin<Box<Sleep>>,
}

impl Watchdog {
    fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            sleep: Box::pin(time::sleep(timeout)),
        }
    }

    fn reset(&mut self) {
        self.sleep.as_mut().reset(Instant::now() + self.timeout);
    }
}

/// An open transport plus the timers that live exactly as long as it does.
struct Link {
    sink: Box<dyn FrameSink>,
    inbound: mpsc::Receiver<TransportEvent>,
    heartbeat: Option<Interval>,
    watchdog: Option<Watchdog>,
}

impl Link {
    async fn write(&mut self, frame: &Frame) -> Result<(), TransportError> {
        let text = encode(frame);
        debug!("-> {}", text);
        self.sink.send_text(text).await
    }
}

enum Activity {
    /// `None` when the transport dropped its event channel.
    Inbound(Option<TransportEvent>),
    HeartbeatDue,
    WatchdogExpired,
}

/// Resolves with the next event on the link; never resolves without one.
async fn next_activity(link: &mut Option<Link>) -> Activity {
    let Some(Link {
        inbound,
        heartbeat,
        watchdog,
        ..
    }) = link.as_mut()
    else {
        return future::pending().await;
    };

    tokio::select! {
        biased;
        event = inbound.recv() => Activity::Inbound(event),
        _ = heartbeat_due(heartbeat) => Activity::HeartbeatDue,
        _ = watchdog_expired(watchdog) => Activity::WatchdogExpired,
    }
}

async fn heartbeat_due(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => future::pending().await,
    }
}

async fn watchdog_expired(watchdog: &mut Option<Watchdog>) {
    match watchdog {
        Some(watchdog) => watchdog.sleep.as_mut().await,
        None => future::pending().await,
    }
}

struct Actor {
    config: ClientConfig,
    negotiator: HandshakeNegotiator,
    connector: Arc<dyn Connector>,
    dispatcher: Dispatcher,
    state: watch::Sender<SessionState>,
    events: broadcast::Sender<SessionEvent>,
    params: Arc<RwLock<Option<SessionParams>>>,
    link: Option<Link>,
}

impl Actor {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        loop {
            tokio::select! {
                biased;
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        debug!("All session handles dropped");
                        self.close().await;
                        break;
                    }
                },
                activity = next_activity(&mut self.link) => self.handle_activity(activity).await,
            }
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Open { url, reply } => {
                let result = self.open(&url).await;
                let _ = reply.send(result);
            }
            Command::Subscribe { event, handler } => {
                if self.dispatcher.subscribe(event.clone(), handler) {
                    debug!("Replaced handler for event {:?}", event);
                }
            }
            Command::Unsubscribe { event } => {
                if !self.dispatcher.unsubscribe(&event) {
                    debug!("No handler to remove for event {:?}", event);
                }
            }
            Command::Emit {
                event,
                args,
                continuation,
                reply,
            } => {
                let result = self.emit(event, args, continuation).await;
                let _ = reply.send(result);
            }
            Command::Send { text, reply } => {
                let frame = Frame::message(text).with_endpoint(self.dispatcher.endpoint());
                let _ = reply.send(self.send_frame(&frame).await);
            }
            Command::Close { reply } => {
                self.close().await;
                let _ = reply.send(());
            }
        }
    }

    async fn handle_activity(&mut self, activity: Activity) {
        match activity {
            Activity::Inbound(Some(TransportEvent::Text(text))) => self.on_text(text).await,
            Activity::Inbound(Some(TransportEvent::Closed)) | Activity::Inbound(None) => {
                self.on_peer_closed()
            }
            Activity::Inbound(Some(TransportEvent::Error(err))) => {
                self.fail(FailureReason::Transport(err.to_string())).await
            }
            Activity::HeartbeatDue => {
                let _ = self.send_frame(&Frame::heartbeat()).await;
            }
            Activity::WatchdogExpired => {
                let ms = self
                    .link
                    .as_ref()
                    .and_then(|link| link.watchdog.as_ref())
                    .map(|w| w.timeout.as_millis() as u32)
                    .unwrap_or_default();
                self.fail(FailureReason::LivenessTimeout(ms)).await
            }
        }
    }

    async fn open(&mut self, raw_url: &str) -> ClientResult<()> {
        let current = self.current_state();
        if !current.can_open() {
            return Err(ClientError::InvalidState(format!("cannot open while {}", current)));
        }
        let url = SocketUrl::parse(raw_url, self.config.secure)?;

        self.set_state(SessionState::HandshakePending);
        let handshake_timeout = self.config.handshake_timeout();
        let negotiated = match time::timeout(handshake_timeout, self.negotiator.negotiate(&url)).await {
            Ok(result) => result,
            Err(_) => Err(HandshakeError::Request(format!(
                "no response within {}ms",
                handshake_timeout.as_millis()
            ))),
        };
        let params = match negotiated {
            Ok(params) => params,
            Err(err) => {
                warn!("Handshake with {} failed: {}", raw_url, err);
                self.set_state(SessionState::Failed);
                return Err(err.into());
            }
        };

        let transport_url = url.transport_url(&params.session_id);
        let liveness = params.connection_timeout();
        *self.params.write() = Some(params);
        self.set_state(SessionState::TransportConnecting);

        let connect_timeout = self.config.connect_timeout();
        let connected = match time::timeout(connect_timeout, self.connector.connect(&transport_url)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Connect(format!(
                "no connection within {}ms",
                connect_timeout.as_millis()
            ))),
        };
        let link = match connected {
            Ok(link) => link,
            Err(err) => {
                warn!("Transport connect to {} failed: {}", transport_url, err);
                self.set_state(SessionState::Failed);
                return Err(err.into());
            }
        };

        let endpoint = self.config.endpoint.clone().unwrap_or(url.endpoint);
        debug!("Requesting endpoint {:?}", endpoint);
        self.dispatcher.set_endpoint(endpoint);
        self.link = Some(Link {
            sink: link.sink,
            inbound: link.events,
            heartbeat: None,
            watchdog: liveness.map(Watchdog::new),
        });
        Ok(())
    }

    async fn emit(
        &mut self,
        event: String,
        args: Vec<Value>,
        continuation: Option<AckContinuation>,
    ) -> ClientResult<Option<MessageId>> {
        let Some(link) = self.link.as_mut() else {
            return Err(ClientError::InvalidState(format!(
                "cannot emit while {}",
                *self.state.borrow()
            )));
        };

        let endpoint = self.dispatcher.endpoint().to_string();
        let frame = self.dispatcher.emit(event, args, &endpoint, continuation);
        if let Err(err) = link.write(&frame).await {
            // The caller gets the error, so the continuation must not also run.
            if let Some(id) = frame.id {
                self.dispatcher.forget_pending_call(id);
            }
            self.fail(FailureReason::Transport(err.to_string())).await;
            return Err(err.into());
        }
        Ok(frame.id)
    }

    async fn on_text(&mut self, text: String) {
        debug!("<- {}", text);
        if let Some(watchdog) = self.link.as_mut().and_then(|link| link.watchdog.as_mut()) {
            watchdog.reset();
        }

        let frame = match decode(&text) {
            Ok(frame) => frame,
            Err(err) => {
                warn!("Dropping malformed frame {:?}: {}", text, err);
                return;
            }
        };

        let dispatch = self.dispatcher.handle_inbound(frame);
        for frame in &dispatch.outbound {
            if self.send_frame(frame).await.is_err() {
                return;
            }
        }

        if let Some(event) = dispatch.event {
            if matches!(event, SessionEvent::Connected(_)) {
                self.on_connected();
            }
            self.publish(event);
        }
    }

    fn on_connected(&mut self) {
        if self.current_state() == SessionState::Connected {
            return;
        }
        let period = self.params.read().as_ref().and_then(SessionParams::heartbeat_interval);
        if let (Some(link), Some(period)) = (self.link.as_mut(), period) {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            link.heartbeat = Some(interval);
        }
        info!("Connected on endpoint {:?}", self.dispatcher.endpoint());
        self.set_state(SessionState::Connected);
    }

    fn on_peer_closed(&mut self) {
        info!("Transport closed by peer");
        self.link = None;
        self.cancel_pending();
        self.set_state(SessionState::Disconnected);
        let endpoint = self.dispatcher.endpoint().to_string();
        self.publish(SessionEvent::Disconnected(endpoint));
        self.publish(SessionEvent::TransportClosed);
    }

    async fn fail(&mut self, reason: FailureReason) {
        error!("Session failed: {}", reason);
        if let Some(mut link) = self.link.take() {
            if let Err(err) = link.sink.close().await {
                debug!("Transport close after failure: {}", err);
            }
        }
        self.cancel_pending();
        self.set_state(SessionState::Failed);
        self.publish(SessionEvent::Failed(reason));
    }

    async fn close(&mut self) {
        let Some(mut link) = self.link.take() else {
            if self.current_state() == SessionState::Failed {
                self.set_state(SessionState::Disconnected);
            }
            return;
        };

        if self.current_state() == SessionState::Connected {
            let text = encode(&Frame::disconnect(self.dispatcher.endpoint()));
            debug!("-> {}", text);
            if let Err(err) = link.sink.send_text(text).await {
                debug!("Disconnect frame not sent: {}", err);
            }
        }
        if let Err(err) = link.sink.close().await {
            debug!("Transport close: {}", err);
        }

        self.cancel_pending();
        self.set_state(SessionState::Disconnected);
    }

    async fn send_frame(&mut self, frame: &Frame) -> ClientResult<()> {
        let Some(link) = self.link.as_mut() else {
            return Err(ClientError::InvalidState(format!(
                "no transport while {}",
                *self.state.borrow()
            )));
        };

        if let Err(err) = link.write(frame).await {
            self.fail(FailureReason::Transport(err.to_string())).await;
            return Err(err.into());
        }
        Ok(())
    }

    fn cancel_pending(&mut self) {
        let cancelled = self.dispatcher.cancel_all();
        if cancelled > 0 {
            debug!("Cancelled {} pending calls", cancelled);
        }
    }

    fn current_state(&self) -> SessionState {
        *self.state.borrow()
    }

    fn set_state(&self, next: SessionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            info!("Session state: {} -> {}", previous, next);
        }
    }

    fn publish(&self, event: SessionEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmitAckPolicy;
    use crate::testing::{FakeConnector, FakeHttp, FakePeer};
    use assert_matches::assert_matches;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const BODY: &str = "abc123:60:3600:websocket,xhr-polling";

    fn session_with(body: &str, config: ClientConfig) -> (Session, Arc<FakeConnector>, mpsc::UnboundedReceiver<FakePeer>) {
        let (connector, peers) = FakeConnector::new();
        let session = Session::with_transport(config, FakeHttp::new(200, body), connector.clone());
        (session, connector, peers)
    }

    async fn connected(body: &str, config: ClientConfig) -> (Session, FakePeer) {
        let (session, _, mut peers) = session_with(body, config);
        session.open("http://localhost:9000").await.unwrap();
        let peer = peers.recv().await.unwrap();
        peer.push("1::").await;
        session.wait_connected().await.unwrap();
        (session, peer)
    }

    async fn wait_for_state(session: &Session, target: SessionState) {
        let mut state = session.state.clone();
        state.wait_for(|s| *s == target).await.unwrap();
    }

    #[tokio::test]
    async fn test_open_negotiates_and_connects() {
        let (session, _, mut peers) = session_with(BODY, ClientConfig::default());
        session.open("http://localhost:9000").await.unwrap();

        assert_eq!(session.state(), SessionState::TransportConnecting);
        assert_eq!(session.session_id().as_deref(), Some("abc123"));
        let params = session.params().unwrap();
        assert_eq!(params.heartbeat_interval_ms, Some(59_500));
        assert_eq!(params.connection_timeout_ms, Some(3_600_000));

        let peer = peers.recv().await.unwrap();
        assert_eq!(peer.url, "ws://localhost:9000/socket.io/1/websocket/abc123");

        let mut events = session.events();
        peer.push("1::").await;
        session.wait_connected().await.unwrap();
        assert_eq!(events.recv().await.unwrap(), SessionEvent::Connected(String::new()));
    }

    #[tokio::test]
    async fn test_open_without_websocket_transport() {
        let (session, connector, _peers) = session_with("abc123:60:3600:xhr-polling", ClientConfig::default());

        let result = session.open("http://localhost:9000").await;
        assert_matches!(result, Err(ClientError::Handshake(HandshakeError::UnsupportedTransport(_))));
        assert_eq!(connector.attempts(), 0);
        assert_eq!(session.state(), SessionState::Failed);
        assert_matches!(session.wait_connected().await, Err(ClientError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_open_rejected() {
        let (connector, _peers) = FakeConnector::new();
        let session = Session::with_transport(ClientConfig::default(), FakeHttp::new(401, "nope"), connector);

        assert_matches!(
            session.open("http://localhost:9000").await,
            Err(ClientError::Handshake(HandshakeError::Rejected(401)))
        );
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn test_open_transport_failure() {
        let connector = FakeConnector::failing(TransportError::Connect("refused".into()));
        let session = Session::with_transport(ClientConfig::default(), FakeHttp::new(200, BODY), connector);

        assert_matches!(
            session.open("http://localhost:9000").await,
            Err(ClientError::Transport(TransportError::Connect(_)))
        );
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn test_open_invalid_url() {
        let (session, _, _peers) = session_with(BODY, ClientConfig::default());
        assert_matches!(session.open("ftp://localhost").await, Err(ClientError::InvalidUrl(_)));
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_open_while_linked_is_rejected() {
        let (session, _peer) = connected(BODY, ClientConfig::default()).await;
        assert_matches!(session.open("http://localhost:9000").await, Err(ClientError::InvalidState(_)));
        assert_eq!(session.state(), SessionState::Connected);
    }

    #[tokio::test]
    async fn test_emit_before_open() {
        let (session, _, _peers) = session_with(BODY, ClientConfig::default());
        assert_matches!(session.emit("x", vec![]).await, Err(ClientError::InvalidState(_)));
        assert_matches!(session.send("hello").await, Err(ClientError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_call_resolves_with_ack_values() {
        let (session, mut peer) = connected(BODY, ClientConfig::default()).await;

        let call = session.call("ping", vec![json!(1), json!("x")]);
        let server = async {
            let sent = peer.next_sent().await.unwrap();
            assert_eq!(sent, r#"5:1+::{"name":"ping","args":[1,"x"]}"#);
            peer.push("6:::1+[42]").await;
        };
        let (result, ()) = tokio::join!(call, server);
        assert_eq!(result.unwrap(), vec![json!(42)]);
    }

    #[tokio::test]
    async fn test_emit_follows_ack_policy() {
        let config = ClientConfig::default().with_emit_ack_policy(EmitAckPolicy::NoAck);
        let (session, mut peer) = connected(BODY, config).await;

        assert_eq!(session.emit("note", vec![json!(true)]).await.unwrap(), None);
        assert_eq!(
            peer.next_sent().await.unwrap(),
            r#"5:::{"name":"note","args":[true]}"#
        );

        assert_eq!(session.emit_value("note", &json!({"a": 1})).await.unwrap(), None);
        assert_eq!(
            peer.next_sent().await.unwrap(),
            r#"5:::{"name":"note","args":[{"a":1}]}"#
        );
    }

    #[tokio::test]
    async fn test_inbound_event_with_manual_ack() {
        let (session, mut peer) = connected(BODY, ClientConfig::default()).await;
        session
            .on("msg", |args| {
                assert_eq!(args, vec![json!("hi")]);
                Some(json!("got"))
            })
            .await
            .unwrap();

        peer.push(r#"5:3+::{"name":"msg","args":["hi"]}"#).await;
        assert_eq!(peer.next_sent().await.unwrap(), r#"6:::3+["got"]"#);
    }

    #[tokio::test]
    async fn test_auto_ack_sent_exactly_once() {
        let (session, mut peer) = connected(BODY, ClientConfig::default()).await;
        session.on("msg", |_| Some(json!("ignored"))).await.unwrap();

        peer.push(r#"5:4::{"name":"msg"}"#).await;
        assert_eq!(peer.next_sent().await.unwrap(), "6:::4");

        session.send("sync").await.unwrap();
        assert_eq!(peer.next_sent().await.unwrap(), "3:::sync");
    }

    #[tokio::test]
    async fn test_off_removes_subscription() {
        let (session, mut peer) = connected(BODY, ClientConfig::default()).await;
        session.on("msg", |_| Some(json!("x"))).await.unwrap();
        session.off("msg").await.unwrap();

        peer.push(r#"5:3+::{"name":"msg"}"#).await;
        session.send("sync").await.unwrap();
        assert_eq!(peer.next_sent().await.unwrap(), "3:::sync");
    }

    #[tokio::test]
    async fn test_malformed_frame_is_dropped() {
        let (session, peer) = connected(BODY, ClientConfig::default()).await;
        let mut events = session.events();

        peer.push("9::").await;
        peer.push("garbage").await;
        peer.push("3:::hello").await;

        assert_eq!(events.recv().await.unwrap(), SessionEvent::Message("hello".into()));
        assert_eq!(session.state(), SessionState::Connected);
    }

    #[tokio::test]
    async fn test_namespace_reannounced_until_matched() {
        let (session, _, mut peers) = session_with(BODY, ClientConfig::default());
        session.open("ws://localhost:9000/chat").await.unwrap();
        let mut peer = peers.recv().await.unwrap();

        peer.push("1::").await;
        assert_eq!(peer.next_sent().await.unwrap(), "1::/chat");
        assert_eq!(session.state(), SessionState::TransportConnecting);

        peer.push("1::/chat").await;
        session.wait_connected().await.unwrap();

        session.emit("hello", vec![]).await.unwrap();
        assert_eq!(
            peer.next_sent().await.unwrap(),
            r#"5:1+:/chat:{"name":"hello","args":[]}"#
        );
    }

    #[tokio::test]
    async fn test_configured_endpoint_overrides_url_path() {
        let config = ClientConfig::default().with_endpoint("/news");
        let (session, _, mut peers) = session_with(BODY, config);
        session.open("ws://localhost:9000/chat").await.unwrap();
        let mut peer = peers.recv().await.unwrap();

        peer.push("1::").await;
        assert_eq!(peer.next_sent().await.unwrap(), "1::/news");
        assert_eq!(session.state(), SessionState::TransportConnecting);
    }

    #[tokio::test]
    async fn test_close_sends_disconnect_and_is_idempotent() {
        let (session, mut peer) = connected(BODY, ClientConfig::default()).await;

        session.close().await.unwrap();
        assert_eq!(peer.next_sent().await.unwrap(), "0::");
        assert_eq!(peer.next_sent().await, None);
        assert_eq!(session.state(), SessionState::Disconnected);

        session.close().await.unwrap();
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_close_cancels_pending_calls() {
        let (session, _peer) = connected(BODY, ClientConfig::default()).await;

        let (tx, rx) = oneshot::channel();
        let id = session
            .emit_with_ack("slow", vec![], move |result| {
                let _ = tx.send(result);
            })
            .await
            .unwrap();

        session.close().await.unwrap();
        assert_eq!(rx.await.unwrap(), Err(CallCancelled { id }));
    }

    #[tokio::test]
    async fn test_close_twice_cancels_pending_call_once() {
        let (session, _peer) = connected(BODY, ClientConfig::default()).await;

        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        session
            .emit_with_ack("slow", vec![], move |result| {
                assert_matches!(result, Err(CallCancelled { id: 1 }));
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();

        session.close().await.unwrap();
        session.close().await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_emit_write_failure_returns_error_without_continuation() {
        let (session, mut peer) = connected(BODY, ClientConfig::default()).await;
        let mut events = session.events();
        peer.stop_reading();

        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let result = session
            .emit_with_ack("lost", vec![], move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        assert_matches!(result, Err(ClientError::Transport(TransportError::Send(_))));
        assert_eq!(session.state(), SessionState::Failed);
        assert_matches!(
            events.recv().await.unwrap(),
            SessionEvent::Failed(FailureReason::Transport(_))
        );
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reopen_after_close() {
        let (session, _, mut peers) = session_with(BODY, ClientConfig::default());
        session.open("http://localhost:9000").await.unwrap();
        let first = peers.recv().await.unwrap();
        first.push("1::").await;
        session.wait_connected().await.unwrap();
        session.close().await.unwrap();

        session.open("http://localhost:9000").await.unwrap();
        let second = peers.recv().await.unwrap();
        second.push("1::").await;
        session.wait_connected().await.unwrap();
    }

    #[tokio::test]
    async fn test_peer_close_disconnects() {
        let (session, peer) = connected(BODY, ClientConfig::default()).await;
        let mut events = session.events();

        let call = session.call("pending", vec![]);
        let server = async {
            peer.deliver(TransportEvent::Closed).await;
        };
        let (result, ()) = tokio::join!(call, server);

        assert_matches!(result, Err(ClientError::Cancelled(_)));
        wait_for_state(&session, SessionState::Disconnected).await;
        assert_eq!(events.recv().await.unwrap(), SessionEvent::Disconnected(String::new()));
        assert_eq!(events.recv().await.unwrap(), SessionEvent::TransportClosed);
    }

    #[tokio::test]
    async fn test_transport_error_fails_session() {
        let (session, peer) = connected(BODY, ClientConfig::default()).await;
        let mut events = session.events();

        peer.deliver(TransportEvent::Error(TransportError::Receive("reset".into())))
            .await;

        assert_matches!(
            events.recv().await.unwrap(),
            SessionEvent::Failed(FailureReason::Transport(msg)) if msg.contains("reset")
        );
        assert_eq!(session.state(), SessionState::Failed);

        session.close().await.unwrap();
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_server_disconnect_keeps_transport() {
        let (session, peer) = connected(BODY, ClientConfig::default()).await;
        let mut events = session.events();

        peer.push("0::").await;
        assert_eq!(events.recv().await.unwrap(), SessionEvent::Disconnected(String::new()));
        assert_eq!(session.state(), SessionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_sent_every_interval() {
        let (_session, mut peer) = connected("abc123:2:60:websocket", ClientConfig::default()).await;

        let start = Instant::now();
        assert_eq!(peer.next_sent().await.unwrap(), "2::");
        assert!(start.elapsed() >= Duration::from_millis(1500));

        assert_eq!(peer.next_sent().await.unwrap(), "2::");
        assert!(start.elapsed() >= Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_heartbeat_when_disabled() {
        let (session, mut peer) = connected("abc123::60:websocket", ClientConfig::default()).await;

        time::sleep(Duration::from_secs(30)).await;
        session.send("sync").await.unwrap();
        assert_eq!(peer.next_sent().await.unwrap(), "3:::sync");
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_fails_silent_connection() {
        let (session, _peer) = connected("abc123:60:2:websocket", ClientConfig::default()).await;
        let mut events = session.events();

        let result = session.call("never answered", vec![]).await;

        assert_matches!(result, Err(ClientError::Cancelled(_)));
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::Failed(FailureReason::LivenessTimeout(2000))
        );
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_reset_by_inbound_traffic() {
        let (session, peer) = connected("abc123:60:2:websocket", ClientConfig::default()).await;

        time::sleep(Duration::from_millis(1500)).await;
        peer.push("2::").await;
        time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(session.state(), SessionState::Connected);

        wait_for_state(&session, SessionState::Failed).await;
    }
}
