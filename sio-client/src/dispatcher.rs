//! Inbound frame routing and outstanding-call bookkeeping
//!
//! The dispatcher never touches the transport. Every inbound frame yields a
//! [`Dispatch`]: frames to send back (acks, namespace re-announcements) and at
//! most one notification for the application. The session actor performs the
//! I/O.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sio_common::{Frame, MessageId, Packet};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::config::EmitAckPolicy;
use crate::error::CallCancelled;
use crate::id::MessageIdAllocator;
use crate::state::SessionEvent;

/// Subscription handler: receives the event arguments, optionally returns a
/// value for a manual acknowledgement.
pub type EventHandler = Box<dyn FnMut(Vec<Value>) -> Option<Value> + Send>;

/// Invoked exactly once with the ack's return values or a cancellation.
pub type AckContinuation = Box<dyn FnOnce(Result<Vec<Value>, CallCancelled>) + Send>;

pub struct PendingCall {
    pub id: MessageId,
    pub registered_at: DateTime<Utc>,
    continuation: AckContinuation,
}

impl PendingCall {
    fn resolve(self, result: Result<Vec<Value>, CallCancelled>) {
        (self.continuation)(result)
    }
}

/// Outcome of routing one inbound frame.
#[derive(Debug, Default, PartialEq)]
pub struct Dispatch {
    pub outbound: Vec<Frame>,
    pub event: Option<SessionEvent>,
}

pub struct Dispatcher {
    endpoint: String,
    ack_policy: EmitAckPolicy,
    ids: MessageIdAllocator,
    subscriptions: HashMap<String, EventHandler>,
    pending: HashMap<MessageId, PendingCall>,
}

impl Dispatcher {
    pub fn new(ack_policy: EmitAckPolicy) -> Self {
        Self {
            endpoint: String::new(),
            ack_policy,
            ids: MessageIdAllocator::new(),
            subscriptions: HashMap::new(),
            pending: HashMap::new(),
        }
    }

    /// The endpoint requested at `open` time.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn set_endpoint(&mut self, endpoint: impl Into<String>) {
        self.endpoint = endpoint.into();
    }

    /// Register `handler` for `event`, replacing any previous handler.
    /// Returns true when a handler was replaced.
    pub fn subscribe(&mut self, event: impl Into<String>, handler: EventHandler) -> bool {
        self.subscriptions.insert(event.into(), handler).is_some()
    }

    pub fn unsubscribe(&mut self, event: &str) -> bool {
        self.subscriptions.remove(event).is_some()
    }

    pub fn is_subscribed(&self, event: &str) -> bool {
        self.subscriptions.contains_key(event)
    }

    pub fn register_pending_call(&mut self, id: MessageId, continuation: AckContinuation) {
        let call = PendingCall {
            id,
            registered_at: Utc::now(),
            continuation,
        };
        if let Some(stale) = self.pending.insert(id, call) {
            warn!("Message id {} reused while still pending; cancelling the older call", id);
            stale.resolve(Err(CallCancelled { id }));
        }
    }

    /// Drop a pending call without running its continuation.
    pub fn forget_pending_call(&mut self, id: MessageId) -> bool {
        self.pending.remove(&id).is_some()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Build an outbound EVENT frame, registering `continuation` as a pending
    /// call when given.
    pub fn emit(
        &mut self,
        event: impl Into<String>,
        args: Vec<Value>,
        endpoint: &str,
        continuation: Option<AckContinuation>,
    ) -> Frame {
        let frame = Frame::event(event, args).with_endpoint(endpoint);

        match continuation {
            Some(continuation) => {
                let id = self.ids.allocate();
                self.register_pending_call(id, continuation);
                frame.with_id(id, true)
            }
            None => match self.ack_policy {
                EmitAckPolicy::DataAck => frame.with_id(self.ids.allocate(), true),
                EmitAckPolicy::AutoAck => frame.with_id(self.ids.allocate(), false),
                EmitAckPolicy::NoAck => frame,
            },
        }
    }

    /// Route one decoded inbound frame.
    pub fn handle_inbound(&mut self, frame: Frame) -> Dispatch {
        let mut dispatch = Dispatch::default();

        if let Some(id) = frame.auto_ack_id() {
            dispatch.outbound.push(Frame::ack(id, None));
        }
        let manual_ack = frame.manual_ack_id();
        let endpoint = frame.endpoint;

        match frame.packet {
            Packet::Disconnect => {
                dispatch.event = Some(SessionEvent::Disconnected(endpoint));
            }
            Packet::Connect => {
                if self.endpoint_matches(&endpoint) {
                    dispatch.event = Some(SessionEvent::Connected(endpoint));
                } else {
                    debug!(
                        "Server connected endpoint {:?}, requesting {:?}",
                        endpoint, self.endpoint
                    );
                    dispatch.outbound.push(Frame::connect(self.endpoint.clone()));
                }
            }
            Packet::Heartbeat => {
                dispatch.event = Some(SessionEvent::HeartbeatReceived);
            }
            Packet::Message(text) => {
                dispatch.event = Some(SessionEvent::Message(text));
            }
            Packet::JsonMessage(text) => {
                debug!("JSON message received: {}", text);
                dispatch.event = Some(SessionEvent::JsonMessage(text));
            }
            Packet::Event { name, args } => match self.subscriptions.get_mut(&name) {
                Some(handler) => {
                    let returned = handler(args);
                    if let Some(id) = manual_ack {
                        dispatch.outbound.push(Frame::ack(id, returned.map(|v| vec![v])));
                    }
                }
                None => debug!("No subscription for event {:?}; dropped", name),
            },
            Packet::Ack { ack_id, args } => self.resolve(ack_id, args.unwrap_or_default()),
            Packet::Error { reason, advice } => {
                dispatch.event = Some(SessionEvent::Error { reason, advice });
            }
            Packet::Noop(text) => {
                debug!("Noop received: {:?}", text);
                dispatch.event = Some(SessionEvent::Noop(text));
            }
        }

        dispatch
    }

    /// Cancel every pending call. Each continuation runs once, after its
    /// entry has left the table.
    pub fn cancel_all(&mut self) -> usize {
        let calls: Vec<PendingCall> = self.pending.drain().map(|(_, call)| call).collect();
        let count = calls.len();
        for call in calls {
            let id = call.id;
            call.resolve(Err(CallCancelled { id }));
        }
        count
    }

    fn resolve(&mut self, id: MessageId, args: Vec<Value>) {
        match self.pending.remove(&id) {
            Some(call) => {
                let waited = Utc::now() - call.registered_at;
                debug!("Ack {} resolved after {}ms", id, waited.num_milliseconds());
                call.resolve(Ok(args));
            }
            None => debug!("Ack for unknown message id {}; ignored", id),
        }
    }

    fn endpoint_matches(&self, endpoint: &str) -> bool {
        strip_query(endpoint) == strip_query(&self.endpoint)
    }
}

fn strip_query(endpoint: &str) -> &str {
    endpoint.split('?').next().unwrap_or(endpoint)
}
