use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use crate::context::ContextId;
use crate::error::{FlowError, Result};
use crate::invoice::Invoice;
use crate::message::{Message, SenderType, TrackingData};

/// Events exchanged over the real-time channel. Wire names are the de facto
/// protocol contract between user-side and runner-side instances.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ChannelEvent {
    #[serde(rename = "join")]
    Join {
        context_id: ContextId,
        sender_id: String,
        sender_type: SenderType,
        token: String,
    },
    #[serde(rename = "history")]
    History { messages: Vec<Message> },
    #[serde(rename = "message")]
    Message { message: Message },
    #[serde(rename = "requestRunner")]
    RequestRunner { runner_id: String, user_id: String },
    #[serde(rename = "acceptRunnerRequest")]
    AcceptRunnerRequest { runner_id: String, user_id: String },
    #[serde(rename = "declineRunnerRequest")]
    DeclineRunnerRequest { runner_id: String, user_id: String },
    #[serde(rename = "sendInvoice")]
    SendInvoice { invoice: Invoice },
    #[serde(rename = "receiveInvoice")]
    ReceiveInvoice { invoice: Invoice },
    #[serde(rename = "invoiceError")]
    InvoiceError { detail: String },
    #[serde(rename = "acceptInvoice")]
    AcceptInvoice { invoice_id: String },
    #[serde(rename = "declineInvoice")]
    DeclineInvoice { invoice_id: String },
    #[serde(rename = "invoiceDeclined")]
    InvoiceDeclined { invoice_id: String },
    #[serde(rename = "receiveTrackRunner")]
    ReceiveTrackRunner { tracking: TrackingData },
}

#[derive(Debug, Clone)]
struct Envelope {
    sender_id: String,
    event: ChannelEvent,
}

/// A joined participant's live view of a conversation channel.
/// Dropping it detaches the listener, which is what keeps `join` idempotent:
/// a re-join replaces the subscription instead of stacking another one.
pub struct Subscription {
    receiver: broadcast::Receiver<Envelope>,
    self_id: String,
}

impl Subscription {
    /// Next event from the other participant. Echoes of our own sends are
    /// filtered here so a relayed message can never ping-pong back into the
    /// log it came from.
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(envelope) if envelope.sender_id == self.self_id => continue,
                Ok(envelope) => return Some(envelope.event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "subscription lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Abstraction over the real-time transport connecting two participants.
#[allow(async_fn_in_trait)]
pub trait ChannelBridge {
    /// Join a context: returns the history snapshot and a live subscription.
    /// The context is created implicitly on first join.
    async fn join(&self, context: &ContextId, sender_id: &str)
        -> Result<(Vec<Message>, Subscription)>;

    /// Fire-and-forget send. A disconnected transport is a silent no-op by
    /// design; delivery confirmation only ever arrives as later status
    /// updates.
    async fn send(&self, context: &ContextId, sender_id: &str, event: ChannelEvent);
}

struct Room {
    history: Vec<Message>,
    tx: broadcast::Sender<Envelope>,
}

impl Room {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            history: Vec::new(),
            tx,
        }
    }
}

/// In-process bridge: both participants share one room registry. Used by the
/// tests and by single-process deployments; the relay server speaks the same
/// `ChannelEvent` surface over WebSockets.
pub struct LocalBridge {
    rooms: RwLock<HashMap<String, Room>>,
    connected: AtomicBool,
}

impl LocalBridge {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            rooms: RwLock::new(HashMap::new()),
            connected: AtomicBool::new(true),
        })
    }

    /// Simulate transport loss and recovery.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl ChannelBridge for LocalBridge {
    async fn join(
        &self,
        context: &ContextId,
        sender_id: &str,
    ) -> Result<(Vec<Message>, Subscription)> {
        if !self.is_connected() {
            return Err(FlowError::TransportUnavailable);
        }
        let mut rooms = self.rooms.write().await;
        let room = rooms.entry(context.to_string()).or_insert_with(Room::new);
        let subscription = Subscription {
            receiver: room.tx.subscribe(),
            self_id: sender_id.to_string(),
        };
        Ok((room.history.clone(), subscription))
    }

    async fn send(&self, context: &ContextId, sender_id: &str, event: ChannelEvent) {
        if !self.is_connected() {
            debug!(context = %context, "transport unavailable, dropping send");
            return;
        }
        let mut rooms = self.rooms.write().await;
        let room = rooms.entry(context.to_string()).or_insert_with(Room::new);
        if let ChannelEvent::Message { message } = &event {
            room.history.push(message.clone());
        }
        // No subscribers yet is fine; history still accumulated.
        let _ = room.tx.send(Envelope {
            sender_id: sender_id.to_string(),
            event,
        });
    }
}
