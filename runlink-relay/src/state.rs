use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, RwLock};

use runlink_core::{ChannelEvent, Message};

/// Validates the token a participant presents when joining. Injected at
/// construction so the relay never reaches into ambient global state for
/// credentials.
pub trait CredentialProvider: Send + Sync {
    fn authorize(&self, token: &str) -> bool;
}

/// Accepts one fixed token. Suitable for tests and single-tenant deploys.
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: &str) -> Self {
        Self(token.to_string())
    }
}

impl CredentialProvider for StaticToken {
    fn authorize(&self, token: &str) -> bool {
        token == self.0
    }
}

/// Accepts any non-empty token. Development only.
pub struct AllowAll;

impl CredentialProvider for AllowAll {
    fn authorize(&self, token: &str) -> bool {
        !token.is_empty()
    }
}

/// An event relayed to room members, tagged with its sender so each socket
/// can drop its own echoes.
pub type Outbound = (String, ChannelEvent);

struct Room {
    history: Vec<Message>,
    tx: broadcast::Sender<Outbound>,
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

#[derive(Serialize)]
pub struct ContextSummary {
    pub context_id: String,
    pub message_count: usize,
}

/// Shared relay state: one room per conversation context, created implicitly
/// on first join.
pub struct AppState {
    rooms: RwLock<HashMap<String, Room>>,
    credentials: Box<dyn CredentialProvider>,
}

impl AppState {
    pub fn new(credentials: Box<dyn CredentialProvider>) -> Arc<Self> {
        Arc::new(Self {
            rooms: RwLock::new(HashMap::new()),
            credentials,
        })
    }

    pub fn authorize(&self, token: &str) -> bool {
        self.credentials.authorize(token)
    }

    /// Subscribe to a context room, creating it if needed. Returns the
    /// history snapshot to replay and the live receiver.
    pub async fn join_room(
        &self,
        context_id: &str,
    ) -> (Vec<Message>, broadcast::Receiver<Outbound>) {
        let mut rooms = self.rooms.write().await;
        let room = rooms.entry(context_id.to_string()).or_insert_with(Room::new);
        (room.history.clone(), room.tx.subscribe())
    }

    /// Relay an event to every other member of the room. Chat messages are
    /// appended to the room history so late joiners can replay them.
    pub async fn publish(&self, context_id: &str, sender_id: &str, event: ChannelEvent) {
        let mut rooms = self.rooms.write().await;
        let room = rooms.entry(context_id.to_string()).or_insert_with(Room::new);
        if let ChannelEvent::Message { message } = &event {
            room.history.push(message.clone());
        }
        let _ = room.tx.send((sender_id.to_string(), event));
    }

    pub async fn contexts(&self) -> Vec<ContextSummary> {
        let rooms = self.rooms.read().await;
        let mut summaries: Vec<ContextSummary> = rooms
            .iter()
            .map(|(id, room)| ContextSummary {
                context_id: id.clone(),
                message_count: room.history.len(),
            })
            .collect();
        summaries.sort_by(|a, b| a.context_id.cmp(&b.context_id));
        summaries
    }
}
