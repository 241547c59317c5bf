use std::time::Duration;

use tracing::debug;

use crate::message::Message;

/// Append-only ordered list of chat entries; the single source of truth for
/// what has been said in one conversation context.
#[derive(Debug, Default)]
pub struct MessageLog {
    messages: Vec<Message>,
    /// Whether history has ever been replayed into this context. Explicit,
    /// not inferred from the current message count: reconnects of the same
    /// context must take the instant batch path even if the log is empty.
    initialized: bool,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Append a locally-originated message. No reordering, no deduplication.
    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Append a remote-origin message. The same logical event can arrive once
    /// via history replay and once via live relay, so duplicates (same id, or
    /// same text at the same time) are dropped. Returns whether it appended.
    pub fn append_remote(&mut self, message: Message) -> bool {
        if self.messages.iter().any(|m| m.duplicates(&message)) {
            debug!(id = message.id, "dropping duplicate delivery");
            return false;
        }
        self.messages.push(message);
        true
    }

    /// Replay a history batch. The first replay for this context staggers
    /// inserts with the given delay to read like a live conversation; every
    /// later replay (reconnect) appends the batch instantly.
    pub async fn replay_history(&mut self, history: Vec<Message>, stagger: Duration) {
        let first_load = !self.initialized;
        self.initialized = true;
        for message in history {
            if first_load && !stagger.is_zero() {
                tokio::time::sleep(stagger).await;
            }
            self.append_remote(message);
        }
    }

    /// Remove all ephemeral placeholders and, in the same operation, append
    /// the message that resolves them. A placeholder is never observable
    /// alongside its resolution.
    pub fn resolve_ephemeral(&mut self, resolution: Option<Message>) {
        self.messages.retain(|m| !m.is_ephemeral());
        if let Some(message) = resolution {
            self.messages.push(message);
        }
    }

    /// Remove the most recent message from the given sender. Used by the
    /// registration retry path to withdraw the just-submitted answer.
    pub fn remove_last_from(&mut self, sender_id: &str) -> Option<Message> {
        let idx = self
            .messages
            .iter()
            .rposition(|m| m.sender_id == sender_id)?;
        Some(self.messages.remove(idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{DeliveryStatus, MessageBody, SenderType};

    fn text_at(id: i64, text: &str, time: &str) -> Message {
        Message {
            id,
            sender_id: "r1".to_string(),
            sender_type: SenderType::Runner,
            body: MessageBody::Text {
                text: text.to_string(),
                affordance: None,
                edited: false,
            },
            time: time.to_string(),
            status: DeliveryStatus::Sent,
        }
    }

    #[test]
    fn test_remote_append_is_idempotent_by_id() {
        let mut log = MessageLog::new();
        assert!(log.append_remote(text_at(5, "hi", "10:00")));
        assert!(!log.append_remote(text_at(5, "hi", "10:00")));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_remote_append_is_idempotent_by_text_and_time() {
        let mut log = MessageLog::new();
        log.append_remote(text_at(5, "hi", "10:00"));
        // Different id, same text at the same display time.
        assert!(!log.append_remote(text_at(9, "hi", "10:00")));
        assert!(log.append_remote(text_at(9, "hi", "10:01")));
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_local_append_never_dedupes() {
        let mut log = MessageLog::new();
        log.append(text_at(5, "hi", "10:00"));
        log.append(text_at(5, "hi", "10:00"));
        assert_eq!(log.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_replay_staggers_inserts() {
        let mut log = MessageLog::new();
        let start = tokio::time::Instant::now();
        log.replay_history(
            vec![text_at(1, "a", "10:00"), text_at(2, "b", "10:01")],
            Duration::from_millis(600),
        )
        .await;
        assert_eq!(log.len(), 2);
        assert!(log.is_initialized());
        assert_eq!(start.elapsed(), Duration::from_millis(1200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_replay_is_instant() {
        let mut log = MessageLog::new();
        log.replay_history(vec![text_at(1, "a", "10:00")], Duration::from_millis(600))
            .await;

        let start = tokio::time::Instant::now();
        log.replay_history(
            vec![text_at(1, "a", "10:00"), text_at(2, "b", "10:01")],
            Duration::from_millis(600),
        )
        .await;
        // Batch path: no delay, and the overlapping entry deduplicated.
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_resolve_ephemeral_is_atomic() {
        let mut log = MessageLog::new();
        log.append(text_at(1, "answer", "10:00"));
        log.append(Message::ephemeral_system("In progress…"));
        log.resolve_ephemeral(Some(Message::system("Registration complete")));

        assert_eq!(log.len(), 2);
        assert!(log.messages().iter().all(|m| !m.is_ephemeral()));
        assert_eq!(
            log.messages().last().unwrap().display_text(),
            Some("Registration complete")
        );
    }

    #[test]
    fn test_remove_last_from_sender() {
        let mut log = MessageLog::new();
        log.append(Message::text("u1", SenderType::User, "first"));
        log.append(Message::text("r1", SenderType::Runner, "reply"));
        log.append(Message::text("u1", SenderType::User, "second"));

        let removed = log.remove_last_from("u1").unwrap();
        assert_eq!(removed.display_text(), Some("second"));
        assert_eq!(log.len(), 2);
        assert!(log.remove_last_from("nobody").is_none());
    }
}
