use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::checklist::Milestone;
use crate::error::{FlowError, Result};
use crate::invoice::Invoice;

/// Who produced a message, in absolute terms. Perspective-relative tags
/// (`me`/`them`) are derived per viewer at read time, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderType {
    User,
    Runner,
    System,
}

/// Sender tag relative to a particular viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Perspective {
    Me,
    Them,
    System,
}

/// Delivery state for a participant's own messages.
/// Ordered so that advancement can be checked with a comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sent,
    Delivered,
    Read,
}

/// Inline affordance a text message may carry. A message carries at most one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Affordance {
    ResendLink,
    ConnectRunner,
    ChooseDelivery,
}

/// Live location payload for a tracking card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingData {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_minutes: Option<u32>,
}

/// Message payload. Each variant carries only the fields it needs; the wire
/// tags match the historical client (`profile-card` kept its hyphen).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MessageBody {
    #[serde(rename = "text")]
    Text {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        affordance: Option<Affordance>,
        #[serde(default)]
        edited: bool,
    },
    #[serde(rename = "image")]
    Image { image_url: String },
    #[serde(rename = "audio")]
    Audio { audio_url: String },
    #[serde(rename = "file")]
    File { file_url: String, file_name: String },
    #[serde(rename = "system")]
    System {
        text: String,
        /// Transient placeholder ("In progress…") removed once resolved.
        #[serde(default)]
        ephemeral: bool,
    },
    #[serde(rename = "profile-card")]
    ProfileCard {
        runner_id: String,
        display_name: String,
    },
    #[serde(rename = "status_update")]
    StatusUpdate { milestone: Milestone, text: String },
    #[serde(rename = "tracking")]
    Tracking { tracking: TrackingData },
    #[serde(rename = "invoice")]
    Invoice { invoice: Invoice },
}

/// The atomic unit of the chat log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Millisecond-timestamp based. Monotonic enough for ordering; collisions
    /// are tolerated by the log, never fatal.
    pub id: i64,
    pub sender_id: String,
    pub sender_type: SenderType,
    #[serde(flatten)]
    pub body: MessageBody,
    /// Human-readable timestamp, display-only.
    pub time: String,
    pub status: DeliveryStatus,
}

/// Sender id used for system-originated messages.
pub const SYSTEM_SENDER: &str = "system";

impl Message {
    fn stamp() -> (i64, String) {
        let now = Utc::now();
        (now.timestamp_millis(), now.format("%H:%M").to_string())
    }

    pub fn text(sender_id: &str, sender_type: SenderType, text: &str) -> Self {
        Self::text_with_affordance(sender_id, sender_type, text, None)
    }

    pub fn text_with_affordance(
        sender_id: &str,
        sender_type: SenderType,
        text: &str,
        affordance: Option<Affordance>,
    ) -> Self {
        let (id, time) = Self::stamp();
        Self {
            id,
            sender_id: sender_id.to_string(),
            sender_type,
            body: MessageBody::Text {
                text: text.to_string(),
                affordance,
                edited: false,
            },
            time,
            status: DeliveryStatus::Sent,
        }
    }

    pub fn system(text: &str) -> Self {
        Self::system_inner(text, false)
    }

    /// A placeholder system message, removed once its outcome is known.
    pub fn ephemeral_system(text: &str) -> Self {
        Self::system_inner(text, true)
    }

    fn system_inner(text: &str, ephemeral: bool) -> Self {
        let (id, time) = Self::stamp();
        Self {
            id,
            sender_id: SYSTEM_SENDER.to_string(),
            sender_type: SenderType::System,
            body: MessageBody::System {
                text: text.to_string(),
                ephemeral,
            },
            time,
            status: DeliveryStatus::Sent,
        }
    }

    pub fn status_update(milestone: Milestone, text: &str) -> Self {
        let (id, time) = Self::stamp();
        Self {
            id,
            sender_id: SYSTEM_SENDER.to_string(),
            sender_type: SenderType::System,
            body: MessageBody::StatusUpdate {
                milestone,
                text: text.to_string(),
            },
            time,
            status: DeliveryStatus::Sent,
        }
    }

    pub fn invoice(sender_id: &str, invoice: Invoice) -> Self {
        let (id, time) = Self::stamp();
        Self {
            id,
            sender_id: sender_id.to_string(),
            sender_type: SenderType::Runner,
            body: MessageBody::Invoice { invoice },
            time,
            status: DeliveryStatus::Sent,
        }
    }

    pub fn tracking(tracking: TrackingData) -> Self {
        let (id, time) = Self::stamp();
        Self {
            id,
            sender_id: SYSTEM_SENDER.to_string(),
            sender_type: SenderType::System,
            body: MessageBody::Tracking { tracking },
            time,
            status: DeliveryStatus::Sent,
        }
    }

    /// Derive the perspective-relative sender tag for a viewer.
    pub fn perspective(&self, viewer_id: &str) -> Perspective {
        if self.sender_type == SenderType::System {
            Perspective::System
        } else if self.sender_id == viewer_id {
            Perspective::Me
        } else {
            Perspective::Them
        }
    }

    /// Advance the delivery status. Regressions are ignored: status is
    /// monotonically non-decreasing.
    pub fn advance_status(&mut self, next: DeliveryStatus) {
        if next > self.status {
            self.status = next;
        }
    }

    /// Edit the text of one's own message. Only text messages from the
    /// editing sender may change; the message is marked as edited.
    pub fn edit(&mut self, editor_id: &str, new_text: &str) -> Result<()> {
        if self.sender_id != editor_id {
            return Err(FlowError::NotMessageSender);
        }
        match &mut self.body {
            MessageBody::Text { text, edited, .. } => {
                *text = new_text.to_string();
                *edited = true;
                Ok(())
            }
            _ => Err(FlowError::NotMessageSender),
        }
    }

    /// Display text for variants that carry one. Used by the log's
    /// `(text, time)` duplicate check.
    pub fn display_text(&self) -> Option<&str> {
        match &self.body {
            MessageBody::Text { text, .. } => Some(text),
            MessageBody::System { text, .. } => Some(text),
            MessageBody::StatusUpdate { text, .. } => Some(text),
            _ => None,
        }
    }

    pub fn is_ephemeral(&self) -> bool {
        matches!(self.body, MessageBody::System { ephemeral: true, .. })
    }

    /// Whether two messages are the same logical event: identical id, or
    /// identical display text at the identical display time.
    pub fn duplicates(&self, other: &Message) -> bool {
        if self.id == other.id {
            return true;
        }
        match (self.display_text(), other.display_text()) {
            (Some(a), Some(b)) => a == b && self.time == other.time,
            _ => false,
        }
    }
}
