use crate::domain::ids::new_message_id;
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

/// Lifecycle of a message.
///
/// `pending -> sent -> delivered -> read`, with `failed` reachable from any
/// non-terminal state. `read` and `failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Pending,
    Sent,
    Delivered,
    Read,
    Failed,
}

impl MessageStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Read | Self::Failed)
    }

    /// States from which `next` may be entered.
    #[must_use]
    pub const fn predecessors(next: Self) -> &'static [Self] {
        match next {
            Self::Pending => &[],
            Self::Sent => &[Self::Pending],
            Self::Delivered => &[Self::Sent],
            Self::Read => &[Self::Sent, Self::Delivered],
            Self::Failed => &[Self::Pending, Self::Sent, Self::Delivered],
        }
    }

    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        Self::predecessors(next).contains(&self)
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for MessageStatus {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "sent" => Ok(Self::Sent),
            "delivered" => Ok(Self::Delivered),
            "read" => Ok(Self::Read),
            "failed" => Ok(Self::Failed),
            _ => Err(()),
        }
    }
}

/// Kind of content carried by a message. Informational only; content is never interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    Document,
    Audio,
    Video,
    Other(String),
}

impl MessageKind {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Document => "document",
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Other(kind) => kind,
        }
    }
}

impl From<&str> for MessageKind {
    fn from(value: &str) -> Self {
        match value {
            "text" => Self::Text,
            "image" => Self::Image,
            "document" => Self::Document,
            "audio" => Self::Audio,
            "video" => Self::Video,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for MessageKind {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<MessageKind> for String {
    fn from(kind: MessageKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Option<String>,
    pub sender_id: String,
    pub recipient_id: String,
    pub content: String,
    pub message_type: MessageKind,
    pub status: MessageStatus,
    pub provider_message_id: Option<String>,
    pub key_fingerprint: Option<String>,
    pub timestamp: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Fields for a message about to be stored. Unset fields get store defaults.
#[derive(Debug, Clone, Default)]
pub struct NewMessage {
    pub id: Option<Uuid>,
    pub conversation_id: Option<String>,
    pub sender_id: String,
    pub recipient_id: String,
    pub content: String,
    pub message_type: MessageKind,
    pub status: Option<MessageStatus>,
    pub provider_message_id: Option<String>,
    pub key_fingerprint: Option<String>,
    pub timestamp: Option<OffsetDateTime>,
}

impl NewMessage {
    #[must_use]
    pub fn into_message(self, now: OffsetDateTime) -> Message {
        Message {
            id: self.id.unwrap_or_else(new_message_id),
            conversation_id: self.conversation_id,
            sender_id: self.sender_id,
            recipient_id: self.recipient_id,
            content: self.content,
            message_type: self.message_type,
            status: self.status.unwrap_or(MessageStatus::Pending),
            provider_message_id: self.provider_message_id,
            key_fingerprint: self.key_fingerprint,
            timestamp: self.timestamp.unwrap_or(now),
            updated_at: now,
        }
    }
}

/// Result of a guarded status transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The status changed.
    Applied(Message),
    /// The message was already in the requested state.
    Unchanged(Message),
    /// The transition is not allowed from the current state; the message is untouched.
    Rejected(Message),
}

impl TransitionOutcome {
    #[must_use]
    pub fn into_message(self) -> Message {
        match self {
            Self::Applied(m) | Self::Unchanged(m) | Self::Rejected(m) => m,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    Applied,
    Unchanged,
    Rejected,
}

impl TransitionKind {
    /// Decides the outcome of moving `current` to `next` without mutating anything.
    #[must_use]
    pub fn classify(current: MessageStatus, next: MessageStatus) -> Self {
        if current == next {
            Self::Unchanged
        } else if current.can_transition_to(next) {
            Self::Applied
        } else {
            Self::Rejected
        }
    }

    #[must_use]
    pub fn wrap(self, message: Message) -> TransitionOutcome {
        match self {
            Self::Applied => TransitionOutcome::Applied(message),
            Self::Unchanged => TransitionOutcome::Unchanged(message),
            Self::Rejected => TransitionOutcome::Rejected(message),
        }
    }
}
