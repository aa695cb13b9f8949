use crate::domain::message::{Message, MessageKind, MessageStatus};
use crate::services::message_service::SendRequest;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    #[serde(default)]
    pub recipient_address: String,
    #[serde(default)]
    pub recipient_reference: Option<String>,
    #[serde(default)]
    pub payload: String,
    #[serde(default)]
    pub kind: Option<MessageKind>,
    #[serde(default)]
    pub key_fingerprint: Option<String>,
}

impl From<SendMessage> for SendRequest {
    fn from(body: SendMessage) -> Self {
        Self {
            recipient_address: body.recipient_address,
            recipient_reference: body.recipient_reference,
            payload: body.payload,
            kind: body.kind.unwrap_or_default(),
            key_fingerprint: body.key_fingerprint,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageResponse {
    pub local_message_id: Uuid,
    pub provider_message_id: Option<String>,
    pub status: MessageStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl From<&Message> for SendMessageResponse {
    fn from(message: &Message) -> Self {
        Self {
            local_message_id: message.id,
            provider_message_id: message.provider_message_id.clone(),
            status: message.status,
            timestamp: message.timestamp,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    #[serde(default)]
    pub conversation_id: String,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: Uuid,
    pub conversation_id: Option<String>,
    pub sender_id: String,
    pub recipient_id: String,
    pub content: String,
    pub message_type: MessageKind,
    pub status: MessageStatus,
    pub provider_message_id: Option<String>,
    pub key_fingerprint: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<Message> for MessageView {
    fn from(message: Message) -> Self {
        Self {
            id: message.id,
            conversation_id: message.conversation_id,
            sender_id: message.sender_id,
            recipient_id: message.recipient_id,
            content: message.content,
            message_type: message.message_type,
            status: message.status,
            provider_message_id: message.provider_message_id,
            key_fingerprint: message.key_fingerprint,
            timestamp: message.timestamp,
            updated_at: message.updated_at,
        }
    }
}
