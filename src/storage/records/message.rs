use crate::domain::message::{Message, MessageStatus};
use crate::error::AppError;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct MessageRecord {
    pub(crate) id: Uuid,
    pub(crate) conversation_id: Option<String>,
    pub(crate) sender_id: String,
    pub(crate) recipient_id: String,
    pub(crate) content: String,
    pub(crate) message_type: String,
    pub(crate) status: String,
    pub(crate) provider_message_id: Option<String>,
    pub(crate) key_fingerprint: Option<String>,
    pub(crate) timestamp: OffsetDateTime,
    pub(crate) updated_at: OffsetDateTime,
}

impl TryFrom<MessageRecord> for Message {
    type Error = AppError;

    fn try_from(record: MessageRecord) -> Result<Self, Self::Error> {
        let status = MessageStatus::try_from(record.status.as_str())
            .map_err(|()| AppError::InternalMsg(format!("Unknown message status in storage: {}", record.status)))?;

        Ok(Self {
            id: record.id,
            conversation_id: record.conversation_id,
            sender_id: record.sender_id,
            recipient_id: record.recipient_id,
            content: record.content,
            message_type: record.message_type.into(),
            status,
            provider_message_id: record.provider_message_id,
            key_fingerprint: record.key_fingerprint,
            timestamp: record.timestamp,
            updated_at: record.updated_at,
        })
    }
}
