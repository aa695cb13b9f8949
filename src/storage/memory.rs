use crate::domain::message::{Message, MessageStatus, NewMessage, TransitionKind, TransitionOutcome};
use crate::error::{AppError, Result};
use crate::storage::MessageStore;
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::cmp::Reverse;
use time::OffsetDateTime;
use uuid::Uuid;

/// Process-local store for tests and single-node deployments.
///
/// Lock order is always provider index first, then records; conversation
/// membership is touched only after record guards are released.
#[derive(Debug, Default)]
pub struct InMemoryMessageStore {
    records: DashMap<Uuid, Message>,
    by_provider_id: DashMap<String, Uuid>,
    by_conversation: DashMap<String, Vec<Uuid>>,
}

impl InMemoryMessageStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    #[tracing::instrument(level = "debug", skip(self, message))]
    async fn create(&self, message: NewMessage) -> Result<Message> {
        let message = message.into_message(OffsetDateTime::now_utc());

        if self.records.contains_key(&message.id) {
            return Err(AppError::Conflict(format!("Message {} already exists", message.id)));
        }

        if let Some(provider_id) = message.provider_message_id.clone() {
            match self.by_provider_id.entry(provider_id) {
                Entry::Occupied(occupied) => {
                    return Err(AppError::Conflict(format!("Provider message id {} is already stored", occupied.key())));
                }
                Entry::Vacant(vacant) => {
                    self.records.insert(message.id, message.clone());
                    vacant.insert(message.id);
                }
            }
        } else {
            self.records.insert(message.id, message.clone());
        }

        if let Some(conversation_id) = &message.conversation_id {
            self.by_conversation.entry(conversation_id.clone()).or_default().push(message.id);
        }

        Ok(message)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Message>> {
        Ok(self.records.get(&id).map(|entry| entry.value().clone()))
    }

    async fn find_by_conversation(&self, conversation_id: &str, limit: usize) -> Result<Vec<Message>> {
        let ids = self.by_conversation.get(conversation_id).map(|entry| entry.value().clone()).unwrap_or_default();

        let mut messages: Vec<Message> =
            ids.iter().filter_map(|id| self.records.get(id).map(|entry| entry.value().clone())).collect();
        messages.sort_by_key(|m| Reverse((m.timestamp, m.id)));
        messages.truncate(limit);

        Ok(messages)
    }

    async fn find_by_provider_id(&self, provider_message_id: &str) -> Result<Option<Message>> {
        let Some(id) = self.by_provider_id.get(provider_message_id).map(|entry| *entry.value()) else {
            return Ok(None);
        };
        self.find_by_id(id).await
    }

    async fn update_status(&self, id: Uuid, status: MessageStatus) -> Result<Option<Message>> {
        Ok(self.records.get_mut(&id).map(|mut entry| {
            entry.status = status;
            entry.updated_at = OffsetDateTime::now_utc();
            entry.value().clone()
        }))
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn attach_provider_id(
        &self,
        id: Uuid,
        provider_message_id: &str,
        status: MessageStatus,
    ) -> Result<Option<Message>> {
        let index_entry = self.by_provider_id.entry(provider_message_id.to_string());
        if let Entry::Occupied(occupied) = &index_entry
            && *occupied.get() != id
        {
            return Err(AppError::Conflict(format!("Provider message id {provider_message_id} belongs to another message")));
        }

        let Some(mut record) = self.records.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(existing) = &record.provider_message_id
            && existing != provider_message_id
        {
            return Err(AppError::Conflict(format!("Message {id} already has provider message id {existing}")));
        }

        record.provider_message_id = Some(provider_message_id.to_string());
        record.status = status;
        record.updated_at = OffsetDateTime::now_utc();
        let updated = record.value().clone();
        drop(record);

        index_entry.or_insert(id);
        Ok(Some(updated))
    }

    async fn transition(&self, id: Uuid, next: MessageStatus) -> Result<Option<TransitionOutcome>> {
        let Some(mut record) = self.records.get_mut(&id) else {
            return Ok(None);
        };

        let kind = TransitionKind::classify(record.status, next);
        if kind == TransitionKind::Applied {
            record.status = next;
            record.updated_at = OffsetDateTime::now_utc();
        }

        Ok(Some(kind.wrap(record.value().clone())))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
