use crate::domain::message::{Message, MessageStatus, NewMessage, TransitionKind, TransitionOutcome};
use crate::error::{AppError, Result};
use crate::storage::records::MessageRecord;
use crate::storage::{DbPool, MessageStore};
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

const COLUMNS: &str = "id, conversation_id, sender_id, recipient_id, content, message_type, status, \
                       provider_message_id, key_fingerprint, timestamp, updated_at";

/// Postgres-backed message store.
#[derive(Clone, Debug)]
pub struct PostgresMessageStore {
    pool: DbPool,
}

impl PostgresMessageStore {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn fetch_one_by_id(&self, id: Uuid) -> Result<Option<Message>> {
        let record = sqlx::query_as::<_, MessageRecord>(&format!("SELECT {COLUMNS} FROM messages WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        record.map(Message::try_from).transpose()
    }
}

fn unique_violation(e: sqlx::Error, what: &str) -> AppError {
    if let sqlx::Error::Database(db_err) = &e
        && db_err.code().as_deref() == Some("23505")
    {
        return AppError::Conflict(format!("{what} is already stored"));
    }
    AppError::Database(e)
}

#[async_trait]
impl MessageStore for PostgresMessageStore {
    #[tracing::instrument(level = "debug", skip(self, message))]
    async fn create(&self, message: NewMessage) -> Result<Message> {
        let message = message.into_message(OffsetDateTime::now_utc());

        let record = sqlx::query_as::<_, MessageRecord>(&format!(
            r#"
            INSERT INTO messages ({COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(message.id)
        .bind(&message.conversation_id)
        .bind(&message.sender_id)
        .bind(&message.recipient_id)
        .bind(&message.content)
        .bind(message.message_type.as_str())
        .bind(message.status.as_str())
        .bind(&message.provider_message_id)
        .bind(&message.key_fingerprint)
        .bind(message.timestamp)
        .bind(message.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| unique_violation(e, "Message"))?;

        record.try_into()
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Message>> {
        self.fetch_one_by_id(id).await
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn find_by_conversation(&self, conversation_id: &str, limit: usize) -> Result<Vec<Message>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let records = sqlx::query_as::<_, MessageRecord>(&format!(
            r#"
            SELECT {COLUMNS}
            FROM messages
            WHERE conversation_id = $1
            ORDER BY timestamp DESC, id DESC
            LIMIT $2
            "#
        ))
        .bind(conversation_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        records.into_iter().map(Message::try_from).collect()
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn find_by_provider_id(&self, provider_message_id: &str) -> Result<Option<Message>> {
        let record = sqlx::query_as::<_, MessageRecord>(&format!(
            "SELECT {COLUMNS} FROM messages WHERE provider_message_id = $1"
        ))
        .bind(provider_message_id)
        .fetch_optional(&self.pool)
        .await?;

        record.map(Message::try_from).transpose()
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn update_status(&self, id: Uuid, status: MessageStatus) -> Result<Option<Message>> {
        let record = sqlx::query_as::<_, MessageRecord>(&format!(
            r#"
            UPDATE messages SET status = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await?;

        record.map(Message::try_from).transpose()
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn attach_provider_id(
        &self,
        id: Uuid,
        provider_message_id: &str,
        status: MessageStatus,
    ) -> Result<Option<Message>> {
        let record = sqlx::query_as::<_, MessageRecord>(&format!(
            r#"
            UPDATE messages SET provider_message_id = $2, status = $3, updated_at = NOW()
            WHERE id = $1 AND (provider_message_id IS NULL OR provider_message_id = $2)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(provider_message_id)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| unique_violation(e, "Provider message id"))?;

        match record {
            Some(record) => Ok(Some(record.try_into()?)),
            None => match self.fetch_one_by_id(id).await? {
                Some(existing) => Err(AppError::Conflict(format!(
                    "Message {id} already has provider message id {}",
                    existing.provider_message_id.unwrap_or_default()
                ))),
                None => Ok(None),
            },
        }
    }

    /// Compare-and-set on the current status. A lost race re-reads the row and
    /// classifies against the status that won.
    #[tracing::instrument(level = "debug", skip(self))]
    async fn transition(&self, id: Uuid, next: MessageStatus) -> Result<Option<TransitionOutcome>> {
        let allowed: Vec<&str> = MessageStatus::predecessors(next).iter().map(|s| s.as_str()).collect();

        let updated = sqlx::query_as::<_, MessageRecord>(&format!(
            r#"
            UPDATE messages SET status = $2, updated_at = NOW()
            WHERE id = $1 AND status = ANY($3)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(next.as_str())
        .bind(allowed)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(record) = updated {
            return Ok(Some(TransitionOutcome::Applied(record.try_into()?)));
        }

        Ok(self.fetch_one_by_id(id).await?.map(|current| {
            match TransitionKind::classify(current.status, next) {
                // Row changed after the update missed; the write was not ours.
                TransitionKind::Applied => TransitionOutcome::Rejected(current),
                kind => kind.wrap(current),
            }
        }))
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
