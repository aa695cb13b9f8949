use crate::config::DatabaseConfig;
use crate::domain::message::{Message, MessageStatus, NewMessage, TransitionOutcome};
use crate::error::Result;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use uuid::Uuid;

pub mod memory;
pub mod message_repo;
pub mod records;

pub use memory::InMemoryMessageStore;
pub use message_repo::PostgresMessageStore;

pub type DbPool = Pool<Postgres>;

/// Authoritative bookkeeping of messages and their delivery state.
///
/// Implementations serialize updates per record and keep a unique index on the
/// provider message id, so a provider id written by one task is visible to every
/// later lookup.
#[async_trait]
pub trait MessageStore: Send + Sync + std::fmt::Debug {
    /// Stores a new message, filling in id, status (`pending`) and timestamp when unset.
    ///
    /// # Errors
    /// Returns `AppError::Conflict` if the provider message id is already taken.
    async fn create(&self, message: NewMessage) -> Result<Message>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Message>>;

    /// Messages of a conversation, newest first, at most `limit` of them.
    async fn find_by_conversation(&self, conversation_id: &str, limit: usize) -> Result<Vec<Message>>;

    async fn find_by_provider_id(&self, provider_message_id: &str) -> Result<Option<Message>>;

    /// Overwrites the status without any transition check.
    async fn update_status(&self, id: Uuid, status: MessageStatus) -> Result<Option<Message>>;

    /// Records the provider-assigned id together with the new status.
    ///
    /// # Errors
    /// Returns `AppError::Conflict` if the provider id belongs to another message, or the
    /// message already carries a different provider id.
    async fn attach_provider_id(
        &self,
        id: Uuid,
        provider_message_id: &str,
        status: MessageStatus,
    ) -> Result<Option<Message>>;

    /// Moves a message to `next` if the state machine allows it. Atomic per record.
    async fn transition(&self, id: Uuid, next: MessageStatus) -> Result<Option<TransitionOutcome>>;

    /// Checks that the store is reachable.
    async fn ping(&self) -> Result<()>;
}

/// Initializes the database connection pool.
///
/// # Errors
/// Returns `sqlx::Error` if the connection fails.
pub async fn init_pool(config: &DatabaseConfig, url: &str) -> std::result::Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(url)
        .await
}

/// Applies the bundled schema migrations.
///
/// # Errors
/// Returns an error if a migration fails.
pub async fn run_migrations(pool: &DbPool) -> std::result::Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!().run(pool).await
}
