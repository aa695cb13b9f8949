use crate::domain::message::{MessageKind, MessageStatus};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Provider unreachable: {0}")]
    Transport(String),
    #[error("Provider call timed out after {0:?}")]
    Timeout(Duration),
    #[error("Provider returned HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("Provider returned an unexpected response: {0}")]
    InvalidResponse(String),
    #[error("Provider call failed after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Box<ProviderError>,
    },
}

impl ProviderError {
    /// Network failures, timeouts, server errors and throttling are worth another attempt.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout(_) => true,
            Self::Http { status, .. } => *status >= 500 || *status == 429,
            Self::InvalidAddress(_) | Self::InvalidResponse(_) | Self::Exhausted { .. } => false,
        }
    }
}

/// Proof that the provider accepted a dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderReceipt {
    pub provider_message_id: String,
    /// Address the provider actually dispatched to, after normalization.
    pub address: String,
}

/// Provider view of a previously sent message.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    pub provider_message_id: String,
    /// `None` when the provider reports a status this service does not track.
    pub status: Option<MessageStatus>,
    pub raw: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadAck {
    pub success: bool,
}

/// Outbound side of the messaging provider.
///
/// Implementations retry transient failures internally; an error returned here is final.
#[async_trait]
pub trait MessagingProvider: Send + Sync + std::fmt::Debug {
    /// Provider account messages are sent from.
    fn account_id(&self) -> &str;

    /// Dispatches an opaque payload to an address.
    ///
    /// # Errors
    /// Returns `ProviderError::InvalidAddress` without contacting the provider if the
    /// address has no digits, otherwise the last error once retries are exhausted.
    async fn send(&self, address: &str, payload: &str, kind: &MessageKind) -> Result<ProviderReceipt, ProviderError>;

    async fn get_status(&self, provider_message_id: &str) -> Result<StatusSnapshot, ProviderError>;

    async fn mark_read(&self, provider_message_id: &str) -> Result<ReadAck, ProviderError>;
}
