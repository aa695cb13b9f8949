use crate::config::MessagingConfig;
use crate::domain::address::AddressFormat;
use crate::domain::ids::KeyFingerprint;
use crate::domain::message::{Message, MessageKind, MessageStatus, NewMessage, TransitionOutcome};
use crate::error::{AppError, Result};
use crate::services::conversation::ConversationResolver;
use crate::services::provider::MessagingProvider;
use crate::storage::MessageStore;
use opentelemetry::{KeyValue, global, metrics::Counter};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub(crate) struct Metrics {
    pub(crate) sent_total: Counter<u64>,
    pub(crate) read_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("courier-server");
        Self {
            sent_total: meter
                .u64_counter("courier_messages_sent_total")
                .with_description("Outbound messages handed to the provider, by outcome")
                .build(),
            read_total: meter
                .u64_counter("courier_messages_read_total")
                .with_description("Local read requests, by outcome")
                .build(),
        }
    }
}

/// An outbound message as requested by a client.
#[derive(Debug, Clone, Default)]
pub struct SendRequest {
    pub recipient_address: String,
    /// Opaque participant id stored as the recipient. Falls back to the normalized address.
    pub recipient_reference: Option<String>,
    pub payload: String,
    pub kind: MessageKind,
    pub key_fingerprint: Option<String>,
}

#[derive(Clone, Debug)]
pub struct MessageService {
    store: Arc<dyn MessageStore>,
    provider: Arc<dyn MessagingProvider>,
    resolver: Arc<dyn ConversationResolver>,
    address_format: AddressFormat,
    config: MessagingConfig,
    metrics: Metrics,
}

impl MessageService {
    #[must_use]
    pub fn new(
        store: Arc<dyn MessageStore>,
        provider: Arc<dyn MessagingProvider>,
        resolver: Arc<dyn ConversationResolver>,
        address_format: AddressFormat,
        config: MessagingConfig,
    ) -> Self {
        Self { store, provider, resolver, address_format, config, metrics: Metrics::new() }
    }

    /// Records an outbound message and dispatches it through the provider.
    ///
    /// The local record is created before the provider is called, so it can be
    /// looked up whatever the dispatch outcome.
    ///
    /// # Errors
    /// Returns `AppError::BadRequest` if the address or payload is unusable; nothing is stored then.
    /// Returns `AppError::Delivery` carrying the local id for every failure after the record
    /// exists. A message the provider accepted but whose provider id could not be stored
    /// stays `pending`; only a rejected dispatch marks it `failed`.
    #[tracing::instrument(
        err(level = "warn"),
        skip(self, request),
        fields(kind = %request.kind, message_id = tracing::field::Empty)
    )]
    pub async fn send(&self, request: SendRequest) -> Result<Message> {
        if request.recipient_address.trim().is_empty() {
            return Err(AppError::BadRequest("recipientAddress is required".into()));
        }
        if request.payload.trim().is_empty() {
            return Err(AppError::BadRequest("payload is required".into()));
        }
        let address = self.address_format.normalize(&request.recipient_address).map_err(AppError::BadRequest)?;
        let key_fingerprint =
            request.key_fingerprint.as_deref().map(KeyFingerprint::parse).transpose()?.map(String::from);

        let account = self.provider.account_id().to_string();
        let recipient_id = request
            .recipient_reference
            .filter(|reference| !reference.trim().is_empty())
            .unwrap_or_else(|| address.clone());

        let message = self
            .store
            .create(NewMessage {
                conversation_id: self.resolver.resolve(&account, &address),
                sender_id: account,
                recipient_id,
                content: request.payload,
                message_type: request.kind,
                key_fingerprint,
                ..Default::default()
            })
            .await?;
        tracing::Span::current().record("message_id", tracing::field::display(message.id));
        tracing::debug!("Message recorded as pending");

        match self.provider.send(&address, &message.content, &message.message_type).await {
            Ok(receipt) => {
                match self.store.attach_provider_id(message.id, &receipt.provider_message_id, MessageStatus::Sent).await
                {
                    Ok(Some(sent)) => {
                        tracing::info!(provider_message_id = %receipt.provider_message_id, "Message accepted by provider");
                        self.metrics.sent_total.add(1, &[KeyValue::new("status", "success")]);
                        Ok(sent)
                    }
                    Ok(None) => {
                        self.metrics.sent_total.add(1, &[KeyValue::new("status", "unrecorded")]);
                        Err(AppError::Delivery {
                            message_id: message.id,
                            reason: format!(
                                "Provider accepted the message as {} but the local record disappeared",
                                receipt.provider_message_id
                            ),
                        })
                    }
                    // Accepted by the provider: the record stays pending.
                    Err(e) => {
                        tracing::error!(
                            provider_message_id = %receipt.provider_message_id,
                            error = %e,
                            "Provider accepted message but its id could not be recorded"
                        );
                        self.metrics.sent_total.add(1, &[KeyValue::new("status", "unrecorded")]);
                        Err(AppError::Delivery {
                            message_id: message.id,
                            reason: format!(
                                "Provider accepted the message as {} but it could not be recorded: {e}",
                                receipt.provider_message_id
                            ),
                        })
                    }
                }
            }
            Err(e) => {
                self.metrics.sent_total.add(1, &[KeyValue::new("status", "failure")]);
                self.mark_failed(message.id).await;
                Err(AppError::Delivery { message_id: message.id, reason: e.to_string() })
            }
        }
    }

    async fn mark_failed(&self, id: Uuid) {
        match self.store.transition(id, MessageStatus::Failed).await {
            Ok(Some(TransitionOutcome::Rejected(current))) => {
                tracing::warn!(message_id = %id, status = %current.status, "Could not mark message as failed");
            }
            Ok(_) => {}
            Err(e) => tracing::error!(message_id = %id, error = %e, "Failed to record dispatch failure"),
        }
    }

    /// # Errors
    /// Returns `AppError::NotFound` if no message has this id.
    pub async fn get(&self, id: Uuid) -> Result<Message> {
        self.store.find_by_id(id).await?.ok_or(AppError::NotFound)
    }

    /// Messages of a conversation, newest first.
    ///
    /// # Errors
    /// Returns `AppError::BadRequest` if the conversation id is blank.
    #[tracing::instrument(err(level = "warn"), skip(self))]
    pub async fn history(&self, conversation_id: &str, limit: Option<usize>) -> Result<Vec<Message>> {
        if conversation_id.trim().is_empty() {
            return Err(AppError::BadRequest("conversationId is required".into()));
        }
        let limit = limit.unwrap_or(self.config.default_history_limit).min(self.config.max_history_limit);
        self.store.find_by_conversation(conversation_id, limit).await
    }

    /// Marks a message as read locally, then acknowledges the read to the provider.
    ///
    /// The provider acknowledgment is best effort: its failure is logged and the local
    /// update stands.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` for an unknown id and `AppError::Conflict` if the
    /// message cannot move to `read` from its current state.
    #[tracing::instrument(err(level = "warn"), skip(self))]
    pub async fn mark_read(&self, id: Uuid) -> Result<Message> {
        let outcome = self.store.transition(id, MessageStatus::Read).await?.ok_or(AppError::NotFound)?;

        let message = match outcome {
            TransitionOutcome::Rejected(current) => {
                self.metrics.read_total.add(1, &[KeyValue::new("status", "rejected")]);
                return Err(AppError::Conflict(format!(
                    "Message {id} cannot be marked read while {}",
                    current.status
                )));
            }
            TransitionOutcome::Unchanged(current) => {
                self.metrics.read_total.add(1, &[KeyValue::new("status", "unchanged")]);
                return Ok(current);
            }
            TransitionOutcome::Applied(updated) => updated,
        };
        self.metrics.read_total.add(1, &[KeyValue::new("status", "applied")]);

        if let Some(provider_message_id) = &message.provider_message_id {
            match self.provider.mark_read(provider_message_id).await {
                Ok(ack) if ack.success => tracing::debug!(%provider_message_id, "Provider acknowledged read"),
                Ok(_) => tracing::warn!(%provider_message_id, "Provider declined read acknowledgment"),
                Err(e) => tracing::warn!(%provider_message_id, error = %e, "Provider read acknowledgment failed"),
            }
        }

        Ok(message)
    }

    /// Asks the provider for the current status of a message and applies it.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` for an unknown id and `AppError::Delivery` if the
    /// provider could not be queried.
    #[tracing::instrument(err(level = "warn"), skip(self))]
    pub async fn refresh_status(&self, id: Uuid) -> Result<Message> {
        let message = self.get(id).await?;
        let Some(provider_message_id) = message.provider_message_id.clone() else {
            tracing::debug!("Message has no provider id yet, nothing to refresh");
            return Ok(message);
        };

        let snapshot = self
            .provider
            .get_status(&provider_message_id)
            .await
            .map_err(|e| AppError::Delivery { message_id: id, reason: e.to_string() })?;

        let Some(status) = snapshot.status else {
            tracing::debug!(raw = %snapshot.raw, "Provider reported an untracked status");
            return Ok(message);
        };

        let outcome = self.store.transition(id, status).await?.ok_or(AppError::NotFound)?;
        if let TransitionOutcome::Rejected(current) = &outcome {
            tracing::info!(current = %current.status, reported = %status, "Ignoring stale provider status");
        }
        Ok(outcome.into_message())
    }
}
