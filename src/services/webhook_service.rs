use crate::config::WebhookConfig;
use crate::domain::callback::{CallbackChange, CallbackPayload, InboundMessage, StatusUpdate, parse_epoch_seconds};
use crate::domain::message::{MessageKind, MessageStatus, NewMessage, TransitionOutcome};
use crate::error::{AppError, Result};
use crate::services::conversation::ConversationResolver;
use crate::storage::MessageStore;
use hmac::{Hmac, Mac};
use opentelemetry::{KeyValue, global, metrics::Counter};
use serde_json::Value;
use sha2::Sha256;
use std::sync::Arc;
use tokio::sync::broadcast;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_PREFIX: &str = "sha256=";

#[derive(Clone, Debug)]
pub(crate) struct Metrics {
    pub(crate) events_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("courier-server");
        Self {
            events_total: meter
                .u64_counter("courier_webhook_events_total")
                .with_description("Webhook items processed, by kind and outcome")
                .build(),
        }
    }

    fn record(&self, report: &ReconcileReport) {
        let counts = [
            ("inbound", "created", report.inbound_created),
            ("inbound", "duplicate", report.duplicates),
            ("status", "applied", report.statuses_applied),
            ("status", "unchanged", report.statuses_unchanged),
            ("status", "rejected", report.statuses_rejected),
            ("status", "unmatched", report.statuses_unmatched),
            ("status", "ignored", report.statuses_ignored),
            ("other", "observed", report.observed),
            ("any", "error", report.errors),
        ];
        for (kind, outcome, count) in counts {
            if count > 0 {
                self.events_total.add(
                    u64::try_from(count).unwrap_or(u64::MAX),
                    &[KeyValue::new("kind", kind), KeyValue::new("outcome", outcome)],
                );
            }
        }
    }
}

/// A callback change that carries neither messages nor statuses.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedEvent {
    pub field: Option<String>,
    pub value: Value,
}

/// What a single callback did to the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub inbound_created: usize,
    pub duplicates: usize,
    pub statuses_applied: usize,
    pub statuses_unchanged: usize,
    pub statuses_rejected: usize,
    pub statuses_unmatched: usize,
    pub statuses_ignored: usize,
    pub observed: usize,
    pub errors: usize,
}

#[derive(Clone, Debug)]
pub struct WebhookService {
    store: Arc<dyn MessageStore>,
    resolver: Arc<dyn ConversationResolver>,
    config: WebhookConfig,
    account_id: String,
    events: broadcast::Sender<ObservedEvent>,
    metrics: Metrics,
}

impl WebhookService {
    #[must_use]
    pub fn new(
        store: Arc<dyn MessageStore>,
        resolver: Arc<dyn ConversationResolver>,
        config: WebhookConfig,
        account_id: String,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self { store, resolver, config, account_id, events, metrics: Metrics::new() }
    }

    /// Observer channel for callback events that are not message traffic.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ObservedEvent> {
        self.events.subscribe()
    }

    /// Checks the `X-Hub-Signature-256` header against the raw body.
    ///
    /// Without a configured app secret every body is accepted.
    ///
    /// # Errors
    /// Returns `AppError::AuthError` if the signature is missing, malformed or wrong.
    pub fn verify_signature(&self, signature: Option<&str>, body: &[u8]) -> Result<()> {
        let Some(secret) = self.config.app_secret.as_deref() else {
            tracing::warn!("No webhook app secret configured, skipping signature verification");
            return Ok(());
        };

        let signature = signature.ok_or(AppError::AuthError)?;
        let hex_digest = signature.trim().strip_prefix(SIGNATURE_PREFIX).ok_or(AppError::AuthError)?;
        let expected = hex::decode(hex_digest).map_err(|_| AppError::AuthError)?;

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| AppError::InternalMsg(format!("Invalid webhook secret: {e}")))?;
        mac.update(body);
        mac.verify_slice(&expected).map_err(|_| AppError::AuthError)
    }

    /// Answers the subscription handshake by echoing the challenge.
    ///
    /// # Errors
    /// Returns `AppError::Forbidden` unless the mode is `subscribe` and the token matches.
    pub fn verify_subscription(
        &self,
        mode: Option<&str>,
        token: Option<&str>,
        challenge: Option<String>,
    ) -> Result<String> {
        let expected = self.config.verify_token.as_deref().ok_or(AppError::Forbidden)?;
        match (mode, token, challenge) {
            (Some("subscribe"), Some(token), Some(challenge)) if token == expected => {
                tracing::info!("Webhook subscription verified");
                Ok(challenge)
            }
            _ => {
                tracing::warn!(?mode, "Webhook subscription verification failed");
                Err(AppError::Forbidden)
            }
        }
    }

    /// Applies an authenticated callback body to the store.
    ///
    /// Never fails: malformed bodies and per-item problems are counted in the report.
    #[tracing::instrument(skip(self, body), fields(bytes = body.len()))]
    pub async fn reconcile(&self, body: &[u8]) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        let payload: CallbackPayload = match serde_json::from_slice(body) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, "Discarding unparseable webhook body");
                report.errors += 1;
                self.metrics.record(&report);
                return report;
            }
        };

        for change in payload.entry.iter().flat_map(|entry| entry.changes.iter()) {
            if change.carries_message_events() {
                self.reconcile_change(change, &mut report).await;
            } else {
                self.observe(change, &mut report);
            }
        }

        tracing::info!(?report, "Webhook reconciled");
        self.metrics.record(&report);
        report
    }

    fn observe(&self, change: &CallbackChange, report: &mut ReconcileReport) {
        tracing::debug!(field = ?change.field, "Observed non-message webhook event");
        report.observed += 1;
        // No subscribers is fine; the event is dropped.
        let _ = self.events.send(ObservedEvent { field: change.field.clone(), value: change.value.clone() });
    }

    async fn reconcile_change(&self, change: &CallbackChange, report: &mut ReconcileReport) {
        let account = change.phone_number_id().unwrap_or(self.account_id.as_str());

        for raw in change.messages() {
            if let Err(e) = self.store_inbound(account, raw, report).await {
                tracing::warn!(error = %e, "Failed to store inbound message");
                report.errors += 1;
            }
        }

        for raw in change.statuses() {
            if let Err(e) = self.apply_status(raw, report).await {
                tracing::warn!(error = %e, "Failed to apply status update");
                report.errors += 1;
            }
        }
    }

    async fn store_inbound(&self, account: &str, raw: &Value, report: &mut ReconcileReport) -> Result<()> {
        let inbound: InboundMessage = serde_json::from_value(raw.clone())
            .map_err(|e| AppError::BadRequest(format!("Malformed inbound message: {e}")))?;

        if self.store.find_by_provider_id(&inbound.id).await?.is_some() {
            tracing::debug!(provider_message_id = %inbound.id, "Skipping redelivered inbound message");
            report.duplicates += 1;
            return Ok(());
        }

        let message = NewMessage {
            conversation_id: self.resolver.resolve(account, &inbound.from),
            sender_id: inbound.from.clone(),
            recipient_id: account.to_string(),
            content: inbound.content(raw),
            message_type: MessageKind::from(inbound.kind.as_str()),
            status: Some(MessageStatus::Delivered),
            provider_message_id: Some(inbound.id.clone()),
            timestamp: parse_epoch_seconds(inbound.timestamp.as_deref()),
            ..Default::default()
        };

        match self.store.create(message).await {
            Ok(created) => {
                tracing::info!(message_id = %created.id, provider_message_id = %inbound.id, "Stored inbound message");
                report.inbound_created += 1;
                Ok(())
            }
            // Lost a race with a concurrent redelivery of the same message.
            Err(AppError::Conflict(_)) => {
                report.duplicates += 1;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn apply_status(&self, raw: &Value, report: &mut ReconcileReport) -> Result<()> {
        let update: StatusUpdate = serde_json::from_value(raw.clone())
            .map_err(|e| AppError::BadRequest(format!("Malformed status update: {e}")))?;

        let Ok(status) = MessageStatus::try_from(update.status.as_str()) else {
            tracing::debug!(status = %update.status, "Ignoring unknown status");
            report.statuses_ignored += 1;
            return Ok(());
        };

        let Some(message) = self.store.find_by_provider_id(&update.id).await? else {
            tracing::debug!(provider_message_id = %update.id, "Status update for unknown message");
            report.statuses_unmatched += 1;
            return Ok(());
        };

        if status == MessageStatus::Failed
            && let Some(reason) = update.error_summary()
        {
            tracing::warn!(message_id = %message.id, reason = %reason, "Provider reported delivery failure");
        }

        match self.store.transition(message.id, status).await? {
            Some(TransitionOutcome::Applied(updated)) => {
                tracing::info!(message_id = %updated.id, status = %status, "Applied provider status");
                report.statuses_applied += 1;
            }
            Some(TransitionOutcome::Unchanged(_)) => report.statuses_unchanged += 1,
            Some(TransitionOutcome::Rejected(current)) => {
                tracing::info!(
                    message_id = %current.id,
                    current = %current.status,
                    reported = %status,
                    "Dropping out-of-order provider status"
                );
                report.statuses_rejected += 1;
            }
            None => report.statuses_unmatched += 1,
        }
        Ok(())
    }
}
