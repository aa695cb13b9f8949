use crate::adapters::provider::retry::RetryPolicy;
use crate::config::ProviderConfig;
use crate::domain::address::AddressFormat;
use crate::domain::message::{MessageKind, MessageStatus};
use crate::services::provider::{MessagingProvider, ProviderError, ProviderReceipt, ReadAck, StatusSnapshot};
use async_trait::async_trait;
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};
use reqwest::Method;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use std::time::{Duration, Instant};

const MESSAGING_PRODUCT: &str = "whatsapp";

#[derive(Clone, Debug)]
struct Metrics {
    attempts_total: Counter<u64>,
    latency_seconds: Histogram<f64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("courier-server");
        Self {
            attempts_total: meter
                .u64_counter("courier_provider_attempts_total")
                .with_description("Provider HTTP calls, by operation and outcome")
                .build(),
            latency_seconds: meter
                .f64_histogram("courier_provider_latency_seconds")
                .with_description("Latency of a single provider HTTP call")
                .build(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    messages: Vec<SentMessage>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    id: String,
}

#[derive(Debug, Deserialize)]
struct MarkReadResponse {
    #[serde(default)]
    success: bool,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Extracts the provider's own error text from an error response body.
fn provider_error_text(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorEnvelope>(body).ok().map(|envelope| envelope.error.message)
}

fn is_link(content: &str) -> bool {
    content.starts_with("https://") || content.starts_with("http://")
}

/// Builds the provider request body for an outbound message.
///
/// Text goes in `text.body`; every other kind is treated as media, referenced by
/// link when the content is a URL and by uploaded media id otherwise.
pub(crate) fn outbound_payload(to: &str, content: &str, kind: &MessageKind) -> Value {
    let mut body = Map::new();
    body.insert("messaging_product".into(), MESSAGING_PRODUCT.into());
    body.insert("recipient_type".into(), "individual".into());
    body.insert("to".into(), to.into());
    body.insert("type".into(), kind.as_str().into());

    let inner = match kind {
        MessageKind::Text => json!({ "body": content }),
        _ if is_link(content) => json!({ "link": content }),
        _ => json!({ "id": content }),
    };
    body.insert(kind.as_str().to_string(), inner);

    Value::Object(body)
}

/// Client for the provider's Cloud messaging API.
#[derive(Clone, Debug)]
pub struct CloudApiClient {
    http: reqwest::Client,
    base_url: String,
    access_token: String,
    phone_number_id: String,
    address_format: AddressFormat,
    retry: RetryPolicy,
    request_timeout: Duration,
    metrics: Metrics,
}

impl CloudApiClient {
    /// Creates a client from provider configuration.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &ProviderConfig) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder().user_agent(concat!("courier-server/", env!("CARGO_PKG_VERSION"))).build()?;

        Ok(Self {
            http,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
            phone_number_id: config.phone_number_id.clone(),
            address_format: AddressFormat::new(&config.default_country_code, config.national_number_length),
            retry: RetryPolicy::from_config(config),
            request_timeout: Duration::from_millis(config.request_timeout_ms),
            metrics: Metrics::new(),
        })
    }

    #[must_use]
    pub const fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    fn messages_url(&self) -> String {
        format!("{}/{}/messages", self.base_url, self.phone_number_id)
    }

    /// One HTTP exchange, bounded by the request timeout.
    async fn call_once<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<T, ProviderError> {
        let started = Instant::now();

        let exchange = async {
            let mut request = self.http.request(method, url).bearer_auth(&self.access_token);
            if let Some(body) = body {
                request = request.json(body);
            }
            let response = request.send().await.map_err(|e| ProviderError::Transport(e.to_string()))?;
            let status = response.status();
            let text = response.text().await.map_err(|e| ProviderError::Transport(e.to_string()))?;
            Ok::<_, ProviderError>((status, text))
        };

        let result = match tokio::time::timeout(self.request_timeout, exchange).await {
            Err(_) => Err(ProviderError::Timeout(self.request_timeout)),
            Ok(Err(e)) => Err(e),
            Ok(Ok((status, text))) if status.is_success() => serde_json::from_str::<T>(&text)
                .map_err(|e| ProviderError::InvalidResponse(format!("{operation} response could not be decoded: {e}"))),
            Ok(Ok((status, text))) => Err(ProviderError::Http {
                status: status.as_u16(),
                message: provider_error_text(&text)
                    .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown error").to_string()),
            }),
        };

        let elapsed = started.elapsed();
        let outcome = match &result {
            Ok(_) => "success",
            Err(e) if e.is_retryable() => "retryable",
            Err(_) => "fatal",
        };
        let attributes = [KeyValue::new("operation", operation), KeyValue::new("outcome", outcome)];
        self.metrics.attempts_total.add(1, &attributes);
        self.metrics.latency_seconds.record(elapsed.as_secs_f64(), &attributes);

        match &result {
            Ok(_) => tracing::debug!(operation, ?elapsed, "Provider call succeeded"),
            Err(e) => tracing::debug!(operation, ?elapsed, outcome, error = %e, "Provider call failed"),
        }

        result
    }
}

#[async_trait]
impl MessagingProvider for CloudApiClient {
    fn account_id(&self) -> &str {
        &self.phone_number_id
    }

    #[tracing::instrument(err(level = "warn"), skip(self, payload), fields(kind = %kind))]
    async fn send(&self, address: &str, payload: &str, kind: &MessageKind) -> Result<ProviderReceipt, ProviderError> {
        let address = self.address_format.normalize(address).map_err(ProviderError::InvalidAddress)?;
        let body = outbound_payload(&address, payload, kind);
        let url = self.messages_url();

        let response: SendResponse =
            self.retry.run("send", || self.call_once("send", Method::POST, &url, Some(&body))).await?;

        let provider_message_id = response
            .messages
            .into_iter()
            .map(|m| m.id)
            .find(|id| !id.is_empty())
            .ok_or_else(|| ProviderError::InvalidResponse("send response carries no message id".into()))?;

        Ok(ProviderReceipt { provider_message_id, address })
    }

    #[tracing::instrument(err(level = "warn"), skip(self))]
    async fn get_status(&self, provider_message_id: &str) -> Result<StatusSnapshot, ProviderError> {
        let url = format!("{}/{provider_message_id}", self.base_url);

        let raw: Value =
            self.retry.run("get_status", || self.call_once("get_status", Method::GET, &url, None)).await?;

        let status = raw.get("status").and_then(Value::as_str).and_then(|s| MessageStatus::try_from(s).ok());

        Ok(StatusSnapshot { provider_message_id: provider_message_id.to_string(), status, raw })
    }

    #[tracing::instrument(err(level = "warn"), skip(self))]
    async fn mark_read(&self, provider_message_id: &str) -> Result<ReadAck, ProviderError> {
        let body = json!({
            "messaging_product": MESSAGING_PRODUCT,
            "status": "read",
            "message_id": provider_message_id,
        });
        let url = self.messages_url();

        let response: MarkReadResponse =
            self.retry.run("mark_read", || self.call_once("mark_read", Method::POST, &url, Some(&body))).await?;

        Ok(ReadAck { success: response.success })
    }
}
