#![allow(dead_code)]

use clap::Parser;
use courier_server::AppBuilder;
use courier_server::api::{self, MgmtState};
use courier_server::config::Config;
use courier_server::services::conversation::DerivedConversationResolver;
use courier_server::storage::{InMemoryMessageStore, MessageStore};
use hmac::{Hmac, Mac};
use serde_json::{Value, json};
use sha2::Sha256;
use std::sync::{Arc, Once};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const ACCOUNT_ID: &str = "1055";
pub const APP_SECRET: &str = "test-app-secret";
pub const VERIFY_TOKEN: &str = "verify-me";

static INIT: Once = Once::new();

pub fn setup_tracing() {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "warn".into())
            .add_directive("courier_server=debug".parse().unwrap())
            .add_directive("tower=warn".parse().unwrap())
            .add_directive("hyper=warn".parse().unwrap())
            .add_directive("reqwest=warn".parse().unwrap())
            .add_directive("wiremock=warn".parse().unwrap());

        tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().init();
    });
}

pub fn get_test_config() -> Config {
    Config::parse_from([
        "courier-server",
        "--host",
        "127.0.0.1",
        "--port",
        "0",
        "--mgmt-port",
        "0",
        "--provider-api-url",
        "http://127.0.0.1:9",
        "--provider-access-token",
        "test-token",
        "--provider-phone-number-id",
        ACCOUNT_ID,
        "--provider-timeout-ms",
        "1000",
        "--provider-max-attempts",
        "4",
        "--provider-base-delay-ms",
        "5",
        "--provider-backoff-multiplier",
        "2",
        "--webhook-app-secret",
        APP_SECRET,
        "--webhook-verify-token",
        VERIFY_TOKEN,
    ])
}

pub struct TestApp {
    pub api_url: String,
    pub mgmt_url: String,
    pub client: reqwest::Client,
    pub provider: MockServer,
    pub store: Arc<InMemoryMessageStore>,
    pub config: Config,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with_config(get_test_config()).await
    }

    pub async fn spawn_with_config(mut config: Config) -> Self {
        setup_tracing();

        let provider = MockServer::start().await;
        config.provider.api_url = provider.uri();

        let store = Arc::new(InMemoryMessageStore::new());
        let services = AppBuilder::new(config.clone())
            .with_store(Arc::clone(&store) as Arc<dyn MessageStore>)
            .with_resolver(Arc::new(DerivedConversationResolver))
            .build()
            .unwrap();

        let app_router = api::app_router(&services);
        let mgmt_app = api::mgmt_router(MgmtState { health_service: services.health_service.clone() });

        let api_listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mgmt_listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let api_url = format!("http://{}", api_listener.local_addr().unwrap());
        let mgmt_url = format!("http://{}", mgmt_listener.local_addr().unwrap());

        tokio::spawn(async move {
            axum::serve(api_listener, app_router).await.unwrap();
        });
        tokio::spawn(async move {
            axum::serve(mgmt_listener, mgmt_app).await.unwrap();
        });

        Self { api_url, mgmt_url, client: reqwest::Client::new(), provider, store, config }
    }

    /// Provider accepts the next outbound text message under the given id.
    pub async fn mock_send_accepts(&self, provider_message_id: &str) {
        Mock::given(method("POST"))
            .and(path(format!("/{ACCOUNT_ID}/messages")))
            .and(body_partial_json(json!({ "messaging_product": "whatsapp", "type": "text" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "messaging_product": "whatsapp",
                "messages": [{ "id": provider_message_id }]
            })))
            .up_to_n_times(1)
            .mount(&self.provider)
            .await;
    }

    pub async fn send_message(&self, address: &str, payload: &str) -> reqwest::Response {
        self.client
            .post(format!("{}/v1/messages", self.api_url))
            .json(&json!({
                "recipientAddress": address,
                "recipientReference": "contact-1",
                "payload": payload,
            }))
            .send()
            .await
            .unwrap()
    }

    /// Sends a message the provider accepts and returns the created message view.
    pub async fn send_accepted(&self, address: &str, provider_message_id: &str) -> Value {
        self.mock_send_accepts(provider_message_id).await;
        let resp = self.send_message(address, "hello").await;
        assert_eq!(resp.status(), reqwest::StatusCode::CREATED);
        let created: Value = resp.json().await.unwrap();
        self.get_message(created["localMessageId"].as_str().unwrap()).await
    }

    pub async fn get_message(&self, id: &str) -> Value {
        let resp = self.client.get(format!("{}/v1/messages/{id}", self.api_url)).send().await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        resp.json().await.unwrap()
    }

    pub fn sign(&self, body: &[u8]) -> String {
        sign_with(APP_SECRET, body)
    }

    pub async fn post_webhook_raw(&self, body: Vec<u8>, signature: Option<String>) -> reqwest::Response {
        let mut request = self
            .client
            .post(format!("{}/v1/webhook", self.api_url))
            .header("content-type", "application/json")
            .body(body);
        if let Some(signature) = signature {
            request = request.header("x-hub-signature-256", signature);
        }
        request.send().await.unwrap()
    }

    /// Posts a correctly signed callback wrapping `value`.
    pub async fn post_webhook(&self, value: &Value) -> reqwest::Response {
        let body = callback(value);
        let signature = self.sign(&body);
        self.post_webhook_raw(body, Some(signature)).await
    }
}

pub fn sign_with(secret: &str, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// Wraps a change value in the provider's callback envelope.
pub fn callback(value: &Value) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "object": "whatsapp_business_account",
        "entry": [{
            "id": "waba-1",
            "changes": [{ "field": "messages", "value": value }]
        }]
    }))
    .unwrap()
}
