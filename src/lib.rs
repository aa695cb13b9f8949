#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::todo)]
#![warn(clippy::panic)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(unreachable_pub)]
#![warn(missing_debug_implementations)]
#![warn(unused_qualifications)]
#![deny(unused_must_use)]

pub mod adapters;
pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod services;
pub mod storage;
pub mod telemetry;

use crate::adapters::provider::CloudApiClient;
use crate::api::ServiceContainer;
use crate::config::{Config, DatabaseConfig};
use crate::domain::address::AddressFormat;
use crate::services::conversation::{ConversationResolver, DerivedConversationResolver};
use crate::services::health_service::HealthService;
use crate::services::message_service::MessageService;
use crate::services::provider::MessagingProvider;
use crate::services::webhook_service::WebhookService;
use crate::storage::{InMemoryMessageStore, MessageStore, PostgresMessageStore};
use std::sync::Arc;
use tokio::sync::watch;

/// Wires services together. Components not supplied explicitly are built from configuration.
#[derive(Debug)]
pub struct AppBuilder {
    config: Config,
    store: Option<Arc<dyn MessageStore>>,
    provider: Option<Arc<dyn MessagingProvider>>,
    resolver: Option<Arc<dyn ConversationResolver>>,
}

impl AppBuilder {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config, store: None, provider: None, resolver: None }
    }

    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn MessageStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn MessagingProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn ConversationResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Builds the service container.
    ///
    /// # Errors
    /// Returns an error if the provider HTTP client cannot be created.
    pub fn build(self) -> anyhow::Result<ServiceContainer> {
        let config = self.config;

        let store: Arc<dyn MessageStore> = self.store.unwrap_or_else(|| Arc::new(InMemoryMessageStore::new()));
        let provider: Arc<dyn MessagingProvider> = match self.provider {
            Some(provider) => provider,
            None => Arc::new(CloudApiClient::new(&config.provider)?),
        };
        let resolver: Arc<dyn ConversationResolver> =
            self.resolver.unwrap_or_else(|| Arc::new(DerivedConversationResolver));
        let address_format =
            AddressFormat::new(&config.provider.default_country_code, config.provider.national_number_length);

        let message_service = MessageService::new(
            Arc::clone(&store),
            Arc::clone(&provider),
            Arc::clone(&resolver),
            address_format,
            config.messaging,
        );
        let webhook_service =
            WebhookService::new(Arc::clone(&store), resolver, config.webhook, provider.account_id().to_string());
        let health_service = HealthService::new(store, config.health);

        Ok(ServiceContainer { message_service, webhook_service, health_service })
    }
}

/// Opens the configured message store: Postgres when a database URL is set, memory otherwise.
///
/// # Errors
/// Returns an error if the database cannot be reached or migrated.
pub async fn init_store(config: &DatabaseConfig) -> anyhow::Result<Arc<dyn MessageStore>> {
    match &config.url {
        Some(url) => {
            let pool = storage::init_pool(config, url).await?;
            storage::run_migrations(&pool).await?;
            tracing::info!("Using Postgres message store");
            Ok(Arc::new(PostgresMessageStore::new(pool)))
        }
        None => {
            tracing::warn!("No database URL configured, messages are kept in memory only");
            Ok(Arc::new(InMemoryMessageStore::new()))
        }
    }
}

/// Routes panics through tracing so they reach the configured log sink.
pub fn setup_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let location = info.location().map(ToString::to_string).unwrap_or_default();
        tracing::error!(panic = %info, %location, "Panic occurred");
    }));
}

/// Flips the shutdown flag on SIGINT or SIGTERM.
pub fn spawn_signal_handler(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => tracing::info!("Received SIGINT, shutting down"),
                        _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down"),
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                    let _ = ctrl_c.await;
                    tracing::info!("Received SIGINT, shutting down");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            tracing::info!("Received Ctrl+C, shutting down");
        }

        let _ = shutdown_tx.send(true);
    });
}
