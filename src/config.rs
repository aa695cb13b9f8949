use clap::{Args, Parser, ValueEnum};

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    #[command(flatten)]
    pub server: ServerConfig,

    #[command(flatten)]
    pub database: DatabaseConfig,

    #[command(flatten)]
    pub provider: ProviderConfig,

    #[command(flatten)]
    pub webhook: WebhookConfig,

    #[command(flatten)]
    pub messaging: MessagingConfig,

    #[command(flatten)]
    pub health: HealthConfig,

    #[command(flatten)]
    pub telemetry: TelemetryConfig,
}

#[derive(Clone, Debug, Args)]
pub struct ServerConfig {
    /// Host to listen on
    #[arg(long, env = "RELAY_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port for the public API
    #[arg(long, env = "RELAY_PORT", default_value_t = 3000)]
    pub port: u16,

    /// Port for the management API (health probes)
    #[arg(long, env = "RELAY_MGMT_PORT", default_value_t = 9090)]
    pub mgmt_port: u16,

    /// Seconds to wait for in-flight work during shutdown
    #[arg(long, env = "RELAY_SHUTDOWN_TIMEOUT_SECS", default_value_t = 10)]
    pub shutdown_timeout_secs: u64,
}

#[derive(Clone, Debug, Args)]
pub struct DatabaseConfig {
    /// Postgres connection URL. When absent, messages are kept in memory.
    #[arg(long = "database-url", env = "RELAY_DATABASE_URL")]
    pub url: Option<String>,

    /// Maximum number of pooled connections
    #[arg(long = "db-max-connections", env = "RELAY_DB_MAX_CONNECTIONS", default_value_t = 20)]
    pub max_connections: u32,

    /// Seconds to wait for a pooled connection
    #[arg(long = "db-acquire-timeout-secs", env = "RELAY_DB_ACQUIRE_TIMEOUT_SECS", default_value_t = 5)]
    pub acquire_timeout_secs: u64,
}

#[derive(Clone, Debug, Args)]
pub struct ProviderConfig {
    /// Base URL of the provider's messaging API
    #[arg(long = "provider-api-url", env = "RELAY_PROVIDER_API_URL", default_value = "https://graph.facebook.com/v20.0")]
    pub api_url: String,

    /// Bearer token used to authenticate against the provider
    #[arg(long = "provider-access-token", env = "RELAY_PROVIDER_ACCESS_TOKEN")]
    pub access_token: String,

    /// Provider account (business phone number id) messages are sent from
    #[arg(long = "provider-phone-number-id", env = "RELAY_PROVIDER_PHONE_NUMBER_ID")]
    pub phone_number_id: String,

    /// Country code prepended to addresses written without one
    #[arg(long, env = "RELAY_DEFAULT_COUNTRY_CODE", default_value = "91")]
    pub default_country_code: String,

    /// Length of a national number; shorter-or-equal addresses get the default country code
    #[arg(long, env = "RELAY_NATIONAL_NUMBER_LENGTH", default_value_t = 10)]
    pub national_number_length: usize,

    /// Timeout for a single provider request in milliseconds
    #[arg(long = "provider-timeout-ms", env = "RELAY_PROVIDER_TIMEOUT_MS", default_value_t = 10_000)]
    pub request_timeout_ms: u64,

    /// Total number of calls made for one provider operation, including the first
    #[arg(long = "provider-max-attempts", env = "RELAY_PROVIDER_MAX_ATTEMPTS", default_value_t = 4)]
    pub max_attempts: u32,

    /// Delay before the first retry in milliseconds
    #[arg(long = "provider-base-delay-ms", env = "RELAY_PROVIDER_BASE_DELAY_MS", default_value_t = 1000)]
    pub base_delay_ms: u64,

    /// Factor applied to the delay after each retry
    #[arg(long = "provider-backoff-multiplier", env = "RELAY_PROVIDER_BACKOFF_MULTIPLIER", default_value_t = 2.0)]
    pub backoff_multiplier: f64,
}

#[derive(Clone, Debug, Args)]
pub struct WebhookConfig {
    /// Shared secret used to verify callback signatures. Verification is skipped when unset.
    #[arg(long = "webhook-app-secret", env = "RELAY_WEBHOOK_APP_SECRET")]
    pub app_secret: Option<String>,

    /// Token expected during the subscription handshake
    #[arg(long = "webhook-verify-token", env = "RELAY_WEBHOOK_VERIFY_TOKEN")]
    pub verify_token: Option<String>,

    /// Capacity of the channel carrying observed, non-message events
    #[arg(long = "webhook-event-capacity", env = "RELAY_WEBHOOK_EVENT_CAPACITY", default_value_t = 64)]
    pub event_capacity: usize,
}

#[derive(Clone, Debug, Args)]
pub struct MessagingConfig {
    /// Number of messages returned by a history query without an explicit limit
    #[arg(long, env = "RELAY_DEFAULT_HISTORY_LIMIT", default_value_t = 50)]
    pub default_history_limit: usize,

    /// Upper bound for the history query limit
    #[arg(long, env = "RELAY_MAX_HISTORY_LIMIT", default_value_t = 500)]
    pub max_history_limit: usize,
}

#[derive(Clone, Debug, Args)]
pub struct HealthConfig {
    /// Timeout for the store readiness check in milliseconds
    #[arg(long = "health-store-timeout-ms", env = "RELAY_HEALTH_STORE_TIMEOUT_MS", default_value_t = 2000)]
    pub store_timeout_ms: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Debug, Args)]
pub struct TelemetryConfig {
    /// OTLP HTTP endpoint for traces and metrics. Export is disabled when unset.
    #[arg(long, env = "RELAY_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,

    /// Log output format
    #[arg(long, env = "RELAY_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Config {
    #[must_use]
    pub fn load() -> Self {
        Self::parse()
    }
}
