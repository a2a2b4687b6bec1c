use serde::Deserialize;
use config::{Config, ConfigError, Environment, File};

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub stripe: StripeConfig,
    #[serde(default)]
    pub booking: BookingPolicy,
    pub checkin: CheckInPolicy,
    #[serde(default)]
    pub webhooks: WebhookConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub base_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub session_duration_hours: i64,
    #[serde(default)]
    pub secure_cookies: bool,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StripeConfig {
    pub secret_key: Option<String>,
    pub webhook_secret: Option<String>,
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BookingPolicy {
    /// Bookings may not be cancelled once the class starts within this many hours.
    pub cancellation_window_hours: i64,
}

impl Default for BookingPolicy {
    fn default() -> Self {
        Self { cancellation_window_hours: 2 }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CheckInPolicy {
    pub token_expiry_minutes: i64,
    /// Key for the HMAC applied to check-in tokens before they are stored.
    pub token_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebhookConfig {
    pub event_cache_size: usize,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self { event_cache_size: 1000 }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct JobsConfig {
    pub enabled: bool,
    pub reminder_interval_minutes: u64,
    pub reconciliation_interval_hours: u64,
    pub reconciliation_lookback_days: i64,
    pub outbox_poll_seconds: u64,
    pub outbox_batch_size: i64,
    pub outbox_max_attempts: i64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            reminder_interval_minutes: 60,
            reconciliation_interval_hours: 24,
            reconciliation_lookback_days: 30,
            outbox_poll_seconds: 5,
            outbox_batch_size: 50,
            outbox_max_attempts: 5,
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.base_url", "http://localhost:8080")?
            .set_default("database.url", "sqlite://gymdesk.db?mode=rwc")?
            .set_default("database.max_connections", 10)?
            .set_default("auth.session_duration_hours", 24)?
            .set_default("stripe.enabled", false)?
            .set_default("booking.cancellation_window_hours", 2)?
            .set_default("checkin.token_expiry_minutes", 30)?
            .set_default("checkin.token_secret", "change-me-in-production")?
            .set_default("webhooks.event_cache_size", 1000)?

            // Add config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))

            // Add environment variables (with GYMDESK__ prefix, double underscore separates levels)
            .add_source(Environment::with_prefix("GYMDESK").separator("__"))

            .build()?;

        config.try_deserialize()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                base_url: "http://localhost:8080".to_string(),
            },
            database: DatabaseConfig {
                url: "sqlite://gymdesk.db?mode=rwc".to_string(),
                max_connections: 10,
            },
            auth: AuthConfig {
                session_duration_hours: 24,
                secure_cookies: false,
            },
            stripe: StripeConfig::default(),
            booking: BookingPolicy::default(),
            checkin: CheckInPolicy {
                token_expiry_minutes: 30,
                token_secret: "change-me-in-production".to_string(),
            },
            webhooks: WebhookConfig::default(),
            jobs: JobsConfig::default(),
        }
    }
}
