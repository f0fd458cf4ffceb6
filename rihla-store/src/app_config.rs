use rihla_core::Role;
use rihla_shared::ProviderId;
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub kafka: KafkaConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub business_rules: BusinessRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    #[serde(default = "default_reserve_max_retries")]
    pub reserve_max_retries: usize,
    /// Clamped to 50..=200ms when the retry policy is built.
    #[serde(default = "default_reserve_retry_backoff_ms")]
    pub reserve_retry_backoff_ms: u64,
    #[serde(default = "default_dashboard_staleness_seconds")]
    pub dashboard_staleness_seconds: u64,
    #[serde(default = "default_dashboard_trailing_months")]
    pub dashboard_trailing_months: u32,
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    #[serde(default = "default_rate_limit_per_minute")]
    pub rate_limit_per_minute: i64,
    /// Longest hotel or car-rental stay a single booking may cover.
    #[serde(default = "default_max_nights")]
    pub max_nights: u32,
}

fn default_reserve_max_retries() -> usize { 1 }
fn default_reserve_retry_backoff_ms() -> u64 { 100 }
fn default_dashboard_staleness_seconds() -> u64 { 30 }
fn default_dashboard_trailing_months() -> u32 { 6 }
fn default_event_buffer() -> usize { 256 }
fn default_rate_limit_per_minute() -> i64 { 100 }
fn default_max_nights() -> u32 { 90 }

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            reserve_max_retries: default_reserve_max_retries(),
            reserve_retry_backoff_ms: default_reserve_retry_backoff_ms(),
            dashboard_staleness_seconds: default_dashboard_staleness_seconds(),
            dashboard_trailing_months: default_dashboard_trailing_months(),
            event_buffer: default_event_buffer(),
            rate_limit_per_minute: default_rate_limit_per_minute(),
            max_nights: default_max_nights(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Shared secret the payment processor sends in `X-Webhook-Secret`.
    pub webhook_secret: String,
    /// Role grants served when no database is configured.
    #[serde(default)]
    pub static_roles: Vec<StaticRole>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StaticRole {
    pub user_id: String,
    pub role: Role,
    #[serde(default)]
    pub provider_id: Option<ProviderId>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RedisConfig {
    pub url: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct KafkaConfig {
    pub brokers: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    #[default]
    Memory,
    Postgres,
    Redis,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LedgerConfig {
    #[serde(default)]
    pub backend: LedgerBackend,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, never checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `RIHLA__SERVER__PORT=8080` sets `server.port`
            .add_source(config::Environment::with_prefix("RIHLA").separator("__"))
            .build()?;

        s.try_deserialize::<Self>()?.validated()
    }

    pub fn from_toml(toml: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?
            .try_deserialize::<Self>()?
            .validated()
    }

    fn validated(self) -> Result<Self, config::ConfigError> {
        if self.auth.jwt_secret.trim().is_empty() {
            return Err(config::ConfigError::Message("auth.jwt_secret must not be empty".into()));
        }
        // An empty secret would match requests that carry no header at all
        if self.auth.webhook_secret.trim().is_empty() {
            return Err(config::ConfigError::Message(
                "auth.webhook_secret must not be empty".into(),
            ));
        }
        if self.business_rules.max_nights == 0 {
            return Err(config::ConfigError::Message(
                "business_rules.max_nights must be at least 1".into(),
            ));
        }
        Ok(self)
    }
}
