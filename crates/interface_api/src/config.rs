//! Webhook server configuration
//!
//! Read from `LEDGER_*` environment variables, with a default for every field.

use std::time::Duration;

use serde::Deserialize;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Plain,
    Json,
}

/// Webhook server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Database URL
    pub database_url: String,
    /// Maximum pooled connections
    pub max_connections: u32,
    /// Bound on waiting for an identity's lock, in milliseconds
    pub lock_timeout_ms: u64,
    /// Endpoint secret used to sign inbound events
    pub webhook_secret: String,
    /// Maximum age of a signed event
    pub signature_tolerance_secs: u64,
    /// Secret API key for customer lookups
    pub stripe_api_key: String,
    pub stripe_api_base: String,
    /// Log level
    pub log_level: String,
    pub log_format: LogFormat,
    /// Number of processed event ids remembered for deduplication
    pub dedup_capacity: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            database_url: "postgres://localhost/ledger".to_string(),
            max_connections: 10,
            lock_timeout_ms: 5_000,
            webhook_secret: String::new(),
            signature_tolerance_secs: 300,
            stripe_api_key: String::new(),
            stripe_api_base: "https://api.stripe.com".to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::Plain,
            dedup_capacity: 10_000,
        }
    }
}

impl ApiConfig {
    /// Loads configuration from environment
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::Environment::with_prefix("LEDGER").try_parsing(true))
            .build()?
            .try_deserialize()
    }

    /// Returns the server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn signature_tolerance(&self) -> Duration {
        Duration::from_secs(self.signature_tolerance_secs)
    }
}
