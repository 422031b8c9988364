use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub connection: ConnectionConfig,
}

/// Configuration for one managed connection.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    /// Endpoint URL (e.g. `wss://example.com/socket`)
    pub url: String,
    /// Optional sub-protocol identifiers offered during the handshake
    #[serde(default)]
    pub protocols: Vec<String>,
    /// Connect immediately on creation
    #[serde(default = "default_auto_connect")]
    pub auto_connect: bool,
    /// Re-establish the connection after unexpected closure
    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,
    /// Maximum automatic reconnect attempts before giving up
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,
    /// Fixed delay between reconnect attempts in milliseconds
    #[serde(default = "default_reconnect_interval")]
    pub reconnect_interval_ms: u64,
}

fn default_auto_connect() -> bool {
    true
}

fn default_auto_reconnect() -> bool {
    true
}

fn default_reconnect_attempts() -> u32 {
    5
}

fn default_reconnect_interval() -> u64 {
    3000
}

impl ConnectionConfig {
    /// Configuration for the given endpoint with default reconnect policy.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            protocols: vec![],
            auto_connect: default_auto_connect(),
            auto_reconnect: default_auto_reconnect(),
            reconnect_attempts: default_reconnect_attempts(),
            reconnect_interval_ms: default_reconnect_interval(),
        }
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            // Start with default values
            .set_default("connection.auto_connect", true)?
            .set_default("connection.auto_reconnect", true)?
            .set_default("connection.reconnect_attempts", 5)?
            .set_default("connection.reconnect_interval_ms", 3000)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables
            // CONNECTION_URL, CONNECTION_RECONNECT_ATTEMPTS, etc.
            .add_source(
                Environment::default()
                    .separator("_")
                    .try_parsing(true)
                    .list_separator(","),
            );

        builder.build()?.try_deserialize()
    }
}
