//! Configuration management
//!
//! Defaults, overridable by an optional `heartline.toml` next to the
//! binary and by `HEARTLINE_`-prefixed environment variables
//! (`HEARTLINE_SERVER__PORT=9000` style).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub media: MediaConfig,
    pub call: CallConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Media provider application id baked into every credential
    pub app_id: String,
    /// Server-held signing secret; never leaves this process
    pub credential_secret: String,
    /// Credential lifetime, scoped to a call's realistic duration
    pub credential_ttl_secs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CallConfig {
    /// How long a dial rings before resolving to missed
    pub ring_window_secs: u64,
    /// Client heartbeat cadence
    pub heartbeat_interval_secs: u64,
    /// Heartbeat age after which a user reads as offline. At least
    /// twice the interval so one missed beat never flips anyone.
    pub presence_staleness_secs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            app_id: "heartline-dev".to_string(),
            // Development fallback; deployments override via config
            credential_secret: "dev-secret-rotate-before-deploying".to_string(),
            credential_ttl_secs: 7200,
        }
    }
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            ring_window_secs: 30,
            heartbeat_interval_secs: 30,
            presence_staleness_secs: 90,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://postgres@localhost/heartline".to_string(),
            max_connections: 10,
            min_connections: 2,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            media: MediaConfig::default(),
            call: CallConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

impl Config {
    /// Layered load: defaults, then `heartline.toml` if present, then
    /// environment overrides.
    pub fn load() -> Result<Self, config::ConfigError> {
        let loader = config::Config::builder()
            .add_source(config::File::with_name("heartline").required(false))
            .add_source(config::Environment::with_prefix("HEARTLINE").separator("__"))
            .build()?;

        loader.try_deserialize()
    }
}
