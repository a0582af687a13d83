//! Configuration management using environment variables

use crate::error::{Error, Result};
use serde::Deserialize;
use std::env;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service identity
    pub service: ServiceConfig,

    /// Identity provider client credentials
    pub auth: AuthConfig,

    /// Queue service endpoint
    pub queues: QueuesConfig,

    /// Trigger store configuration
    pub store: StoreConfig,

    /// Logging configuration
    pub log: LogConfig,

    /// Poller engine tuning
    pub engine: EngineConfig,
}

/// Service identity configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name; also the route prefix for the HTTP surface
    pub name: String,

    /// Deployment environment tag
    pub environment: String,

    /// Bind host
    pub host: String,

    /// Bind port
    pub port: u16,
}

/// Identity provider configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Base URL of the identity service
    pub base_url: String,

    /// Service client id (HTTP Basic username)
    pub client_id: String,

    /// Service client secret (HTTP Basic password)
    pub client_secret: String,
}

/// Queue service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct QueuesConfig {
    /// Base URL of the queue service API
    pub base_url: String,
}

/// Trigger store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// PostgreSQL connection URL
    pub database_url: String,

    /// Table holding trigger rows
    pub table_name: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Create the trigger table at startup when it does not exist
    pub create_table: bool,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Console,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Default log level when RUST_LOG is not set
    pub level: String,

    /// Output format
    pub format: LogFormat,
}

/// Poller engine tuning
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Capacity of the channel handing poller tasks to the reaper
    pub reaper_queue_capacity: usize,

    /// Maximum number of entries kept in a trigger's action status log
    pub action_status_log_limit: usize,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    env_or(key, default)
        .parse()
        .map_err(|e| Error::config(format!("Invalid {}: {}", key, e)))
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let table_name = env_or("TRIGGERS_TABLE_NAME", "triggers");
        if !is_valid_table_name(&table_name) {
            return Err(Error::config(format!(
                "Invalid TRIGGERS_TABLE_NAME: {}",
                table_name
            )));
        }

        let format = match env_or("LOG_FORMAT", "console").to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "console" => LogFormat::Console,
            other => {
                return Err(Error::config(format!("Invalid LOG_FORMAT: {}", other)));
            }
        };

        Ok(Self {
            service: ServiceConfig {
                name: env_or("SERVICE_NAME", "triggers"),
                environment: env_or("SERVICE_ENVIRONMENT", "localtest"),
                host: env_or("SERVER_HOST", "0.0.0.0"),
                port: parse_env("SERVER_PORT", "8080")?,
            },
            auth: AuthConfig {
                base_url: env_or("AUTH_BASE_URL", "https://auth.globus.org"),
                client_id: env::var("AUTH_CLIENT_ID")
                    .map_err(|_| Error::config("AUTH_CLIENT_ID must be set"))?,
                client_secret: env::var("AUTH_CLIENT_SECRET")
                    .map_err(|_| Error::config("AUTH_CLIENT_SECRET must be set"))?,
            },
            queues: QueuesConfig {
                base_url: env_or("QUEUES_BASE_URL", "https://queues.api.globus.org/v1"),
            },
            store: StoreConfig {
                database_url: env::var("DATABASE_URL")
                    .map_err(|_| Error::config("DATABASE_URL must be set"))?,
                table_name,
                max_connections: parse_env("DB_MAX_CONNECTIONS", "10")?,
                create_table: parse_env("CREATE_TRIGGERS_TABLE", "false")?,
            },
            log: LogConfig {
                level: env_or("LOG_LEVEL", "info"),
                format,
            },
            engine: EngineConfig {
                reaper_queue_capacity: parse_env("REAPER_QUEUE_CAPACITY", "100")?,
                action_status_log_limit: parse_env("ACTION_STATUS_LOG_LIMIT", "100")?,
            },
        })
    }
}

/// Table names are interpolated into SQL statements, so restrict them to
/// identifier characters.
pub fn is_valid_table_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_table_names() {
        assert!(is_valid_table_name("triggers"));
        assert!(is_valid_table_name("triggers_dev"));
        assert!(is_valid_table_name("t2"));
    }

    #[test]
    fn test_invalid_table_names() {
        assert!(!is_valid_table_name(""));
        assert!(!is_valid_table_name("triggers; DROP TABLE users"));
        assert!(!is_valid_table_name("2triggers"));
        assert!(!is_valid_table_name("trig-gers"));
    }
}
