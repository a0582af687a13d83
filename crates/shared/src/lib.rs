//! Shared library for the trigger service
//!
//! This crate provides common functionality used across the workspace:
//! - Data models for triggers, events, tokens, and action statuses
//! - The trigger store contract with PostgreSQL and in-memory backends
//!   (including pool setup)
//! - Error handling types
//! - Configuration management
//! - Logging initialization

pub mod config;
pub mod error;
pub mod models;
pub mod store;

// Re-export commonly used types
pub use config::{Config, LogConfig, LogFormat};
pub use error::{Error, Result};
pub use models::{
    ActionStatus, ActionStatusValue, Event, QueueMessage, Token, TokenSet, Trigger, TriggerSpec,
    TriggerState,
};
pub use store::{MemoryTriggerStore, PgTriggerStore, ScanClause, ScanValue, TriggerStore};

/// Initialize tracing subscriber for structured logging
///
/// The `RUST_LOG` environment variable overrides the configured level; the
/// output format follows the `json`/`console` switch in [`LogConfig`].
pub fn init_tracing(log: &LogConfig) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "shared={level},auth={level},expressions={level},trigger_engine={level},api_gateway={level},info",
            level = log.level
        ))
    });

    let registry = tracing_subscriber::registry().with(filter);
    match log.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Console => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}
