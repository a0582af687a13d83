//! Trigger persistence
//!
//! Triggers are stored as whole JSON documents keyed by `trigger_id`. The
//! store is abstracted behind a trait so the poller engine and the HTTP
//! surface can be exercised against an in-memory implementation.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::collections::HashMap;
use std::time::Duration;

use crate::config::{is_valid_table_name, StoreConfig};
use crate::error::{Error, Result};
use crate::models::Trigger;

/// A value to match an attribute against in a scan clause
#[derive(Debug, Clone)]
pub enum ScanValue {
    /// Attribute must equal this value
    One(Value),
    /// Attribute must equal any of these values
    Any(Vec<Value>),
}

/// Attributes within a clause combine conjunctively; clauses combine
/// disjunctively across a scan.
pub type ScanClause = HashMap<String, ScanValue>;

/// Storage contract for trigger records
#[async_trait]
pub trait TriggerStore: Send + Sync {
    /// Fetch a trigger by id
    async fn get(&self, trigger_id: &str) -> Result<Option<Trigger>>;

    /// Upsert a trigger keyed by its `trigger_id`
    async fn put(&self, trigger: &Trigger) -> Result<()>;

    /// Remove a trigger, returning the removed record
    async fn delete(&self, trigger_id: &str) -> Result<Trigger>;

    /// Enumerate triggers matching any of the given clauses.
    ///
    /// An empty clause list matches every trigger.
    async fn scan(&self, clauses: &[ScanClause]) -> Result<Vec<Trigger>>;
}

/// Evaluate scan clauses against a trigger's JSON representation.
fn matches_clauses(doc: &Value, clauses: &[ScanClause]) -> bool {
    if clauses.is_empty() {
        return true;
    }
    clauses.iter().any(|clause| {
        clause.iter().all(|(attr, want)| match doc.get(attr) {
            Some(have) => match want {
                ScanValue::One(v) => have == v,
                ScanValue::Any(vs) => vs.contains(have),
            },
            None => false,
        })
    })
}

/// PostgreSQL-backed trigger store
///
/// Rows live in a two-column table: `trigger_id TEXT PRIMARY KEY` and
/// `data JSONB` carrying the full trigger document.
#[derive(Clone)]
pub struct PgTriggerStore {
    pool: PgPool,
    table: String,
}

impl PgTriggerStore {
    /// Create a store over an existing pool.
    ///
    /// The table name is interpolated into SQL statements and therefore
    /// restricted to identifier characters.
    pub fn new(pool: PgPool, table: &str) -> Result<Self> {
        if !is_valid_table_name(table) {
            return Err(Error::config(format!("Invalid table name: {}", table)));
        }
        Ok(Self {
            pool,
            table: table.to_string(),
        })
    }

    /// Connect a pool from configuration, verify the connection, and
    /// create the backing table when configured to.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(&config.database_url)
            .await?;
        sqlx::query("SELECT 1").execute(&pool).await?;
        tracing::info!(
            max_connections = config.max_connections,
            table = %config.table_name,
            "Trigger store connected"
        );

        let store = Self::new(pool, &config.table_name)?;
        if config.create_table {
            store.ensure_table().await?;
        }
        Ok(store)
    }

    /// Create the backing table when it does not already exist.
    pub async fn ensure_table(&self) -> Result<()> {
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (trigger_id TEXT PRIMARY KEY, data JSONB NOT NULL)",
            self.table
        ))
        .execute(&self.pool)
        .await?;
        tracing::info!(table = %self.table, "Trigger table ready");
        Ok(())
    }
}

#[async_trait]
impl TriggerStore for PgTriggerStore {
    async fn get(&self, trigger_id: &str) -> Result<Option<Trigger>> {
        let row: Option<(Value,)> = sqlx::query_as(&format!(
            "SELECT data FROM {} WHERE trigger_id = $1",
            self.table
        ))
        .bind(trigger_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((data,)) => Ok(Some(serde_json::from_value(data)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, trigger: &Trigger) -> Result<()> {
        let data = serde_json::to_value(trigger)?;
        sqlx::query(&format!(
            "INSERT INTO {} (trigger_id, data) VALUES ($1, $2) \
             ON CONFLICT (trigger_id) DO UPDATE SET data = EXCLUDED.data",
            self.table
        ))
        .bind(&trigger.trigger_id)
        .bind(data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, trigger_id: &str) -> Result<Trigger> {
        let row: Option<(Value,)> = sqlx::query_as(&format!(
            "DELETE FROM {} WHERE trigger_id = $1 RETURNING data",
            self.table
        ))
        .bind(trigger_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((data,)) => Ok(serde_json::from_value(data)?),
            None => Err(Error::not_found("Trigger", trigger_id)),
        }
    }

    async fn scan(&self, clauses: &[ScanClause]) -> Result<Vec<Trigger>> {
        // TODO: push clause matching into SQL once the scan access patterns
        // settle; the table stays small enough that a full read is fine.
        let rows: Vec<(Value,)> = sqlx::query_as(&format!("SELECT data FROM {}", self.table))
            .fetch_all(&self.pool)
            .await?;

        let mut triggers = Vec::new();
        for (data,) in rows {
            if matches_clauses(&data, clauses) {
                triggers.push(serde_json::from_value(data)?);
            }
        }
        Ok(triggers)
    }
}

/// In-memory trigger store for tests and local development
#[derive(Default)]
pub struct MemoryTriggerStore {
    triggers: DashMap<String, Trigger>,
}

impl MemoryTriggerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TriggerStore for MemoryTriggerStore {
    async fn get(&self, trigger_id: &str) -> Result<Option<Trigger>> {
        Ok(self.triggers.get(trigger_id).map(|t| t.clone()))
    }

    async fn put(&self, trigger: &Trigger) -> Result<()> {
        self.triggers
            .insert(trigger.trigger_id.clone(), trigger.clone());
        Ok(())
    }

    async fn delete(&self, trigger_id: &str) -> Result<Trigger> {
        self.triggers
            .remove(trigger_id)
            .map(|(_, t)| t)
            .ok_or_else(|| Error::not_found("Trigger", trigger_id))
    }

    async fn scan(&self, clauses: &[ScanClause]) -> Result<Vec<Trigger>> {
        let mut triggers = Vec::new();
        for entry in self.triggers.iter() {
            let doc = serde_json::to_value(entry.value())?;
            if matches_clauses(&doc, clauses) {
                triggers.push(entry.value().clone());
            }
        }
        Ok(triggers)
    }
}
