//! RelationalStrategy - PostgreSQL Engine
//!
//! `TigerStyle`: Connection pooling, explicit schema, proper error handling.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    RelationalStrategy                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Pool: sqlx::PgPool (connection pooling)                     │
//! │  Table per collection: (id BIGSERIAL PK, data JSONB)         │
//! │  Filters: JSONB containment (data @> filter)                 │
//! │  sort/limit/offset pushed down into SQL                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each collection maps to its own table, created on demand. The serial row
//! id is merged into the stored JSONB when the payload carries none, so id
//! filters and sorts behave identically to every other engine.

use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use tokio::sync::OnceCell;

use crate::config::ResolvedConfig;
use crate::constants::{HEALTH_PROBE_TIMEOUT_MS, RELATIONAL_POOL_CONNECTIONS_COUNT_DEFAULT};

use super::error::{StrategyError, StrategyResult};
use super::lifecycle::{EventHandler, RetryPolicy, Supervisor};
use super::strategy::StorageStrategy;
use super::types::{
    check_collection_name, CollectionSchema, Filter, HealthReport, LifecycleEvent, ReadOptions,
    Record, RecordSchemas, SortOrder, StrategyStatus, ID_FIELD,
};

// =============================================================================
// Configuration
// =============================================================================

/// Relational engine configuration.
#[derive(Debug, Clone)]
pub struct RelationalConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Pool size
    pub max_connections: u32,
    /// Retry policy for connect
    pub retry: RetryPolicy,
}

impl RelationalConfig {
    /// Build from a resolved engine config. Required fields are
    /// pre-validated by the factory.
    #[must_use]
    pub fn from_resolved(config: &ResolvedConfig) -> Self {
        let url = config
            .get("url")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let max_connections = config
            .get("max_connections")
            .and_then(Value::as_u64)
            .unwrap_or(RELATIONAL_POOL_CONNECTIONS_COUNT_DEFAULT)
            .min(u64::from(u32::MAX)) as u32;
        let retry = match config.get("max_retries").and_then(Value::as_u64) {
            Some(n) => RetryPolicy::with_max_retries(n.min(u64::from(u32::MAX)) as u32),
            None => RetryPolicy::default(),
        };

        Self {
            url,
            max_connections,
            retry,
        }
    }
}

// =============================================================================
// RelationalStrategy
// =============================================================================

/// PostgreSQL storage strategy.
#[derive(Debug)]
pub struct RelationalStrategy {
    config: RelationalConfig,
    supervisor: Supervisor,
    pool: OnceCell<PgPool>,
    schemas: RecordSchemas,
}

impl RelationalStrategy {
    /// Create a strategy; the pool is established on first `ready()` await.
    #[must_use]
    pub fn new(config: RelationalConfig) -> Self {
        Self {
            config,
            supervisor: Supervisor::new(),
            pool: OnceCell::new(),
            schemas: RecordSchemas::new(),
        }
    }

    /// Create from a resolved engine config (factory path).
    #[must_use]
    pub fn from_config(config: &ResolvedConfig) -> Self {
        Self::new(RelationalConfig::from_resolved(config))
    }

    fn pool(&self) -> StrategyResult<&PgPool> {
        self.supervisor.require_ready()?;
        self.pool.get().ok_or(StrategyError::NotConnected)
    }

    async fn try_connect(&self) -> StrategyResult<()> {
        // Preconditions
        if !self.config.url.starts_with("postgres://") && !self.config.url.starts_with("postgresql://")
        {
            return Err(StrategyError::query(
                "connect",
                "connection url must be a postgres URL",
            ));
        }

        let pool = PgPoolOptions::new()
            .max_connections(self.config.max_connections)
            .connect(&self.config.url)
            .await
            .map_err(|e| StrategyError::query("connect", e.to_string()))?;

        // First ready() resolves exactly once, so set() cannot collide.
        self.pool.set(pool).ok();
        Ok(())
    }

    async fn ensure_table(&self, collection: &str) -> StrategyResult<()> {
        let pool = self.pool()?;
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS \"{collection}\" (
                id BIGSERIAL PRIMARY KEY,
                data JSONB NOT NULL
            )"
        );
        sqlx::query(&sql)
            .execute(pool)
            .await
            .map_err(|e| StrategyError::query("ensure_table", e.to_string()))?;
        Ok(())
    }

    fn filter_json(filter: &Filter) -> Value {
        Value::Object(filter.clone())
    }

    fn row_data(row: &sqlx::postgres::PgRow, operation: &str) -> StrategyResult<Record> {
        let data: Value = row
            .try_get("data")
            .map_err(|e| StrategyError::query(operation, e.to_string()))?;
        match data {
            Value::Object(map) => Ok(map),
            other => Err(StrategyError::serialization(format!(
                "expected JSON object row, got {other}"
            ))),
        }
    }

    /// Sort mutation results by id so the affected sequence is stable.
    fn sort_by_id(records: &mut [Record]) {
        records.sort_by(|a, b| {
            super::types::compare_values(a.get(ID_FIELD), b.get(ID_FIELD))
        });
    }
}

#[async_trait]
impl StorageStrategy for RelationalStrategy {
    fn engine(&self) -> &str {
        "relational"
    }

    fn status(&self) -> StrategyStatus {
        self.supervisor.status()
    }

    async fn ready(&self) -> StrategyResult<()> {
        self.supervisor
            .ready("relational", &self.config.retry, |_| self.try_connect())
            .await
    }

    async fn connect(&self) -> StrategyResult<()> {
        self.ready().await
    }

    async fn disconnect(&self) -> StrategyResult<()> {
        if self.supervisor.mark_disconnected() {
            if let Some(pool) = self.pool.get() {
                // close() drains the pool: waits for checked-out
                // connections to be returned before resolving.
                pool.close().await;
            }
            tracing::debug!(engine = "relational", "pool drained and closed");
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, record), fields(engine = "relational"))]
    async fn create(&self, collection: &str, record: Record) -> StrategyResult<Record> {
        check_collection_name(collection)?;
        self.schemas.check(collection, &record)?;
        self.ensure_table(collection).await?;
        let pool = self.pool()?;

        let payload = Value::Object(record.clone());
        let row = if record.contains_key(ID_FIELD) {
            let sql = format!(
                "INSERT INTO \"{collection}\" (data) VALUES ($1::jsonb) RETURNING data"
            );
            sqlx::query(&sql).bind(&payload).fetch_one(pool).await
        } else {
            // Merge the serial id into the stored document so id filters
            // and sorts see it like any other field.
            let sql = format!(
                "WITH ins AS (
                    INSERT INTO \"{collection}\" (data) VALUES ($1::jsonb) RETURNING id
                )
                UPDATE \"{collection}\" t
                SET data = t.data || jsonb_build_object('id', ins.id)
                FROM ins
                WHERE t.id = ins.id
                RETURNING t.data"
            );
            sqlx::query(&sql).bind(&payload).fetch_one(pool).await
        }
        .map_err(|e| {
            tracing::debug!(engine = "relational", collection, error = %e, "create failed");
            StrategyError::query("create", e.to_string())
        })?;

        Self::row_data(&row, "create")
    }

    #[tracing::instrument(skip(self, filter, options), fields(engine = "relational"))]
    async fn read(
        &self,
        collection: &str,
        filter: &Filter,
        options: &ReadOptions,
    ) -> StrategyResult<Vec<Record>> {
        options.validate()?;
        check_collection_name(collection)?;
        self.ensure_table(collection).await?;
        let pool = self.pool()?;

        let mut sql = format!("SELECT data FROM \"{collection}\" WHERE data @> $1::jsonb");
        match &options.sort {
            Some(sort) => {
                let direction = match sort.order {
                    SortOrder::Asc => "ASC",
                    SortOrder::Desc => "DESC",
                };
                // jsonb ordering compares numbers numerically
                sql.push_str(&format!(" ORDER BY data->'{}' {direction}", sort.field));
            }
            None => sql.push_str(" ORDER BY id ASC"),
        }
        if let Some(limit) = options.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = options.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }

        let rows = sqlx::query(&sql)
            .bind(Self::filter_json(filter))
            .fetch_all(pool)
            .await
            .map_err(|e| {
                tracing::debug!(
                    engine = "relational",
                    collection,
                    filter = %Self::filter_json(filter),
                    error = %e,
                    "read failed"
                );
                StrategyError::query("read", e.to_string())
            })?;

        rows.iter().map(|row| Self::row_data(row, "read")).collect()
    }

    #[tracing::instrument(skip(self, filter, patch), fields(engine = "relational"))]
    async fn update(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Record,
    ) -> StrategyResult<Vec<Record>> {
        check_collection_name(collection)?;
        self.ensure_table(collection).await?;
        let pool = self.pool()?;

        let sql = format!(
            "UPDATE \"{collection}\"
             SET data = data || $2::jsonb
             WHERE data @> $1::jsonb
             RETURNING data"
        );
        let rows = sqlx::query(&sql)
            .bind(Self::filter_json(filter))
            .bind(Value::Object(patch.clone()))
            .fetch_all(pool)
            .await
            .map_err(|e| {
                tracing::debug!(
                    engine = "relational",
                    collection,
                    filter = %Self::filter_json(filter),
                    error = %e,
                    "update failed"
                );
                StrategyError::query("update", e.to_string())
            })?;

        let mut affected: Vec<Record> = rows
            .iter()
            .map(|row| Self::row_data(row, "update"))
            .collect::<StrategyResult<_>>()?;
        Self::sort_by_id(&mut affected);
        Ok(affected)
    }

    #[tracing::instrument(skip(self, filter), fields(engine = "relational"))]
    async fn delete(&self, collection: &str, filter: &Filter) -> StrategyResult<Vec<Record>> {
        check_collection_name(collection)?;
        self.ensure_table(collection).await?;
        let pool = self.pool()?;

        let sql = format!(
            "DELETE FROM \"{collection}\" WHERE data @> $1::jsonb RETURNING data"
        );
        let rows = sqlx::query(&sql)
            .bind(Self::filter_json(filter))
            .fetch_all(pool)
            .await
            .map_err(|e| {
                tracing::debug!(
                    engine = "relational",
                    collection,
                    filter = %Self::filter_json(filter),
                    error = %e,
                    "delete failed"
                );
                StrategyError::query("delete", e.to_string())
            })?;

        let mut removed: Vec<Record> = rows
            .iter()
            .map(|row| Self::row_data(row, "delete"))
            .collect::<StrategyResult<_>>()?;
        Self::sort_by_id(&mut removed);
        Ok(removed)
    }

    async fn health_check(&self) -> HealthReport {
        let started = Instant::now();
        let probe = async {
            match self.pool.get() {
                Some(pool) if !self.supervisor.is_disconnected() => {
                    sqlx::query("SELECT 1").fetch_one(pool).await.is_ok()
                }
                _ => false,
            }
        };
        let ok = tokio::time::timeout(
            std::time::Duration::from_millis(HEALTH_PROBE_TIMEOUT_MS),
            probe,
        )
        .await
        .unwrap_or(false);

        HealthReport {
            ok,
            latency_ms: started.elapsed().as_millis() as u64,
        }
    }

    fn on(&self, event: LifecycleEvent, handler: EventHandler) {
        self.supervisor.on(event, handler);
    }

    fn register_collection_schema(&self, collection: &str, schema: CollectionSchema) {
        self.schemas.register(collection, schema);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(url: &str) -> RelationalConfig {
        RelationalConfig {
            url: url.to_string(),
            max_connections: 2,
            retry: RetryPolicy {
                max_retries: 0,
                base_delay: std::time::Duration::from_millis(1),
                multiplier: 2.0,
                max_delay: std::time::Duration::from_millis(10),
            },
        }
    }

    #[test]
    fn test_config_from_resolved() {
        let mut resolved = ResolvedConfig::new();
        resolved.insert("url".to_string(), json!("postgres://localhost/app"));
        resolved.insert("max_connections".to_string(), json!(25));
        resolved.insert("max_retries".to_string(), json!(1));

        let config = RelationalConfig::from_resolved(&resolved);
        assert_eq!(config.url, "postgres://localhost/app");
        assert_eq!(config.max_connections, 25);
        assert_eq!(config.retry.max_retries, 1);
    }

    #[tokio::test]
    async fn test_health_on_never_connected_instance() {
        let strategy = RelationalStrategy::new(config("postgres://localhost/app"));

        let report = strategy.health_check().await;
        assert!(!report.ok);
        // Latency is measured, not thrown
        assert!(report.latency_ms < HEALTH_PROBE_TIMEOUT_MS * 2);
        assert_eq!(strategy.status(), StrategyStatus::Connecting);
    }

    #[tokio::test]
    async fn test_rejects_non_postgres_url() {
        let strategy = RelationalStrategy::new(config("mysql://localhost/app"));
        let err = strategy.ready().await.unwrap_err();
        assert!(matches!(err, StrategyError::ConnectionExhausted { .. }));
        assert_eq!(strategy.status(), StrategyStatus::Error);
    }

    #[tokio::test]
    async fn test_crud_before_ready_is_not_connected() {
        let strategy = RelationalStrategy::new(config("postgres://localhost/app"));
        let err = strategy
            .read("users", &Filter::new(), &ReadOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StrategyError::NotConnected));
    }
}
