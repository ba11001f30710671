//! EmbeddedStrategy - Single-File redb Engine
//!
//! `TigerStyle`: Durable storage with zero external services.
//!
//! One redb database file; one table per collection keyed by a sequential
//! u64 starting at 1, values are the JSON-encoded record bytes. redb
//! serializes writers internally and its read transactions are lock-free,
//! so access through one file is safe without extra coordination here.
//! Blocking redb work runs under `spawn_blocking`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use redb::{Database, ReadableTable, TableDefinition};
use serde_json::Value;
use tokio::sync::OnceCell;

use crate::config::ResolvedConfig;
use crate::constants::EMBEDDED_DB_PATH_DEFAULT;

use super::error::{StrategyError, StrategyResult};
use super::lifecycle::{EventHandler, RetryPolicy, Supervisor};
use super::strategy::StorageStrategy;
use super::types::{
    apply_window, check_collection_name, record_matches, sort_records, CollectionSchema, Filter,
    HealthReport, LifecycleEvent, ReadOptions, Record, RecordSchemas, StrategyStatus, ID_FIELD,
};

// =============================================================================
// Configuration
// =============================================================================

/// Embedded engine configuration.
#[derive(Debug, Clone)]
pub struct EmbeddedConfig {
    /// Database file path; parent directories are created on connect
    pub path: PathBuf,
    /// Retry policy for connect
    pub retry: RetryPolicy,
}

impl EmbeddedConfig {
    /// Build from a resolved engine config.
    #[must_use]
    pub fn from_resolved(config: &ResolvedConfig) -> Self {
        let path = config
            .get("path")
            .and_then(Value::as_str)
            .unwrap_or(EMBEDDED_DB_PATH_DEFAULT)
            .into();
        let retry = match config.get("max_retries").and_then(Value::as_u64) {
            Some(n) => RetryPolicy::with_max_retries(n.min(u64::from(u32::MAX)) as u32),
            None => RetryPolicy::default(),
        };

        Self { path, retry }
    }
}

// =============================================================================
// EmbeddedStrategy
// =============================================================================

/// Single-file storage strategy powered by redb.
pub struct EmbeddedStrategy {
    config: EmbeddedConfig,
    supervisor: Supervisor,
    db: OnceCell<Arc<Database>>,
    schemas: RecordSchemas,
}

impl std::fmt::Debug for EmbeddedStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddedStrategy")
            .field("path", &self.config.path)
            .field("status", &self.supervisor.status())
            .finish_non_exhaustive()
    }
}

impl EmbeddedStrategy {
    /// Create a strategy; the file is opened on first `ready()`.
    #[must_use]
    pub fn new(config: EmbeddedConfig) -> Self {
        Self {
            config,
            supervisor: Supervisor::new(),
            db: OnceCell::new(),
            schemas: RecordSchemas::new(),
        }
    }

    /// Create from a resolved engine config (factory path).
    #[must_use]
    pub fn from_config(config: &ResolvedConfig) -> Self {
        Self::new(EmbeddedConfig::from_resolved(config))
    }

    fn database(&self) -> StrategyResult<Arc<Database>> {
        self.supervisor.require_ready()?;
        self.db.get().cloned().ok_or(StrategyError::NotConnected)
    }

    async fn try_connect(&self) -> StrategyResult<()> {
        let path = self.config.path.clone();
        let db = tokio::task::spawn_blocking(move || -> StrategyResult<Database> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StrategyError::query("connect", e.to_string()))?;
            }
            Database::create(&path)
                .map_err(|e| StrategyError::query("connect", e.to_string()))
        })
        .await
        .map_err(|e| StrategyError::query("connect", e.to_string()))??;

        self.db.set(Arc::new(db)).ok();
        tracing::debug!(engine = "embedded", path = %self.config.path.display(), "database opened");
        Ok(())
    }

    fn encode(record: &Record) -> StrategyResult<Vec<u8>> {
        serde_json::to_vec(record).map_err(|e| StrategyError::serialization(e.to_string()))
    }

    fn decode(bytes: &[u8]) -> StrategyResult<Record> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| StrategyError::serialization(e.to_string()))?;
        match value {
            Value::Object(map) => Ok(map),
            other => Err(StrategyError::serialization(format!(
                "expected JSON object entry, got {other}"
            ))),
        }
    }

    /// Collect `(key, record)` pairs matching the filter, in key order.
    fn scan_matching(
        table: &impl ReadableTable<u64, &'static [u8]>,
        filter: &Filter,
        operation: &str,
    ) -> StrategyResult<Vec<(u64, Record)>> {
        let mut matched = Vec::new();
        let iter = table
            .range::<u64>(..)
            .map_err(|e| StrategyError::query(operation, e.to_string()))?;
        for entry in iter {
            let (key, value) =
                entry.map_err(|e| StrategyError::query(operation, e.to_string()))?;
            let record = Self::decode(value.value())?;
            if record_matches(&record, filter) {
                matched.push((key.value(), record));
            }
        }
        Ok(matched)
    }
}

#[async_trait]
impl StorageStrategy for EmbeddedStrategy {
    fn engine(&self) -> &str {
        "embedded"
    }

    fn status(&self) -> StrategyStatus {
        self.supervisor.status()
    }

    async fn ready(&self) -> StrategyResult<()> {
        self.supervisor
            .ready("embedded", &self.config.retry, |_| self.try_connect())
            .await
    }

    async fn connect(&self) -> StrategyResult<()> {
        self.ready().await
    }

    async fn disconnect(&self) -> StrategyResult<()> {
        // No pool to drain: redb commits synchronously per transaction, and
        // the file handle closes when the last Arc drops.
        self.supervisor.mark_disconnected();
        Ok(())
    }

    #[tracing::instrument(skip(self, record), fields(engine = "embedded"))]
    async fn create(&self, collection: &str, record: Record) -> StrategyResult<Record> {
        check_collection_name(collection)?;
        self.schemas.check(collection, &record)?;
        let db = self.database()?;
        let collection = collection.to_string();

        tokio::task::spawn_blocking(move || -> StrategyResult<Record> {
            let txn = db
                .begin_write()
                .map_err(|e| StrategyError::query("create", e.to_string()))?;
            let stored;
            {
                let definition = TableDefinition::<u64, &[u8]>::new(&collection);
                let mut table = txn
                    .open_table(definition)
                    .map_err(|e| StrategyError::query("create", e.to_string()))?;

                let next_key = table
                    .range::<u64>(..)
                    .map_err(|e| StrategyError::query("create", e.to_string()))?
                    .next_back()
                    .transpose()
                    .map_err(|e| StrategyError::query("create", e.to_string()))?
                    .map_or(1, |(key, _)| key.value() + 1);

                let mut record = record;
                if !record.contains_key(ID_FIELD) {
                    record.insert(ID_FIELD.to_string(), Value::from(next_key));
                }
                let bytes = Self::encode(&record)?;
                table
                    .insert(next_key, bytes.as_slice())
                    .map_err(|e| StrategyError::query("create", e.to_string()))?;
                stored = record;
            }
            txn.commit()
                .map_err(|e| StrategyError::query("create", e.to_string()))?;
            Ok(stored)
        })
        .await
        .map_err(|e| StrategyError::query("create", e.to_string()))?
    }

    #[tracing::instrument(skip(self, filter, options), fields(engine = "embedded"))]
    async fn read(
        &self,
        collection: &str,
        filter: &Filter,
        options: &ReadOptions,
    ) -> StrategyResult<Vec<Record>> {
        options.validate()?;
        check_collection_name(collection)?;
        let db = self.database()?;
        let collection = collection.to_string();
        let filter = filter.clone();
        let options = options.clone();

        tokio::task::spawn_blocking(move || -> StrategyResult<Vec<Record>> {
            let txn = db
                .begin_read()
                .map_err(|e| StrategyError::query("read", e.to_string()))?;
            let definition = TableDefinition::<u64, &[u8]>::new(&collection);
            let table = match txn.open_table(definition) {
                Ok(table) => table,
                // Table does not exist yet: nothing has been written
                Err(_) => return Ok(Vec::new()),
            };

            let mut matched: Vec<Record> = Self::scan_matching(&table, &filter, "read")?
                .into_iter()
                .map(|(_, record)| record)
                .collect();

            if let Some(sort) = &options.sort {
                sort_records(&mut matched, sort);
            }
            Ok(apply_window(matched, &options))
        })
        .await
        .map_err(|e| StrategyError::query("read", e.to_string()))?
    }

    #[tracing::instrument(skip(self, filter, patch), fields(engine = "embedded"))]
    async fn update(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Record,
    ) -> StrategyResult<Vec<Record>> {
        check_collection_name(collection)?;
        let db = self.database()?;
        let collection = collection.to_string();
        let filter = filter.clone();
        let patch = patch.clone();

        tokio::task::spawn_blocking(move || -> StrategyResult<Vec<Record>> {
            let txn = db
                .begin_write()
                .map_err(|e| StrategyError::query("update", e.to_string()))?;
            let affected;
            {
                let definition = TableDefinition::<u64, &[u8]>::new(&collection);
                let mut table = txn
                    .open_table(definition)
                    .map_err(|e| StrategyError::query("update", e.to_string()))?;

                // Collect first; the scan borrows the table immutably.
                let matched = Self::scan_matching(&table, &filter, "update")?;
                let mut patched = Vec::with_capacity(matched.len());
                for (key, mut record) in matched {
                    for (field, value) in &patch {
                        record.insert(field.clone(), value.clone());
                    }
                    let bytes = Self::encode(&record)?;
                    table
                        .insert(key, bytes.as_slice())
                        .map_err(|e| StrategyError::query("update", e.to_string()))?;
                    patched.push(record);
                }
                affected = patched;
            }
            txn.commit()
                .map_err(|e| StrategyError::query("update", e.to_string()))?;
            Ok(affected)
        })
        .await
        .map_err(|e| StrategyError::query("update", e.to_string()))?
    }

    #[tracing::instrument(skip(self, filter), fields(engine = "embedded"))]
    async fn delete(&self, collection: &str, filter: &Filter) -> StrategyResult<Vec<Record>> {
        check_collection_name(collection)?;
        let db = self.database()?;
        let collection = collection.to_string();
        let filter = filter.clone();

        tokio::task::spawn_blocking(move || -> StrategyResult<Vec<Record>> {
            let txn = db
                .begin_write()
                .map_err(|e| StrategyError::query("delete", e.to_string()))?;
            let removed;
            {
                let definition = TableDefinition::<u64, &[u8]>::new(&collection);
                let mut table = txn
                    .open_table(definition)
                    .map_err(|e| StrategyError::query("delete", e.to_string()))?;

                let matched = Self::scan_matching(&table, &filter, "delete")?;
                let mut records = Vec::with_capacity(matched.len());
                for (key, record) in matched {
                    table
                        .remove(key)
                        .map_err(|e| StrategyError::query("delete", e.to_string()))?;
                    records.push(record);
                }
                removed = records;
            }
            txn.commit()
                .map_err(|e| StrategyError::query("delete", e.to_string()))?;
            Ok(removed)
        })
        .await
        .map_err(|e| StrategyError::query("delete", e.to_string()))?
    }

    async fn health_check(&self) -> HealthReport {
        let started = Instant::now();
        let ok = match self.db.get() {
            Some(db) if !self.supervisor.is_disconnected() => {
                let db = Arc::clone(db);
                tokio::task::spawn_blocking(move || db.begin_read().is_ok())
                    .await
                    .unwrap_or(false)
            }
            _ => false,
        };

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

    fn record(pairs: &[(&str, Value)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    async fn open_strategy(dir: &tempfile::TempDir) -> EmbeddedStrategy {
        let strategy = EmbeddedStrategy::new(EmbeddedConfig {
            path: dir.path().join("store.redb"),
            retry: RetryPolicy::with_max_retries(0),
        });
        strategy.ready().await.unwrap();
        strategy
    }

    #[tokio::test]
    async fn test_create_assigns_sequential_keys() {
        let dir = tempfile::tempdir().unwrap();
        let strategy = open_strategy(&dir).await;

        let first = strategy
            .create("users", record(&[("name", json!("Alice"))]))
            .await
            .unwrap();
        assert_eq!(first[ID_FIELD], json!(1));

        let second = strategy
            .create("users", record(&[("name", json!("Bob"))]))
            .await
            .unwrap();
        assert_eq!(second[ID_FIELD], json!(2));
    }

    #[tokio::test]
    async fn test_read_missing_collection_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let strategy = open_strategy(&dir).await;

        let records = strategy
            .read("ghosts", &Filter::new(), &ReadOptions::default())
            .await
            .unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_update_and_delete_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let strategy = open_strategy(&dir).await;

        for n in 1..=3 {
            strategy
                .create("items", record(&[("n", json!(n))]))
                .await
                .unwrap();
        }

        let affected = strategy
            .update(
                "items",
                &record(&[("n", json!(2))]),
                &record(&[("seen", json!(true))]),
            )
            .await
            .unwrap();
        assert_eq!(affected.len(), 1);
        assert_eq!(affected[0]["seen"], json!(true));

        let removed = strategy
            .delete("items", &record(&[("n", json!(2))]))
            .await
            .unwrap();
        assert_eq!(removed.len(), 1);

        let remaining = strategy
            .read("items", &Filter::new(), &ReadOptions::default())
            .await
            .unwrap();
        assert_eq!(remaining.len(), 2);
    }

    #[tokio::test]
    async fn test_persistence_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.redb");

        {
            let strategy = EmbeddedStrategy::new(EmbeddedConfig {
                path: path.clone(),
                retry: RetryPolicy::with_max_retries(0),
            });
            strategy.ready().await.unwrap();
            strategy
                .create("notes", record(&[("text", json!("kept"))]))
                .await
                .unwrap();
            strategy.disconnect().await.unwrap();
        }

        let reopened = EmbeddedStrategy::new(EmbeddedConfig {
            path,
            retry: RetryPolicy::with_max_retries(0),
        });
        reopened.ready().await.unwrap();
        let records = reopened
            .read("notes", &Filter::new(), &ReadOptions::default())
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["text"], json!("kept"));
    }
}
