//! DocumentStrategy - MongoDB Engine
//!
//! `TigerStyle`: One collection per contract collection, BSON at the edge
//! only.
//!
//! Records and filters cross the driver boundary as BSON documents; the
//! ObjectId a new document receives is written back into a plain `id` field
//! immediately after insert, so id filters and sorts behave like every
//! other engine. sort/skip/limit ride on the find cursor's options.

use std::time::Instant;

use async_trait::async_trait;
use futures::stream::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::FindOptions;
use mongodb::{Client, Database};
use serde_json::Value;
use tokio::sync::OnceCell;

use crate::config::ResolvedConfig;
use crate::constants::{DOCUMENT_DATABASE_NAME_DEFAULT, HEALTH_PROBE_TIMEOUT_MS};

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

/// Document engine configuration.
#[derive(Debug, Clone)]
pub struct DocumentConfig {
    /// MongoDB connection URL
    pub url: String,
    /// Database name
    pub database: String,
    /// Retry policy for connect
    pub retry: RetryPolicy,
}

impl DocumentConfig {
    /// Build from a resolved engine config. Required fields are
    /// pre-validated by the factory.
    #[must_use]
    pub fn from_resolved(config: &ResolvedConfig) -> Self {
        let url = config
            .get("url")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let database = config
            .get("database")
            .and_then(Value::as_str)
            .unwrap_or(DOCUMENT_DATABASE_NAME_DEFAULT)
            .to_string();
        let retry = match config.get("max_retries").and_then(Value::as_u64) {
            Some(n) => RetryPolicy::with_max_retries(n.min(u64::from(u32::MAX)) as u32),
            None => RetryPolicy::default(),
        };

        Self {
            url,
            database,
            retry,
        }
    }
}

// =============================================================================
// DocumentStrategy
// =============================================================================

/// MongoDB storage strategy.
pub struct DocumentStrategy {
    config: DocumentConfig,
    supervisor: Supervisor,
    client: OnceCell<Client>,
    schemas: RecordSchemas,
}

impl std::fmt::Debug for DocumentStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStrategy")
            .field("database", &self.config.database)
            .field("status", &self.supervisor.status())
            .finish_non_exhaustive()
    }
}

impl DocumentStrategy {
    /// Create a strategy; the client is established on first `ready()`.
    #[must_use]
    pub fn new(config: DocumentConfig) -> Self {
        Self {
            config,
            supervisor: Supervisor::new(),
            client: OnceCell::new(),
            schemas: RecordSchemas::new(),
        }
    }

    /// Create from a resolved engine config (factory path).
    #[must_use]
    pub fn from_config(config: &ResolvedConfig) -> Self {
        Self::new(DocumentConfig::from_resolved(config))
    }

    fn database(&self) -> StrategyResult<Database> {
        self.supervisor.require_ready()?;
        let client = self.client.get().ok_or(StrategyError::NotConnected)?;
        Ok(client.database(&self.config.database))
    }

    async fn try_connect(&self) -> StrategyResult<()> {
        let client = Client::with_uri_str(&self.config.url)
            .await
            .map_err(|e| StrategyError::query("connect", e.to_string()))?;

        // The driver connects lazily; ping so retries see real transport
        // failures instead of deferred ones.
        client
            .database(&self.config.database)
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| StrategyError::query("connect", e.to_string()))?;

        self.client.set(client).ok();
        Ok(())
    }

    fn to_document(map: &serde_json::Map<String, Value>, what: &str) -> StrategyResult<Document> {
        mongodb::bson::to_document(map)
            .map_err(|e| StrategyError::serialization(format!("{what}: {e}")))
    }

    fn from_document(mut doc: Document, operation: &str) -> StrategyResult<Record> {
        doc.remove("_id");
        let value = serde_json::to_value(&doc)
            .map_err(|e| StrategyError::query(operation, e.to_string()))?;
        match value {
            Value::Object(map) => Ok(map),
            other => Err(StrategyError::serialization(format!(
                "expected JSON object document, got {other}"
            ))),
        }
    }

    fn find_options(options: &ReadOptions) -> FindOptions {
        let sort = options.sort.as_ref().map(|sort| {
            let direction = match sort.order {
                SortOrder::Asc => 1_i32,
                SortOrder::Desc => -1_i32,
            };
            let mut spec = Document::new();
            spec.insert(sort.field.clone(), direction);
            spec
        });

        FindOptions::builder()
            .sort(sort)
            .skip(options.offset.map(|offset| offset as u64))
            .limit(options.limit.map(|limit| limit as i64))
            .build()
    }

    async fn collect_matching(
        &self,
        collection: &str,
        filter_doc: Document,
        options: FindOptions,
        operation: &str,
    ) -> StrategyResult<Vec<Document>> {
        let db = self.database()?;
        let cursor = db
            .collection::<Document>(collection)
            .find(filter_doc, options)
            .await
            .map_err(|e| StrategyError::query(operation, e.to_string()))?;
        cursor
            .try_collect()
            .await
            .map_err(|e| StrategyError::query(operation, e.to_string()))
    }
}

#[async_trait]
impl StorageStrategy for DocumentStrategy {
    fn engine(&self) -> &str {
        "document"
    }

    fn status(&self) -> StrategyStatus {
        self.supervisor.status()
    }

    async fn ready(&self) -> StrategyResult<()> {
        self.supervisor
            .ready("document", &self.config.retry, |_| self.try_connect())
            .await
    }

    async fn connect(&self) -> StrategyResult<()> {
        self.ready().await
    }

    async fn disconnect(&self) -> StrategyResult<()> {
        if self.supervisor.mark_disconnected() {
            if let Some(client) = self.client.get() {
                // shutdown() waits for in-flight operations on any clone of
                // this client before tearing the pool down.
                client.clone().shutdown().await;
            }
            tracing::debug!(engine = "document", "client shut down");
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, record), fields(engine = "document"))]
    async fn create(&self, collection: &str, record: Record) -> StrategyResult<Record> {
        check_collection_name(collection)?;
        self.schemas.check(collection, &record)?;
        let db = self.database()?;
        let documents = db.collection::<Document>(collection);

        let payload = Self::to_document(&record, "record")?;
        let inserted = documents
            .insert_one(payload, None)
            .await
            .map_err(|e| {
                tracing::debug!(engine = "document", collection, error = %e, "create failed");
                StrategyError::query("create", e.to_string())
            })?;

        let mut stored = record;
        if !stored.contains_key(ID_FIELD) {
            // Persist the ObjectId as a plain `id` field so filters and
            // sorts treat identifiers uniformly across engines.
            let id_hex = match &inserted.inserted_id {
                Bson::ObjectId(oid) => oid.to_hex(),
                other => other.to_string(),
            };
            documents
                .update_one(
                    doc! { "_id": inserted.inserted_id.clone() },
                    doc! { "$set": { ID_FIELD: &id_hex } },
                    None,
                )
                .await
                .map_err(|e| StrategyError::query("create", e.to_string()))?;
            stored.insert(ID_FIELD.to_string(), Value::String(id_hex));
        }

        Ok(stored)
    }

    #[tracing::instrument(skip(self, filter, options), fields(engine = "document"))]
    async fn read(
        &self,
        collection: &str,
        filter: &Filter,
        options: &ReadOptions,
    ) -> StrategyResult<Vec<Record>> {
        options.validate()?;
        check_collection_name(collection)?;

        let filter_doc = Self::to_document(filter, "filter")?;
        let documents = self
            .collect_matching(collection, filter_doc, Self::find_options(options), "read")
            .await
            .map_err(|e| {
                tracing::debug!(
                    engine = "document",
                    collection,
                    filter = %serde_json::Value::Object(filter.clone()),
                    error = %e,
                    "read failed"
                );
                e
            })?;

        documents
            .into_iter()
            .map(|doc| Self::from_document(doc, "read"))
            .collect()
    }

    #[tracing::instrument(skip(self, filter, patch), fields(engine = "document"))]
    async fn update(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Record,
    ) -> StrategyResult<Vec<Record>> {
        check_collection_name(collection)?;
        let db = self.database()?;
        let documents = db.collection::<Document>(collection);

        let filter_doc = Self::to_document(filter, "filter")?;
        let patch_doc = Self::to_document(patch, "patch")?;

        // Snapshot matching ids first: update_many only reports counts, and
        // the contract returns the affected records themselves.
        let matched = self
            .collect_matching(
                collection,
                filter_doc.clone(),
                FindOptions::default(),
                "update",
            )
            .await?;
        let ids: Vec<Bson> = matched
            .iter()
            .filter_map(|doc| doc.get("_id").cloned())
            .collect();

        if ids.is_empty() {
            return Ok(Vec::new());
        }

        documents
            .update_many(filter_doc, doc! { "$set": patch_doc }, None)
            .await
            .map_err(|e| {
                tracing::debug!(
                    engine = "document",
                    collection,
                    filter = %serde_json::Value::Object(filter.clone()),
                    error = %e,
                    "update failed"
                );
                StrategyError::query("update", e.to_string())
            })?;

        let updated = self
            .collect_matching(
                collection,
                doc! { "_id": { "$in": ids.clone() } },
                FindOptions::default(),
                "update",
            )
            .await?;

        // Preserve the original match order.
        let mut by_id: std::collections::HashMap<String, Document> = updated
            .into_iter()
            .filter_map(|doc| doc.get("_id").map(|id| (id.to_string(), doc.clone())))
            .collect();
        ids.iter()
            .filter_map(|id| by_id.remove(&id.to_string()))
            .map(|doc| Self::from_document(doc, "update"))
            .collect()
    }

    #[tracing::instrument(skip(self, filter), fields(engine = "document"))]
    async fn delete(&self, collection: &str, filter: &Filter) -> StrategyResult<Vec<Record>> {
        check_collection_name(collection)?;
        let db = self.database()?;
        let documents = db.collection::<Document>(collection);

        let filter_doc = Self::to_document(filter, "filter")?;
        let removed = self
            .collect_matching(
                collection,
                filter_doc.clone(),
                FindOptions::default(),
                "delete",
            )
            .await?;

        documents
            .delete_many(filter_doc, None)
            .await
            .map_err(|e| {
                tracing::debug!(
                    engine = "document",
                    collection,
                    filter = %serde_json::Value::Object(filter.clone()),
                    error = %e,
                    "delete failed"
                );
                StrategyError::query("delete", e.to_string())
            })?;

        removed
            .into_iter()
            .map(|doc| Self::from_document(doc, "delete"))
            .collect()
    }

    async fn health_check(&self) -> HealthReport {
        let started = Instant::now();
        let probe = async {
            match self.client.get() {
                Some(client) if !self.supervisor.is_disconnected() => client
                    .database(&self.config.database)
                    .run_command(doc! { "ping": 1 }, None)
                    .await
                    .is_ok(),
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
