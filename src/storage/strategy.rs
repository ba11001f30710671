//! Storage Strategy Trait
//!
//! `TigerStyle`: Abstract interface for collection storage.
//!
//! One CRUD contract runs identically against every engine. All operations
//! are async, return explicit errors, and a strategy is owned by its caller:
//! the factory never pools or caches instances, and `disconnect()` is the
//! terminal disposal.

use async_trait::async_trait;

use super::error::StrategyResult;
use super::lifecycle::EventHandler;
use super::types::{
    CollectionSchema, Filter, HealthReport, LifecycleEvent, ReadOptions, Record, StrategyStatus,
};

/// Abstract storage strategy over named collections.
///
/// Mutation operations uniformly return the ordered sequence of affected
/// records; the affected count is its length.
#[async_trait]
pub trait StorageStrategy: Send + Sync + std::fmt::Debug {
    /// Engine tag this strategy implements (`mock`, `relational`, ...).
    fn engine(&self) -> &str;

    /// Last known lifecycle state, readable in any state.
    fn status(&self) -> StrategyStatus;

    /// Await readiness.
    ///
    /// Resolved exactly once per instance: the first await drives the
    /// connect-with-retry chain, later awaits observe the same result.
    async fn ready(&self) -> StrategyResult<()>;

    /// Establish the backend connection.
    ///
    /// Fails with a connection error once retries are exhausted. Equivalent
    /// to awaiting `ready()`.
    async fn connect(&self) -> StrategyResult<()>;

    /// Release backend resources, draining in-flight work first.
    ///
    /// Safe to call more than once; the instance is not reusable afterward.
    async fn disconnect(&self) -> StrategyResult<()>;

    /// Persist a record, returning the stored record including any
    /// backend-generated identifier.
    async fn create(&self, collection: &str, record: Record) -> StrategyResult<Record>;

    /// Read records matching an equality conjunction over `filter`.
    ///
    /// Invalid options fail before any backend call.
    async fn read(
        &self,
        collection: &str,
        filter: &Filter,
        options: &ReadOptions,
    ) -> StrategyResult<Vec<Record>>;

    /// Apply `patch` to every record matching `filter`; returns the
    /// affected records after patching.
    async fn update(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Record,
    ) -> StrategyResult<Vec<Record>>;

    /// Remove every record matching `filter`; returns the removed records.
    async fn delete(&self, collection: &str, filter: &Filter) -> StrategyResult<Vec<Record>>;

    /// Probe the backend. Never errors: failures report `ok: false` with
    /// the measured latency.
    async fn health_check(&self) -> HealthReport;

    /// Register a persistent lifecycle listener. Multiple listeners per
    /// event are allowed; there is no replay for late subscribers.
    fn on(&self, event: LifecycleEvent, handler: EventHandler);

    /// Register or replace a per-collection record schema enforced on
    /// `create`.
    fn register_collection_schema(&self, collection: &str, schema: CollectionSchema);
}
