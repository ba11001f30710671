//! MockStrategy - In-Memory Engine for Testing
//!
//! `TigerStyle`: Deterministic testing with fault injection.
//!
//! Records live in a `RwLock<HashMap<collection, Vec<Record>>>` preserving
//! insertion order. Identifiers are sequential integers scoped per
//! collection, starting at 1. A seeded fault plan can fail connect attempts
//! (to exercise retry/backoff) or inject per-operation failures at a fixed
//! rate, so failure paths are reproducible: same seed, same faults.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::ResolvedConfig;

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

/// Mock engine configuration.
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Seed for the deterministic fault RNG
    pub seed: u64,
    /// Number of leading connect attempts that fail (`u32::MAX` = all)
    pub connect_failures: u32,
    /// Probability in [0, 1] that any CRUD operation fails
    pub operation_failure_rate: f64,
    /// Retry policy for connect
    pub retry: RetryPolicy,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            connect_failures: 0,
            operation_failure_rate: 0.0,
            retry: RetryPolicy::default(),
        }
    }
}

impl MockConfig {
    /// Build from a resolved engine config. Fields are pre-validated by the
    /// factory; anything absent falls back to defaults.
    #[must_use]
    pub fn from_resolved(config: &ResolvedConfig) -> Self {
        let seed = config
            .get("seed")
            .and_then(Value::as_u64)
            .unwrap_or_default();
        let connect_failures = config
            .get("connect_failures")
            .and_then(Value::as_u64)
            .map_or(0, |n| n.min(u64::from(u32::MAX)) as u32);
        let operation_failure_rate = config
            .get("operation_failure_rate")
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
            .clamp(0.0, 1.0);
        let max_retries = config.get("max_retries").and_then(Value::as_u64);

        let retry = match max_retries {
            Some(n) => RetryPolicy::with_max_retries(n.min(u64::from(u32::MAX)) as u32),
            None => RetryPolicy::default(),
        };

        Self {
            seed,
            connect_failures,
            operation_failure_rate,
            retry,
        }
    }
}

// =============================================================================
// Deterministic Faults
// =============================================================================

/// SplitMix64: tiny, deterministic, good enough for fault scheduling.
#[derive(Debug)]
struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    fn next_f64(&mut self) -> f64 {
        // 53 high bits into [0, 1)
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }
}

#[derive(Debug)]
struct FaultPlan {
    remaining_connect_failures: AtomicU32,
    operation_failure_rate: f64,
    rng: Mutex<DeterministicRng>,
}

impl FaultPlan {
    fn new(config: &MockConfig) -> Self {
        Self {
            remaining_connect_failures: AtomicU32::new(config.connect_failures),
            operation_failure_rate: config.operation_failure_rate,
            rng: Mutex::new(DeterministicRng::new(config.seed)),
        }
    }

    fn take_connect_failure(&self) -> bool {
        self.remaining_connect_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n > 0 && n != u32::MAX).then(|| n - 1)
            })
            .map_or_else(|n| n == u32::MAX, |_| true)
    }

    fn maybe_inject(&self, operation: &str) -> StrategyResult<()> {
        if self.operation_failure_rate <= 0.0 {
            return Ok(());
        }
        let roll = self.rng.lock().expect("fault rng poisoned").next_f64();
        if roll < self.operation_failure_rate {
            return Err(StrategyError::fault(format!("{operation} fault")));
        }
        Ok(())
    }
}

// =============================================================================
// MockStrategy
// =============================================================================

#[derive(Debug, Default)]
struct MockCollection {
    next_id: u64,
    records: Vec<Record>,
}

/// Operation counters, readable in tests.
#[derive(Debug, Default)]
pub struct MockStats {
    pub creates: u64,
    pub reads: u64,
    pub updates: u64,
    pub deletes: u64,
}

/// In-memory storage strategy.
#[derive(Debug)]
pub struct MockStrategy {
    config: MockConfig,
    supervisor: Supervisor,
    collections: RwLock<HashMap<String, MockCollection>>,
    schemas: RecordSchemas,
    faults: FaultPlan,
    connect_attempts: AtomicU32,
    creates: AtomicU64,
    reads: AtomicU64,
    updates: AtomicU64,
    deletes: AtomicU64,
}

impl MockStrategy {
    /// Create a mock strategy with the given configuration.
    #[must_use]
    pub fn new(config: MockConfig) -> Self {
        let faults = FaultPlan::new(&config);
        Self {
            config,
            supervisor: Supervisor::new(),
            collections: RwLock::new(HashMap::new()),
            schemas: RecordSchemas::new(),
            faults,
            connect_attempts: AtomicU32::new(0),
            creates: AtomicU64::new(0),
            reads: AtomicU64::new(0),
            updates: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
        }
    }

    /// Create from a resolved engine config (factory path).
    #[must_use]
    pub fn from_config(config: &ResolvedConfig) -> Self {
        Self::new(MockConfig::from_resolved(config))
    }

    /// Connect attempts performed so far (for retry tests).
    #[must_use]
    pub fn connect_attempts(&self) -> u32 {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    /// Snapshot of the operation counters.
    #[must_use]
    pub fn stats(&self) -> MockStats {
        MockStats {
            creates: self.creates.load(Ordering::Relaxed),
            reads: self.reads.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        }
    }

    /// Record count in one collection (for tests).
    #[must_use]
    pub fn collection_len(&self, collection: &str) -> usize {
        let collections = self.collections.read().expect("collections poisoned");
        collections.get(collection).map_or(0, |c| c.records.len())
    }

    fn guard(&self, collection: &str, operation: &str) -> StrategyResult<()> {
        self.supervisor.require_ready()?;
        check_collection_name(collection)?;
        self.faults.maybe_inject(operation)
    }
}

#[async_trait]
impl StorageStrategy for MockStrategy {
    fn engine(&self) -> &str {
        "mock"
    }

    fn status(&self) -> StrategyStatus {
        self.supervisor.status()
    }

    async fn ready(&self) -> StrategyResult<()> {
        self.supervisor
            .ready("mock", &self.config.retry, |_| {
                self.connect_attempts.fetch_add(1, Ordering::SeqCst);
                let fail = self.faults.take_connect_failure();
                async move {
                    if fail {
                        Err(StrategyError::fault("connect refused"))
                    } else {
                        Ok(())
                    }
                }
            })
            .await
    }

    async fn connect(&self) -> StrategyResult<()> {
        self.ready().await
    }

    async fn disconnect(&self) -> StrategyResult<()> {
        self.supervisor.mark_disconnected();
        Ok(())
    }

    #[tracing::instrument(skip(self, record), fields(engine = "mock"))]
    async fn create(&self, collection: &str, record: Record) -> StrategyResult<Record> {
        self.guard(collection, "create")?;
        self.schemas.check(collection, &record)?;

        let mut collections = self.collections.write().expect("collections poisoned");
        let entry = collections.entry(collection.to_string()).or_default();

        let mut stored = record;
        if !stored.contains_key(ID_FIELD) {
            entry.next_id += 1;
            stored.insert(ID_FIELD.to_string(), Value::from(entry.next_id));
        }
        entry.records.push(stored.clone());
        self.creates.fetch_add(1, Ordering::Relaxed);

        Ok(stored)
    }

    #[tracing::instrument(skip(self, filter, options), fields(engine = "mock"))]
    async fn read(
        &self,
        collection: &str,
        filter: &Filter,
        options: &ReadOptions,
    ) -> StrategyResult<Vec<Record>> {
        options.validate()?;
        self.guard(collection, "read")?;

        let collections = self.collections.read().expect("collections poisoned");
        let mut matched: Vec<Record> = collections
            .get(collection)
            .map(|c| {
                c.records
                    .iter()
                    .filter(|r| record_matches(r, filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some(sort) = &options.sort {
            sort_records(&mut matched, sort);
        }
        self.reads.fetch_add(1, Ordering::Relaxed);

        Ok(apply_window(matched, options))
    }

    #[tracing::instrument(skip(self, filter, patch), fields(engine = "mock"))]
    async fn update(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Record,
    ) -> StrategyResult<Vec<Record>> {
        self.guard(collection, "update")?;

        let mut collections = self.collections.write().expect("collections poisoned");
        let mut affected = Vec::new();

        if let Some(entry) = collections.get_mut(collection) {
            for record in entry.records.iter_mut() {
                if record_matches(record, filter) {
                    for (key, value) in patch {
                        record.insert(key.clone(), value.clone());
                    }
                    affected.push(record.clone());
                }
            }
        }
        self.updates.fetch_add(1, Ordering::Relaxed);

        Ok(affected)
    }

    #[tracing::instrument(skip(self, filter), fields(engine = "mock"))]
    async fn delete(&self, collection: &str, filter: &Filter) -> StrategyResult<Vec<Record>> {
        self.guard(collection, "delete")?;

        let mut collections = self.collections.write().expect("collections poisoned");
        let mut removed = Vec::new();

        if let Some(entry) = collections.get_mut(collection) {
            let mut kept = Vec::with_capacity(entry.records.len());
            for record in entry.records.drain(..) {
                if record_matches(&record, filter) {
                    removed.push(record);
                } else {
                    kept.push(record);
                }
            }
            entry.records = kept;
        }
        self.deletes.fetch_add(1, Ordering::Relaxed);

        Ok(removed)
    }

    async fn health_check(&self) -> HealthReport {
        let started = Instant::now();
        let ok = !self.supervisor.is_disconnected()
            && self.supervisor.status() == StrategyStatus::Ready;
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
