//! # polystore
//!
//! Collection storage with interchangeable engines: one CRUD contract over
//! named collections, backed by in-memory, relational, document, or
//! embedded storage chosen at runtime.
//!
//! ## Features
//!
//! - **One contract, many engines**: a single [`StorageStrategy`] trait
//!   satisfied by independent backend implementations
//! - **Self-describing configuration**: per-engine field schemas resolved
//!   from the environment, type-coerced, and validated with every violation
//!   reported at once
//! - **Connection lifecycle**: retry with exponential backoff, a readiness
//!   future resolved exactly once, connect/disconnect events, and health
//!   checks that never throw
//! - **Custom engines**: callers register `custom:<name>` constructors at
//!   startup; the registry is write-once per name
//! - **Mock-first testing**: the in-memory engine carries deterministic
//!   fault injection, so retry and failure paths test without services
//!
//! ## Quick Start
//!
//! ```rust
//! use polystore::storage::{ReadOptions, StorageStrategy, StrategyFactory};
//! use polystore::config::StaticEnv;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let factory = StrategyFactory::with_builtins();
//! let env = StaticEnv::new();
//!
//! // Resolve the engine's config from the environment and connect.
//! let store = factory.create_from_env("mock", &env).await?;
//!
//! let mut record = serde_json::Map::new();
//! record.insert("name".into(), serde_json::json!("Alice"));
//! let stored = store.create("users", record).await?;
//! assert_eq!(stored["id"], serde_json::json!(1));
//!
//! let users = store
//!     .read("users", &serde_json::Map::new(), &ReadOptions::default())
//!     .await?;
//! assert_eq!(users.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     StrategyFactory                       │
//! │        engine tag → validated config → ready strategy     │
//! ├──────────────────────────────────────────────────────────┤
//! │  Config: SchemaRegistry │ Resolver │ Validator            │
//! ├──────────────────────────────────────────────────────────┤
//! │  Engines: Mock │ Relational │ Document │ Embedded │ custom│
//! ├──────────────────────────────────────────────────────────┤
//! │  Lifecycle: retry/backoff │ readiness │ events │ health   │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Feature Flags
//!
//! - `relational` - PostgreSQL engine via sqlx (default)
//! - `document` - MongoDB engine (default)
//! - `embedded` - single-file redb engine (default)
//!
//! The mock engine is always available.
//!
//! [`StorageStrategy`]: storage::StorageStrategy

pub mod config;
pub mod constants;
pub mod storage;
pub mod telemetry;

pub use config::{
    ConfigError, EnvSource, FieldDefinition, FieldType, ModuleSchema, ProcessEnv, ResolvedConfig,
    Resolver, SchemaRegistry, StaticEnv, ValidationReport,
};
pub use storage::{
    EngineId, FactoryError, HealthReport, ReadOptions, Record, StorageStrategy, StrategyError,
    StrategyFactory, StrategyStatus,
};
