//! Storage - Strategy Contract and Engine Implementations
//!
//! `TigerStyle`: One contract, many engines, mock-first testing.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   StorageStrategy Trait                      │
//! │   connect / disconnect / CRUD / health / events / status    │
//! └─────────────────────────────────────────────────────────────┘
//!      ↑              ↑               ↑               ↑
//!      │              │               │               │
//! ┌────┴─────┐ ┌──────┴──────┐ ┌──────┴──────┐ ┌──────┴──────┐
//! │   Mock   │ │ Relational  │ │  Document   │ │  Embedded   │
//! │ (memory) │ │ (PostgreSQL)│ │  (MongoDB)  │ │   (redb)    │
//! └──────────┘ └─────────────┘ └─────────────┘ └─────────────┘
//! ```
//!
//! # Mock-First
//!
//! The mock engine is always compiled and carries deterministic fault
//! injection, so contract behavior (including retry and failure paths) is
//! testable without any external service. Production engines are
//! feature-gated.

mod error;
mod factory;
mod lifecycle;
mod mock;
mod strategy;
mod types;

#[cfg(feature = "document")]
mod document;

#[cfg(feature = "embedded")]
mod embedded;

#[cfg(feature = "relational")]
mod relational;

pub use error::{StrategyError, StrategyResult};
pub use factory::{
    builtin_schemas, CustomConfigValidator, CustomConstructor, CustomEngineRegistration,
    EngineId, FactoryError, StrategyFactory,
};
pub use lifecycle::{EventHandler, RetryPolicy, Supervisor};
pub use mock::{MockConfig, MockStats, MockStrategy};
pub use strategy::StorageStrategy;
pub use types::{
    apply_window, check_collection_name, compare_values, record_matches, sort_records,
    CollectionSchema, Filter, HealthReport, LifecycleEvent, ReadOptions, Record, RecordField,
    RecordSchemas, Sort, SortOrder, StrategyStatus, ValueKind, ID_FIELD,
};

#[cfg(feature = "document")]
pub use document::{DocumentConfig, DocumentStrategy};

#[cfg(feature = "embedded")]
pub use embedded::{EmbeddedConfig, EmbeddedStrategy};

#[cfg(feature = "relational")]
pub use relational::{RelationalConfig, RelationalStrategy};
