//! Config - Schema Registry, Resolver, and Validator
//!
//! `TigerStyle`: Schema as data, environment as the single source.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      SchemaRegistry                       │
//! │        module name → ModuleSchema (ordered fields)        │
//! └──────────────────────────────────────────────────────────┘
//!        │                                        │
//!        ▼                                        ▼
//! ┌───────────────────┐                ┌───────────────────────┐
//! │     Resolver      │───resolved────▶│       Validator       │
//! │  env → typed cfg  │                │  aggregate, no stop   │
//! └───────────────────┘                └───────────────────────┘
//! ```
//!
//! Engines describe their configurable fields once; the resolver turns
//! environment strings into typed values; the validator reports every
//! violation at once so operators fix a bad deployment in one pass.

mod error;
mod resolver;
mod schema;
mod validator;

pub use error::{ConfigError, ConfigResult};
pub use resolver::{coerce, EnvSource, ProcessEnv, Resolver, StaticEnv};
pub use schema::{
    always_required, FieldDefinition, FieldType, ModuleSchema, RequiredIf, ResolvedConfig,
    SchemaRegistry,
};
pub use validator::{validate, validate_module, FieldViolation, ValidationReport};
