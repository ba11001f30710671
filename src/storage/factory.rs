//! Strategy Factory - Engine Tags to Ready Strategies
//!
//! `TigerStyle`: One creation path, explicit registry, fail fast.
//!
//! # Architecture
//!
//! ```text
//! create(engine, config)
//!   ├── custom:*  → registry lookup → optional validator → constructor
//!   └── builtin   → schema lookup → aggregate validation → constructor
//!                         │
//!                         ▼
//!                 await ready()  (connect with retry)
//! ```
//!
//! The factory owns the custom-engine registry (write-once per name, no
//! globals) and never pools or caches instances: every `create` hands a
//! fresh, ready strategy to the caller, and the caller's `disconnect()` is
//! its terminal disposal.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

use serde_json::json;
use thiserror::Error;

use crate::config::{
    always_required, validate_module, EnvSource, FieldDefinition, FieldType, ModuleSchema,
    ResolvedConfig, Resolver, SchemaRegistry, ValidationReport,
};
use crate::constants::{
    DOCUMENT_DATABASE_NAME_DEFAULT, EMBEDDED_DB_PATH_DEFAULT, ENGINE_CUSTOM_PREFIX,
    ENGINE_ENV_VAR, RELATIONAL_POOL_CONNECTIONS_COUNT_DEFAULT, STORAGE_RETRY_COUNT_MAX,
};

use super::error::StrategyError;
use super::mock::MockStrategy;
use super::strategy::StorageStrategy;

#[cfg(feature = "document")]
use super::document::DocumentStrategy;
#[cfg(feature = "embedded")]
use super::embedded::EmbeddedStrategy;
#[cfg(feature = "relational")]
use super::relational::RelationalStrategy;

// =============================================================================
// Engine Identifiers
// =============================================================================

/// A storage engine tag: one of the builtin set or a namespaced custom name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EngineId {
    Mock,
    Relational,
    Document,
    Embedded,
    Custom(String),
}

impl EngineId {
    /// Read the engine selection from the environment, once at startup.
    ///
    /// # Errors
    /// Returns `UnknownEngine` when the variable is unset or does not parse.
    pub fn from_env(env: &dyn EnvSource) -> Result<Self, FactoryError> {
        let raw = env.get(ENGINE_ENV_VAR).ok_or_else(|| FactoryError::UnknownEngine {
            name: format!("${ENGINE_ENV_VAR} unset"),
        })?;
        raw.parse()
    }

    /// Whether this tag names a custom engine.
    #[must_use]
    pub fn is_custom(&self) -> bool {
        matches!(self, EngineId::Custom(_))
    }
}

impl FromStr for EngineId {
    type Err = FactoryError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "mock" => Ok(EngineId::Mock),
            "relational" => Ok(EngineId::Relational),
            "document" => Ok(EngineId::Document),
            "embedded" => Ok(EngineId::Embedded),
            other => match other.strip_prefix(ENGINE_CUSTOM_PREFIX) {
                Some(name) if !name.is_empty() => Ok(EngineId::Custom(name.to_string())),
                _ => Err(FactoryError::UnknownEngine {
                    name: other.to_string(),
                }),
            },
        }
    }
}

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineId::Mock => write!(f, "mock"),
            EngineId::Relational => write!(f, "relational"),
            EngineId::Document => write!(f, "document"),
            EngineId::Embedded => write!(f, "embedded"),
            EngineId::Custom(name) => write!(f, "{ENGINE_CUSTOM_PREFIX}{name}"),
        }
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Errors from strategy creation and registration.
#[derive(Debug, Error)]
pub enum FactoryError {
    /// Requested engine has no registered field schema
    #[error("no config schema registered for engine `{engine}`")]
    ConfigSchemaMissing {
        /// Engine tag
        engine: String,
    },

    /// One or more config fields failed type/required checks
    #[error("config validation failed for engine `{engine}`:\n{report}")]
    ConfigValidationFailed {
        /// Engine tag
        engine: String,
        /// Every violated field
        report: ValidationReport,
    },

    /// `custom:<name>` requested before registration
    #[error("custom engine `{name}` is not registered")]
    UnregisteredCustomEngine {
        /// Full engine tag
        name: String,
    },

    /// Re-registering an existing custom name
    #[error("engine `{name}` is already registered")]
    DuplicateEngineRegistration {
        /// Full engine tag
        name: String,
    },

    /// Custom registration without the `custom:` prefix
    #[error("invalid engine name `{name}`: custom engines must use the `custom:` prefix")]
    InvalidEngineName {
        /// Offending name
        name: String,
    },

    /// Engine tag outside the builtin set and not `custom:`-prefixed
    #[error("unknown engine `{name}`")]
    UnknownEngine {
        /// Offending tag
        name: String,
    },

    /// Engine excluded from this build by feature flags
    #[error("engine `{engine}` was disabled at compile time")]
    EngineDisabled {
        /// Engine tag
        engine: String,
    },

    /// A custom registration's config validator rejected the config
    #[error("custom config validation failed: {message}")]
    CustomConfigRejected {
        /// Validator message
        message: String,
    },

    /// Connection failure surfaced while awaiting readiness
    #[error(transparent)]
    Connection(#[from] StrategyError),
}

// =============================================================================
// Custom Registrations
// =============================================================================

/// Constructor for a custom engine.
pub type CustomConstructor = Arc<
    dyn Fn(ResolvedConfig) -> Result<Box<dyn StorageStrategy>, StrategyError> + Send + Sync,
>;

/// Optional config check run before a custom constructor.
pub type CustomConfigValidator =
    Arc<dyn Fn(&ResolvedConfig) -> Result<(), String> + Send + Sync>;

/// A dynamically registered engine.
#[derive(Clone)]
pub struct CustomEngineRegistration {
    /// Builds the strategy from a resolved config
    pub constructor: CustomConstructor,
    /// Optional config check, run before construction
    pub config_validator: Option<CustomConfigValidator>,
    /// Optional field schema, registered for resolution alongside builtins
    pub config_schema: Option<ModuleSchema>,
}

impl CustomEngineRegistration {
    /// Registration with only a constructor.
    #[must_use]
    pub fn new(constructor: CustomConstructor) -> Self {
        Self {
            constructor,
            config_validator: None,
            config_schema: None,
        }
    }

    /// Attach a config validator.
    #[must_use]
    pub fn with_validator(mut self, validator: CustomConfigValidator) -> Self {
        self.config_validator = Some(validator);
        self
    }

    /// Attach a field schema.
    #[must_use]
    pub fn with_schema(mut self, schema: ModuleSchema) -> Self {
        self.config_schema = Some(schema);
        self
    }
}

impl fmt::Debug for CustomEngineRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomEngineRegistration")
            .field("has_validator", &self.config_validator.is_some())
            .field("has_schema", &self.config_schema.is_some())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Builtin Schemas
// =============================================================================

const BUILTIN_ENGINES: [&str; 4] = ["mock", "relational", "document", "embedded"];

/// Field schemas for the builtin engines.
#[must_use]
pub fn builtin_schemas() -> Vec<ModuleSchema> {
    let retries = |env_var: &str| {
        FieldDefinition::new("max_retries", FieldType::Number)
            .with_env_var(env_var)
            .with_default(json!(STORAGE_RETRY_COUNT_MAX))
            .with_description("Connect retries after the initial attempt")
    };

    vec![
        ModuleSchema::new("mock")
            .with_field(
                FieldDefinition::new("seed", FieldType::Number)
                    .with_env_var("STORAGE_MOCK_SEED")
                    .with_default(json!(0))
                    .with_description("Seed for deterministic fault injection"),
            )
            .with_field(
                FieldDefinition::new("connect_failures", FieldType::Number)
                    .with_env_var("STORAGE_MOCK_CONNECT_FAILURES")
                    .with_default(json!(0))
                    .with_description("Leading connect attempts that fail"),
            )
            .with_field(
                FieldDefinition::new("operation_failure_rate", FieldType::Number)
                    .with_env_var("STORAGE_MOCK_FAILURE_RATE")
                    .with_default(json!(0.0))
                    .with_description("Probability that any operation fails"),
            )
            .with_field(retries("STORAGE_MOCK_MAX_RETRIES")),
        ModuleSchema::new("relational")
            .with_field(
                FieldDefinition::new("url", FieldType::Secret)
                    .with_env_var("DATABASE_URL")
                    .with_description("PostgreSQL connection URL")
                    .required_when(always_required),
            )
            .with_field(
                FieldDefinition::new("max_connections", FieldType::Number)
                    .with_env_var("DATABASE_POOL_SIZE")
                    .with_default(json!(RELATIONAL_POOL_CONNECTIONS_COUNT_DEFAULT))
                    .with_description("Connection pool size")
                    .with_group("pool"),
            )
            .with_field(retries("DATABASE_MAX_RETRIES")),
        ModuleSchema::new("document")
            .with_field(
                FieldDefinition::new("url", FieldType::Secret)
                    .with_env_var("MONGODB_URL")
                    .with_description("MongoDB connection URL")
                    .required_when(always_required),
            )
            .with_field(
                FieldDefinition::new("database", FieldType::String)
                    .with_env_var("MONGODB_DATABASE")
                    .with_default(json!(DOCUMENT_DATABASE_NAME_DEFAULT))
                    .with_description("Database holding the collections"),
            )
            .with_field(retries("MONGODB_MAX_RETRIES")),
        ModuleSchema::new("embedded")
            .with_field(
                FieldDefinition::new("path", FieldType::String)
                    .with_env_var("EMBEDDED_DB_PATH")
                    .with_default(json!(EMBEDDED_DB_PATH_DEFAULT))
                    .with_description("Database file path"),
            )
            .with_field(retries("EMBEDDED_MAX_RETRIES")),
    ]
}

// =============================================================================
// StrategyFactory
// =============================================================================

/// Builds ready strategies from engine tags and resolved configs.
pub struct StrategyFactory {
    schemas: Arc<SchemaRegistry>,
    custom: RwLock<HashMap<String, CustomEngineRegistration>>,
}

impl fmt::Debug for StrategyFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyFactory")
            .field("engines", &self.list_engines())
            .finish_non_exhaustive()
    }
}

impl StrategyFactory {
    /// Factory over an existing schema registry.
    #[must_use]
    pub fn new(schemas: Arc<SchemaRegistry>) -> Self {
        Self {
            schemas,
            custom: RwLock::new(HashMap::new()),
        }
    }

    /// Factory with the builtin engine schemas pre-registered.
    #[must_use]
    pub fn with_builtins() -> Self {
        let registry = SchemaRegistry::new();
        for schema in builtin_schemas() {
            registry.register_module_schema(schema);
        }
        Self::new(Arc::new(registry))
    }

    /// The schema registry backing this factory.
    #[must_use]
    pub fn schemas(&self) -> &Arc<SchemaRegistry> {
        &self.schemas
    }

    /// Register a custom engine. Write-once per name.
    ///
    /// # Errors
    /// `InvalidEngineName` without the `custom:` prefix;
    /// `DuplicateEngineRegistration` when the name is taken.
    pub fn register_custom_engine(
        &self,
        name: &str,
        registration: CustomEngineRegistration,
    ) -> Result<(), FactoryError> {
        if !name.starts_with(ENGINE_CUSTOM_PREFIX)
            || name.len() == ENGINE_CUSTOM_PREFIX.len()
        {
            return Err(FactoryError::InvalidEngineName {
                name: name.to_string(),
            });
        }

        let mut custom = self.custom.write().expect("custom registry poisoned");
        if custom.contains_key(name) {
            return Err(FactoryError::DuplicateEngineRegistration {
                name: name.to_string(),
            });
        }

        if let Some(schema) = &registration.config_schema {
            self.schemas.register_module_schema(schema.clone());
        }
        custom.insert(name.to_string(), registration);
        tracing::debug!(engine = name, "custom engine registered");
        Ok(())
    }

    /// Whether a builtin or custom engine answers to this tag.
    #[must_use]
    pub fn has_engine(&self, name: &str) -> bool {
        BUILTIN_ENGINES.contains(&name)
            || self
                .custom
                .read()
                .expect("custom registry poisoned")
                .contains_key(name)
    }

    /// Every known engine tag: builtins first, then customs (sorted).
    #[must_use]
    pub fn list_engines(&self) -> Vec<String> {
        let mut engines: Vec<String> = BUILTIN_ENGINES.iter().map(|e| (*e).to_string()).collect();
        let mut customs: Vec<String> = self
            .custom
            .read()
            .expect("custom registry poisoned")
            .keys()
            .cloned()
            .collect();
        customs.sort();
        engines.extend(customs);
        engines
    }

    /// Create a strategy and await its readiness.
    ///
    /// Schema, validation, and registration errors surface synchronously
    /// and are never retried; connection failures are retried inside the
    /// strategy and surface as `Connection` once exhausted.
    pub async fn create(
        &self,
        engine: &str,
        config: ResolvedConfig,
    ) -> Result<Box<dyn StorageStrategy>, FactoryError> {
        let id: EngineId = engine.parse()?;

        let strategy = if let EngineId::Custom(_) = &id {
            self.construct_custom(&id.to_string(), config)?
        } else {
            self.construct_builtin(&id, config)?
        };

        strategy.ready().await?;
        tracing::info!(engine, "storage strategy ready");
        Ok(strategy)
    }

    /// Resolve the engine's config from an environment source, then create.
    pub async fn create_from_env(
        &self,
        engine: &str,
        env: &dyn EnvSource,
    ) -> Result<Box<dyn StorageStrategy>, FactoryError> {
        let module = engine.to_string();
        let config = match self.schemas.get_module_schema(&module) {
            Some(schema) => Resolver::new(env).resolve_module(&schema),
            None => ResolvedConfig::new(),
        };
        self.create(engine, config).await
    }

    fn construct_custom(
        &self,
        name: &str,
        config: ResolvedConfig,
    ) -> Result<Box<dyn StorageStrategy>, FactoryError> {
        let registration = {
            let custom = self.custom.read().expect("custom registry poisoned");
            custom
                .get(name)
                .cloned()
                .ok_or_else(|| FactoryError::UnregisteredCustomEngine {
                    name: name.to_string(),
                })?
        };

        if let Some(validator) = &registration.config_validator {
            validator(&config).map_err(|message| FactoryError::CustomConfigRejected { message })?;
        }

        Ok((registration.constructor)(config)?)
    }

    fn construct_builtin(
        &self,
        id: &EngineId,
        config: ResolvedConfig,
    ) -> Result<Box<dyn StorageStrategy>, FactoryError> {
        let module = id.to_string();
        let schema =
            self.schemas
                .get_module_schema(&module)
                .ok_or(FactoryError::ConfigSchemaMissing {
                    engine: module.clone(),
                })?;

        let violations = validate_module(&schema, &config);
        if !violations.is_empty() {
            return Err(FactoryError::ConfigValidationFailed {
                engine: module,
                report: ValidationReport { errors: violations },
            });
        }

        match id {
            EngineId::Mock => Ok(Box::new(MockStrategy::from_config(&config))),
            EngineId::Relational => Self::construct_relational(&config, module),
            EngineId::Document => Self::construct_document(&config, module),
            EngineId::Embedded => Self::construct_embedded(&config, module),
            EngineId::Custom(_) => unreachable!("custom engines take the registry path"),
        }
    }

    #[cfg(feature = "relational")]
    fn construct_relational(
        config: &ResolvedConfig,
        _module: String,
    ) -> Result<Box<dyn StorageStrategy>, FactoryError> {
        Ok(Box::new(RelationalStrategy::from_config(config)))
    }

    #[cfg(not(feature = "relational"))]
    fn construct_relational(
        _config: &ResolvedConfig,
        module: String,
    ) -> Result<Box<dyn StorageStrategy>, FactoryError> {
        Err(FactoryError::EngineDisabled { engine: module })
    }

    #[cfg(feature = "document")]
    fn construct_document(
        config: &ResolvedConfig,
        _module: String,
    ) -> Result<Box<dyn StorageStrategy>, FactoryError> {
        Ok(Box::new(DocumentStrategy::from_config(config)))
    }

    #[cfg(not(feature = "document"))]
    fn construct_document(
        _config: &ResolvedConfig,
        module: String,
    ) -> Result<Box<dyn StorageStrategy>, FactoryError> {
        Err(FactoryError::EngineDisabled { engine: module })
    }

    #[cfg(feature = "embedded")]
    fn construct_embedded(
        config: &ResolvedConfig,
        _module: String,
    ) -> Result<Box<dyn StorageStrategy>, FactoryError> {
        Ok(Box::new(EmbeddedStrategy::from_config(config)))
    }

    #[cfg(not(feature = "embedded"))]
    fn construct_embedded(
        _config: &ResolvedConfig,
        module: String,
    ) -> Result<Box<dyn StorageStrategy>, FactoryError> {
        Err(FactoryError::EngineDisabled { engine: module })
    }
}

// =============================================================================
// Tests
// =============================================================================
