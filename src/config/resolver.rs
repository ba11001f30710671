//! Config Resolver - Environment to Typed Values
//!
//! `TigerStyle`: Deterministic coercion, simulation-friendly environment
//! access.
//!
//! For each field in a module's schema: if its environment variable is set,
//! the raw string is coerced per the declared type; otherwise the default
//! applies; otherwise the field is undefined and absent from the result.
//!
//! Coercion table:
//! - `number`  - integer parse, then float parse; an unparseable value
//!   resolves to the raw string so the validator reports it
//! - `boolean` - equality with the literal string `"true"`
//! - `string` / `secret` / `custom` - the raw string, unchanged

use std::collections::HashMap;

use serde_json::{Number, Value};

use super::schema::{FieldDefinition, FieldType, ModuleSchema, ResolvedConfig, SchemaRegistry};

// =============================================================================
// Environment Sources
// =============================================================================

/// Source of environment values.
///
/// Production code uses [`ProcessEnv`]; tests use [`StaticEnv`] for
/// deterministic resolution without touching the process environment.
pub trait EnvSource: Send + Sync {
    /// Fetch a variable, `None` when unset.
    fn get(&self, key: &str) -> Option<String>;
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Fixed in-memory environment for deterministic tests.
#[derive(Debug, Clone, Default)]
pub struct StaticEnv {
    vars: HashMap<String, String>,
}

impl StaticEnv {
    /// Create an empty environment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable, builder style.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }
}

impl EnvSource for StaticEnv {
    fn get(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

// =============================================================================
// Resolver
// =============================================================================

/// Resolves module schemas against an environment source.
pub struct Resolver<'a> {
    env: &'a dyn EnvSource,
    /// Active deployment environment; fields scoped to other environments
    /// resolve as undefined. `None` disables scoping.
    deployment: Option<String>,
}

impl<'a> Resolver<'a> {
    /// Create a resolver over the given environment source.
    #[must_use]
    pub fn new(env: &'a dyn EnvSource) -> Self {
        Self {
            env,
            deployment: None,
        }
    }

    /// Scope resolution to a deployment environment name.
    #[must_use]
    pub fn with_deployment(mut self, deployment: impl Into<String>) -> Self {
        self.deployment = Some(deployment.into());
        self
    }

    /// Resolve one module's configuration.
    ///
    /// The result contains only defined fields; a field with no environment
    /// value and no default is absent.
    #[must_use]
    pub fn resolve_module(&self, schema: &ModuleSchema) -> ResolvedConfig {
        let mut resolved = ResolvedConfig::new();

        for field in schema.fields() {
            if !self.applies(field) {
                continue;
            }
            if let Some(value) = self.resolve_field(field) {
                resolved.insert(field.key.clone(), value);
            }
        }

        resolved
    }

    /// Resolve every registered module.
    #[must_use]
    pub fn resolve_all(&self, registry: &SchemaRegistry) -> HashMap<String, ResolvedConfig> {
        registry
            .all_schemas()
            .into_iter()
            .map(|schema| {
                let resolved = self.resolve_module(&schema);
                (schema.module, resolved)
            })
            .collect()
    }

    fn applies(&self, field: &FieldDefinition) -> bool {
        match (&self.deployment, &field.environments) {
            (Some(current), Some(scoped)) => scoped.iter().any(|e| e == current),
            _ => true,
        }
    }

    fn resolve_field(&self, field: &FieldDefinition) -> Option<Value> {
        if let Some(env_var) = &field.env_var {
            if let Some(raw) = self.env.get(env_var) {
                return Some(coerce(&raw, field.field_type));
            }
        }
        field.default.clone()
    }
}

/// Coerce a raw environment string per the declared field type.
#[must_use]
pub fn coerce(raw: &str, field_type: FieldType) -> Value {
    match field_type {
        FieldType::Number => {
            if let Ok(i) = raw.parse::<i64>() {
                Value::Number(Number::from(i))
            } else if let Some(n) = raw.parse::<f64>().ok().and_then(Number::from_f64) {
                Value::Number(n)
            } else {
                // Left as a string so validation reports the mismatch.
                Value::String(raw.to_string())
            }
        }
        FieldType::Boolean => Value::Bool(raw == "true"),
        FieldType::String | FieldType::Secret | FieldType::Custom => Value::String(raw.to_string()),
    }
}

// =============================================================================
// Tests
// =============================================================================
