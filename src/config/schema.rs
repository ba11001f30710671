//! Field Schemas - Self-Describing Engine Configuration
//!
//! `TigerStyle`: Schema as data, interpreted by a small switch over the type
//! tag. No reflection.
//!
//! Each engine registers one [`ModuleSchema`]: an ordered list of
//! [`FieldDefinition`]s describing where a configuration value comes from
//! (environment variable), how it is typed, and when it is required. The
//! resolver and validator interpret these descriptors; nothing else in the
//! crate looks at the environment directly.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use serde_json::Value;

// =============================================================================
// Field Types
// =============================================================================

/// Declared type of a configuration field.
///
/// `Secret` behaves as a string everywhere but marks the value as sensitive
/// for display layers. `Custom` accepts any value and is never coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Secret,
    Custom,
}

impl FieldType {
    /// Human-readable name used in validation messages.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Secret => "secret",
            FieldType::Custom => "custom",
        }
    }

    /// Check whether a resolved value matches this declared type.
    ///
    /// Secrets validate as strings; custom fields accept anything.
    #[must_use]
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            FieldType::String | FieldType::Secret => value.is_string(),
            FieldType::Number => value.is_number(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Custom => true,
        }
    }
}

// =============================================================================
// Field Definitions
// =============================================================================

/// A fully resolved module configuration: field key to typed value.
///
/// Only defined fields are present. A field with no environment value and
/// no default is absent, never null.
pub type ResolvedConfig = BTreeMap<String, Value>;

/// Requirement predicate evaluated against the module's resolved config.
pub type RequiredIf = fn(&ResolvedConfig) -> bool;

/// Predicate for fields that are always required.
pub fn always_required(_: &ResolvedConfig) -> bool {
    true
}

/// Declarative description of one configurable field.
#[derive(Debug, Clone)]
pub struct FieldDefinition {
    /// Key under which the resolved value is stored
    pub key: String,
    /// Declared type, drives coercion and validation
    pub field_type: FieldType,
    /// Fallback when the environment variable is unset
    pub default: Option<Value>,
    /// Environment variable sourcing this field
    pub env_var: Option<String>,
    /// Human-readable description for display layers
    pub description: Option<String>,
    /// Deployment environments this field applies to (None = all)
    pub environments: Option<Vec<String>>,
    /// Display grouping hint
    pub group: Option<String>,
    /// Roles allowed to see this field's value in display layers
    pub visible_to: Option<Vec<String>>,
    /// When present and true for the resolved config, the field must be defined
    pub required_if: Option<RequiredIf>,
}

impl FieldDefinition {
    /// Create a field with the given key and type; everything else unset.
    #[must_use]
    pub fn new(key: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            key: key.into(),
            field_type,
            default: None,
            env_var: None,
            description: None,
            environments: None,
            group: None,
            visible_to: None,
            required_if: None,
        }
    }

    /// Set the fallback value used when the environment variable is unset.
    #[must_use]
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Set the environment variable sourcing this field.
    #[must_use]
    pub fn with_env_var(mut self, env_var: impl Into<String>) -> Self {
        self.env_var = Some(env_var.into());
        self
    }

    /// Set the human-readable description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Restrict the field to the given deployment environments.
    #[must_use]
    pub fn with_environments(mut self, environments: Vec<String>) -> Self {
        self.environments = Some(environments);
        self
    }

    /// Set the display grouping hint.
    #[must_use]
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Restrict visibility to the given roles.
    #[must_use]
    pub fn visible_to(mut self, roles: Vec<String>) -> Self {
        self.visible_to = Some(roles);
        self
    }

    /// Mark the field required whenever the predicate holds.
    #[must_use]
    pub fn required_when(mut self, predicate: RequiredIf) -> Self {
        self.required_if = Some(predicate);
        self
    }

    /// Mark the field unconditionally required.
    #[must_use]
    pub fn required(self) -> Self {
        self.required_when(always_required)
    }
}

// =============================================================================
// Module Schemas
// =============================================================================

/// Ordered set of field definitions for one engine.
///
/// Field order is preserved; later definitions with a duplicate key replace
/// earlier ones in place.
#[derive(Debug, Clone)]
pub struct ModuleSchema {
    /// Engine name this schema configures
    pub module: String,
    fields: Vec<FieldDefinition>,
}

impl ModuleSchema {
    /// Create an empty schema for the given module.
    #[must_use]
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            fields: Vec::new(),
        }
    }

    /// Add or replace a field, preserving order for replacements.
    #[must_use]
    pub fn with_field(mut self, field: FieldDefinition) -> Self {
        if let Some(existing) = self.fields.iter_mut().find(|f| f.key == field.key) {
            *existing = field;
        } else {
            self.fields.push(field);
        }
        self
    }

    /// Look up a field by key.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.key == key)
    }

    /// All fields in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[FieldDefinition] {
        &self.fields
    }

    /// Field keys in declaration order.
    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.key.as_str()).collect()
    }
}

// =============================================================================
// Schema Registry
// =============================================================================

/// Registry of module schemas, owned by the composition root.
///
/// Schemas are registered once at process start; registration overwrites.
/// Reads are pure. There is deliberately no global instance.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    inner: RwLock<HashMap<String, ModuleSchema>>,
}

impl SchemaRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store or overwrite a module's schema.
    pub fn register_module_schema(&self, schema: ModuleSchema) {
        let mut inner = self.inner.write().expect("schema registry poisoned");
        inner.insert(schema.module.clone(), schema);
    }

    /// Fetch one module's schema.
    #[must_use]
    pub fn get_module_schema(&self, module: &str) -> Option<ModuleSchema> {
        let inner = self.inner.read().expect("schema registry poisoned");
        inner.get(module).cloned()
    }

    /// All registered schemas, in no particular order.
    #[must_use]
    pub fn all_schemas(&self) -> Vec<ModuleSchema> {
        let inner = self.inner.read().expect("schema registry poisoned");
        inner.values().cloned().collect()
    }

    /// Whether a schema exists for the given module.
    #[must_use]
    pub fn contains(&self, module: &str) -> bool {
        let inner = self.inner.read().expect("schema registry poisoned");
        inner.contains_key(module)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_type_accepts() {
        assert!(FieldType::String.accepts(&json!("x")));
        assert!(!FieldType::String.accepts(&json!(1)));
        assert!(FieldType::Number.accepts(&json!(1.5)));
        assert!(FieldType::Boolean.accepts(&json!(true)));
        assert!(FieldType::Secret.accepts(&json!("hunter2")));
        assert!(FieldType::Custom.accepts(&json!({"any": []})));
    }

    #[test]
    fn test_schema_preserves_order() {
        let schema = ModuleSchema::new("relational")
            .with_field(FieldDefinition::new("url", FieldType::Secret))
            .with_field(FieldDefinition::new("max_connections", FieldType::Number))
            .with_field(FieldDefinition::new("max_retries", FieldType::Number));

        assert_eq!(schema.keys(), vec!["url", "max_connections", "max_retries"]);
    }

    #[test]
    fn test_schema_replaces_duplicate_key_in_place() {
        let schema = ModuleSchema::new("m")
            .with_field(FieldDefinition::new("a", FieldType::String))
            .with_field(FieldDefinition::new("b", FieldType::String))
            .with_field(FieldDefinition::new("a", FieldType::Number));

        assert_eq!(schema.keys(), vec!["a", "b"]);
        assert_eq!(schema.field("a").unwrap().field_type, FieldType::Number);
    }

    #[test]
    fn test_registry_overwrites() {
        let registry = SchemaRegistry::new();
        registry.register_module_schema(ModuleSchema::new("mock"));
        registry.register_module_schema(
            ModuleSchema::new("mock").with_field(FieldDefinition::new("seed", FieldType::Number)),
        );

        let schema = registry.get_module_schema("mock").unwrap();
        assert_eq!(schema.keys(), vec!["seed"]);
        assert!(registry.contains("mock"));
        assert!(!registry.contains("relational"));
    }
}
