//! Config Validator - Aggregate Schema Checks
//!
//! `TigerStyle`: Collect every violation; never stop at the first.
//!
//! Given `{module: resolved config}`, checks each schema field: a field
//! whose requirement predicate holds must be defined, and a defined value's
//! runtime type must match its declaration. The result carries one message
//! per violated field, naming module and key.

use std::collections::HashMap;
use std::fmt;

use super::schema::{ModuleSchema, ResolvedConfig, SchemaRegistry};

// =============================================================================
// Violations
// =============================================================================

/// One violated field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    /// Module the field belongs to
    pub module: String,
    /// Field key
    pub key: String,
    /// What went wrong
    pub message: String,
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}: {}", self.module, self.key, self.message)
    }
}

/// Aggregate validation result.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// All violations, in schema order per module
    pub errors: Vec<FieldViolation>,
}

impl ValidationReport {
    /// True when no field was violated.
    #[must_use]
    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errors.is_empty() {
            return write!(f, "valid");
        }
        for (i, violation) in self.errors.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{violation}")?;
        }
        Ok(())
    }
}

// =============================================================================
// Validation
// =============================================================================

/// Validate one module's resolved config against its schema.
///
/// Returns every violation, in field declaration order.
#[must_use]
pub fn validate_module(schema: &ModuleSchema, config: &ResolvedConfig) -> Vec<FieldViolation> {
    let mut violations = Vec::new();

    for field in schema.fields() {
        match config.get(&field.key) {
            None => {
                let required = field.required_if.map_or(false, |predicate| predicate(config));
                if required {
                    violations.push(FieldViolation {
                        module: schema.module.clone(),
                        key: field.key.clone(),
                        message: "required field is undefined".to_string(),
                    });
                }
            }
            Some(value) => {
                if !field.field_type.accepts(value) {
                    violations.push(FieldViolation {
                        module: schema.module.clone(),
                        key: field.key.clone(),
                        message: format!(
                            "expected {}, got {}",
                            field.field_type.name(),
                            value_kind(value)
                        ),
                    });
                }
            }
        }
    }

    violations
}

/// Validate a set of module configs against the registry.
///
/// A module with no registered schema is itself a violation.
#[must_use]
pub fn validate(
    configs: &HashMap<String, ResolvedConfig>,
    registry: &SchemaRegistry,
) -> ValidationReport {
    let mut report = ValidationReport::default();

    let mut modules: Vec<&String> = configs.keys().collect();
    modules.sort();

    for module in modules {
        let config = &configs[module];
        match registry.get_module_schema(module) {
            Some(schema) => report.errors.extend(validate_module(&schema, config)),
            None => report.errors.push(FieldViolation {
                module: module.clone(),
                key: "*".to_string(),
                message: "no schema registered for module".to_string(),
            }),
        }
    }

    report
}

fn value_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{FieldDefinition, FieldType};
    use serde_json::json;

    fn schema() -> ModuleSchema {
        ModuleSchema::new("document")
            .with_field(
                FieldDefinition::new("url", FieldType::Secret)
                    .with_env_var("MONGODB_URL")
                    .required(),
            )
            .with_field(
                FieldDefinition::new("database", FieldType::String).with_default(json!("app")),
            )
            .with_field(FieldDefinition::new("max_retries", FieldType::Number))
    }

    #[test]
    fn test_valid_config_passes() {
        let mut config = ResolvedConfig::new();
        config.insert("url".to_string(), json!("mongodb://localhost"));
        config.insert("database".to_string(), json!("app"));

        assert!(validate_module(&schema(), &config).is_empty());
    }

    #[test]
    fn test_all_violations_collected() {
        // Missing required url AND mistyped max_retries: both must surface.
        let mut config = ResolvedConfig::new();
        config.insert("database".to_string(), json!("app"));
        config.insert("max_retries".to_string(), json!("three"));

        let violations = validate_module(&schema(), &config);
        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0].key, "url");
        assert!(violations[0].message.contains("required"));
        assert_eq!(violations[1].key, "max_retries");
        assert!(violations[1].message.contains("expected number"));
    }

    #[test]
    fn test_optional_undefined_field_is_fine() {
        let mut config = ResolvedConfig::new();
        config.insert("url".to_string(), json!("mongodb://localhost"));

        assert!(validate_module(&schema(), &config).is_empty());
    }

    #[test]
    fn test_conditional_requirement() {
        fn tls_enabled(config: &ResolvedConfig) -> bool {
            config.get("tls") == Some(&json!(true))
        }

        let schema = ModuleSchema::new("m")
            .with_field(FieldDefinition::new("tls", FieldType::Boolean))
            .with_field(
                FieldDefinition::new("ca_path", FieldType::String).required_when(tls_enabled),
            );

        let mut off = ResolvedConfig::new();
        off.insert("tls".to_string(), json!(false));
        assert!(validate_module(&schema, &off).is_empty());

        let mut on = ResolvedConfig::new();
        on.insert("tls".to_string(), json!(true));
        let violations = validate_module(&schema, &on);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].key, "ca_path");
    }

    #[test]
    fn test_unknown_module_reported() {
        let registry = SchemaRegistry::new();
        let mut configs = HashMap::new();
        configs.insert("ghost".to_string(), ResolvedConfig::new());

        let report = validate(&configs, &registry);
        assert!(!report.success());
        assert_eq!(report.errors[0].module, "ghost");
    }

    #[test]
    fn test_report_display_names_module_and_key() {
        let registry = SchemaRegistry::new();
        registry.register_module_schema(schema());

        let mut configs = HashMap::new();
        configs.insert("document".to_string(), ResolvedConfig::new());

        let report = validate(&configs, &registry);
        let rendered = report.to_string();
        assert!(rendered.contains("document.url"));
    }
}
