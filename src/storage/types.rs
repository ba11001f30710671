//! Strategy Types - Records, Filters, Options, Health
//!
//! `TigerStyle`: One record shape for every engine.
//!
//! Records and filters are JSON object maps. A filter is an equality
//! conjunction over its fields: a record matches when every filter field is
//! present and equal. Engines that cannot push sorting or windowing down to
//! their backend use the helpers at the bottom of this file so all engines
//! agree on ordering semantics.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{COLLECTION_NAME_BYTES_MAX, READ_LIMIT_COUNT_MAX};

use super::error::{StrategyError, StrategyResult};

// =============================================================================
// Records and Filters
// =============================================================================

/// A stored record: field name to JSON value.
pub type Record = serde_json::Map<String, Value>;

/// An equality conjunction over record fields. Empty matches everything.
pub type Filter = serde_json::Map<String, Value>;

/// Reserved field carrying the backend-assigned identifier.
pub const ID_FIELD: &str = "id";

// =============================================================================
// Read Options
// =============================================================================

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Sort specification for reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    /// Record field to order by
    pub field: String,
    /// Direction
    pub order: SortOrder,
}

/// Optional windowing and ordering for `read`.
///
/// Validated before any backend call; invalid options never reach a driver.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReadOptions {
    /// Result ordering; `None` preserves backend insertion order
    #[serde(default)]
    pub sort: Option<Sort>,
    /// Maximum records returned (0 to 1000)
    #[serde(default)]
    pub limit: Option<usize>,
    /// Records skipped before the window starts
    #[serde(default)]
    pub offset: Option<usize>,
}

impl ReadOptions {
    /// Check bounds on limit and sort.
    ///
    /// # Errors
    /// Returns `InvalidQueryOptions` when the limit exceeds the cap or the
    /// sort field is empty.
    pub fn validate(&self) -> StrategyResult<()> {
        if let Some(limit) = self.limit {
            if limit > READ_LIMIT_COUNT_MAX {
                return Err(StrategyError::invalid_options(format!(
                    "limit {limit} exceeds maximum {READ_LIMIT_COUNT_MAX}"
                )));
            }
        }
        if let Some(sort) = &self.sort {
            // Sort fields reach backend query text; hold them to plain
            // identifier characters.
            let valid = !sort.field.is_empty()
                && sort
                    .field
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_');
            if !valid {
                return Err(StrategyError::invalid_options(format!(
                    "sort field `{}` is not a plain identifier",
                    sort.field
                )));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Health and Lifecycle
// =============================================================================

/// Result of a health probe. Never an error: failures report `ok: false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    /// Whether the backend answered the probe
    pub ok: bool,
    /// Measured probe latency in milliseconds
    pub latency_ms: u64,
}

/// Lifecycle state of a strategy instance.
///
/// `Error` is terminal: recovery means creating a new instance through the
/// factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyStatus {
    Connecting,
    Ready,
    Error,
}

/// Observable lifecycle transitions.
///
/// `Connect` fires on each transition into `Ready`; `Disconnect` on each
/// transition into `Error`. Emission is level-triggered with no replay: a
/// listener registered after a transition does not receive it, and callers
/// needing current state read `status()` directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Connect,
    Disconnect,
}

// =============================================================================
// Collection Record Schemas
// =============================================================================

/// JSON kind accepted by a record field rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    String,
    Number,
    Boolean,
    Object,
    Array,
    Any,
}

impl ValueKind {
    fn accepts(self, value: &Value) -> bool {
        match self {
            ValueKind::String => value.is_string(),
            ValueKind::Number => value.is_number(),
            ValueKind::Boolean => value.is_boolean(),
            ValueKind::Object => value.is_object(),
            ValueKind::Array => value.is_array(),
            ValueKind::Any => true,
        }
    }

    fn name(self) -> &'static str {
        match self {
            ValueKind::String => "string",
            ValueKind::Number => "number",
            ValueKind::Boolean => "boolean",
            ValueKind::Object => "object",
            ValueKind::Array => "array",
            ValueKind::Any => "any",
        }
    }
}

/// One field rule in a collection schema.
#[derive(Debug, Clone)]
pub struct RecordField {
    /// Record field name
    pub key: String,
    /// Accepted JSON kind
    pub kind: ValueKind,
    /// Whether the field must be present on create
    pub required: bool,
}

impl RecordField {
    /// Required field of the given kind.
    #[must_use]
    pub fn required(key: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            key: key.into(),
            kind,
            required: true,
        }
    }

    /// Optional field of the given kind.
    #[must_use]
    pub fn optional(key: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            key: key.into(),
            kind,
            required: false,
        }
    }
}

/// Record rules for one collection, enforced on `create`.
#[derive(Debug, Clone, Default)]
pub struct CollectionSchema {
    /// Field rules
    pub fields: Vec<RecordField>,
}

impl CollectionSchema {
    /// Create an empty schema (accepts everything).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field rule.
    #[must_use]
    pub fn with_field(mut self, field: RecordField) -> Self {
        self.fields.push(field);
        self
    }

    /// Check a payload against the rules.
    ///
    /// # Errors
    /// Returns a validation error naming the first offending field.
    pub fn check(&self, collection: &str, record: &Record) -> StrategyResult<()> {
        for rule in &self.fields {
            match record.get(&rule.key) {
                None if rule.required => {
                    return Err(StrategyError::validation(
                        collection,
                        format!("missing required field `{}`", rule.key),
                    ));
                }
                Some(value) if !rule.kind.accepts(value) => {
                    return Err(StrategyError::validation(
                        collection,
                        format!("field `{}` must be {}", rule.key, rule.kind.name()),
                    ));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Per-collection schemas held by a strategy instance.
#[derive(Debug, Default)]
pub struct RecordSchemas {
    inner: RwLock<HashMap<String, CollectionSchema>>,
}

impl RecordSchemas {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a collection's schema.
    pub fn register(&self, collection: &str, schema: CollectionSchema) {
        let mut inner = self.inner.write().expect("record schemas poisoned");
        inner.insert(collection.to_string(), schema);
    }

    /// Check a payload against the collection's schema, if one is registered.
    pub fn check(&self, collection: &str, record: &Record) -> StrategyResult<()> {
        let inner = self.inner.read().expect("record schemas poisoned");
        match inner.get(collection) {
            Some(schema) => schema.check(collection, record),
            None => Ok(()),
        }
    }
}

// =============================================================================
// Shared Query Helpers
// =============================================================================

/// Check a collection name before handing it to a backend.
///
/// # Errors
/// Returns `InvalidCollection` for names that are empty, oversized, or not
/// of the form `[A-Za-z_][A-Za-z0-9_]*`.
pub fn check_collection_name(name: &str) -> StrategyResult<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .map_or(false, |c| c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if !valid_start || !valid_rest || name.len() > COLLECTION_NAME_BYTES_MAX {
        return Err(StrategyError::invalid_collection(name));
    }
    Ok(())
}

/// Equality-conjunction match: every filter field present and equal.
#[must_use]
pub fn record_matches(record: &Record, filter: &Filter) -> bool {
    filter
        .iter()
        .all(|(key, expected)| record.get(key) == Some(expected))
}

/// Total order over JSON values for sorting.
///
/// Null < booleans < numbers < strings < arrays/objects; absent fields sort
/// first. Numbers compare numerically, everything else by its rendered form.
#[must_use]
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(left), Some(right)) => {
            let by_rank = rank(left).cmp(&rank(right));
            if by_rank != Ordering::Equal {
                return by_rank;
            }
            match (left, right) {
                (Value::Bool(l), Value::Bool(r)) => l.cmp(r),
                (Value::Number(l), Value::Number(r)) => {
                    let l = l.as_f64().unwrap_or(f64::NAN);
                    let r = r.as_f64().unwrap_or(f64::NAN);
                    l.partial_cmp(&r).unwrap_or(Ordering::Equal)
                }
                (Value::String(l), Value::String(r)) => l.cmp(r),
                _ => left.to_string().cmp(&right.to_string()),
            }
        }
    }
}

/// Apply a sort specification in place. Stable, so ties keep insertion order.
pub fn sort_records(records: &mut [Record], sort: &Sort) {
    records.sort_by(|a, b| {
        let ordering = compare_values(a.get(&sort.field), b.get(&sort.field));
        match sort.order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });
}

/// Apply offset and limit to an already ordered result set.
#[must_use]
pub fn apply_window(records: Vec<Record>, options: &ReadOptions) -> Vec<Record> {
    let offset = options.offset.unwrap_or(0);
    let iter = records.into_iter().skip(offset);
    match options.limit {
        Some(limit) => iter.take(limit).collect(),
        None => iter.collect(),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(pairs: &[(&str, Value)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_filter_is_equality_conjunction() {
        let r = record(&[("name", json!("Alice")), ("age", json!(30))]);

        assert!(record_matches(&r, &record(&[])));
        assert!(record_matches(&r, &record(&[("name", json!("Alice"))])));
        assert!(record_matches(
            &r,
            &record(&[("name", json!("Alice")), ("age", json!(30))])
        ));
        assert!(!record_matches(&r, &record(&[("name", json!("Bob"))])));
        assert!(!record_matches(&r, &record(&[("missing", json!(1))])));
    }

    #[test]
    fn test_limit_bounds() {
        let ok = ReadOptions {
            limit: Some(READ_LIMIT_COUNT_MAX),
            ..Default::default()
        };
        assert!(ok.validate().is_ok());

        let too_big = ReadOptions {
            limit: Some(READ_LIMIT_COUNT_MAX + 1),
            ..Default::default()
        };
        assert!(matches!(
            too_big.validate(),
            Err(StrategyError::InvalidQueryOptions { .. })
        ));
    }

    #[test]
    fn test_empty_sort_field_rejected() {
        let options = ReadOptions {
            sort: Some(Sort {
                field: String::new(),
                order: SortOrder::Asc,
            }),
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_sort_numeric_then_window() {
        let mut records = vec![
            record(&[("n", json!(3))]),
            record(&[("n", json!(1))]),
            record(&[("n", json!(10))]),
            record(&[("n", json!(2))]),
        ];
        sort_records(
            &mut records,
            &Sort {
                field: "n".to_string(),
                order: SortOrder::Asc,
            },
        );
        let ns: Vec<_> = records.iter().map(|r| r["n"].clone()).collect();
        assert_eq!(ns, vec![json!(1), json!(2), json!(3), json!(10)]);

        let window = apply_window(
            records,
            &ReadOptions {
                limit: Some(2),
                offset: Some(1),
                ..Default::default()
            },
        );
        assert_eq!(window.len(), 2);
        assert_eq!(window[0]["n"], json!(2));
        assert_eq!(window[1]["n"], json!(3));
    }

    #[test]
    fn test_collection_name_rules() {
        assert!(check_collection_name("users").is_ok());
        assert!(check_collection_name("_audit_log2").is_ok());
        assert!(check_collection_name("").is_err());
        assert!(check_collection_name("1users").is_err());
        assert!(check_collection_name("users; DROP TABLE").is_err());
        assert!(check_collection_name(&"x".repeat(COLLECTION_NAME_BYTES_MAX + 1)).is_err());
    }

    #[test]
    fn test_collection_schema_check() {
        let schema = CollectionSchema::new()
            .with_field(RecordField::required("name", ValueKind::String))
            .with_field(RecordField::optional("age", ValueKind::Number));

        assert!(schema
            .check("users", &record(&[("name", json!("Alice"))]))
            .is_ok());
        assert!(schema.check("users", &record(&[("age", json!(1))])).is_err());
        assert!(schema
            .check(
                "users",
                &record(&[("name", json!("Alice")), ("age", json!("old"))])
            )
            .is_err());
    }
}
