//! Integration Tests for the Storage Core
//!
//! End-to-end workflow validation through the factory and the mock engine:
//! - Engine selection, schema resolution, and validation
//! - Custom engine registration ordering
//! - The shared CRUD contract (ids, filters, windows, mutation returns)

use std::sync::Arc;

use serde_json::{json, Value};

use polystore::config::{Resolver, StaticEnv};
use polystore::storage::{
    CollectionSchema, CustomEngineRegistration, Filter, MockConfig, MockStrategy, ReadOptions,
    Record, RecordField, Sort, SortOrder, StorageStrategy, StrategyFactory, ValueKind,
};
use polystore::{FactoryError, StrategyError};

fn record(pairs: &[(&str, Value)]) -> Record {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

// =============================================================================
// Configuration Resolution
// =============================================================================

#[test]
fn test_resolved_config_matches_schema_types() {
    let factory = StrategyFactory::with_builtins();
    let env = StaticEnv::new()
        .with("STORAGE_MOCK_SEED", "42")
        .with("STORAGE_MOCK_FAILURE_RATE", "0.25");

    let schema = factory.schemas().get_module_schema("mock").unwrap();
    let resolved = Resolver::new(&env).resolve_module(&schema);

    // Every resolved key belongs to the schema and carries the declared type.
    for (key, value) in &resolved {
        let field = schema.field(key).expect("key outside schema");
        assert!(
            field.field_type.accepts(value),
            "{key} resolved to mismatched type {value}"
        );
    }
    // Defaults fill in for unset fields, so the key set equals the schema's.
    let mut schema_keys = schema.keys();
    schema_keys.sort_unstable();
    assert_eq!(
        resolved.keys().map(String::as_str).collect::<Vec<_>>(),
        schema_keys
    );
    assert_eq!(resolved["seed"], json!(42));
    assert_eq!(resolved["operation_failure_rate"], json!(0.25));
}

#[tokio::test]
async fn test_invalid_config_reports_every_field() {
    let factory = StrategyFactory::with_builtins();
    let env = StaticEnv::new()
        .with("STORAGE_MOCK_SEED", "not-a-number")
        .with("STORAGE_MOCK_CONNECT_FAILURES", "many");

    let err = factory.create_from_env("mock", &env).await.unwrap_err();
    match err {
        FactoryError::ConfigValidationFailed { report, .. } => {
            assert_eq!(report.errors.len(), 2);
            let keys: Vec<_> = report.errors.iter().map(|e| e.key.as_str()).collect();
            assert!(keys.contains(&"seed"));
            assert!(keys.contains(&"connect_failures"));
        }
        other => panic!("expected validation failure, got {other:?}"),
    }
}

// =============================================================================
// Custom Engines
// =============================================================================

#[tokio::test]
async fn test_custom_engine_lifecycle() {
    let factory = StrategyFactory::with_builtins();

    // Before registration: creation fails.
    let err = factory
        .create("custom:flatfile", Default::default())
        .await
        .unwrap_err();
    assert!(matches!(err, FactoryError::UnregisteredCustomEngine { .. }));

    factory
        .register_custom_engine(
            "custom:flatfile",
            CustomEngineRegistration::new(Arc::new(|_| {
                Ok(Box::new(MockStrategy::new(MockConfig::default()))
                    as Box<dyn StorageStrategy>)
            })),
        )
        .unwrap();

    // After registration: creation succeeds and the instance is ready.
    let store = factory
        .create("custom:flatfile", Default::default())
        .await
        .unwrap();
    assert!(store.health_check().await.ok);

    // The registry is write-once per name.
    let err = factory
        .register_custom_engine(
            "custom:flatfile",
            CustomEngineRegistration::new(Arc::new(|_| {
                Ok(Box::new(MockStrategy::new(MockConfig::default()))
                    as Box<dyn StorageStrategy>)
            })),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        FactoryError::DuplicateEngineRegistration { .. }
    ));
}

// =============================================================================
// CRUD Contract
// =============================================================================

#[tokio::test]
async fn test_create_then_read_assigns_sequential_ids() {
    let factory = StrategyFactory::with_builtins();
    let store = factory.create("mock", Default::default()).await.unwrap();

    store
        .create("users", record(&[("name", json!("Alice"))]))
        .await
        .unwrap();

    let users = store
        .read("users", &Filter::new(), &ReadOptions::default())
        .await
        .unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0]["id"], json!(1));

    let second = store
        .create("users", record(&[("name", json!("Bob"))]))
        .await
        .unwrap();
    assert_eq!(second["id"], json!(2));
}

#[tokio::test]
async fn test_read_window_over_five_records() {
    let factory = StrategyFactory::with_builtins();
    let store = factory.create("mock", Default::default()).await.unwrap();

    for i in 1..=5 {
        store
            .create("items", record(&[("n", json!(i))]))
            .await
            .unwrap();
    }

    let window = store
        .read(
            "items",
            &Filter::new(),
            &ReadOptions {
                limit: Some(2),
                offset: Some(1),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // Records 2 and 3, in insertion order.
    assert_eq!(window.len(), 2);
    assert_eq!(window[0]["id"], json!(2));
    assert_eq!(window[1]["id"], json!(3));
}

#[tokio::test]
async fn test_filter_is_equality_conjunction() {
    let factory = StrategyFactory::with_builtins();
    let store = factory.create("mock", Default::default()).await.unwrap();

    for (name, role) in [("Alice", "admin"), ("Bob", "user"), ("Cara", "admin")] {
        store
            .create(
                "users",
                record(&[("name", json!(name)), ("role", json!(role))]),
            )
            .await
            .unwrap();
    }

    let admins = store
        .read(
            "users",
            &record(&[("role", json!("admin"))]),
            &ReadOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(admins.len(), 2);

    let alice_admin = store
        .read(
            "users",
            &record(&[("role", json!("admin")), ("name", json!("Alice"))]),
            &ReadOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(alice_admin.len(), 1);
}

#[tokio::test]
async fn test_sorted_read_pushdown() {
    let factory = StrategyFactory::with_builtins();
    let store = factory.create("mock", Default::default()).await.unwrap();

    for age in [30, 25, 35] {
        store
            .create("users", record(&[("age", json!(age))]))
            .await
            .unwrap();
    }

    let sorted = store
        .read(
            "users",
            &Filter::new(),
            &ReadOptions {
                sort: Some(Sort {
                    field: "age".to_string(),
                    order: SortOrder::Asc,
                }),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let ages: Vec<_> = sorted.iter().map(|r| r["age"].clone()).collect();
    assert_eq!(ages, vec![json!(25), json!(30), json!(35)]);
}

#[tokio::test]
async fn test_mutations_return_affected_records() {
    let factory = StrategyFactory::with_builtins();
    let store = factory.create("mock", Default::default()).await.unwrap();

    for n in 1..=4 {
        store
            .create("items", record(&[("n", json!(n)), ("even", json!(n % 2 == 0))]))
            .await
            .unwrap();
    }

    let updated = store
        .update(
            "items",
            &record(&[("even", json!(true))]),
            &record(&[("flagged", json!(true))]),
        )
        .await
        .unwrap();
    assert_eq!(updated.len(), 2);
    assert!(updated.iter().all(|r| r["flagged"] == json!(true)));

    let removed = store
        .delete("items", &record(&[("even", json!(true))]))
        .await
        .unwrap();
    assert_eq!(removed.len(), 2);

    let remaining = store
        .read("items", &Filter::new(), &ReadOptions::default())
        .await
        .unwrap();
    assert_eq!(remaining.len(), 2);
}

#[tokio::test]
async fn test_collection_schema_gates_create() {
    let factory = StrategyFactory::with_builtins();
    let store = factory.create("mock", Default::default()).await.unwrap();

    store.register_collection_schema(
        "users",
        CollectionSchema::new()
            .with_field(RecordField::required("name", ValueKind::String))
            .with_field(RecordField::optional("age", ValueKind::Number)),
    );

    let err = store
        .create("users", record(&[("age", json!("old"))]))
        .await
        .unwrap_err();
    assert!(matches!(err, StrategyError::Validation { .. }));

    // Other collections stay unconstrained.
    assert!(store
        .create("posts", record(&[("anything", json!(1))]))
        .await
        .is_ok());
}

#[tokio::test]
async fn test_invalid_query_options_rejected_up_front() {
    let factory = StrategyFactory::with_builtins();
    let store = factory.create("mock", Default::default()).await.unwrap();

    let err = store
        .read(
            "users",
            &Filter::new(),
            &ReadOptions {
                limit: Some(1001),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StrategyError::InvalidQueryOptions { .. }));
}
