//! Lifecycle Tests with Deterministic Faults
//!
//! Retry/backoff, readiness, event emission, and health reporting,
//! exercised through the mock engine's scripted connect failures so every
//! failure path is reproducible.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use polystore::storage::{
    LifecycleEvent, MockConfig, MockStrategy, RetryPolicy, StorageStrategy, StrategyError,
    StrategyStatus,
};

fn fast_retry(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        base_delay: Duration::from_millis(10),
        multiplier: 2.0,
        max_delay: Duration::from_millis(200),
    }
}

// =============================================================================
// Retry and Backoff
// =============================================================================

#[tokio::test]
async fn test_always_failing_transport_attempts_exactly_four_times() {
    let mock = MockStrategy::new(MockConfig {
        connect_failures: u32::MAX,
        retry: fast_retry(3),
        ..Default::default()
    });

    let started = Instant::now();
    let err = mock.connect().await.unwrap_err();
    let elapsed = started.elapsed();

    // 1 initial + 3 retries
    assert_eq!(mock.connect_attempts(), 4);
    assert!(matches!(
        err,
        StrategyError::ConnectionExhausted { attempts: 4, .. }
    ));
    assert_eq!(mock.status(), StrategyStatus::Error);

    // Geometric delays: at least 10 + 20 + 40 ms slept between attempts.
    assert!(elapsed >= Duration::from_millis(70), "elapsed {elapsed:?}");
}

#[tokio::test]
async fn test_backoff_delays_grow_geometrically() {
    let policy = fast_retry(3);
    assert_eq!(policy.delay_for(0), Duration::from_millis(10));
    assert_eq!(policy.delay_for(1), Duration::from_millis(20));
    assert_eq!(policy.delay_for(2), Duration::from_millis(40));
    // And cap out rather than growing without bound.
    assert_eq!(policy.delay_for(20), Duration::from_millis(200));
}

#[tokio::test]
async fn test_connect_recovers_within_retry_budget() {
    let mock = MockStrategy::new(MockConfig {
        connect_failures: 3,
        retry: fast_retry(3),
        ..Default::default()
    });

    mock.connect().await.unwrap();
    assert_eq!(mock.connect_attempts(), 4);
    assert_eq!(mock.status(), StrategyStatus::Ready);
}

#[tokio::test]
async fn test_readiness_resolves_once_with_stable_result() {
    let mock = MockStrategy::new(MockConfig {
        connect_failures: u32::MAX,
        retry: fast_retry(0),
        ..Default::default()
    });

    let first = mock.ready().await.unwrap_err();
    let again = mock.ready().await.unwrap_err();

    // Same terminal result, no further attempts.
    assert_eq!(mock.connect_attempts(), 1);
    assert_eq!(first.to_string(), again.to_string());
}

// =============================================================================
// Events
// =============================================================================

#[tokio::test]
async fn test_connect_event_fires_on_ready_transition_only() {
    let mock = MockStrategy::new(MockConfig::default());

    let connects = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&connects);
    mock.on(
        LifecycleEvent::Connect,
        Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    );

    mock.connect().await.unwrap();
    mock.connect().await.unwrap();
    assert_eq!(connects.load(Ordering::SeqCst), 1);

    // A listener registered after the transition stays silent: late
    // subscribers poll status() instead.
    let late = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&late);
    mock.on(
        LifecycleEvent::Connect,
        Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    );
    assert_eq!(late.load(Ordering::SeqCst), 0);
    assert_eq!(mock.status(), StrategyStatus::Ready);
}

#[tokio::test]
async fn test_disconnect_event_fires_once() {
    let mock = MockStrategy::new(MockConfig::default());
    mock.connect().await.unwrap();

    let disconnects = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&disconnects);
    mock.on(
        LifecycleEvent::Disconnect,
        Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    );

    mock.disconnect().await.unwrap();
    mock.disconnect().await.unwrap();
    assert_eq!(disconnects.load(Ordering::SeqCst), 1);
    assert_eq!(mock.status(), StrategyStatus::Error);
}

#[tokio::test]
async fn test_multiple_listeners_all_invoked() {
    let mock = MockStrategy::new(MockConfig::default());

    let total = Arc::new(AtomicU32::new(0));
    for _ in 0..3 {
        let counter = Arc::clone(&total);
        mock.on(
            LifecycleEvent::Connect,
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
    }

    mock.connect().await.unwrap();
    assert_eq!(total.load(Ordering::SeqCst), 3);
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_is_computable_in_every_state() {
    let mock = MockStrategy::new(MockConfig {
        connect_failures: u32::MAX,
        retry: fast_retry(0),
        ..Default::default()
    });

    // Connecting: not ok, no panic.
    let report = mock.health_check().await;
    assert!(!report.ok);

    // Terminal error after exhaustion: still not ok, still no panic.
    mock.connect().await.unwrap_err();
    let report = mock.health_check().await;
    assert!(!report.ok);
}

#[cfg(feature = "relational")]
#[tokio::test]
async fn test_health_on_never_connected_relational_strategy() {
    use polystore::storage::{RelationalConfig, RelationalStrategy};

    let strategy = RelationalStrategy::new(RelationalConfig {
        url: "postgres://localhost:1/never".to_string(),
        max_connections: 1,
        retry: fast_retry(0),
    });

    // Never connected: reports not-ok with a measured latency, no error.
    let report = strategy.health_check().await;
    assert!(!report.ok);
    assert!(report.latency_ms <= 10_000);
}

// =============================================================================
// Terminal Disposal
// =============================================================================

#[tokio::test]
async fn test_no_recovery_after_disconnect() {
    let mock = MockStrategy::new(MockConfig::default());
    mock.connect().await.unwrap();
    mock.disconnect().await.unwrap();

    // connect() replays the resolved readiness; the instance stays dead.
    assert_eq!(mock.status(), StrategyStatus::Error);
    let err = mock
        .create("users", polystore::storage::Record::new())
        .await
        .unwrap_err();
    assert!(matches!(err, StrategyError::Disconnected));
}
