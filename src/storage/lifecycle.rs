//! Connection Lifecycle - Status, Retry, Events
//!
//! `TigerStyle`: One supervisor per strategy instance, explicit observer
//! lists, no hidden replay.
//!
//! States: `connecting → ready` on success; `connecting → connecting` after
//! a failed attempt while retries remain, with exponential backoff between
//! attempts; `connecting → error` once retries are exhausted, re-raising
//! the final transport failure; `ready → error` on `disconnect()`. `Error`
//! is terminal — recovery means a fresh instance from the factory.
//!
//! Backoff delays suspend only the in-flight connect chain of this
//! instance; they never block other instances or callers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::sync::OnceCell;

use crate::constants::{
    STORAGE_RETRY_BACKOFF_FACTOR, STORAGE_RETRY_COUNT_MAX, STORAGE_RETRY_DELAY_MS_BASE,
    STORAGE_RETRY_DELAY_MS_MAX,
};

use super::error::{StrategyError, StrategyResult};
use super::types::{LifecycleEvent, StrategyStatus};

// =============================================================================
// Retry Policy
// =============================================================================

/// Exponential backoff policy for connect attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the initial attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Growth factor applied per failed attempt
    pub multiplier: f64,
    /// Upper bound on any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: STORAGE_RETRY_COUNT_MAX,
            base_delay: Duration::from_millis(STORAGE_RETRY_DELAY_MS_BASE),
            multiplier: STORAGE_RETRY_BACKOFF_FACTOR,
            max_delay: Duration::from_millis(STORAGE_RETRY_DELAY_MS_MAX),
        }
    }
}

impl RetryPolicy {
    /// Policy with a different retry count, defaults otherwise.
    #[must_use]
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Total attempts performed: one initial plus the retries.
    #[must_use]
    pub fn attempts_total(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay slept after the given zero-based failed attempt.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let ms = (self.base_delay.as_millis() as f64) * factor;
        let capped = ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}

// =============================================================================
// Supervisor
// =============================================================================

/// Persistent lifecycle listener.
pub type EventHandler = Arc<dyn Fn(LifecycleEvent) + Send + Sync>;

/// Lifecycle supervisor owned by every concrete strategy.
///
/// Holds the watchable status, the once-resolved readiness result, and the
/// observer lists. Event emission is level-triggered on transitions with no
/// replay: late subscribers read `status()`.
pub struct Supervisor {
    status: RwLock<StrategyStatus>,
    readiness: OnceCell<StrategyResult<()>>,
    connect_handlers: Mutex<Vec<EventHandler>>,
    disconnect_handlers: Mutex<Vec<EventHandler>>,
    disconnected: AtomicBool,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Supervisor {
    /// New supervisor in the `Connecting` state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            status: RwLock::new(StrategyStatus::Connecting),
            readiness: OnceCell::new(),
            connect_handlers: Mutex::new(Vec::new()),
            disconnect_handlers: Mutex::new(Vec::new()),
            disconnected: AtomicBool::new(false),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn status(&self) -> StrategyStatus {
        *self.status.read().expect("status lock poisoned")
    }

    /// Register a listener for the given event.
    pub fn on(&self, event: LifecycleEvent, handler: EventHandler) {
        let handlers = match event {
            LifecycleEvent::Connect => &self.connect_handlers,
            LifecycleEvent::Disconnect => &self.disconnect_handlers,
        };
        handlers.lock().expect("handlers poisoned").push(handler);
    }

    /// Guard for CRUD operations: the instance must be ready and not
    /// disposed.
    pub fn require_ready(&self) -> StrategyResult<()> {
        if self.disconnected.load(Ordering::Acquire) {
            return Err(StrategyError::Disconnected);
        }
        match self.status() {
            StrategyStatus::Ready => Ok(()),
            StrategyStatus::Connecting | StrategyStatus::Error => Err(StrategyError::NotConnected),
        }
    }

    /// Whether `disconnect()` already ran.
    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::Acquire)
    }

    /// Drive the connect-with-retry chain, resolving readiness exactly once.
    ///
    /// The first caller performs `1 + max_retries` attempts with geometric
    /// backoff; concurrent and later callers observe the same result.
    pub async fn ready<F, Fut>(
        &self,
        engine: &str,
        policy: &RetryPolicy,
        attempt_op: F,
    ) -> StrategyResult<()>
    where
        F: FnMut(u32) -> Fut,
        Fut: std::future::Future<Output = StrategyResult<()>>,
    {
        let result = self
            .readiness
            .get_or_init(|| self.connect_with_retry(engine, policy, attempt_op))
            .await;
        result.clone()
    }

    async fn connect_with_retry<F, Fut>(
        &self,
        engine: &str,
        policy: &RetryPolicy,
        mut attempt_op: F,
    ) -> StrategyResult<()>
    where
        F: FnMut(u32) -> Fut,
        Fut: std::future::Future<Output = StrategyResult<()>>,
    {
        let total = policy.attempts_total();
        let mut last_error = StrategyError::NotConnected;

        for attempt in 0..total {
            match attempt_op(attempt).await {
                Ok(()) => {
                    tracing::debug!(engine, attempt, "backend connection established");
                    self.transition(StrategyStatus::Ready);
                    return Ok(());
                }
                Err(error) => {
                    tracing::warn!(engine, attempt, %error, "connect attempt failed");
                    last_error = error;
                    if attempt + 1 < total {
                        tokio::time::sleep(policy.delay_for(attempt)).await;
                    }
                }
            }
        }

        let exhausted = StrategyError::connection_exhausted(total, last_error.to_string());
        tracing::warn!(engine, attempts = total, "connection retries exhausted");
        self.transition(StrategyStatus::Error);
        Err(exhausted)
    }

    /// Mark the instance disposed. Returns true on the first call only.
    ///
    /// Transitions to `Error` and emits `Disconnect` exactly once.
    pub fn mark_disconnected(&self) -> bool {
        let first = !self.disconnected.swap(true, Ordering::AcqRel);
        if first {
            self.transition(StrategyStatus::Error);
        }
        first
    }

    fn transition(&self, next: StrategyStatus) {
        let previous = {
            let mut status = self.status.write().expect("status lock poisoned");
            let previous = *status;
            *status = next;
            previous
        };
        if previous == next {
            return;
        }
        match next {
            StrategyStatus::Ready => self.emit(LifecycleEvent::Connect),
            StrategyStatus::Error => self.emit(LifecycleEvent::Disconnect),
            StrategyStatus::Connecting => {}
        }
    }

    fn emit(&self, event: LifecycleEvent) {
        // Snapshot under the lock, invoke outside it, so a handler may
        // re-subscribe without deadlocking.
        let handlers = match event {
            LifecycleEvent::Connect => &self.connect_handlers,
            LifecycleEvent::Disconnect => &self.disconnect_handlers,
        };
        let snapshot: Vec<EventHandler> = handlers.lock().expect("handlers poisoned").clone();
        for handler in snapshot {
            handler(event);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
            multiplier: 2.0,
            max_delay: Duration::from_millis(10),
        }
    }

    #[test]
    fn test_backoff_grows_geometrically() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        // Capped at the maximum
        assert_eq!(policy.delay_for(10), Duration::from_millis(5000));
    }

    #[tokio::test]
    async fn test_exhaustion_performs_exact_attempt_count() {
        let supervisor = Supervisor::new();
        let attempts = AtomicU32::new(0);

        let result = supervisor
            .ready("mock", &fast_policy(3), |_| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(StrategyError::fault("refused")) }
            })
            .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        assert!(matches!(
            result,
            Err(StrategyError::ConnectionExhausted { attempts: 4, .. })
        ));
        assert_eq!(supervisor.status(), StrategyStatus::Error);
    }

    #[tokio::test]
    async fn test_ready_resolves_once_and_repeats_result() {
        let supervisor = Supervisor::new();
        let attempts = AtomicU32::new(0);

        for _ in 0..3 {
            let result = supervisor
                .ready("mock", &fast_policy(0), |_| {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    async { Ok(()) }
                })
                .await;
            assert!(result.is_ok());
        }

        // Only the first await drove the connect chain.
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(supervisor.status(), StrategyStatus::Ready);
    }

    #[tokio::test]
    async fn test_events_fire_on_transitions_without_replay() {
        let supervisor = Supervisor::new();
        let connects = Arc::new(AtomicU32::new(0));
        let disconnects = Arc::new(AtomicU32::new(0));

        let c = Arc::clone(&connects);
        supervisor.on(
            LifecycleEvent::Connect,
            Arc::new(move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        );
        let d = Arc::clone(&disconnects);
        supervisor.on(
            LifecycleEvent::Disconnect,
            Arc::new(move |_| {
                d.fetch_add(1, Ordering::SeqCst);
            }),
        );

        supervisor
            .ready("mock", &fast_policy(0), |_| async { Ok(()) })
            .await
            .unwrap();
        assert_eq!(connects.load(Ordering::SeqCst), 1);

        // Late subscriber: no replay of the connect transition.
        let late = Arc::new(AtomicU32::new(0));
        let l = Arc::clone(&late);
        supervisor.on(
            LifecycleEvent::Connect,
            Arc::new(move |_| {
                l.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert_eq!(late.load(Ordering::SeqCst), 0);

        // Disconnect emits once, even when called twice.
        assert!(supervisor.mark_disconnected());
        assert!(!supervisor.mark_disconnected());
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_require_ready_guards() {
        let supervisor = Supervisor::new();
        assert!(matches!(
            supervisor.require_ready(),
            Err(StrategyError::NotConnected)
        ));

        supervisor
            .ready("mock", &fast_policy(0), |_| async { Ok(()) })
            .await
            .unwrap();
        assert!(supervisor.require_ready().is_ok());

        supervisor.mark_disconnected();
        assert!(matches!(
            supervisor.require_ready(),
            Err(StrategyError::Disconnected)
        ));
    }
}
