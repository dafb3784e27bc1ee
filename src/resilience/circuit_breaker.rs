//! Circuit breaker for unreliable downstream services.
//!
//! One breaker per named dependency, created lazily through the registry so
//! independent downstreams fail in isolation. All state lives under a single
//! mutex per breaker; the guarded call itself runs without the lock.

use crate::error::ServiceError;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Breaker state machine. Closed is normal operation; Open fails fast;
/// HalfOpen probes whether the downstream recovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakerState::Closed => write!(f, "closed"),
            BreakerState::Open => write!(f, "open"),
            BreakerState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Breaker thresholds.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,
    /// How long the circuit stays open before a half-open probe is allowed
    pub recovery_timeout: Duration,
    /// Consecutive half-open successes needed to close the circuit
    pub success_threshold: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 2,
        }
    }
}

/// Counters exposed for observability.
#[derive(Debug, Clone, Default)]
pub struct BreakerStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub consecutive_failures: u32,
    pub times_opened: u64,
}

/// Point-in-time view of one breaker.
#[derive(Debug, Clone)]
pub struct BreakerSnapshot {
    pub state: BreakerState,
    pub stats: BreakerStats,
}

struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    last_failure_at: Option<Instant>,
    stats: BreakerStats,
}

/// Failure-isolation guard for one named downstream dependency.
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    /// Which errors count against the breaker; others pass through uncounted.
    counts_failure: fn(&ServiceError) -> bool,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: &str, config: BreakerConfig) -> Self {
        Self::with_failure_predicate(name, config, ServiceError::is_transient)
    }

    pub fn with_failure_predicate(
        name: &str,
        config: BreakerConfig,
        counts_failure: fn(&ServiceError) -> bool,
    ) -> Self {
        debug!(
            breaker = %name,
            failure_threshold = config.failure_threshold,
            recovery_timeout_secs = config.recovery_timeout.as_secs(),
            "circuit breaker initialized"
        );
        Self {
            name: name.to_string(),
            config,
            counts_failure,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                last_failure_at: None,
                stats: BreakerStats::default(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().unwrap().state
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock().unwrap();
        BreakerSnapshot {
            state: inner.state,
            stats: inner.stats.clone(),
        }
    }

    /// Run `op` under breaker protection.
    ///
    /// While open and within the recovery timeout, fails fast with
    /// `CircuitOpen` without invoking `op`. The open-to-half-open transition
    /// is evaluated lazily here, at call time. The guarded future runs
    /// without holding the breaker lock.
    pub async fn call<T, F, Fut>(&self, op: F) -> Result<T, ServiceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        self.before_call()?;

        match op().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(e) => {
                if (self.counts_failure)(&e) {
                    self.on_failure();
                }
                Err(e)
            }
        }
    }

    fn before_call(&self) -> Result<(), ServiceError> {
        let mut inner = self.inner.lock().unwrap();
        inner.stats.total_requests += 1;

        if inner.state == BreakerState::Open {
            let elapsed = inner
                .last_failure_at
                .map(|at| Instant::now().duration_since(at))
                .unwrap_or(self.config.recovery_timeout);

            if elapsed >= self.config.recovery_timeout {
                inner.state = BreakerState::HalfOpen;
                inner.consecutive_successes = 0;
                info!(breaker = %self.name, "circuit breaker half-open, probing downstream");
            } else {
                let retry_in = self.config.recovery_timeout - elapsed;
                return Err(ServiceError::CircuitOpen {
                    name: self.name.clone(),
                    retry_in,
                });
            }
        }

        Ok(())
    }

    fn on_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.stats.successful_requests += 1;
        inner.consecutive_failures = 0;
        inner.stats.consecutive_failures = 0;
        inner.consecutive_successes += 1;

        if inner.state == BreakerState::HalfOpen
            && inner.consecutive_successes >= self.config.success_threshold
        {
            inner.state = BreakerState::Closed;
            inner.consecutive_successes = 0;
            info!(breaker = %self.name, "circuit breaker closed, downstream recovered");
        }
    }

    fn on_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.stats.failed_requests += 1;
        inner.consecutive_failures += 1;
        inner.stats.consecutive_failures = inner.consecutive_failures;
        inner.consecutive_successes = 0;
        inner.last_failure_at = Some(Instant::now());

        match inner.state {
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.stats.times_opened += 1;
                warn!(breaker = %self.name, "circuit breaker reopened, downstream still failing");
            }
            BreakerState::Closed
                if inner.consecutive_failures >= self.config.failure_threshold =>
            {
                inner.state = BreakerState::Open;
                inner.stats.times_opened += 1;
                error!(
                    breaker = %self.name,
                    consecutive_failures = inner.consecutive_failures,
                    "circuit breaker opened"
                );
            }
            _ => {}
        }
    }

    /// Force the breaker back to closed.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.stats.consecutive_failures = 0;
        inner.consecutive_successes = 0;
        info!(breaker = %self.name, "circuit breaker manually reset");
    }
}

/// Process-wide registry of named breakers, one per downstream dependency.
pub struct BreakerRegistry {
    defaults: BreakerConfig,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new(defaults: BreakerConfig) -> Self {
        Self {
            defaults,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    /// Get the breaker for `name`, creating it lazily with the registry's
    /// default thresholds.
    pub fn get(&self, name: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().unwrap();
        breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(name, self.defaults.clone())))
            .clone()
    }

    /// Snapshot every registered breaker, keyed by dependency name.
    pub fn snapshot(&self) -> HashMap<String, BreakerSnapshot> {
        let breakers = self.breakers.lock().unwrap();
        breakers
            .iter()
            .map(|(name, breaker)| (name.clone(), breaker.snapshot()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn config() -> BreakerConfig {
        BreakerConfig {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 2,
        }
    }

    async fn fail(breaker: &CircuitBreaker) -> Result<(), ServiceError> {
        breaker
            .call(|| async { Err::<(), _>(ServiceError::external("svc", "boom")) })
            .await
    }

    async fn succeed(breaker: &CircuitBreaker) -> Result<(), ServiceError> {
        breaker.call(|| async { Ok(()) }).await
    }

    #[tokio::test]
    async fn test_opens_after_exact_failure_threshold() {
        let breaker = CircuitBreaker::new("svc", config());

        fail(&breaker).await.unwrap_err();
        fail(&breaker).await.unwrap_err();
        assert_eq!(breaker.state(), BreakerState::Closed);

        fail(&breaker).await.unwrap_err();
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[tokio::test]
    async fn test_success_resets_consecutive_failures() {
        let breaker = CircuitBreaker::new("svc", config());

        fail(&breaker).await.unwrap_err();
        fail(&breaker).await.unwrap_err();
        succeed(&breaker).await.unwrap();
        fail(&breaker).await.unwrap_err();
        fail(&breaker).await.unwrap_err();

        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_fails_fast_without_invoking_op() {
        let breaker = CircuitBreaker::new("svc", config());
        for _ in 0..3 {
            fail(&breaker).await.unwrap_err();
        }

        let invocations = AtomicU32::new(0);
        let err = breaker
            .call(|| {
                invocations.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await
            .unwrap_err();

        assert_eq!(invocations.load(Ordering::SeqCst), 0);
        match err {
            ServiceError::CircuitOpen { name, retry_in } => {
                assert_eq!(name, "svc");
                assert!(retry_in <= Duration::from_secs(60));
                assert!(retry_in > Duration::ZERO);
            }
            other => panic!("expected CircuitOpen, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_cycle_closes_after_success_threshold() {
        let breaker = CircuitBreaker::new("svc", config());
        for _ in 0..3 {
            fail(&breaker).await.unwrap_err();
        }
        assert_eq!(breaker.state(), BreakerState::Open);

        tokio::time::advance(Duration::from_secs(61)).await;

        // First call after the timeout transitions to half-open and probes.
        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.state(), BreakerState::HalfOpen);

        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens() {
        let breaker = CircuitBreaker::new("svc", config());
        for _ in 0..3 {
            fail(&breaker).await.unwrap_err();
        }

        tokio::time::advance(Duration::from_secs(61)).await;

        fail(&breaker).await.unwrap_err();
        assert_eq!(breaker.state(), BreakerState::Open);

        // And the fresh failure restarts the recovery clock.
        let err = succeed(&breaker).await.unwrap_err();
        assert!(matches!(err, ServiceError::CircuitOpen { .. }));
    }

    #[tokio::test]
    async fn test_non_transient_errors_do_not_count() {
        let breaker = CircuitBreaker::new("svc", config());

        for _ in 0..10 {
            let err = breaker
                .call(|| async {
                    Err::<(), _>(ServiceError::CircuitOpen {
                        name: "other".into(),
                        retry_in: Duration::from_secs(1),
                    })
                })
                .await
                .unwrap_err();
            assert!(!err.is_transient());
        }

        assert_eq!(breaker.state(), BreakerState::Closed);
        assert_eq!(breaker.snapshot().stats.failed_requests, 0);
    }

    #[tokio::test]
    async fn test_registry_isolates_dependencies() {
        let registry = BreakerRegistry::new(config());

        let investigation = registry.get("investigation-service");
        let reputation = registry.get("reputation-store");

        for _ in 0..3 {
            fail(&investigation).await.unwrap_err();
        }

        assert_eq!(investigation.state(), BreakerState::Open);
        assert_eq!(reputation.state(), BreakerState::Closed);
        succeed(&reputation).await.unwrap();

        // Same name returns the same instance.
        assert_eq!(
            registry.get("investigation-service").state(),
            BreakerState::Open
        );
        assert_eq!(registry.snapshot().len(), 2);
    }
}
