//! Retry with exponential backoff and jitter.
//!
//! `RetryPolicy` is the stateless delay calculator; `RetryHandler` drives the
//! attempt loop. Only transient errors are retried; everything else
//! propagates immediately. Each retrying caller sleeps independently.

use crate::error::ServiceError;
use rand::Rng;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;
use tracing::{error, warn};

/// Backoff parameters. Delay for attempt `i` (0-indexed) is
/// `min(base_delay * exponential_base^i, max_delay)`, scaled by a uniform
/// factor in [0.5, 1.0) when jitter is enabled.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            exponential_base: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Backoff delay before retrying after failed attempt `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponential = self.base_delay.as_secs_f64() * self.exponential_base.powi(attempt as i32);
        let capped = exponential.min(self.max_delay.as_secs_f64());

        let scaled = if self.jitter {
            capped * (0.5 + rand::thread_rng().gen::<f64>() * 0.5)
        } else {
            capped
        };

        Duration::from_secs_f64(scaled)
    }
}

/// Observer invoked with the error and the 0-indexed attempt number after
/// each failed attempt.
pub type RetryObserver = Box<dyn Fn(&ServiceError, u32) + Send + Sync>;

/// Drives retries of a fallible async operation.
pub struct RetryHandler {
    policy: RetryPolicy,
    on_retry: Option<RetryObserver>,
}

impl RetryHandler {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            on_retry: None,
        }
    }

    /// Attach an observer called on each failed attempt. Observer panics are
    /// logged and swallowed; they never abort the retry loop.
    pub fn with_observer(mut self, observer: RetryObserver) -> Self {
        self.on_retry = Some(observer);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `op`, retrying transient failures up to `max_retries` times
    /// (`max_retries + 1` total attempts). Exhaustion yields `RetryExhausted`
    /// carrying the last error; non-transient errors propagate unmodified on
    /// the attempt that produced them.
    pub async fn execute<T, F, Fut>(&self, mut op: F) -> Result<T, ServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let mut attempt: u32 = 0;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() => {
                    self.notify_observer(&e, attempt);

                    if attempt >= self.policy.max_retries {
                        return Err(ServiceError::RetryExhausted {
                            attempts: attempt + 1,
                            last: Box::new(e),
                        });
                    }

                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        attempt = attempt + 1,
                        total_attempts = self.policy.max_retries + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "attempt failed, backing off before retry"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn notify_observer(&self, e: &ServiceError, attempt: u32) {
        if let Some(observer) = &self.on_retry {
            if catch_unwind(AssertUnwindSafe(|| observer(e, attempt))).is_err() {
                error!(attempt = attempt, "retry observer panicked; ignoring");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn policy_without_jitter() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            exponential_base: 2.0,
            jitter: false,
        }
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = policy_without_jitter();

        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        // 2^10 seconds would be 1024s; capped at max_delay.
        assert_eq!(policy.delay_for(10), Duration::from_secs(30));
    }

    #[test]
    fn test_jitter_scales_into_half_open_interval() {
        let policy = RetryPolicy {
            jitter: true,
            ..policy_without_jitter()
        };

        for _ in 0..100 {
            let delay = policy.delay_for(2); // 4s before jitter
            assert!(delay >= Duration::from_secs(2));
            assert!(delay < Duration::from_secs(4));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_after_exact_attempt_count() {
        let handler = RetryHandler::new(policy_without_jitter());
        let attempts = Arc::new(AtomicU32::new(0));

        let counter = attempts.clone();
        let err = handler
            .execute(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(ServiceError::external("svc", "boom"))
                }
            })
            .await
            .unwrap_err();

        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        match err {
            ServiceError::RetryExhausted { attempts, last } => {
                assert_eq!(attempts, 4);
                assert!(matches!(*last, ServiceError::External { .. }));
            }
            other => panic!("expected RetryExhausted, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let handler = RetryHandler::new(policy_without_jitter());
        let attempts = Arc::new(AtomicU32::new(0));

        let counter = attempts.clone();
        let value = handler
            .execute(move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(ServiceError::external("svc", "boom"))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_transient_error_is_not_retried() {
        let handler = RetryHandler::new(policy_without_jitter());
        let attempts = Arc::new(AtomicU32::new(0));

        let counter = attempts.clone();
        let err = handler
            .execute(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(ServiceError::CircuitOpen {
                        name: "svc".into(),
                        retry_in: Duration::from_secs(5),
                    })
                }
            })
            .await
            .unwrap_err();

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(matches!(err, ServiceError::CircuitOpen { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_observer_sees_every_failed_attempt() {
        let observed = Arc::new(AtomicU32::new(0));
        let seen = observed.clone();

        let handler = RetryHandler::new(policy_without_jitter()).with_observer(Box::new(
            move |_err, _attempt| {
                seen.fetch_add(1, Ordering::SeqCst);
            },
        ));

        handler
            .execute(|| async { Err::<(), _>(ServiceError::external("svc", "boom")) })
            .await
            .unwrap_err();

        assert_eq!(observed.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_observer_does_not_abort_retries() {
        let handler = RetryHandler::new(policy_without_jitter())
            .with_observer(Box::new(|_err, _attempt| panic!("observer bug")));

        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let err = handler
            .execute(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(ServiceError::external("svc", "boom"))
                }
            })
            .await
            .unwrap_err();

        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        assert!(matches!(err, ServiceError::RetryExhausted { .. }));
    }
}
