//! Resilience primitives guarding calls into unreliable downstream services

pub mod circuit_breaker;
pub mod rate_limiter;
pub mod retry;

pub use circuit_breaker::{BreakerConfig, BreakerRegistry, BreakerState, CircuitBreaker};
pub use rate_limiter::{RateLimitConfig, RateLimiter};
pub use retry::{RetryHandler, RetryPolicy};
