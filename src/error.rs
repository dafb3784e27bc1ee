//! Error taxonomy for the fraud triage pipeline.
//!
//! `ValidationError` rejects malformed transactions before they reach the
//! scoring core. `ServiceError` covers the guarded downstream path; its
//! `is_transient` classification drives retry and circuit-breaker accounting.

use std::time::Duration;
use thiserror::Error;

/// A transaction failed ingestion validation. Never retried.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("order_id must be non-empty")]
    EmptyOrderId,

    #[error("user_id must be non-empty")]
    EmptyUserId,

    #[error("amount must be positive, got {0}")]
    NonPositiveAmount(f64),

    #[error("amount {0} exceeds the maximum of {max}", max = crate::types::transaction::MAX_AMOUNT)]
    AmountTooLarge(f64),

    #[error("avg_order_value must be non-negative, got {0}")]
    NegativeAvgOrderValue(f64),
}

/// Failure on the guarded downstream path.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The breaker is open; the call was rejected without invoking the
    /// downstream. Not retried, not counted as a new breaker failure.
    #[error("circuit breaker '{name}' is open, recovery in {retry_in:?}")]
    CircuitOpen { name: String, retry_in: Duration },

    /// Transient downstream failure, retryable up to policy limits.
    #[error("{service}: {message}")]
    External { service: String, message: String },

    /// The investigation call exceeded its deadline. Counted as a breaker
    /// failure and retried like any other transient error.
    #[error("investigation timed out after {0:?}")]
    InvestigationTimeout(Duration),

    /// All retry attempts failed. Terminal; surfaced to the orchestrator.
    #[error("gave up after {attempts} attempts: {last}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        last: Box<ServiceError>,
    },
}

impl ServiceError {
    /// Create an `External` error for a named downstream service.
    pub fn external(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::External {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Whether this failure class is retryable and counts against a breaker.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ServiceError::External { .. } | ServiceError::InvestigationTimeout(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(ServiceError::external("svc", "boom").is_transient());
        assert!(ServiceError::InvestigationTimeout(Duration::from_secs(90)).is_transient());

        let open = ServiceError::CircuitOpen {
            name: "svc".into(),
            retry_in: Duration::from_secs(10),
        };
        assert!(!open.is_transient());

        let exhausted = ServiceError::RetryExhausted {
            attempts: 4,
            last: Box::new(ServiceError::external("svc", "boom")),
        };
        assert!(!exhausted.is_transient());
    }
}
