//! Triage outcome data structures

use crate::detection::fusion::FraudScoreBreakdown;
use crate::services::InvestigationVerdict;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Final routing decision for a scored transaction.
///
/// `ManualReview` is also the fail-safe fallback whenever the investigation
/// path cannot produce a verdict; the pipeline never fails open into
/// `Approve`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Disposition {
    Approve,
    ManualReview,
    Block,
}

/// Result of scoring and routing one transaction, published downstream and
/// handed to the persistence sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageOutcome {
    /// Unique outcome identifier
    pub outcome_id: String,

    /// Associated order
    pub order_id: String,

    /// User who placed the order
    pub user_id: String,

    /// Score fusion breakdown, including triage
    pub breakdown: FraudScoreBreakdown,

    /// Final disposition
    pub disposition: Disposition,

    /// Investigation verdict, when an escalation completed
    pub investigation: Option<InvestigationVerdict>,

    /// True when the fail-safe fallback replaced an unavailable verdict
    pub fallback_applied: bool,

    /// Outcome generation timestamp
    pub timestamp: DateTime<Utc>,

    /// End-to-end processing time in milliseconds
    pub processing_time_ms: u64,
}

impl TriageOutcome {
    pub fn new(
        order_id: String,
        user_id: String,
        breakdown: FraudScoreBreakdown,
        disposition: Disposition,
    ) -> Self {
        Self {
            outcome_id: uuid::Uuid::new_v4().to_string(),
            order_id,
            user_id,
            breakdown,
            disposition,
            investigation: None,
            fallback_applied: false,
            timestamp: Utc::now(),
            processing_time_ms: 0,
        }
    }

    /// Attach a completed investigation verdict.
    pub fn with_investigation(mut self, verdict: InvestigationVerdict) -> Self {
        self.investigation = Some(verdict);
        self
    }

    /// Mark that the fail-safe fallback was applied.
    pub fn with_fallback(mut self) -> Self {
        self.fallback_applied = true;
        self
    }

    pub fn with_processing_time(mut self, ms: u64) -> Self {
        self.processing_time_ms = ms;
        self
    }
}
