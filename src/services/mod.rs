//! External collaborator boundaries.
//!
//! The scoring core only ever sees these traits; concrete backends are
//! injected into the orchestrator. Reputation and similarity lookups are
//! optional and the pipeline degrades to zero boost without them.

pub mod audit;
pub mod investigation;

use crate::detection::fusion::FraudScoreBreakdown;
use crate::detection::velocity::VelocityVerdict;
use crate::error::ServiceError;
use crate::types::outcome::{Disposition, TriageOutcome};
use crate::types::transaction::Transaction;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use audit::NatsAuditSink;
pub use investigation::NatsInvestigationClient;

/// Reputation lookup result; `boost` feeds score fusion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReputationSignal {
    pub is_flagged: bool,
    pub reason: Option<String>,
    pub boost: f64,
}

/// A historic fraud case similar to the current transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarCase {
    pub fraud_type: String,
    pub similarity_score: f64,
}

/// Supporting evidence handed to the investigation collaborator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvestigationContext {
    pub velocity: Option<VelocityVerdict>,
    pub reputation: Option<ReputationSignal>,
    pub similar_cases: Vec<SimilarCase>,
}

/// Verdict returned by the investigation collaborator; replaces the
/// escalation as the final disposition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestigationVerdict {
    pub decision: Disposition,
    pub confidence: f64,
    pub reasoning: String,
}

/// Deep investigation of an escalated transaction. Invoked only when triage
/// is Escalate, through the circuit breaker, retry handler, and rate limiter.
#[async_trait]
pub trait InvestigationService: Send + Sync {
    async fn investigate(
        &self,
        transaction: &Transaction,
        breakdown: &FraudScoreBreakdown,
        context: &InvestigationContext,
    ) -> Result<InvestigationVerdict, ServiceError>;
}

/// Key/value reputation store for users and IP addresses.
#[async_trait]
pub trait ReputationService: Send + Sync {
    async fn lookup(
        &self,
        user_id: &str,
        ip_address: Option<&str>,
    ) -> Result<ReputationSignal, ServiceError>;
}

/// Vector-similarity search over known fraud cases.
#[async_trait]
pub trait SimilarityService: Send + Sync {
    async fn find_similar(
        &self,
        transaction: &Transaction,
        limit: usize,
        threshold: f64,
    ) -> Result<Vec<SimilarCase>, ServiceError>;
}

/// Fire-and-forget persistence of scored outcomes. Failures never affect the
/// disposition already computed.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn record(&self, outcome: &TriageOutcome) -> Result<(), ServiceError>;
}
