//! Composition root: scores one transaction end to end.
//!
//! Per transaction: validate, reputation lookup, velocity check, base model
//! score, similarity lookup, score fusion, then (for escalations only) the
//! guarded investigation call. Every downstream sits behind its own circuit
//! breaker; the investigation path additionally goes through the retry
//! handler and the rate limiter. Whenever the investigation path cannot
//! produce a verdict, the disposition falls back to manual review.

use crate::config::AppConfig;
use crate::detection::fusion::{FraudScoreBreakdown, ScoreFusionEngine, Triage, SIMILARITY_CASE_WEIGHT};
use crate::detection::scorer::{HeuristicScorer, RiskScorer};
use crate::detection::velocity::VelocityDetector;
use crate::error::{ServiceError, ValidationError};
use crate::metrics::PipelineMetrics;
use crate::resilience::circuit_breaker::BreakerRegistry;
use crate::resilience::rate_limiter::RateLimiter;
use crate::resilience::retry::RetryHandler;
use crate::services::{
    InvestigationContext, InvestigationService, PersistenceSink, ReputationService,
    ReputationSignal, SimilarCase, SimilarityService,
};
use crate::types::outcome::{Disposition, TriageOutcome};
use crate::types::transaction::Transaction;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Breaker names, one per downstream dependency.
const INVESTIGATION_BREAKER: &str = "investigation-service";
const REPUTATION_BREAKER: &str = "reputation-store";
const SIMILARITY_BREAKER: &str = "similarity-index";

/// How many similar fraud cases to retrieve per transaction.
const SIMILAR_CASES_LIMIT: usize = 3;
/// Minimum similarity score for a retrieved case to count.
const SIMILARITY_THRESHOLD: f64 = 0.75;

/// Drives the full scoring path for each transaction.
///
/// Collaborators are injected; reputation, similarity, investigation, and
/// persistence are all optional and the pipeline degrades without them.
pub struct Orchestrator {
    velocity: VelocityDetector,
    fusion: ScoreFusionEngine,
    scorer: Box<dyn RiskScorer>,
    breakers: BreakerRegistry,
    retry: RetryHandler,
    limiter: RateLimiter,
    investigation_timeout: Duration,
    investigation: Option<Arc<dyn InvestigationService>>,
    reputation: Option<Arc<dyn ReputationService>>,
    similarity: Option<Arc<dyn SimilarityService>>,
    persistence: Option<Arc<dyn PersistenceSink>>,
    metrics: Arc<PipelineMetrics>,
}

impl Orchestrator {
    pub fn new(config: &AppConfig, metrics: Arc<PipelineMetrics>) -> Self {
        Self {
            velocity: VelocityDetector::new(config.detection.velocity.to_config()),
            fusion: ScoreFusionEngine::new(config.detection.fusion()),
            scorer: Box::new(HeuristicScorer::new()),
            breakers: BreakerRegistry::new(config.resilience.circuit_breaker.to_config()),
            retry: RetryHandler::new(config.resilience.retry.to_policy()),
            limiter: RateLimiter::new(config.resilience.rate_limit.to_config()),
            investigation_timeout: Duration::from_secs(config.resilience.investigation_timeout_secs),
            investigation: None,
            reputation: None,
            similarity: None,
            persistence: None,
            metrics,
        }
    }

    /// Replace the baseline scorer with a trained model.
    pub fn with_scorer(mut self, scorer: Box<dyn RiskScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn with_investigation(mut self, service: Arc<dyn InvestigationService>) -> Self {
        self.investigation = Some(service);
        self
    }

    pub fn with_reputation(mut self, service: Arc<dyn ReputationService>) -> Self {
        self.reputation = Some(service);
        self
    }

    pub fn with_similarity(mut self, service: Arc<dyn SimilarityService>) -> Self {
        self.similarity = Some(service);
        self
    }

    pub fn with_persistence(mut self, sink: Arc<dyn PersistenceSink>) -> Self {
        self.persistence = Some(sink);
        self
    }

    pub fn breakers(&self) -> &BreakerRegistry {
        &self.breakers
    }

    pub fn velocity(&self) -> &VelocityDetector {
        &self.velocity
    }

    /// Score one transaction and resolve its final disposition.
    ///
    /// Rejects malformed transactions before any state is touched. Never
    /// fails for a valid transaction: downstream trouble degrades the
    /// signals or triggers the manual-review fallback instead.
    pub async fn process(&self, transaction: &Transaction) -> Result<TriageOutcome, ValidationError> {
        let started = Instant::now();

        if let Err(e) = transaction.validate() {
            self.metrics.record_validation_failure();
            warn!(order_id = %transaction.order_id, error = %e, "transaction rejected");
            return Err(e);
        }

        let reputation = self.reputation_signal(transaction).await;
        let reputation_boost = reputation.as_ref().map_or(0.0, |s| s.boost);

        let verdict = self
            .velocity
            .check(&transaction.user_id, transaction.amount, Instant::now());
        if let Some(pattern) = verdict.pattern {
            self.metrics.record_pattern(pattern);
        }

        let ml_score = self.scorer.score(transaction);

        let similar_cases = self.similar_cases(transaction).await;
        let similarity_boost: f64 = similar_cases
            .iter()
            .map(|c| c.similarity_score * SIMILARITY_CASE_WEIGHT)
            .sum();

        let breakdown = self.fusion.fuse(
            ml_score,
            verdict.score_boost,
            reputation_boost,
            similarity_boost,
        );

        debug!(
            order_id = %transaction.order_id,
            final_score = breakdown.final_score,
            triage = ?breakdown.triage,
            ml_score = breakdown.ml_score,
            velocity_boost = breakdown.velocity_boost,
            reputation_boost = breakdown.reputation_boost,
            similarity_boost = breakdown.similarity_boost,
            "transaction scored"
        );

        let mut outcome = match breakdown.triage {
            Triage::Approve => TriageOutcome::new(
                transaction.order_id.clone(),
                transaction.user_id.clone(),
                breakdown,
                Disposition::Approve,
            ),
            Triage::ManualReview => TriageOutcome::new(
                transaction.order_id.clone(),
                transaction.user_id.clone(),
                breakdown,
                Disposition::ManualReview,
            ),
            Triage::Escalate => {
                let context = InvestigationContext {
                    velocity: Some(verdict.clone()),
                    reputation,
                    similar_cases,
                };
                self.resolve_escalation(transaction, breakdown, context).await
            }
        };

        outcome = outcome.with_processing_time(started.elapsed().as_millis() as u64);
        self.metrics
            .record_transaction(started.elapsed(), outcome.breakdown.final_score);
        self.metrics.record_disposition(outcome.disposition);

        self.persist(&outcome);

        Ok(outcome)
    }

    /// Resolve an escalation through the guarded investigation path.
    ///
    /// The verdict replaces the escalation as the final disposition. If no
    /// collaborator is configured, the breaker is open, retries are
    /// exhausted, or the call times out, the disposition is manual review
    /// with the fallback flag set. Never approve on failure.
    async fn resolve_escalation(
        &self,
        transaction: &Transaction,
        breakdown: FraudScoreBreakdown,
        context: InvestigationContext,
    ) -> TriageOutcome {
        let base = TriageOutcome::new(
            transaction.order_id.clone(),
            transaction.user_id.clone(),
            breakdown,
            Disposition::ManualReview,
        );

        let Some(service) = &self.investigation else {
            warn!(
                order_id = %transaction.order_id,
                "no investigation collaborator configured, falling back to manual review"
            );
            self.metrics.record_fallback();
            return base.with_fallback();
        };

        self.metrics.record_investigation();
        let breaker = self.breakers.get(INVESTIGATION_BREAKER);
        let breakdown = &base.breakdown;
        let context = &context;

        let result = self
            .retry
            .execute(|| {
                let breaker = breaker.clone();
                let service = service.clone();
                async move {
                    self.limiter.acquire().await;
                    breaker
                        .call(|| async move {
                            match tokio::time::timeout(
                                self.investigation_timeout,
                                service.investigate(transaction, breakdown, context),
                            )
                            .await
                            {
                                Ok(result) => result,
                                Err(_) => Err(ServiceError::InvestigationTimeout(
                                    self.investigation_timeout,
                                )),
                            }
                        })
                        .await
                }
            })
            .await;

        match result {
            Ok(verdict) => {
                info!(
                    order_id = %transaction.order_id,
                    decision = ?verdict.decision,
                    confidence = verdict.confidence,
                    "escalation resolved by investigation"
                );
                let decision = verdict.decision;
                let mut outcome = base.with_investigation(verdict);
                outcome.disposition = decision;
                outcome
            }
            Err(e) => {
                warn!(
                    order_id = %transaction.order_id,
                    error = %e,
                    "investigation unavailable, falling back to manual review"
                );
                self.metrics.record_fallback();
                base.with_fallback()
            }
        }
    }

    /// Reputation lookup behind its own breaker; degrades to no signal.
    async fn reputation_signal(&self, transaction: &Transaction) -> Option<ReputationSignal> {
        let service = self.reputation.as_ref()?;
        let breaker = self.breakers.get(REPUTATION_BREAKER);

        let result = breaker
            .call(|| service.lookup(&transaction.user_id, transaction.ip_address.as_deref()))
            .await;

        match result {
            Ok(signal) => {
                if signal.is_flagged {
                    warn!(
                        user_id = %transaction.user_id,
                        reason = signal.reason.as_deref().unwrap_or("unspecified"),
                        boost = signal.boost,
                        "reputation store flagged user"
                    );
                }
                Some(signal)
            }
            Err(e) => {
                warn!(user_id = %transaction.user_id, error = %e, "reputation lookup failed");
                None
            }
        }
    }

    /// Similar-case lookup behind its own breaker; degrades to no cases.
    async fn similar_cases(&self, transaction: &Transaction) -> Vec<SimilarCase> {
        let Some(service) = &self.similarity else {
            return Vec::new();
        };
        let breaker = self.breakers.get(SIMILARITY_BREAKER);

        let result = breaker
            .call(|| service.find_similar(transaction, SIMILAR_CASES_LIMIT, SIMILARITY_THRESHOLD))
            .await;

        match result {
            Ok(cases) => cases,
            Err(e) => {
                warn!(order_id = %transaction.order_id, error = %e, "similarity lookup failed");
                Vec::new()
            }
        }
    }

    /// Fire-and-forget persistence; failures never touch the disposition.
    fn persist(&self, outcome: &TriageOutcome) {
        let Some(sink) = &self.persistence else {
            return;
        };
        let sink = sink.clone();
        let outcome = outcome.clone();
        tokio::spawn(async move {
            if let Err(e) = sink.record(&outcome).await {
                warn!(outcome_id = %outcome.outcome_id, error = %e, "failed to persist outcome");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::resilience::circuit_breaker::BreakerState;
    use crate::services::InvestigationVerdict;
    use crate::types::transaction::PaymentMethod;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Scorer returning a fixed base score.
    struct FixedScorer(f64);

    impl RiskScorer for FixedScorer {
        fn score(&self, _tx: &Transaction) -> f64 {
            self.0
        }
    }

    enum MockBehavior {
        Verdict(Disposition),
        Fail,
        Hang,
    }

    struct MockInvestigation {
        behavior: MockBehavior,
        calls: AtomicU32,
    }

    impl MockInvestigation {
        fn new(behavior: MockBehavior) -> Arc<Self> {
            Arc::new(Self {
                behavior,
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl InvestigationService for MockInvestigation {
        async fn investigate(
            &self,
            _transaction: &Transaction,
            _breakdown: &FraudScoreBreakdown,
            _context: &InvestigationContext,
        ) -> Result<InvestigationVerdict, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behavior {
                MockBehavior::Verdict(decision) => Ok(InvestigationVerdict {
                    decision: *decision,
                    confidence: 0.95,
                    reasoning: "mock verdict".into(),
                }),
                MockBehavior::Fail => Err(ServiceError::external("investigation", "unreachable")),
                MockBehavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    unreachable!("hung investigation should have timed out")
                }
            }
        }
    }

    struct MockReputation {
        boost: f64,
    }

    #[async_trait]
    impl ReputationService for MockReputation {
        async fn lookup(
            &self,
            _user_id: &str,
            _ip: Option<&str>,
        ) -> Result<ReputationSignal, ServiceError> {
            Ok(ReputationSignal {
                is_flagged: self.boost > 0.0,
                reason: Some("known bad actor".into()),
                boost: self.boost,
            })
        }
    }

    struct FailingSink {
        attempts: Arc<AtomicU32>,
    }

    #[async_trait]
    impl PersistenceSink for FailingSink {
        async fn record(&self, _outcome: &TriageOutcome) -> Result<(), ServiceError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(ServiceError::external("audit-sink", "disk full"))
        }
    }

    struct RecordingSink {
        recorded: Mutex<Vec<TriageOutcome>>,
    }

    #[async_trait]
    impl PersistenceSink for RecordingSink {
        async fn record(&self, outcome: &TriageOutcome) -> Result<(), ServiceError> {
            self.recorded.lock().unwrap().push(outcome.clone());
            Ok(())
        }
    }

    fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        // Keep escalation tests fast under the paused clock.
        config.resilience.retry.jitter = false;
        config.resilience.rate_limit.min_delay_seconds = 0.0;
        config
    }

    fn orchestrator(config: &AppConfig, ml_score: f64) -> Orchestrator {
        Orchestrator::new(config, Arc::new(PipelineMetrics::new()))
            .with_scorer(Box::new(FixedScorer(ml_score)))
    }

    fn tx(order_id: &str, user_id: &str, amount: f64) -> Transaction {
        Transaction::new(order_id, user_id, amount, PaymentMethod::CreditCard)
    }

    #[tokio::test(start_paused = true)]
    async fn test_card_testing_burst_goes_to_manual_review() {
        // U1: three $1 orders 10s apart with a low base score.
        let config = test_config();
        let orch = orchestrator(&config, 0.1);

        let first = orch.process(&tx("ord_1", "U1", 1.0)).await.unwrap();
        assert_eq!(first.disposition, Disposition::Approve);

        tokio::time::advance(Duration::from_secs(10)).await;
        let second = orch.process(&tx("ord_2", "U1", 1.0)).await.unwrap();
        assert_eq!(second.disposition, Disposition::Approve);

        tokio::time::advance(Duration::from_secs(10)).await;
        let third = orch.process(&tx("ord_3", "U1", 1.0)).await.unwrap();

        // 0.1 + 0.5 = 0.6: at least review_threshold, below block_threshold.
        assert_eq!(third.breakdown.velocity_boost, 0.5);
        assert!((third.breakdown.final_score - 0.6).abs() < 1e-9);
        assert_eq!(third.disposition, Disposition::ManualReview);
        assert!(!third.fallback_applied);
    }

    #[tokio::test(start_paused = true)]
    async fn test_escalation_falls_back_when_breaker_is_open() {
        // U2: two orders 50ms apart escalate; the investigation service is
        // down, so once the breaker opens the fallback must be manual
        // review, never approve or block.
        let mut config = test_config();
        // The retries of a single escalation are enough to open the breaker.
        config.resilience.circuit_breaker.failure_threshold = 4;
        let investigation = MockInvestigation::new(MockBehavior::Fail);
        let orch = orchestrator(&config, 0.5).with_investigation(investigation.clone());

        orch.process(&tx("ord_1", "U2", 100.0)).await.unwrap();
        tokio::time::advance(Duration::from_millis(50)).await;
        let outcome = orch.process(&tx("ord_2", "U2", 100.0)).await.unwrap();

        assert_eq!(outcome.breakdown.velocity_boost, 0.4);
        assert!((outcome.breakdown.final_score - 0.9).abs() < 1e-9);
        assert_eq!(outcome.breakdown.triage, Triage::Escalate);
        assert_eq!(outcome.disposition, Disposition::ManualReview);
        assert!(outcome.fallback_applied);

        // Retries exhausted against a failing downstream: 4 attempts, and
        // the 4th consecutive failure opened the breaker.
        assert_eq!(investigation.calls.load(Ordering::SeqCst), 4);
        assert_eq!(
            orch.breakers().get(INVESTIGATION_BREAKER).state(),
            BreakerState::Open
        );

        // The retry backoff advanced the clock well past the velocity
        // threshold, so a fresh rapid pair is needed to escalate again.
        // While the breaker is open the fail-fast path must land on manual
        // review without invoking the downstream at all.
        orch.process(&tx("ord_3", "U2", 100.0)).await.unwrap();
        tokio::time::advance(Duration::from_millis(50)).await;
        let outcome = orch.process(&tx("ord_4", "U2", 100.0)).await.unwrap();

        assert_eq!(outcome.breakdown.triage, Triage::Escalate);
        assert_eq!(outcome.disposition, Disposition::ManualReview);
        assert!(outcome.fallback_applied);
        assert_eq!(investigation.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_investigation_verdict_replaces_escalation() {
        let config = test_config();
        let investigation = MockInvestigation::new(MockBehavior::Verdict(Disposition::Block));
        let orch = orchestrator(&config, 0.9).with_investigation(investigation.clone());

        let outcome = orch.process(&tx("ord_1", "u1", 100.0)).await.unwrap();

        assert_eq!(outcome.breakdown.triage, Triage::Escalate);
        assert_eq!(outcome.disposition, Disposition::Block);
        assert!(!outcome.fallback_applied);
        assert_eq!(investigation.calls.load(Ordering::SeqCst), 1);

        let verdict = outcome.investigation.expect("verdict attached");
        assert_eq!(verdict.decision, Disposition::Block);
    }

    #[tokio::test(start_paused = true)]
    async fn test_investigation_timeout_triggers_fallback() {
        let config = test_config();
        let investigation = MockInvestigation::new(MockBehavior::Hang);
        let orch = orchestrator(&config, 0.9).with_investigation(investigation.clone());

        let outcome = orch.process(&tx("ord_1", "u1", 100.0)).await.unwrap();

        assert_eq!(outcome.disposition, Disposition::ManualReview);
        assert!(outcome.fallback_applied);
        // Each attempt hit the 90s deadline and was retried.
        assert_eq!(investigation.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_escalation_without_collaborator_falls_back() {
        let config = test_config();
        let orch = orchestrator(&config, 0.9);

        let outcome = orch.process(&tx("ord_1", "u1", 100.0)).await.unwrap();

        assert_eq!(outcome.breakdown.triage, Triage::Escalate);
        assert_eq!(outcome.disposition, Disposition::ManualReview);
        assert!(outcome.fallback_applied);
    }

    #[tokio::test]
    async fn test_reputation_boost_feeds_fusion() {
        let config = test_config();
        let orch =
            orchestrator(&config, 0.2).with_reputation(Arc::new(MockReputation { boost: 0.3 }));

        let outcome = orch.process(&tx("ord_1", "u1", 100.0)).await.unwrap();

        assert_eq!(outcome.breakdown.reputation_boost, 0.3);
        assert!((outcome.breakdown.final_score - 0.5).abs() < 1e-9);
        assert_eq!(outcome.disposition, Disposition::ManualReview);
    }

    #[tokio::test]
    async fn test_low_score_approves() {
        let config = test_config();
        let orch = orchestrator(&config, 0.1);

        let outcome = orch.process(&tx("ord_1", "u1", 100.0)).await.unwrap();

        assert_eq!(outcome.disposition, Disposition::Approve);
        assert!(outcome.breakdown.final_score < 0.40);
        assert!(outcome.investigation.is_none());
    }

    #[tokio::test]
    async fn test_malformed_transaction_is_rejected() {
        let config = test_config();
        let orch = orchestrator(&config, 0.1);

        let mut bad = tx("", "u1", 100.0);
        assert_eq!(
            orch.process(&bad).await.unwrap_err(),
            ValidationError::EmptyOrderId
        );

        bad = tx("ord_1", "u1", -5.0);
        assert_eq!(
            orch.process(&bad).await.unwrap_err(),
            ValidationError::NonPositiveAmount(-5.0)
        );

        // Rejected transactions never enter the velocity window.
        assert_eq!(orch.velocity().stats().tracked_users, 0);
    }

    #[tokio::test]
    async fn test_persistence_failure_does_not_change_disposition() {
        let config = test_config();
        let attempts = Arc::new(AtomicU32::new(0));
        let orch = orchestrator(&config, 0.1).with_persistence(Arc::new(FailingSink {
            attempts: attempts.clone(),
        }));

        let outcome = orch.process(&tx("ord_1", "u1", 100.0)).await.unwrap();
        assert_eq!(outcome.disposition, Disposition::Approve);

        // Let the spawned fire-and-forget write run.
        tokio::task::yield_now().await;
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_outcomes_reach_the_persistence_sink() {
        let config = test_config();
        let sink = Arc::new(RecordingSink {
            recorded: Mutex::new(Vec::new()),
        });
        let orch = orchestrator(&config, 0.1).with_persistence(sink.clone());

        orch.process(&tx("ord_1", "u1", 100.0)).await.unwrap();
        tokio::task::yield_now().await;

        let recorded = sink.recorded.lock().unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].order_id, "ord_1");
    }
}
