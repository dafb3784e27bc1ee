//! Score fusion: merges the base model score with detector and collaborator
//! boosts into one bounded probability and a triage decision.

use serde::{Deserialize, Serialize};

/// Ceiling on the reputation boost a collaborator can contribute
/// (flagged user 0.3 + flagged IP 0.4 + hot velocity 0.2).
pub const MAX_REPUTATION_BOOST: f64 = 0.9;

/// Ceiling on the similarity boost (3 cases x 0.2 weight). Enforced here so
/// the boost's contract holds independently of the final min(1.0) cap.
pub const MAX_SIMILARITY_BOOST: f64 = 0.6;

/// Weight applied to each similar case's similarity score.
pub const SIMILARITY_CASE_WEIGHT: f64 = 0.2;

/// Triage routing derived from the fused score.
///
/// `Escalate` is not terminal: it tells the orchestrator to consult the
/// investigation collaborator, whose verdict replaces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Triage {
    Approve,
    ManualReview,
    Escalate,
}

/// How the final score was assembled. `final_score` is derived, always in
/// [0, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudScoreBreakdown {
    pub ml_score: f64,
    pub velocity_boost: f64,
    pub reputation_boost: f64,
    pub similarity_boost: f64,
    pub final_score: f64,
    pub triage: Triage,
}

/// Triage thresholds, evaluated high to low with inclusive lower bounds.
#[derive(Debug, Clone)]
pub struct FusionConfig {
    pub block_threshold: f64,
    pub review_threshold: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            block_threshold: 0.70,
            review_threshold: 0.40,
        }
    }
}

/// Combines heterogeneous risk signals into one probability.
#[derive(Debug, Clone, Default)]
pub struct ScoreFusionEngine {
    config: FusionConfig,
}

impl ScoreFusionEngine {
    pub fn new(config: FusionConfig) -> Self {
        Self { config }
    }

    /// Fuse the base score and boosts. Each addend is clamped to its own
    /// contract sub-range before summing; the sum is capped at 1.0. Monotone
    /// non-decreasing in every input.
    pub fn fuse(
        &self,
        ml_score: f64,
        velocity_boost: f64,
        reputation_boost: f64,
        similarity_boost: f64,
    ) -> FraudScoreBreakdown {
        let ml_score = ml_score.clamp(0.0, 1.0);
        let velocity_boost = velocity_boost.max(0.0);
        let reputation_boost = reputation_boost.clamp(0.0, MAX_REPUTATION_BOOST);
        let similarity_boost = similarity_boost.clamp(0.0, MAX_SIMILARITY_BOOST);

        let final_score =
            (ml_score + velocity_boost + reputation_boost + similarity_boost).min(1.0);

        FraudScoreBreakdown {
            ml_score,
            velocity_boost,
            reputation_boost,
            similarity_boost,
            final_score,
            triage: self.triage(final_score),
        }
    }

    fn triage(&self, final_score: f64) -> Triage {
        if final_score >= self.config.block_threshold {
            Triage::Escalate
        } else if final_score >= self.config.review_threshold {
            Triage::ManualReview
        } else {
            Triage::Approve
        }
    }
}
