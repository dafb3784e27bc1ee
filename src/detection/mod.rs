//! Fraud detection core: velocity patterns, base scoring, score fusion

pub mod fusion;
pub mod scorer;
pub mod velocity;

pub use fusion::{FraudScoreBreakdown, ScoreFusionEngine, Triage};
pub use scorer::{HeuristicScorer, RiskScorer};
pub use velocity::{FraudPattern, VelocityDetector, VelocityVerdict};
