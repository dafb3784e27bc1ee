//! Fraud Triage Pipeline Library
//!
//! Real-time transaction fraud scoring and routing: a per-user velocity
//! detector, a bounded score-fusion engine, and resilience primitives
//! (circuit breaker, retry with backoff, rate limiter) guarding calls into
//! unreliable downstream services.

pub mod config;
pub mod consumer;
pub mod detection;
pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod producer;
pub mod resilience;
pub mod services;
pub mod types;

pub use config::AppConfig;
pub use consumer::TransactionConsumer;
pub use error::{ServiceError, ValidationError};
pub use orchestrator::Orchestrator;
pub use producer::OutcomePublisher;
pub use types::{outcome::TriageOutcome, transaction::Transaction};
