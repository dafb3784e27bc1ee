//! Fire-and-forget persistence sink publishing outcomes to an audit subject

use super::PersistenceSink;
use crate::error::ServiceError;
use crate::types::outcome::TriageOutcome;
use async_nats::Client;
use async_trait::async_trait;
use tracing::debug;

const SERVICE_NAME: &str = "audit-sink";

/// Persistence sink backed by a NATS subject; a downstream writer owns the
/// durable store.
pub struct NatsAuditSink {
    client: Client,
    subject: String,
}

impl NatsAuditSink {
    pub fn new(client: Client, subject: &str) -> Self {
        Self {
            client,
            subject: subject.to_string(),
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}

#[async_trait]
impl PersistenceSink for NatsAuditSink {
    async fn record(&self, outcome: &TriageOutcome) -> Result<(), ServiceError> {
        let payload = serde_json::to_vec(outcome)
            .map_err(|e| ServiceError::external(SERVICE_NAME, e.to_string()))?;

        self.client
            .publish(self.subject.clone(), payload.into())
            .await
            .map_err(|e| ServiceError::external(SERVICE_NAME, e.to_string()))?;

        debug!(
            outcome_id = %outcome.outcome_id,
            order_id = %outcome.order_id,
            "outcome recorded to audit subject"
        );

        Ok(())
    }
}
