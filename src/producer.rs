//! NATS message producer for triage outcomes

use crate::types::outcome::TriageOutcome;
use anyhow::Result;
use async_nats::Client;
use tracing::debug;

/// Producer for publishing triage outcomes to NATS
#[derive(Clone)]
pub struct OutcomePublisher {
    client: Client,
    subject: String,
}

impl OutcomePublisher {
    /// Create a new outcome publisher
    pub fn new(client: Client, subject: &str) -> Self {
        Self {
            client,
            subject: subject.to_string(),
        }
    }

    /// Publish a triage outcome
    pub async fn publish(&self, outcome: &TriageOutcome) -> Result<()> {
        let payload = serde_json::to_vec(outcome)?;

        self.client
            .publish(self.subject.clone(), payload.into())
            .await?;

        debug!(
            outcome_id = %outcome.outcome_id,
            order_id = %outcome.order_id,
            disposition = ?outcome.disposition,
            final_score = outcome.breakdown.final_score,
            "Published triage outcome"
        );

        Ok(())
    }

    /// Get the subject name
    pub fn subject(&self) -> &str {
        &self.subject
    }
}
