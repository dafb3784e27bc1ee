//! NATS request/reply client for the investigation service

use super::{InvestigationContext, InvestigationService, InvestigationVerdict};
use crate::detection::fusion::FraudScoreBreakdown;
use crate::error::ServiceError;
use crate::types::transaction::Transaction;
use async_nats::Client;
use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

const SERVICE_NAME: &str = "investigation-service";

/// Request payload sent to the investigation subject.
#[derive(Debug, Serialize)]
struct InvestigationRequest<'a> {
    transaction: &'a Transaction,
    breakdown: &'a FraudScoreBreakdown,
    context: &'a InvestigationContext,
}

/// Investigation collaborator reached over NATS request/reply.
pub struct NatsInvestigationClient {
    client: Client,
    subject: String,
}

impl NatsInvestigationClient {
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
impl InvestigationService for NatsInvestigationClient {
    async fn investigate(
        &self,
        transaction: &Transaction,
        breakdown: &FraudScoreBreakdown,
        context: &InvestigationContext,
    ) -> Result<InvestigationVerdict, ServiceError> {
        let request = InvestigationRequest {
            transaction,
            breakdown,
            context,
        };
        let payload = serde_json::to_vec(&request)
            .map_err(|e| ServiceError::external(SERVICE_NAME, e.to_string()))?;

        let reply = self
            .client
            .request(self.subject.clone(), payload.into())
            .await
            .map_err(|e| ServiceError::external(SERVICE_NAME, e.to_string()))?;

        let verdict: InvestigationVerdict = serde_json::from_slice(&reply.payload)
            .map_err(|e| ServiceError::external(SERVICE_NAME, e.to_string()))?;

        debug!(
            order_id = %transaction.order_id,
            decision = ?verdict.decision,
            confidence = verdict.confidence,
            "investigation verdict received"
        );

        Ok(verdict)
    }
}

#[cfg(test)]
mod tests {
    // Request/reply round trips require a running NATS server; the guarded
    // invocation path is covered by the orchestrator tests with mock
    // collaborators.
}
