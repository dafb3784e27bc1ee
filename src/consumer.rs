//! NATS ingestion for incoming transactions.
//!
//! Owns the subscription and the wire decode; malformed payloads are
//! reported as errors here so the processing loop only ever sees
//! well-formed transactions.

use crate::types::transaction::Transaction;
use anyhow::{Context, Result};
use async_nats::{Client, Message, Subscriber};
use tracing::info;

/// Consumer for receiving order transactions from NATS
pub struct TransactionConsumer {
    client: Client,
    subject: String,
}

impl TransactionConsumer {
    /// Create a new transaction consumer
    pub fn new(client: Client, subject: &str) -> Self {
        Self {
            client,
            subject: subject.to_string(),
        }
    }

    /// Subscribe to the transaction subject
    pub async fn subscribe(&self) -> Result<Subscriber> {
        let subscriber = self.client.subscribe(self.subject.clone()).await?;
        info!(subject = %self.subject, "Subscribed to transaction subject");
        Ok(subscriber)
    }

    /// Decode one inbound message into a transaction.
    ///
    /// Decode failures are ingestion noise, distinct from the validation a
    /// decoded transaction still has to pass before it is scored.
    pub fn decode(message: &Message) -> Result<Transaction> {
        serde_json::from_slice(&message.payload).context("Failed to decode transaction payload")
    }

    /// Get the subject name
    pub fn subject(&self) -> &str {
        &self.subject
    }
}
