//! Fraud Triage Pipeline - Main Entry Point
//!
//! Consumes transactions from NATS, scores them for fraud risk, resolves
//! escalations through the investigation service, and publishes triage
//! outcomes. Supports parallel transaction processing for high throughput.

use anyhow::Result;
use fraud_triage_pipeline::{
    config::AppConfig,
    consumer::TransactionConsumer,
    metrics::{MetricsReporter, PipelineMetrics},
    orchestrator::Orchestrator,
    producer::OutcomePublisher,
    services::{NatsAuditSink, NatsInvestigationClient},
};
use futures::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fraud_triage_pipeline=info".parse()?),
        )
        .init();

    info!("Starting Fraud Triage Pipeline");

    // Load configuration
    let config = AppConfig::load()?;
    info!("Configuration loaded successfully");
    info!(
        "Triage thresholds: escalate>={:.2}, review>={:.2} | velocity: {}ms gap, {} small orders in {}min",
        config.detection.block_threshold,
        config.detection.review_threshold,
        config.detection.velocity.velocity_threshold_ms,
        config.detection.velocity.card_testing_order_threshold,
        config.detection.velocity.card_testing_window_minutes,
    );

    // Initialize metrics
    let metrics = Arc::new(PipelineMetrics::new());

    // Connect to NATS
    let client = async_nats::connect(&config.nats.url).await?;
    info!("Connected to NATS at {}", config.nats.url);

    // Initialize consumer, publisher, and downstream collaborators
    let consumer = TransactionConsumer::new(client.clone(), &config.nats.transaction_subject);
    let publisher = Arc::new(OutcomePublisher::new(
        client.clone(),
        &config.nats.outcome_subject,
    ));
    let investigation = Arc::new(NatsInvestigationClient::new(
        client.clone(),
        &config.nats.investigation_subject,
    ));
    let audit = Arc::new(NatsAuditSink::new(client.clone(), &config.nats.audit_subject));

    // Assemble the orchestrator with its guarded collaborators
    let orchestrator = Arc::new(
        Orchestrator::new(&config, metrics.clone())
            .with_investigation(investigation)
            .with_persistence(audit),
    );

    // Parallel processing configuration
    let num_workers = config.pipeline.workers;
    info!(
        "Starting transaction processing loop with {} parallel workers",
        num_workers
    );
    info!("Listening on subject: {}", config.nats.transaction_subject);
    info!("Publishing outcomes to: {}", config.nats.outcome_subject);

    // Semaphore to limit concurrent processing
    let semaphore = Arc::new(Semaphore::new(num_workers));
    let processed_count = Arc::new(AtomicU64::new(0));

    // Start metrics reporter (prints summary every 30 seconds)
    let metrics_clone = metrics.clone();
    tokio::spawn(async move {
        let reporter = MetricsReporter::new(metrics_clone, 30);
        reporter.start().await;
    });

    // Process transactions in parallel
    let mut subscription = consumer.subscribe().await?;

    while let Some(message) = subscription.next().await {
        // Acquire permit (limits concurrent tasks)
        let permit = semaphore.clone().acquire_owned().await.unwrap();

        // Clone shared resources for the spawned task
        let orchestrator = orchestrator.clone();
        let publisher = publisher.clone();
        let metrics = metrics.clone();
        let processed_count = processed_count.clone();

        // Spawn task to process this transaction
        tokio::spawn(async move {
            match TransactionConsumer::decode(&message) {
                Ok(transaction) => {
                    let order_id = transaction.order_id.clone();

                    match orchestrator.process(&transaction).await {
                        Ok(outcome) => {
                            if let Err(e) = publisher.publish(&outcome).await {
                                error!(
                                    order_id = %order_id,
                                    error = %e,
                                    "Failed to publish triage outcome"
                                );
                            } else {
                                info!(
                                    order_id = %order_id,
                                    disposition = ?outcome.disposition,
                                    final_score = outcome.breakdown.final_score,
                                    fallback = outcome.fallback_applied,
                                    processing_time_ms = outcome.processing_time_ms,
                                    "Triage outcome published"
                                );
                            }

                            let count = processed_count.fetch_add(1, Ordering::Relaxed) + 1;

                            // Log progress every 100 transactions
                            if count % 100 == 0 {
                                let throughput = metrics.get_throughput();
                                let processing_stats = metrics.get_processing_stats();
                                info!(
                                    processed = count,
                                    throughput = format!("{:.1} tx/s", throughput),
                                    avg_latency_us = processing_stats.mean_us,
                                    "Processing milestone"
                                );
                            }
                        }
                        Err(e) => {
                            warn!(
                                order_id = %order_id,
                                error = %e,
                                "Transaction rejected by validation"
                            );
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Failed to deserialize transaction");
                }
            }

            // Release permit when done
            drop(permit);
        });
    }

    // Print final summary
    info!("Pipeline shutting down...");
    metrics.print_summary();

    Ok(())
}
