//! Test Transaction Producer
//!
//! Generates and publishes test transactions to NATS for pipeline testing.
//! Mixes legitimate traffic with velocity bursts (rapid repeat orders from
//! one user) and card-testing bursts (many small orders from one user).

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

/// Transaction structure matching the pipeline's expected format
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Transaction {
    order_id: String,
    user_id: String,
    amount: f64,
    payment_method: String,
    account_age_days: u32,
    total_orders: u32,
    avg_order_value: f64,
    ip_address: Option<String>,
    timestamp: chrono::DateTime<Utc>,
}

/// Transaction generator for testing
struct TransactionGenerator {
    rng: rand::rngs::ThreadRng,
    order_counter: u64,
    burst_counter: u64,
}

impl TransactionGenerator {
    fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
            order_counter: 0,
            burst_counter: 0,
        }
    }

    /// Generate a random legitimate transaction
    fn generate_legitimate(&mut self) -> Transaction {
        self.order_counter += 1;

        Transaction {
            order_id: format!("ord_{:012}", self.order_counter),
            user_id: format!("user_{}", self.rng.gen_range(1..500)),
            amount: self.rng.gen_range(10.0..500.0),
            payment_method: self
                .random_choice(&["credit_card", "debit_card", "bank_transfer", "paypal"])
                .to_string(),
            account_age_days: self.rng.gen_range(30..1000),
            total_orders: self.rng.gen_range(1..100),
            avg_order_value: self.rng.gen_range(50.0..200.0),
            ip_address: Some(self.random_ip()),
            timestamp: Utc::now(),
        }
    }

    /// Generate a suspicious transaction: new account, large crypto order
    /// far above the user's usual spend.
    fn generate_suspicious(&mut self) -> Transaction {
        self.order_counter += 1;

        Transaction {
            order_id: format!("ord_{:012}", self.order_counter),
            user_id: format!("user_{}", self.rng.gen_range(1..500)),
            amount: self.rng.gen_range(1000.0..10000.0),
            payment_method: "crypto".to_string(),
            account_age_days: self.rng.gen_range(0..7),
            total_orders: 0,
            avg_order_value: self.rng.gen_range(20.0..60.0),
            ip_address: Some(self.random_ip()),
            timestamp: Utc::now(),
        }
    }

    /// Generate a burst of orders from one user.
    ///
    /// Published back-to-back these trip the velocity check; small amounts
    /// spread out trip the card-testing check instead.
    fn generate_burst(&mut self, orders: usize, amount_range: (f64, f64)) -> Vec<Transaction> {
        self.burst_counter += 1;
        let user_id = format!("burst_user_{}", self.burst_counter);
        let ip = self.random_ip();

        (0..orders)
            .map(|_| {
                self.order_counter += 1;
                Transaction {
                    order_id: format!("ord_{:012}", self.order_counter),
                    user_id: user_id.clone(),
                    amount: self.rng.gen_range(amount_range.0..amount_range.1),
                    payment_method: "credit_card".to_string(),
                    account_age_days: self.rng.gen_range(1..90),
                    total_orders: self.rng.gen_range(0..5),
                    avg_order_value: 40.0,
                    ip_address: Some(ip.clone()),
                    timestamp: Utc::now(),
                }
            })
            .collect()
    }

    fn random_ip(&mut self) -> String {
        format!(
            "{}.{}.{}.{}",
            self.rng.gen_range(1..255),
            self.rng.gen_range(0..255),
            self.rng.gen_range(0..255),
            self.rng.gen_range(1..255)
        )
    }

    fn random_choice<'a>(&mut self, choices: &[&'a str]) -> &'a str {
        choices[self.rng.gen_range(0..choices.len())]
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("test_producer=info".parse()?),
        )
        .init();

    info!("Starting Test Transaction Producer");

    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    let nats_url = args
        .get(1)
        .map(|s| s.as_str())
        .unwrap_or("nats://localhost:4222");
    let subject = args.get(2).map(|s| s.as_str()).unwrap_or("transactions");
    let count: u64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(100);
    let fraud_rate: f64 = args.get(4).and_then(|s| s.parse().ok()).unwrap_or(0.1);
    let delay_ms: u64 = args.get(5).and_then(|s| s.parse().ok()).unwrap_or(100);

    info!(
        nats_url = %nats_url,
        subject = %subject,
        count = count,
        fraud_rate = fraud_rate,
        delay_ms = delay_ms,
        "Configuration loaded"
    );

    // Connect to NATS
    let client = match async_nats::connect(nats_url).await {
        Ok(c) => {
            info!("Connected to NATS");
            c
        }
        Err(e) => {
            warn!(error = %e, "Failed to connect to NATS. Running in dry-run mode.");
            // Continue in dry-run mode
            return run_dry_mode(count, fraud_rate, delay_ms).await;
        }
    };

    // Generate and publish transactions
    let mut generator = TransactionGenerator::new();
    let mut rng = rand::thread_rng();

    info!("Starting to publish {} transactions...", count);

    let mut legitimate_count = 0;
    let mut suspicious_count = 0;
    let mut burst_count = 0;

    let mut published: u64 = 0;
    while published < count {
        // Occasionally emit a whole fraud-pattern burst instead of one order.
        if rng.gen_bool(fraud_rate / 4.0) {
            let card_testing = rng.gen_bool(0.5);
            let burst = if card_testing {
                // Small orders, spaced out: card-testing shape.
                generator.generate_burst(4, (1.0, 20.0))
            } else {
                // Any amounts, back-to-back: velocity shape.
                generator.generate_burst(3, (50.0, 300.0))
            };
            burst_count += 1;

            for transaction in burst {
                let payload = serde_json::to_vec(&transaction)?;
                client.publish(subject.to_string(), payload.into()).await?;
                published += 1;

                if card_testing {
                    // Slow enough to miss the velocity gap, still inside the
                    // 5 minute card-testing window.
                    tokio::time::sleep(Duration::from_millis(700)).await;
                }
            }
            continue;
        }

        let transaction = if rng.gen_bool(fraud_rate) {
            suspicious_count += 1;
            generator.generate_suspicious()
        } else {
            legitimate_count += 1;
            generator.generate_legitimate()
        };

        let payload = serde_json::to_vec(&transaction)?;
        client.publish(subject.to_string(), payload.into()).await?;
        published += 1;

        if published % 10 == 0 {
            info!(
                "Published {}/{} transactions ({} legitimate, {} suspicious, {} bursts)",
                published, count, legitimate_count, suspicious_count, burst_count
            );
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    info!(
        "Completed! Published {} transactions ({} legitimate, {} suspicious, {} bursts)",
        published, legitimate_count, suspicious_count, burst_count
    );

    Ok(())
}

async fn run_dry_mode(count: u64, fraud_rate: f64, delay_ms: u64) -> anyhow::Result<()> {
    info!("Running in dry-run mode (no NATS connection)");

    let mut generator = TransactionGenerator::new();
    let mut rng = rand::thread_rng();

    for i in 0..count {
        let transaction = if rng.gen_bool(fraud_rate) {
            generator.generate_suspicious()
        } else {
            generator.generate_legitimate()
        };

        let json = serde_json::to_string_pretty(&transaction)?;

        if (i + 1) % 10 == 0 || i == 0 {
            info!("Sample transaction {}:\n{}", i + 1, json);
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    Ok(())
}
