//! Performance metrics and statistics tracking for the fraud triage pipeline.

use crate::detection::velocity::FraudPattern;
use crate::types::outcome::Disposition;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::info;

/// Metrics collector for pipeline performance
pub struct PipelineMetrics {
    /// Total transactions processed
    pub transactions_processed: AtomicU64,
    /// Transactions rejected by ingestion validation
    pub validation_failures: AtomicU64,
    /// Escalations sent to the investigation service
    pub investigations: AtomicU64,
    /// Escalations resolved by the fail-safe fallback
    pub fallbacks: AtomicU64,
    /// Velocity fraud detections
    pub velocity_fraud_count: AtomicU64,
    /// Card-testing detections
    pub card_testing_count: AtomicU64,
    /// Final dispositions by kind
    dispositions: RwLock<HashMap<String, u64>>,
    /// Processing times (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    /// Final score distribution buckets
    score_buckets: RwLock<[u64; 10]>,
    /// Start time for rate calculation
    start_time: Instant,
}

impl PipelineMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            transactions_processed: AtomicU64::new(0),
            validation_failures: AtomicU64::new(0),
            investigations: AtomicU64::new(0),
            fallbacks: AtomicU64::new(0),
            velocity_fraud_count: AtomicU64::new(0),
            card_testing_count: AtomicU64::new(0),
            dispositions: RwLock::new(HashMap::new()),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            score_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record a processed transaction
    pub fn record_transaction(&self, processing_time: Duration, final_score: f64) {
        self.transactions_processed.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut times) = self.processing_times.write() {
            times.push(processing_time.as_micros() as u64);
            // Keep only the most recent samples for memory efficiency
            if times.len() > 10000 {
                times.drain(0..5000);
            }
        }

        let bucket = (final_score * 10.0).min(9.0) as usize;
        if let Ok(mut buckets) = self.score_buckets.write() {
            buckets[bucket] += 1;
        }
    }

    /// Record a final disposition
    pub fn record_disposition(&self, disposition: Disposition) {
        let key = match disposition {
            Disposition::Approve => "approve",
            Disposition::ManualReview => "manual_review",
            Disposition::Block => "block",
        };
        if let Ok(mut by_kind) = self.dispositions.write() {
            *by_kind.entry(key.to_string()).or_insert(0) += 1;
        }
    }

    /// Record a fired velocity pattern
    pub fn record_pattern(&self, pattern: FraudPattern) {
        match pattern {
            FraudPattern::Velocity => {
                self.velocity_fraud_count.fetch_add(1, Ordering::Relaxed);
            }
            FraudPattern::CardTesting => {
                self.card_testing_count.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn record_validation_failure(&self) {
        self.validation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_investigation(&self) {
        self.investigations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fallback(&self) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    /// Get processing time statistics
    pub fn get_processing_stats(&self) -> ProcessingStats {
        let times = self.processing_times.read().unwrap();
        if times.is_empty() {
            return ProcessingStats::default();
        }

        let mut sorted: Vec<u64> = times.clone();
        sorted.sort();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();

        ProcessingStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: sorted[count / 2],
            p95_us: sorted[(count as f64 * 0.95) as usize],
            p99_us: sorted[(count as f64 * 0.99) as usize],
            max_us: *sorted.last().unwrap_or(&0),
        }
    }

    /// Get current throughput (transactions per second)
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.transactions_processed.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Get final score distribution
    pub fn get_score_distribution(&self) -> [u64; 10] {
        *self.score_buckets.read().unwrap()
    }

    /// Get dispositions by kind
    pub fn get_dispositions(&self) -> HashMap<String, u64> {
        self.dispositions.read().unwrap().clone()
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let tx_count = self.transactions_processed.load(Ordering::Relaxed);
        let investigations = self.investigations.load(Ordering::Relaxed);
        let fallbacks = self.fallbacks.load(Ordering::Relaxed);
        let velocity = self.velocity_fraud_count.load(Ordering::Relaxed);
        let card_testing = self.card_testing_count.load(Ordering::Relaxed);
        let rejected = self.validation_failures.load(Ordering::Relaxed);

        let processing = self.get_processing_stats();
        let throughput = self.get_throughput();
        let dispositions = self.get_dispositions();
        let score_dist = self.get_score_distribution();

        info!("================ FRAUD TRIAGE PIPELINE - METRICS ================");
        info!(
            "transactions: {} | throughput: {:.1} tx/s | rejected: {}",
            tx_count, throughput, rejected
        );
        info!(
            "velocity fraud: {} | card testing: {} | investigations: {} | fallbacks: {}",
            velocity, card_testing, investigations, fallbacks
        );
        info!(
            "processing time (us): mean={} p50={} p95={} p99={} max={}",
            processing.mean_us, processing.p50_us, processing.p95_us, processing.p99_us,
            processing.max_us
        );

        info!("dispositions:");
        for (kind, count) in &dispositions {
            let pct = if tx_count > 0 {
                (*count as f64 / tx_count as f64) * 100.0
            } else {
                0.0
            };
            info!("  {:14}: {:>6} ({:>5.1}%)", kind, count, pct);
        }

        info!("final score distribution:");
        let total: u64 = score_dist.iter().sum();
        for (i, &count) in score_dist.iter().enumerate() {
            let pct = if total > 0 {
                (count as f64 / total as f64) * 100.0
            } else {
                0.0
            };
            let bar: String = "#".repeat(((pct / 2.0) as usize).min(20));
            info!(
                "  {:.1}-{:.1}: {:>6} ({:>5.1}%) {}",
                i as f64 / 10.0,
                (i + 1) as f64 / 10.0,
                count,
                pct,
                bar
            );
        }
        info!("=================================================================");
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Processing time statistics
#[derive(Debug, Default)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Real-time metrics reporter that prints periodic summaries
pub struct MetricsReporter {
    metrics: std::sync::Arc<PipelineMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: std::sync::Arc<PipelineMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}
