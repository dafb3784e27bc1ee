//! Per-user velocity fraud detection.
//!
//! Tracks a sliding window of order events per user and flags two patterns:
//! rapid successive orders (velocity fraud) and bursts of small orders
//! (card testing). Append and evaluation happen inside a single critical
//! section, so concurrent checks for the same user never interleave.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Amortized pruning cadence, in checks between full sweeps.
const SWEEP_EVERY: u32 = 256;

/// Velocity detector thresholds.
#[derive(Debug, Clone)]
pub struct VelocityConfig {
    /// Gap below which two successive orders count as velocity fraud
    pub velocity_threshold: Duration,
    /// Small orders within the window needed to flag card testing
    pub card_testing_order_threshold: usize,
    /// Trailing window for the card-testing count
    pub card_testing_window: Duration,
    /// Amount below which an order counts as "small"
    pub small_order_amount: f64,
    /// How long events are retained before pruning
    pub retention: Duration,
}

impl Default for VelocityConfig {
    fn default() -> Self {
        Self {
            velocity_threshold: Duration::from_millis(500),
            card_testing_order_threshold: 3,
            card_testing_window: Duration::from_secs(5 * 60),
            small_order_amount: 50.0,
            retention: Duration::from_secs(60 * 60),
        }
    }
}

/// Which fraud pattern fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FraudPattern {
    Velocity,
    CardTesting,
}

/// Result of a velocity check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VelocityVerdict {
    pub is_fraud: bool,
    pub pattern: Option<FraudPattern>,
    pub reason: String,
    pub score_boost: f64,
}

impl VelocityVerdict {
    fn clean() -> Self {
        Self {
            is_fraud: false,
            pattern: None,
            reason: "no velocity fraud detected".to_string(),
            score_boost: 0.0,
        }
    }
}

/// One recorded order. Monotonic instant drives all comparisons; the wall
/// clock is carried for downstream reporting only.
#[derive(Debug, Clone)]
struct OrderEvent {
    at: Instant,
    wall: DateTime<Utc>,
    amount: f64,
}

#[derive(Default)]
struct VelocityState {
    /// Per-user windows, time-ordered by insertion
    windows: HashMap<String, VecDeque<OrderEvent>>,
    checks_since_sweep: u32,
}

/// Detects velocity fraud patterns across users.
pub struct VelocityDetector {
    config: VelocityConfig,
    state: Mutex<VelocityState>,
}

/// Snapshot of what the detector is currently tracking.
#[derive(Debug, Clone, Copy)]
pub struct VelocityStats {
    pub tracked_users: usize,
    pub tracked_events: usize,
}

impl VelocityDetector {
    pub fn new(config: VelocityConfig) -> Self {
        Self {
            config,
            state: Mutex::new(VelocityState::default()),
        }
    }

    /// Record an order and evaluate both fraud patterns, in fixed order.
    /// Velocity wins over card testing; a user's first order never fires
    /// either. Total for well-formed input.
    pub fn check(&self, user_id: &str, amount: f64, now: Instant) -> VelocityVerdict {
        let mut state = self.state.lock().unwrap();

        state.checks_since_sweep += 1;
        if state.checks_since_sweep >= SWEEP_EVERY {
            state.checks_since_sweep = 0;
            Self::sweep(&mut state.windows, now, self.config.retention);
        }

        let window = state.windows.entry(user_id.to_string()).or_default();

        // Front-prune the touched window; insertion order == time order.
        while let Some(front) = window.front() {
            if now.duration_since(front.at) > self.config.retention {
                window.pop_front();
            } else {
                break;
            }
        }

        window.push_back(OrderEvent {
            at: now,
            wall: Utc::now(),
            amount,
        });

        // Check 1: rapid successive orders.
        if window.len() >= 2 {
            let previous = &window[window.len() - 2];
            let gap = now.duration_since(previous.at);
            if gap < self.config.velocity_threshold {
                let gap_ms = gap.as_millis();
                let threshold_ms = self.config.velocity_threshold.as_millis();
                warn!(
                    user_id = %user_id,
                    gap_ms = gap_ms,
                    threshold_ms = threshold_ms,
                    previous_order_at = %previous.wall,
                    "velocity fraud: rapid successive orders"
                );
                return VelocityVerdict {
                    is_fraud: true,
                    pattern: Some(FraudPattern::Velocity),
                    reason: format!(
                        "{}ms since last order (threshold: {}ms)",
                        gap_ms, threshold_ms
                    ),
                    score_boost: 0.4,
                };
            }
        }

        // Check 2: many small orders within the trailing window.
        let small_orders = window
            .iter()
            .filter(|e| {
                now.duration_since(e.at) <= self.config.card_testing_window
                    && e.amount < self.config.small_order_amount
            })
            .count();

        if small_orders >= self.config.card_testing_order_threshold {
            warn!(
                user_id = %user_id,
                small_orders = small_orders,
                window_secs = self.config.card_testing_window.as_secs(),
                "card testing: burst of small orders"
            );
            return VelocityVerdict {
                is_fraud: true,
                pattern: Some(FraudPattern::CardTesting),
                reason: format!(
                    "{} orders under ${:.2} in {} minutes",
                    small_orders,
                    self.config.small_order_amount,
                    self.config.card_testing_window.as_secs() / 60
                ),
                score_boost: 0.5,
            };
        }

        VelocityVerdict::clean()
    }

    /// Drop events past the retention horizon for every user and delete
    /// users whose window becomes empty. Also runs on an internal cadence.
    pub fn prune(&self, now: Instant) {
        let mut state = self.state.lock().unwrap();
        Self::sweep(&mut state.windows, now, self.config.retention);
    }

    fn sweep(windows: &mut HashMap<String, VecDeque<OrderEvent>>, now: Instant, retention: Duration) {
        let before: usize = windows.values().map(VecDeque::len).sum();
        windows.retain(|_, window| {
            while let Some(front) = window.front() {
                if now.duration_since(front.at) > retention {
                    window.pop_front();
                } else {
                    break;
                }
            }
            !window.is_empty()
        });
        let after: usize = windows.values().map(VecDeque::len).sum();
        if before != after {
            debug!(pruned = before - after, remaining = after, "pruned stale order events");
        }
    }

    /// Count of a user's retained orders inside the trailing `window`.
    pub fn user_order_count(&self, user_id: &str, window: Duration, now: Instant) -> usize {
        let state = self.state.lock().unwrap();
        state
            .windows
            .get(user_id)
            .map(|w| {
                w.iter()
                    .filter(|e| now.duration_since(e.at) <= window)
                    .count()
            })
            .unwrap_or(0)
    }

    pub fn stats(&self) -> VelocityStats {
        let state = self.state.lock().unwrap();
        VelocityStats {
            tracked_users: state.windows.len(),
            tracked_events: state.windows.values().map(VecDeque::len).sum(),
        }
    }
}

impl Default for VelocityDetector {
    fn default() -> Self {
        Self::new(VelocityConfig::default())
    }
}
