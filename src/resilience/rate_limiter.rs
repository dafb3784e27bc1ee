//! Call pacing for one shared downstream resource.
//!
//! Enforces two independent constraints: a per-minute call budget over a
//! fixed (non-sliding) 60 second window, and a minimum delay between
//! consecutive calls. Slots are reserved under the lock; the wait happens
//! outside it, so one sleeping caller never blocks another's bookkeeping.

use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

const WINDOW: Duration = Duration::from_secs(60);

/// Pacing limits.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Calls allowed inside one 60 second window
    pub max_calls_per_minute: u32,
    /// Minimum spacing between consecutive calls
    pub min_delay: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_calls_per_minute: 20,
            min_delay: Duration::from_secs(3),
        }
    }
}

struct RateLimitWindow {
    window_start: Instant,
    calls_in_window: u32,
    last_call: Option<Instant>,
}

/// Non-blocking view of the limiter.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitStatus {
    pub calls_in_window: u32,
    pub max_calls: u32,
    pub calls_remaining: u32,
    pub time_until_reset: Duration,
}

/// Stateful pacing guard shared by every caller of one resource.
pub struct RateLimiter {
    config: RateLimitConfig,
    window: Mutex<RateLimitWindow>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            window: Mutex::new(RateLimitWindow {
                window_start: Instant::now(),
                calls_in_window: 0,
                last_call: None,
            }),
        }
    }

    /// Block until it is safe to make one call, then record it.
    ///
    /// Under the lock we reserve the earliest slot satisfying both the
    /// per-minute budget and the minimum spacing, roll the window state
    /// forward to that slot, then sleep until it arrives.
    pub async fn acquire(&self) {
        let slot = {
            let mut window = self.window.lock().unwrap();
            let now = Instant::now();

            if now.duration_since(window.window_start) >= WINDOW {
                window.window_start = now;
                window.calls_in_window = 0;
                debug!("rate limit window reset");
            }

            let mut slot = now;
            if let Some(last) = window.last_call {
                slot = slot.max(last + self.config.min_delay);
            }
            if window.calls_in_window >= self.config.max_calls_per_minute {
                let next_window = window.window_start + WINDOW;
                slot = slot.max(next_window);
                warn!(
                    max_calls = self.config.max_calls_per_minute,
                    wait_ms = next_window.saturating_duration_since(now).as_millis() as u64,
                    "rate limit reached, delaying call into next window"
                );
            }

            if slot.duration_since(window.window_start) >= WINDOW {
                window.window_start = slot;
                window.calls_in_window = 1;
            } else {
                window.calls_in_window += 1;
            }
            window.last_call = Some(slot);

            slot
        };

        tokio::time::sleep_until(slot).await;
    }

    /// Current window occupancy; never blocks.
    pub fn status(&self) -> RateLimitStatus {
        let window = self.window.lock().unwrap();
        let elapsed = Instant::now().duration_since(window.window_start);

        RateLimitStatus {
            calls_in_window: window.calls_in_window,
            max_calls: self.config.max_calls_per_minute,
            calls_remaining: self
                .config
                .max_calls_per_minute
                .saturating_sub(window.calls_in_window),
            time_until_reset: WINDOW.saturating_sub(elapsed),
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_calls_within_budget_do_not_wait() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_calls_per_minute: 5,
            min_delay: Duration::ZERO,
        });

        let start = Instant::now();
        for _ in 0..5 {
            limiter.acquire().await;
        }
        assert_eq!(Instant::now(), start);
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_overflow_waits_for_next_window() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_calls_per_minute: 3,
            min_delay: Duration::ZERO,
        });

        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert_eq!(Instant::now(), start);

        // Fourth call must not complete inside the same 60s window.
        limiter.acquire().await;
        assert!(Instant::now().duration_since(start) >= WINDOW);
    }

    #[tokio::test(start_paused = true)]
    async fn test_min_delay_spaces_consecutive_calls() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_calls_per_minute: 100,
            min_delay: Duration::from_secs(3),
        });

        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;

        assert!(Instant::now().duration_since(start) >= Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_resets_after_sixty_seconds() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_calls_per_minute: 2,
            min_delay: Duration::ZERO,
        });

        limiter.acquire().await;
        limiter.acquire().await;
        assert_eq!(limiter.status().calls_remaining, 0);

        tokio::time::advance(Duration::from_secs(61)).await;

        let start = Instant::now();
        limiter.acquire().await;
        assert_eq!(Instant::now(), start);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_reports_window_occupancy() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_calls_per_minute: 10,
            min_delay: Duration::ZERO,
        });

        limiter.acquire().await;
        limiter.acquire().await;

        let status = limiter.status();
        assert_eq!(status.calls_in_window, 2);
        assert_eq!(status.max_calls, 10);
        assert_eq!(status.calls_remaining, 8);
        assert!(status.time_until_reset <= WINDOW);
    }
}
