//! Configuration management for the fraud triage pipeline

use crate::detection::fusion::FusionConfig;
use crate::detection::velocity::VelocityConfig;
use crate::resilience::circuit_breaker::BreakerConfig;
use crate::resilience::rate_limiter::RateLimitConfig;
use crate::resilience::retry::RetryPolicy;
use anyhow::{Context, Result};
use config::{Config, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub nats: NatsConfig,
    pub detection: DetectionConfig,
    pub resilience: ResilienceConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

/// NATS connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NatsConfig {
    /// NATS server URL
    pub url: String,
    /// Subject for incoming transactions
    pub transaction_subject: String,
    /// Subject for outgoing triage outcomes
    pub outcome_subject: String,
    /// Subject for the fire-and-forget audit trail
    pub audit_subject: String,
    /// Request/reply subject for the investigation service
    pub investigation_subject: String,
}

/// Scoring and triage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    /// Fused score at or above which a transaction escalates
    pub block_threshold: f64,
    /// Fused score at or above which a transaction goes to manual review
    pub review_threshold: f64,
    pub velocity: VelocitySettings,
}

/// Velocity detector thresholds
#[derive(Debug, Clone, Deserialize)]
pub struct VelocitySettings {
    pub velocity_threshold_ms: u64,
    pub card_testing_order_threshold: usize,
    pub card_testing_window_minutes: u64,
    pub small_order_amount: f64,
    pub retention_minutes: u64,
}

impl Default for VelocitySettings {
    fn default() -> Self {
        Self {
            velocity_threshold_ms: 500,
            card_testing_order_threshold: 3,
            card_testing_window_minutes: 5,
            small_order_amount: 50.0,
            retention_minutes: 60,
        }
    }
}

/// Guards around the investigation call path
#[derive(Debug, Clone, Deserialize)]
pub struct ResilienceConfig {
    /// Deadline for a single investigation attempt
    pub investigation_timeout_secs: u64,
    pub circuit_breaker: BreakerSettings,
    pub retry: RetrySettings,
    pub rate_limit: RateLimitSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub recovery_timeout_secs: u64,
    pub success_threshold: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub exponential_base: f64,
    pub jitter: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitSettings {
    pub max_calls_per_minute: u32,
    pub min_delay_seconds: f64,
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Maximum transactions processed concurrently
    pub workers: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/config.toml")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

impl DetectionConfig {
    pub fn fusion(&self) -> FusionConfig {
        FusionConfig {
            block_threshold: self.block_threshold,
            review_threshold: self.review_threshold,
        }
    }
}

impl VelocitySettings {
    pub fn to_config(&self) -> VelocityConfig {
        VelocityConfig {
            velocity_threshold: Duration::from_millis(self.velocity_threshold_ms),
            card_testing_order_threshold: self.card_testing_order_threshold,
            card_testing_window: Duration::from_secs(self.card_testing_window_minutes * 60),
            small_order_amount: self.small_order_amount,
            retention: Duration::from_secs(self.retention_minutes * 60),
        }
    }
}

impl BreakerSettings {
    pub fn to_config(&self) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.failure_threshold,
            recovery_timeout: Duration::from_secs(self.recovery_timeout_secs),
            success_threshold: self.success_threshold,
        }
    }
}

impl RetrySettings {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            exponential_base: self.exponential_base,
            jitter: self.jitter,
        }
    }
}

impl RateLimitSettings {
    pub fn to_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            max_calls_per_minute: self.max_calls_per_minute,
            min_delay: Duration::from_secs_f64(self.min_delay_seconds),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            nats: NatsConfig {
                url: "nats://localhost:4222".to_string(),
                transaction_subject: "transactions".to_string(),
                outcome_subject: "fraud.dispositions".to_string(),
                audit_subject: "fraud.audit".to_string(),
                investigation_subject: "fraud.investigation".to_string(),
            },
            detection: DetectionConfig {
                block_threshold: 0.70,
                review_threshold: 0.40,
                velocity: VelocitySettings::default(),
            },
            resilience: ResilienceConfig {
                investigation_timeout_secs: 90,
                circuit_breaker: BreakerSettings {
                    failure_threshold: 5,
                    recovery_timeout_secs: 60,
                    success_threshold: 2,
                },
                retry: RetrySettings {
                    max_retries: 3,
                    base_delay_ms: 1000,
                    max_delay_ms: 30000,
                    exponential_base: 2.0,
                    jitter: true,
                },
                rate_limit: RateLimitSettings {
                    max_calls_per_minute: 20,
                    min_delay_seconds: 3.0,
                },
            },
            pipeline: PipelineConfig { workers: 5 },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.nats.url, "nats://localhost:4222");
        assert_eq!(config.detection.block_threshold, 0.70);
        assert_eq!(config.detection.review_threshold, 0.40);
        assert_eq!(config.detection.velocity.velocity_threshold_ms, 500);
        assert_eq!(config.resilience.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.resilience.investigation_timeout_secs, 90);
        assert_eq!(config.pipeline.workers, 5);
    }

    #[test]
    fn test_settings_conversions() {
        let config = AppConfig::default();

        let velocity = config.detection.velocity.to_config();
        assert_eq!(velocity.velocity_threshold, Duration::from_millis(500));
        assert_eq!(velocity.card_testing_window, Duration::from_secs(300));
        assert_eq!(velocity.retention, Duration::from_secs(3600));

        let retry = config.resilience.retry.to_policy();
        assert_eq!(retry.max_retries, 3);
        assert_eq!(retry.base_delay, Duration::from_secs(1));

        let rate = config.resilience.rate_limit.to_config();
        assert_eq!(rate.min_delay, Duration::from_secs(3));
    }
}
