use crate::error::{AugmentError, Result};
use std::time::Duration;

/// Object key the augmented CSV is uploaded under.
pub const DEFAULT_OUTPUT_KEY: &str = "filename_final.csv";

/// What to do with a row whose task missed its deadline or died.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DroppedRowPolicy {
    /// Leave the row out of the output. Callers must reconcile row counts.
    #[default]
    Drop,
    /// Keep the row and fill its response with the error sentinel.
    Sentinel,
}

/// Backoff settings for calls to the completion service.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,

    /// Sleep after the first failure. Doubles after every failure, uncapped.
    pub initial_delay: Duration,

    /// Deadline for a single attempt.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 7,
            initial_delay: Duration::from_secs(1),
            attempt_timeout: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    /// Delay slept after the `failures`-th failed attempt (1-based).
    pub fn delay_after(&self, failures: u32) -> Duration {
        self.initial_delay
            .saturating_mul(2u32.saturating_pow(failures.saturating_sub(1)))
    }
}

/// Configuration for a pipeline run.
///
/// Use [`PipelineConfig::builder()`] for ergonomic construction, or
/// [`PipelineConfig::default()`] for the production settings
/// (batches of 1000, 10 batches x 20 rows in flight).
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Rows per batch. The last batch may be shorter.
    pub batch_size: usize,

    /// Batches processed concurrently.
    pub batch_concurrency: usize,

    /// Rows processed concurrently inside one batch.
    pub row_concurrency: usize,

    /// Deadline for a single row, measured from when it starts running.
    pub row_timeout: Duration,

    /// Deadline for collecting every row of a batch.
    pub batch_timeout: Duration,

    /// Retry behaviour of the completion call.
    pub retry: RetryPolicy,

    /// `max_tokens` sent with every completion request.
    pub max_tokens: u32,

    /// Handling of rows that time out or fail inside the row pool.
    pub dropped_rows: DroppedRowPolicy,

    /// Destination key for the rendered table.
    pub output_key: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            batch_concurrency: 10,
            row_concurrency: 20,
            row_timeout: Duration::from_secs(180),
            batch_timeout: Duration::from_secs(240),
            retry: RetryPolicy::default(),
            max_tokens: 700,
            dropped_rows: DroppedRowPolicy::Drop,
            output_key: DEFAULT_OUTPUT_KEY.to_string(),
        }
    }
}

impl PipelineConfig {
    /// Start building a config with the builder pattern.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Reject settings that would stall or divide by zero.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(AugmentError::InvalidConfig(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if self.batch_concurrency == 0 || self.row_concurrency == 0 {
            return Err(AugmentError::InvalidConfig(
                "concurrency limits must be at least 1".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(AugmentError::InvalidConfig(
                "retry policy needs at least one attempt".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    pub fn with_batch_concurrency(mut self, limit: usize) -> Self {
        self.config.batch_concurrency = limit;
        self
    }

    pub fn with_row_concurrency(mut self, limit: usize) -> Self {
        self.config.row_concurrency = limit;
        self
    }

    pub fn with_row_timeout(mut self, timeout: Duration) -> Self {
        self.config.row_timeout = timeout;
        self
    }

    pub fn with_batch_timeout(mut self, timeout: Duration) -> Self {
        self.config.batch_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    pub fn with_max_tokens(mut self, tokens: u32) -> Self {
        self.config.max_tokens = tokens;
        self
    }

    /// Emit the error sentinel for timed-out rows instead of dropping them.
    pub fn with_dropped_rows(mut self, policy: DroppedRowPolicy) -> Self {
        self.config.dropped_rows = policy;
        self
    }

    pub fn with_output_key(mut self, key: impl Into<String>) -> Self {
        self.config.output_key = key.into();
        self
    }

    /// Build the final [`PipelineConfig`].
    pub fn build(self) -> PipelineConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.batch_size, 1000);
        assert_eq!(config.batch_concurrency, 10);
        assert_eq!(config.row_concurrency, 20);
        assert_eq!(config.row_timeout, Duration::from_secs(180));
        assert_eq!(config.batch_timeout, Duration::from_secs(240));
        assert_eq!(config.retry.max_attempts, 7);
        assert_eq!(config.max_tokens, 700);
        assert_eq!(config.dropped_rows, DroppedRowPolicy::Drop);
        assert_eq!(config.output_key, "filename_final.csv");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = PipelineConfig::builder()
            .with_batch_size(50)
            .with_row_concurrency(4)
            .with_dropped_rows(DroppedRowPolicy::Sentinel)
            .with_output_key("out.csv")
            .build();
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.row_concurrency, 4);
        assert_eq!(config.batch_concurrency, 10);
        assert_eq!(config.dropped_rows, DroppedRowPolicy::Sentinel);
        assert_eq!(config.output_key, "out.csv");
    }

    #[test]
    fn test_validate_rejects_zeroes() {
        let config = PipelineConfig::builder().with_batch_size(0).build();
        assert!(matches!(
            config.validate(),
            Err(AugmentError::InvalidConfig(_))
        ));

        let config = PipelineConfig::builder().with_row_concurrency(0).build();
        assert!(config.validate().is_err());

        let config = PipelineConfig::builder()
            .with_retry(RetryPolicy {
                max_attempts: 0,
                ..RetryPolicy::default()
            })
            .build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        let delays: Vec<u64> = (1..=7).map(|n| policy.delay_after(n).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 32, 64]);
    }
}
