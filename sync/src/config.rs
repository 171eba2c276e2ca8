//! Sync configuration.

use chrono::Duration;
use sokoni_core::config::env_parse;

/// Hard ceiling on rows returned by a single pull per collection.
pub const MAX_PULL_LIMIT: usize = 500;

/// Hard ceiling on rows enumerated for one chunked-pull window.
pub const MAX_WINDOW_ROWS: usize = 10_000;

/// Sync core tuning.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Rows per collection in one pull when the client does not say.
    ///
    /// Default: 100
    pub default_limit: usize,

    /// Queue items claimed per worker pass.
    ///
    /// Default: 50 (`SYNC_BATCH_SIZE`)
    pub batch_size: usize,

    /// Background worker count.
    ///
    /// Default: 2 (`SYNC_WORKERS`)
    pub workers: usize,

    /// Interval between claim passes.
    ///
    /// Default: 30 seconds
    pub claim_interval: Duration,

    /// Retry policy for failed queue items.
    pub retry: RetryPolicy,

    /// Age at which completed items are swept.
    ///
    /// Default: 24 hours
    pub completed_retention: Duration,

    /// Age at which metrics rows are swept.
    ///
    /// Default: 30 days
    pub metrics_retention: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            default_limit: 100,
            batch_size: 50,
            workers: 2,
            claim_interval: Duration::seconds(30),
            retry: RetryPolicy::default(),
            completed_retention: Duration::hours(24),
            metrics_retention: Duration::days(30),
        }
    }
}

impl SyncConfig {
    /// Load from the environment, falling back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            default_limit: 100,
            batch_size: env_parse("SYNC_BATCH_SIZE", 50),
            workers: env_parse("SYNC_WORKERS", 2),
            claim_interval: Duration::seconds(env_parse("SYNC_CLAIM_INTERVAL", 30)),
            retry: RetryPolicy::from_env(),
            completed_retention: Duration::hours(env_parse("SYNC_COMPLETED_RETENTION_HOURS", 24)),
            metrics_retention: Duration::days(30),
        }
    }

    /// Set the worker count.
    #[must_use]
    pub const fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the claim interval.
    #[must_use]
    pub const fn with_claim_interval(mut self, interval: Duration) -> Self {
        self.claim_interval = interval;
        self
    }

    /// Set the retry policy.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Clamp a client-requested limit into range.
    #[must_use]
    pub fn clamp_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_limit)
            .clamp(1, MAX_PULL_LIMIT)
    }
}

/// Exponential backoff with optional ±10 % jitter.
///
/// `delay(n) = min(base × (n + 1) × multiplier, max)` for retry count `n`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Base delay before scaling.
    ///
    /// Default: 1 second (`SYNC_BASE_DELAY`)
    pub base_delay: Duration,

    /// Backoff multiplier.
    ///
    /// Default: 2.0 (`SYNC_MULTIPLIER`)
    pub multiplier: f64,

    /// Delay ceiling.
    ///
    /// Default: 30 seconds (`SYNC_MAX_DELAY`)
    pub max_delay: Duration,

    /// Attempt ceiling.
    ///
    /// Default: 3 (`SYNC_MAX_RETRIES`)
    pub max_retries: u32,

    /// Spread delays ±10 % to avoid thundering herds.
    ///
    /// Default: true (`SYNC_JITTER`)
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::seconds(1),
            multiplier: 2.0,
            max_delay: Duration::seconds(30),
            max_retries: 3,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Load from the environment, falling back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            base_delay: Duration::milliseconds(env_parse("SYNC_BASE_DELAY", 1000)),
            multiplier: env_parse("SYNC_MULTIPLIER", 2.0),
            max_delay: Duration::milliseconds(env_parse("SYNC_MAX_DELAY", 30_000)),
            max_retries: env_parse("SYNC_MAX_RETRIES", 3),
            jitter: env_parse("SYNC_JITTER", 1u8) != 0,
        }
    }

    /// Delay before the attempt following retry count `n`, without jitter.
    #[must_use]
    pub fn raw_delay(&self, retry_count: u32) -> Duration {
        let scaled_ms = (self.base_delay.num_milliseconds() as f64)
            * f64::from(retry_count + 1)
            * self.multiplier;
        let capped = scaled_ms.min(self.max_delay.num_milliseconds() as f64);
        Duration::milliseconds(capped as i64)
    }

    /// Delay with jitter applied when enabled: uniform in ±10 % of the raw
    /// delay.
    #[must_use]
    pub fn delay(&self, retry_count: u32) -> Duration {
        let raw = self.raw_delay(retry_count);
        if !self.jitter {
            return raw;
        }
        use rand::Rng as _;
        let raw_ms = raw.num_milliseconds() as f64;
        let spread = raw_ms * 0.1;
        let offset = rand::thread_rng().gen_range(-spread..=spread);
        Duration::milliseconds((raw_ms + offset).max(0.0) as i64)
    }

    /// `true` when an item with this retry count has budget left.
    #[must_use]
    pub const fn can_retry(&self, retry_count: u32) -> bool {
        retry_count < self.max_retries
    }
}
