//! Plain-data configuration.
//!
//! These structs are what a host application loads from its own settings and
//! turns into a [`RetryPolicy`] or a [`SyncEngine`](crate::SyncEngine). With the
//! `serde` feature they deserialize from any serde format; every field has a
//! default, so partial documents are fine.
//!
//! ```rust
//! use resync::config::{BackoffKind, RetryConfig};
//! use std::time::Duration;
//!
//! let config = RetryConfig {
//!     backoff: BackoffKind::Exponential,
//!     base_delay_ms: 250,
//!     ..RetryConfig::default()
//! };
//!
//! let policy = config.to_policy().unwrap();
//! assert_eq!(policy.delay_for_attempt(2), Some(Duration::from_millis(500)));
//! ```

use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::retry::{PolicyError, RetryPolicy, DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS};

/// Default interval between periodic sync runs.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Default unique name of the periodic sync job.
pub const DEFAULT_SYNC_JOB: &str = "periodic-sync";

/// Named backoff strategies available from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum BackoffKind {
    /// Same delay every time.
    Constant,
    /// `base * attempt`.
    #[default]
    Linear,
    /// `base * 2^(attempt - 1)`.
    Exponential,
    /// `base * fib(attempt)`.
    Fibonacci,
}

/// Retry settings.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RetryConfig {
    /// Attempts per run, the first one included.
    pub max_attempts: u32,
    /// Base delay in milliseconds.
    pub base_delay_ms: u64,
    /// How the delay grows with each failed attempt.
    pub backoff: BackoffKind,
    /// Optional cap on any single delay, in milliseconds.
    pub max_delay_ms: Option<u64>,
    /// Optional proportional jitter factor (0.0 to 1.0).
    pub jitter: Option<f64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY.as_millis() as u64,
            backoff: BackoffKind::Linear,
            max_delay_ms: None,
            jitter: None,
        }
    }
}

impl RetryConfig {
    /// Build and validate the policy these settings describe.
    pub fn to_policy(&self) -> Result<RetryPolicy, PolicyError> {
        let base = Duration::from_millis(self.base_delay_ms);
        let mut policy = match self.backoff {
            BackoffKind::Constant => RetryPolicy::constant(base),
            BackoffKind::Linear => RetryPolicy::linear(base),
            BackoffKind::Exponential => RetryPolicy::exponential(base),
            BackoffKind::Fibonacci => RetryPolicy::fibonacci(base),
        }
        .with_max_attempts(self.max_attempts);

        if let Some(max) = self.max_delay_ms {
            policy = policy.with_max_delay(Duration::from_millis(max));
        }
        if let Some(factor) = self.jitter {
            if !factor.is_finite() {
                return Err(PolicyError::InvalidJitter(factor));
            }
            policy = policy.with_jitter(factor);
        }

        policy.validate()?;
        Ok(policy)
    }
}

/// Sync engine settings.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SyncConfig {
    /// Retry behavior for every sync run.
    pub retry: RetryConfig,
    /// Seconds between periodic sync runs.
    pub interval_secs: u64,
    /// Unique name of the periodic job; re-enqueuing under it replaces the old job.
    pub job_name: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            interval_secs: DEFAULT_SYNC_INTERVAL.as_secs(),
            job_name: DEFAULT_SYNC_JOB.to_string(),
        }
    }
}

impl SyncConfig {
    /// Interval between periodic runs.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}
