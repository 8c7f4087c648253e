//! Retry policy types and configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::error::PolicyError;

/// Default number of attempts (initial attempt included).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay between attempts.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// A retry policy describing how to retry failed work.
///
/// Policies are pure data - they describe retry behavior but don't execute it.
/// The [`RetryRunner`](super::RetryRunner) executes them.
///
/// `max_attempts` counts every invocation of the work, including the first.
/// A policy with `max_attempts == 0` is invalid and rejected by
/// [`RetryPolicy::validate`].
///
/// # Examples
///
/// ```rust
/// use resync::RetryPolicy;
/// use std::time::Duration;
///
/// // Linear backoff: wait base * attempt after each failed attempt.
/// let policy = RetryPolicy::linear(Duration::from_millis(1000))
///     .with_max_attempts(3);
///
/// assert_eq!(policy.max_attempts(), 3);
/// assert_eq!(policy.delay_for_attempt(1), Some(Duration::from_millis(1000)));
/// assert_eq!(policy.delay_for_attempt(2), Some(Duration::from_millis(2000)));
/// assert_eq!(policy.delay_for_attempt(3), None); // attempts exhausted
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    strategy: RetryStrategy,
    max_attempts: u32,
    max_delay: Option<Duration>,
    jitter: JitterStrategy,
}

/// The backoff strategy for retry delays.
///
/// Delays are computed from the 1-indexed number of the attempt that just failed.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryStrategy {
    /// Fixed delay between attempts.
    Constant(Duration),
    /// Delay increases linearly: base * attempt.
    Linear {
        /// Base delay duration.
        base: Duration,
    },
    /// Delay doubles: base * 2^(attempt - 1).
    Exponential {
        /// Base delay duration.
        base: Duration,
    },
    /// Delay follows Fibonacci sequence: base * fib(attempt).
    Fibonacci {
        /// Base delay duration.
        base: Duration,
    },
    /// Caller-supplied backoff function.
    Custom(BackoffFn),
}

/// A caller-supplied backoff function mapping a failed attempt number to a delay.
///
/// Two `BackoffFn`s compare equal only if they share the same allocation.
#[derive(Clone)]
pub struct BackoffFn(Arc<dyn Fn(u32) -> Duration + Send + Sync>);

impl BackoffFn {
    /// Wrap a backoff function.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Compute the delay after `attempt` failed.
    pub fn delay(&self, attempt: u32) -> Duration {
        (self.0)(attempt)
    }
}

impl fmt::Debug for BackoffFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BackoffFn(..)")
    }
}

impl PartialEq for BackoffFn {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Strategy for adding randomness to delays.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum JitterStrategy {
    /// No jitter applied.
    #[default]
    None,
    /// Add ±percentage randomness to delay.
    Proportional(f64),
    /// Random delay between 0 and calculated delay.
    Full,
    /// Random delay between the calculated delay and 3x the previous delay.
    Decorrelated,
}

/// Information about a failed attempt that is about to be retried.
#[derive(Debug, Clone)]
pub struct RetryEvent<'a, E> {
    /// Which attempt just failed (1-indexed).
    pub attempt: u32,
    /// The error from the failed attempt.
    pub error: &'a E,
    /// Delay before the next attempt.
    pub next_delay: Duration,
    /// Total elapsed time since the first attempt.
    pub elapsed: Duration,
}

impl Default for RetryPolicy {
    /// Linear backoff from [`DEFAULT_BASE_DELAY`] with [`DEFAULT_MAX_ATTEMPTS`].
    fn default() -> Self {
        Self::linear(DEFAULT_BASE_DELAY).with_max_attempts(DEFAULT_MAX_ATTEMPTS)
    }
}

impl RetryPolicy {
    fn with_strategy(strategy: RetryStrategy) -> Self {
        Self {
            strategy,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_delay: None,
            jitter: JitterStrategy::None,
        }
    }

    /// Create a policy with constant delay between attempts.
    ///
    /// ```rust
    /// use resync::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::constant(Duration::from_millis(500))
    ///     .with_max_attempts(3);
    ///
    /// assert_eq!(policy.delay_for_attempt(1), Some(Duration::from_millis(500)));
    /// assert_eq!(policy.delay_for_attempt(2), Some(Duration::from_millis(500)));
    /// assert_eq!(policy.delay_for_attempt(3), None);
    /// ```
    pub fn constant(delay: Duration) -> Self {
        Self::with_strategy(RetryStrategy::Constant(delay))
    }

    /// Create a policy with linearly increasing delay.
    ///
    /// Delay = base * attempt
    pub fn linear(base: Duration) -> Self {
        Self::with_strategy(RetryStrategy::Linear { base })
    }

    /// Create a policy with exponentially increasing delay.
    ///
    /// Delay = base * 2^(attempt - 1)
    ///
    /// ```rust
    /// use resync::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::exponential(Duration::from_millis(100))
    ///     .with_max_attempts(5);
    ///
    /// assert_eq!(policy.delay_for_attempt(1), Some(Duration::from_millis(100)));
    /// assert_eq!(policy.delay_for_attempt(2), Some(Duration::from_millis(200)));
    /// assert_eq!(policy.delay_for_attempt(3), Some(Duration::from_millis(400)));
    /// ```
    pub fn exponential(base: Duration) -> Self {
        Self::with_strategy(RetryStrategy::Exponential { base })
    }

    /// Create a policy with Fibonacci-based delay.
    ///
    /// Delay = base * fib(attempt)
    pub fn fibonacci(base: Duration) -> Self {
        Self::with_strategy(RetryStrategy::Fibonacci { base })
    }

    /// Create a policy with a caller-supplied backoff function.
    ///
    /// ```rust
    /// use resync::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::custom(|attempt| Duration::from_secs(u64::from(attempt) * 10))
    ///     .with_max_attempts(4);
    ///
    /// assert_eq!(policy.delay_for_attempt(2), Some(Duration::from_secs(20)));
    /// ```
    pub fn custom<F>(backoff: F) -> Self
    where
        F: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        Self::with_strategy(RetryStrategy::Custom(BackoffFn::new(backoff)))
    }

    /// Set the maximum number of attempts, initial attempt included.
    pub fn with_max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    /// Set the maximum delay cap.
    ///
    /// Delays will never exceed this value, regardless of strategy or jitter.
    pub fn with_max_delay(mut self, d: Duration) -> Self {
        self.max_delay = Some(d);
        self
    }

    /// Add proportional jitter to delays.
    ///
    /// `0.25` means the actual delay will be within ±25% of the calculated one.
    /// The factor is clamped to `0.0..=1.0`.
    ///
    /// **Note**: Requires the `jitter` feature. Without it, this setting is inert.
    pub fn with_jitter(mut self, factor: f64) -> Self {
        self.jitter = JitterStrategy::Proportional(factor.clamp(0.0, 1.0));
        self
    }

    /// Use full jitter: a random delay between 0 and the calculated delay.
    ///
    /// **Note**: Requires the `jitter` feature.
    pub fn with_full_jitter(mut self) -> Self {
        self.jitter = JitterStrategy::Full;
        self
    }

    /// Use decorrelated jitter.
    ///
    /// **Note**: Requires the `jitter` feature.
    pub fn with_decorrelated_jitter(mut self) -> Self {
        self.jitter = JitterStrategy::Decorrelated;
        self
    }

    /// Get the maximum number of attempts.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Get the maximum delay cap.
    pub fn max_delay(&self) -> Option<Duration> {
        self.max_delay
    }

    /// Get the jitter strategy.
    pub fn jitter(&self) -> &JitterStrategy {
        &self.jitter
    }

    /// Get the retry strategy.
    pub fn strategy(&self) -> &RetryStrategy {
        &self.strategy
    }

    /// Calculate the delay to wait after attempt N (1-indexed) failed.
    ///
    /// Returns `None` when attempt N was the last one allowed, or for attempt 0.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt >= self.max_attempts {
            return None;
        }

        let base_delay = match &self.strategy {
            RetryStrategy::Constant(d) => *d,
            RetryStrategy::Linear { base } => base.saturating_mul(attempt),
            RetryStrategy::Exponential { base } => {
                base.saturating_mul(2u32.saturating_pow(attempt - 1))
            }
            RetryStrategy::Fibonacci { base } => base.saturating_mul(fibonacci(attempt)),
            RetryStrategy::Custom(f) => f.delay(attempt),
        };

        Some(cap(base_delay, self.max_delay))
    }

    /// Calculate the delay with jitter applied.
    ///
    /// This is used internally by the retry runner.
    #[doc(hidden)]
    pub fn delay_with_jitter(
        &self,
        attempt: u32,
        prev_delay: Option<Duration>,
    ) -> Option<Duration> {
        let base_delay = self.delay_for_attempt(attempt)?;
        Some(self.jitter.apply(base_delay, prev_delay, self.max_delay))
    }

    /// Validate the policy invariants.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.max_attempts == 0 {
            return Err(PolicyError::ZeroAttempts);
        }
        if let JitterStrategy::Proportional(factor) = self.jitter {
            if !factor.is_finite() {
                return Err(PolicyError::InvalidJitter(factor));
            }
        }
        Ok(())
    }
}

impl JitterStrategy {
    /// Apply jitter to a base delay.
    ///
    /// # Arguments
    ///
    /// * `base_delay` - The calculated delay before jitter
    /// * `prev_delay` - The previous delay (for decorrelated jitter)
    /// * `max_delay` - Optional cap on the final delay
    pub fn apply(
        &self,
        base_delay: Duration,
        #[cfg_attr(not(feature = "jitter"), allow(unused_variables))] prev_delay: Option<Duration>,
        max_delay: Option<Duration>,
    ) -> Duration {
        let jittered = match self {
            JitterStrategy::None => base_delay,
            #[cfg(feature = "jitter")]
            JitterStrategy::Proportional(factor) => {
                use rand::Rng;
                let base_millis = base_delay.as_millis() as f64;
                let spread = base_millis * factor;
                let min = (base_millis - spread).max(0.0);
                let max = base_millis + spread;
                if max <= min {
                    base_delay
                } else {
                    Duration::from_millis(rand::rng().random_range(min..=max) as u64)
                }
            }
            #[cfg(not(feature = "jitter"))]
            JitterStrategy::Proportional(_) => base_delay,
            #[cfg(feature = "jitter")]
            JitterStrategy::Full => {
                use rand::Rng;
                let max_millis = saturating_millis(base_delay.as_millis());
                if max_millis == 0 {
                    Duration::ZERO
                } else {
                    Duration::from_millis(rand::rng().random_range(0..=max_millis))
                }
            }
            #[cfg(not(feature = "jitter"))]
            JitterStrategy::Full => base_delay,
            #[cfg(feature = "jitter")]
            JitterStrategy::Decorrelated => {
                use rand::Rng;
                let prev = prev_delay.unwrap_or(base_delay);
                let base_millis = saturating_millis(base_delay.as_millis());
                let max_millis = saturating_millis(prev.as_millis().saturating_mul(3));
                if max_millis <= base_millis {
                    base_delay
                } else {
                    Duration::from_millis(rand::rng().random_range(base_millis..=max_millis))
                }
            }
            #[cfg(not(feature = "jitter"))]
            JitterStrategy::Decorrelated => base_delay,
        };

        cap(jittered, max_delay)
    }
}

#[cfg(feature = "jitter")]
fn saturating_millis(millis: u128) -> u64 {
    u64::try_from(millis).unwrap_or(u64::MAX)
}

fn cap(delay: Duration, max_delay: Option<Duration>) -> Duration {
    match max_delay {
        Some(max) => delay.min(max),
        None => delay,
    }
}

/// Calculate the nth Fibonacci number, saturating.
fn fibonacci(n: u32) -> u32 {
    if n == 0 {
        return 0;
    }
    let mut a = 0u32;
    let mut b = 1u32;
    for _ in 1..n {
        let next = a.saturating_add(b);
        a = b;
        b = next;
    }
    b
}
