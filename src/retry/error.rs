//! Error types for retry operations.

use std::time::Duration;

/// Error returned when a run gave up on its work.
///
/// Carries only the error from the final attempt; errors from earlier attempts
/// are reported through the `on_retry` hook and then dropped.
///
/// # Examples
///
/// ```rust
/// use resync::{Outcome, RetryPolicy, RetryRunner};
/// use tokio_util::sync::CancellationToken;
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let policy = RetryPolicy::constant(Duration::from_millis(1)).with_max_attempts(3);
/// let mut runner = RetryRunner::new(policy).unwrap();
///
/// let outcome = runner
///     .run(|| async { Err::<(), _>("always fails") }, &CancellationToken::new())
///     .await;
///
/// match outcome {
///     Outcome::Failed(exhausted) => {
///         assert_eq!(exhausted.final_error, "always fails");
///         assert_eq!(exhausted.attempts, 3);
///     }
///     other => panic!("Expected failure, got {:?}", other),
/// }
/// # });
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryExhausted<E> {
    /// The error from the final attempt.
    pub final_error: E,
    /// Total number of attempts made.
    pub attempts: u32,
    /// Total time spent, waits included.
    pub total_duration: Duration,
}

impl<E> RetryExhausted<E> {
    /// Create a new RetryExhausted error.
    pub fn new(final_error: E, attempts: u32, total_duration: Duration) -> Self {
        Self {
            final_error,
            attempts,
            total_duration,
        }
    }

    /// Extract the final error, discarding metadata.
    pub fn into_error(self) -> E {
        self.final_error
    }

    /// Get a reference to the final error.
    pub fn error(&self) -> &E {
        &self.final_error
    }
}

impl<E: std::fmt::Display> std::fmt::Display for RetryExhausted<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "retry exhausted after {} attempts ({:?}): {}",
            self.attempts, self.total_duration, self.final_error
        )
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RetryExhausted<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.final_error)
    }
}

/// A run stopped because its cancellation token was signaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled {
    /// Attempts that were invoked before cancellation was observed.
    pub attempts: u32,
    /// Time from the start of the run until cancellation was observed.
    pub elapsed: Duration,
}

impl Cancelled {
    /// Create a new Cancelled marker.
    pub fn new(attempts: u32, elapsed: Duration) -> Self {
        Self { attempts, elapsed }
    }
}

impl std::fmt::Display for Cancelled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "run cancelled after {} attempts ({:?})",
            self.attempts, self.elapsed
        )
    }
}

impl std::error::Error for Cancelled {}

/// The terminal failure of a run, for callers that want a `Result`.
///
/// Keeps "gave up after exhausting attempts" and "gave up on request" apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError<E> {
    /// Every allowed attempt failed, or the last error was not retryable.
    Exhausted(RetryExhausted<E>),
    /// The cancellation token was signaled.
    Cancelled(Cancelled),
}

impl<E> RetryError<E> {
    /// Returns true if the run was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Returns true if the run gave up after failing.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted(_))
    }

    /// Get the final work error, if the run failed rather than being cancelled.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Exhausted(e) => Some(e.final_error),
            Self::Cancelled(_) => None,
        }
    }

    /// Number of attempts made before the run settled.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted(e) => e.attempts,
            Self::Cancelled(c) => c.attempts,
        }
    }
}

impl<E: std::fmt::Display> std::fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exhausted(e) => write!(f, "{}", e),
            Self::Cancelled(c) => write!(f, "{}", c),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Exhausted(e) => Some(e),
            Self::Cancelled(c) => Some(c),
        }
    }
}

/// A retry policy that violates its invariants.
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyError {
    /// `max_attempts` was zero; at least one attempt is required.
    ZeroAttempts,
    /// The proportional jitter factor was not a finite number.
    InvalidJitter(f64),
}

impl std::fmt::Display for PolicyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ZeroAttempts => write!(f, "retry policy must allow at least one attempt"),
            Self::InvalidJitter(factor) => write!(f, "invalid jitter factor: {}", factor),
        }
    }
}

impl std::error::Error for PolicyError {}

/// Error returned when an attempt times out.
///
/// Can wrap either a timeout or an inner error from the work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeoutError<E> {
    /// The attempt timed out.
    Timeout {
        /// The timeout duration that was exceeded.
        duration: Duration,
    },
    /// The work failed before the timeout.
    Inner(E),
}

impl<E> TimeoutError<E> {
    /// Create a timeout error.
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout { duration }
    }

    /// Create an inner error.
    pub fn inner(error: E) -> Self {
        Self::Inner(error)
    }

    /// Returns true if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns true if this is an inner error.
    pub fn is_inner(&self) -> bool {
        matches!(self, Self::Inner(_))
    }

    /// Get the inner error if present.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            Self::Timeout { .. } => None,
        }
    }
}

impl<E: std::fmt::Display> std::fmt::Display for TimeoutError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout { duration } => write!(f, "attempt timed out after {:?}", duration),
            Self::Inner(e) => write!(f, "{}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for TimeoutError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Timeout { .. } => None,
            Self::Inner(e) => Some(e),
        }
    }
}
