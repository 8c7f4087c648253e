//! The settled result of a retry run.

use super::error::{Cancelled, RetryError, RetryExhausted};

/// The terminal result of a run: a success value, the last error, or cancellation.
///
/// Returned exactly once per run by [`RetryRunner::run`](super::RetryRunner::run).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T, E> {
    /// The work succeeded.
    Succeeded {
        /// The value produced by the successful attempt.
        value: T,
        /// Attempts made, the successful one included.
        attempts: u32,
    },
    /// The run gave up; carries the last error only.
    Failed(RetryExhausted<E>),
    /// The cancellation token was signaled before the run settled otherwise.
    Cancelled(Cancelled),
}

impl<T, E> Outcome<T, E> {
    /// Returns true if the work succeeded.
    pub fn is_succeeded(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    /// Returns true if the run gave up after failing.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Returns true if the run was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Number of times the work was invoked.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Succeeded { attempts, .. } => *attempts,
            Self::Failed(e) => e.attempts,
            Self::Cancelled(c) => c.attempts,
        }
    }

    /// Get the success value, if any.
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Succeeded { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Get the last work error, if the run failed.
    pub fn error(&self) -> Option<&E> {
        match self {
            Self::Failed(e) => Some(&e.final_error),
            _ => None,
        }
    }

    /// Convert into a `Result`, keeping failure and cancellation distinct.
    ///
    /// ```rust
    /// use resync::{Outcome, RetryError};
    /// use resync::retry::Cancelled;
    /// use std::time::Duration;
    ///
    /// let ok: Outcome<i32, String> = Outcome::Succeeded { value: 7, attempts: 2 };
    /// assert_eq!(ok.into_result(), Ok(7));
    ///
    /// let cancelled: Outcome<i32, String> = Outcome::Cancelled(Cancelled::new(0, Duration::ZERO));
    /// assert!(matches!(cancelled.into_result(), Err(RetryError::Cancelled(_))));
    /// ```
    pub fn into_result(self) -> Result<T, RetryError<E>> {
        match self {
            Self::Succeeded { value, .. } => Ok(value),
            Self::Failed(e) => Err(RetryError::Exhausted(e)),
            Self::Cancelled(c) => Err(RetryError::Cancelled(c)),
        }
    }
}

impl<T, E> From<Outcome<T, E>> for Result<T, RetryError<E>> {
    fn from(outcome: Outcome<T, E>) -> Self {
        outcome.into_result()
    }
}
