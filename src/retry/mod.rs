//! Bounded retries with backoff and cancellation.
//!
//! - [`RetryPolicy`] is plain data: how many attempts, and how long to wait
//!   after each failed one.
//! - [`RetryRunner`] executes a unit of work under a policy, observing a
//!   [`CancellationToken`](tokio_util::sync::CancellationToken) before every
//!   attempt and during every wait.
//! - [`Outcome`] is the settled result; [`RunState`] snapshots are published
//!   on every transition and can be watched through a [`StateWatch`].
//!
//! # Quick Start
//!
//! ```rust
//! use resync::{Outcome, RetryPolicy, RetryRunner};
//! use tokio_util::sync::CancellationToken;
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let policy = RetryPolicy::exponential(Duration::from_millis(1)).with_max_attempts(4);
//! let mut runner = RetryRunner::new(policy).unwrap();
//!
//! let outcome = runner
//!     .run(|| async { Ok::<_, String>(42) }, &CancellationToken::new())
//!     .await;
//!
//! assert_eq!(outcome.value(), Some(&42));
//! assert_eq!(outcome.attempts(), 1);
//! # });
//! ```
//!
//! # Backoff Strategies
//!
//! - **Constant**: Fixed delay between attempts
//! - **Linear**: Delay grows with the attempt number (1s, 2s, 3s, ...), the default
//! - **Exponential**: Delay doubles each attempt (100ms, 200ms, 400ms, ...)
//! - **Fibonacci**: Delay follows the Fibonacci sequence
//! - **Custom**: Any `Fn(u32) -> Duration`
//!
//! Jitter is available with the `jitter` feature.

mod error;
mod outcome;
mod policy;
mod runner;
mod state;
mod timeout;

pub use error::{Cancelled, PolicyError, RetryError, RetryExhausted, TimeoutError};
pub use outcome::Outcome;
pub use policy::{
    BackoffFn, JitterStrategy, RetryEvent, RetryPolicy, RetryStrategy, DEFAULT_BASE_DELAY,
    DEFAULT_MAX_ATTEMPTS,
};
pub use runner::RetryRunner;
pub use state::{RunState, StateWatch};
pub use timeout::with_timeout;

#[cfg(test)]
mod tests;
