//! # resync
//!
//! Bounded retries for async work, with backoff, cancellation, and periodic
//! background sync.
//!
//! The crate never performs I/O on its own. The caller hands it a *unit of
//! work* (any `FnMut() -> impl Future<Output = Result<T, E>>`) and gets back a
//! settled [`Outcome`]: the success value, the last error after attempts ran
//! out, or cancellation.
//!
//! ## Quick Example
//!
//! ```rust
//! use resync::{Outcome, RetryPolicy, RetryRunner};
//! use tokio_util::sync::CancellationToken;
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! // Up to 3 attempts, waiting 1ms then 2ms between them.
//! let policy = RetryPolicy::linear(Duration::from_millis(1)).with_max_attempts(3);
//! let mut runner = RetryRunner::new(policy).unwrap();
//! let cancel = CancellationToken::new();
//!
//! let outcome = runner
//!     .run(|| async { Err::<(), _>("net error") }, &cancel)
//!     .await;
//!
//! match outcome {
//!     Outcome::Failed(exhausted) => {
//!         assert_eq!(exhausted.final_error, "net error");
//!         assert_eq!(exhausted.attempts, 3);
//!     }
//!     other => panic!("unexpected {:?}", other),
//! }
//! # });
//! ```
//!
//! ## Layout
//!
//! - [`retry`]: policies, the runner, outcomes, and observable run state
//! - [`sync`]: [`SyncEngine`], which scopes runs and the periodic job under one token
//! - [`schedule`]: [`PeriodicScheduler`], named periodic jobs that replace on re-enqueue
//! - [`config`]: plain-data settings, deserializable with the `serde` feature
//! - [`testing`]: scripted work and outcome assertions for tests
//!
//! ## Features
//!
//! - `tracing`: emit `tracing` events for attempts, retries, and cancellation
//! - `jitter`: randomized delays via `rand`
//! - `serde`: `Serialize`/`Deserialize` for the [`config`] types
//! - `proptest`: `Arbitrary` for [`RetryPolicy`]

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod config;
pub mod retry;
pub mod schedule;
pub mod sync;
pub mod testing;

// Re-exports
pub use config::{RetryConfig, SyncConfig};
pub use retry::{
    Outcome, PolicyError, RetryError, RetryEvent, RetryExhausted, RetryPolicy, RetryRunner,
    RetryStrategy, RunState, StateWatch, TimeoutError,
};
pub use schedule::{PeriodicScheduler, ScheduleError};
pub use sync::SyncEngine;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{RetryConfig, SyncConfig};
    pub use crate::retry::{
        with_timeout, Cancelled, Outcome, RetryError, RetryExhausted, RetryPolicy, RetryRunner,
        RunState,
    };
    pub use crate::schedule::PeriodicScheduler;
    pub use crate::sync::SyncEngine;
    pub use tokio_util::sync::CancellationToken;
}
