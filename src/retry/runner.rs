//! The bounded-retry loop.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::error::{Cancelled, PolicyError, RetryExhausted};
use super::outcome::Outcome;
use super::policy::{RetryEvent, RetryPolicy};
use super::state::{RunState, StatePublisher, StateWatch};

type RetryPredicate<E> = Box<dyn Fn(&E) -> bool + Send + Sync>;
type RetryHook<E> = Box<dyn Fn(&RetryEvent<'_, E>) + Send + Sync>;

/// Runs a unit of work until it succeeds, runs out of attempts, or is cancelled.
///
/// Attempts are strictly sequential. Between attempts the runner sleeps for the
/// delay computed by its [`RetryPolicy`], and that sleep races against the
/// cancellation token so a cancel request wakes it immediately. Cancellation is
/// also checked before every attempt, but an attempt that is already running
/// is never interrupted.
///
/// A runner is single-writer: [`run`](Self::run) takes `&mut self`, so it cannot
/// drive two sequences at once. Independent runners share nothing and may run
/// concurrently.
///
/// # Example
///
/// ```rust
/// use resync::{Outcome, RetryPolicy, RetryRunner};
/// use tokio_util::sync::CancellationToken;
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let calls = AtomicU32::new(0);
/// let calls = &calls;
/// let mut runner = RetryRunner::new(
///     RetryPolicy::linear(Duration::from_millis(1)).with_max_attempts(3),
/// )
/// .unwrap();
///
/// let outcome = runner
///     .run(
///         move || async move {
///             if calls.fetch_add(1, Ordering::SeqCst) == 0 {
///                 Err("net error")
///             } else {
///                 Ok("synced")
///             }
///         },
///         &CancellationToken::new(),
///     )
///     .await;
///
/// assert_eq!(outcome, Outcome::Succeeded { value: "synced", attempts: 2 });
/// # });
/// ```
pub struct RetryRunner<E> {
    policy: RetryPolicy,
    should_retry: RetryPredicate<E>,
    on_retry: Option<RetryHook<E>>,
    state: StatePublisher<E>,
}

impl<E> fmt::Debug for RetryRunner<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryRunner")
            .field("policy", &self.policy)
            .field("has_retry_hook", &self.on_retry.is_some())
            .finish_non_exhaustive()
    }
}

impl<E> RetryRunner<E> {
    /// Create an idle runner for the given policy.
    ///
    /// Fails if the policy does not allow at least one attempt.
    pub fn new(policy: RetryPolicy) -> Result<Self, PolicyError> {
        policy.validate()?;
        Ok(Self::from_validated(policy))
    }

    /// Callers must have validated `policy`.
    pub(crate) fn from_validated(policy: RetryPolicy) -> Self {
        Self {
            policy,
            should_retry: Box::new(|_| true),
            on_retry: None,
            state: StatePublisher::new(),
        }
    }

    /// Only retry errors for which the predicate returns true.
    ///
    /// A rejected error settles the run as failed right away, with no wait.
    /// By default every error is retried.
    pub fn retry_if<P>(mut self, should_retry: P) -> Self
    where
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Box::new(should_retry);
        self
    }

    /// Call `hook` after each failed attempt that is about to be retried.
    ///
    /// The hook is synchronous and runs before the wait; use it for logging or
    /// metrics, not for blocking work.
    pub fn on_retry<H>(mut self, hook: H) -> Self
    where
        H: Fn(&RetryEvent<'_, E>) + Send + Sync + 'static,
    {
        self.on_retry = Some(Box::new(hook));
        self
    }

    /// The policy this runner applies.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// A handle for observing state transitions from other tasks.
    pub fn watch(&self) -> StateWatch<E> {
        self.state.watch()
    }

    /// Return the runner to `Idle`.
    pub fn reset(&mut self) {
        if !self.state.is_idle() {
            self.state.publish(RunState::Idle);
        }
    }
}

impl<E: Clone> RetryRunner<E> {
    /// The latest state snapshot.
    pub fn state(&self) -> RunState<E> {
        self.state.watch().current()
    }

    /// Run `work` under this runner's policy until it settles.
    ///
    /// Always returns a settled [`Outcome`]; work failures are never propagated
    /// any other way. Only the last error is kept. Calling `run` again on a
    /// settled runner starts a fresh run.
    ///
    /// If the returned future is dropped before it settles, for example by an
    /// outer `tokio::time::timeout`, the runner publishes
    /// [`RunState::Cancelled`] with the attempts invoked so far, so watchers
    /// still see a terminal state.
    pub async fn run<T, F, Fut>(&mut self, mut work: F, cancel: &CancellationToken) -> Outcome<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let start = Instant::now();
        #[cfg(feature = "tracing")]
        let max_attempts = self.policy.max_attempts();
        let mut attempt = 1u32;
        let mut prev_delay: Option<Duration> = None;

        self.state.publish(RunState::Running { attempt });
        let mut abandoned = SettleOnDrop::new(&self.state);

        loop {
            if cancel.is_cancelled() {
                abandoned.disarm();
                return self.settle_cancelled(attempt - 1, start);
            }

            #[cfg(feature = "tracing")]
            tracing::debug!(attempt, max_attempts, "starting attempt");

            abandoned.attempts = attempt;
            let result = work().await;
            abandoned.disarm();

            let error = match result {
                Ok(value) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(attempt, elapsed = ?start.elapsed(), "work succeeded");

                    self.state.publish(RunState::Succeeded { attempts: attempt });
                    return Outcome::Succeeded {
                        value,
                        attempts: attempt,
                    };
                }
                Err(error) => error,
            };

            let delay = if (self.should_retry)(&error) {
                self.policy.delay_with_jitter(attempt, prev_delay)
            } else {
                #[cfg(feature = "tracing")]
                tracing::debug!(attempt, "error is not retryable");
                None
            };

            let Some(delay) = delay else {
                #[cfg(feature = "tracing")]
                tracing::error!(attempt, max_attempts, elapsed = ?start.elapsed(), "giving up on work");

                self.state.publish(RunState::Failed {
                    attempts: attempt,
                    error: error.clone(),
                });
                return Outcome::Failed(RetryExhausted::new(error, attempt, start.elapsed()));
            };

            if let Some(hook) = &self.on_retry {
                hook(&RetryEvent {
                    attempt,
                    error: &error,
                    next_delay: delay,
                    elapsed: start.elapsed(),
                });
            }

            #[cfg(feature = "tracing")]
            tracing::warn!(attempt, max_attempts, next_delay = ?delay, "attempt failed, retrying");

            // Not held across the wait.
            drop(error);

            abandoned.arm();
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    abandoned.disarm();
                    return self.settle_cancelled(attempt, start);
                }
                _ = tokio::time::sleep(delay) => {}
            }

            prev_delay = Some(delay);
            attempt += 1;
            self.state.publish(RunState::Running { attempt });
        }
    }

    fn settle_cancelled<T>(&self, attempts: u32, start: Instant) -> Outcome<T, E> {
        #[cfg(feature = "tracing")]
        tracing::info!(attempts, elapsed = ?start.elapsed(), "run cancelled");

        self.state.publish(RunState::Cancelled { attempts });
        Outcome::Cancelled(Cancelled::new(attempts, start.elapsed()))
    }
}

/// Publishes `Cancelled` if a run future is dropped while armed.
struct SettleOnDrop<'a, E> {
    state: &'a StatePublisher<E>,
    attempts: u32,
    armed: bool,
}

impl<'a, E> SettleOnDrop<'a, E> {
    fn new(state: &'a StatePublisher<E>) -> Self {
        Self {
            state,
            attempts: 0,
            armed: true,
        }
    }

    fn arm(&mut self) {
        self.armed = true;
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl<E> Drop for SettleOnDrop<'_, E> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        #[cfg(feature = "tracing")]
        tracing::info!(attempts = self.attempts, "run abandoned before settling");

        self.state.publish(RunState::Cancelled {
            attempts: self.attempts,
        });
    }
}
