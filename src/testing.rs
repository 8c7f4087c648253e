//! Testing utilities for code that drives retries.
//!
//! # ScriptedWork
//!
//! ```rust
//! use resync::testing::ScriptedWork;
//! use resync::{RetryPolicy, RetryRunner, assert_succeeded};
//! use tokio_util::sync::CancellationToken;
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let work = ScriptedWork::new(vec![Err("net error"), Ok("synced")]);
//! let mut runner = RetryRunner::new(
//!     RetryPolicy::constant(Duration::from_millis(1)).with_max_attempts(3),
//! )
//! .unwrap();
//!
//! let outcome = runner.run(|| work.call(), &CancellationToken::new()).await;
//!
//! assert_succeeded!(outcome, "synced");
//! assert_eq!(work.calls(), 2);
//! # });
//! ```

use std::collections::VecDeque;
use std::future::{ready, Ready};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::time::Instant;

/// A mock unit of work that replays a script of results.
///
/// Each call pops the next scripted result; once the script runs out the last
/// result is repeated. Clones share the script and the call log, so a clone
/// can be moved into a closure while the original is inspected afterwards.
#[derive(Debug)]
pub struct ScriptedWork<T, E> {
    inner: Arc<Mutex<Script<T, E>>>,
}

#[derive(Debug)]
struct Script<T, E> {
    pending: VecDeque<Result<T, E>>,
    last: Result<T, E>,
    calls: Vec<Instant>,
}

impl<T, E> Clone for ScriptedWork<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone, E: Clone> ScriptedWork<T, E> {
    /// Create work that returns `script` in order, then repeats the last entry.
    ///
    /// # Panics
    ///
    /// Panics if `script` is empty.
    pub fn new(mut script: Vec<Result<T, E>>) -> Self {
        let Some(last) = script.pop() else {
            panic!("ScriptedWork needs at least one result");
        };
        Self {
            inner: Arc::new(Mutex::new(Script {
                pending: script.into(),
                last,
                calls: Vec::new(),
            })),
        }
    }

    /// Work that fails with `error` on every call.
    pub fn always_failing(error: E) -> Self {
        Self::new(vec![Err(error)])
    }

    /// Work that fails `failures` times with `error`, then succeeds with `value`.
    pub fn succeeds_after(failures: usize, error: E, value: T) -> Self {
        let mut script: Vec<Result<T, E>> = vec![Err(error); failures];
        script.push(Ok(value));
        Self::new(script)
    }

    /// Invoke the work once.
    pub fn call(&self) -> Ready<Result<T, E>> {
        let mut script = self.lock();
        script.calls.push(Instant::now());
        let result = match script.pending.pop_front() {
            Some(next) => next,
            None => script.last.clone(),
        };
        ready(result)
    }
}

impl<T, E> ScriptedWork<T, E> {
    /// Number of times the work was invoked.
    pub fn calls(&self) -> u32 {
        self.lock().calls.len() as u32
    }

    /// Time between consecutive invocations.
    pub fn gaps(&self) -> Vec<std::time::Duration> {
        let script = self.lock();
        script
            .calls
            .windows(2)
            .map(|pair| pair[1].duration_since(pair[0]))
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Script<T, E>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Assert that an outcome succeeded, optionally with a specific value.
///
/// # Example
///
/// ```rust
/// use resync::{Outcome, assert_succeeded};
///
/// let outcome: Outcome<_, String> = Outcome::Succeeded { value: 42, attempts: 1 };
/// assert_succeeded!(outcome, 42);
/// ```
#[macro_export]
macro_rules! assert_succeeded {
    ($outcome:expr) => {
        match $outcome {
            $crate::Outcome::Succeeded { .. } => {}
            other => panic!("Expected Succeeded, got {:?}", other),
        }
    };
    ($outcome:expr, $expected:expr) => {
        match $outcome {
            $crate::Outcome::Succeeded { value, .. } => assert_eq!(value, $expected),
            other => panic!("Expected Succeeded, got {:?}", other),
        }
    };
}

/// Assert that an outcome failed, optionally with a specific last error.
///
/// # Example
///
/// ```rust
/// use resync::{Outcome, RetryExhausted, assert_failed};
/// use std::time::Duration;
///
/// let outcome: Outcome<(), _> =
///     Outcome::Failed(RetryExhausted::new("net error", 3, Duration::ZERO));
/// assert_failed!(outcome, "net error");
/// ```
#[macro_export]
macro_rules! assert_failed {
    ($outcome:expr) => {
        match $outcome {
            $crate::Outcome::Failed(_) => {}
            other => panic!("Expected Failed, got {:?}", other),
        }
    };
    ($outcome:expr, $expected:expr) => {
        match $outcome {
            $crate::Outcome::Failed(exhausted) => assert_eq!(exhausted.final_error, $expected),
            other => panic!("Expected Failed, got {:?}", other),
        }
    };
}

/// Assert that an outcome was cancelled.
///
/// # Example
///
/// ```rust
/// use resync::{Outcome, assert_cancelled};
/// use resync::retry::Cancelled;
/// use std::time::Duration;
///
/// let outcome: Outcome<(), ()> = Outcome::Cancelled(Cancelled::new(0, Duration::ZERO));
/// assert_cancelled!(outcome);
/// ```
#[macro_export]
macro_rules! assert_cancelled {
    ($outcome:expr) => {
        match $outcome {
            $crate::Outcome::Cancelled(_) => {}
            other => panic!("Expected Cancelled, got {:?}", other),
        }
    };
}

#[cfg(feature = "proptest")]
use proptest::prelude::*;

#[cfg(feature = "proptest")]
impl Arbitrary for crate::RetryPolicy {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        use std::time::Duration;

        let base = (0u64..10_000).prop_map(Duration::from_millis);
        let strategy = prop_oneof![
            base.clone().prop_map(crate::RetryPolicy::constant),
            base.clone().prop_map(crate::RetryPolicy::linear),
            base.clone().prop_map(crate::RetryPolicy::exponential),
            base.prop_map(crate::RetryPolicy::fibonacci),
        ];
        (
            strategy,
            1u32..32,
            proptest::option::of((0u64..60_000).prop_map(Duration::from_millis)),
        )
            .prop_map(|(policy, attempts, max_delay)| {
                let policy = policy.with_max_attempts(attempts);
                match max_delay {
                    Some(cap) => policy.with_max_delay(cap),
                    None => policy,
                }
            })
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::Cancelled;
    use crate::{Outcome, RetryExhausted};
    use std::time::Duration;

    #[tokio::test]
    async fn scripted_work_replays_then_repeats_last() {
        let work = ScriptedWork::new(vec![Err("a"), Ok(1)]);
        assert_eq!(work.call().await, Err("a"));
        assert_eq!(work.call().await, Ok(1));
        assert_eq!(work.call().await, Ok(1));
        assert_eq!(work.calls(), 3);
    }

    #[tokio::test]
    async fn clones_share_call_log() {
        let work = ScriptedWork::<(), _>::always_failing("net error");
        let clone = work.clone();
        let _ = clone.call().await;
        let _ = clone.call().await;
        assert_eq!(work.calls(), 2);
    }

    #[tokio::test]
    async fn succeeds_after_builds_script() {
        let work = ScriptedWork::succeeds_after(2, "net error", "ok");
        assert_eq!(work.call().await, Err("net error"));
        assert_eq!(work.call().await, Err("net error"));
        assert_eq!(work.call().await, Ok("ok"));
    }

    #[tokio::test(start_paused = true)]
    async fn gaps_measure_time_between_calls() {
        let work = ScriptedWork::<(), ()>::new(vec![Ok(())]);
        let _ = work.call().await;
        tokio::time::sleep(Duration::from_millis(250)).await;
        let _ = work.call().await;
        assert_eq!(work.gaps(), vec![Duration::from_millis(250)]);
    }

    #[test]
    #[should_panic(expected = "at least one result")]
    fn empty_script_panics() {
        let _ = ScriptedWork::<(), ()>::new(vec![]);
    }

    #[test]
    fn outcome_macros() {
        let ok: Outcome<i32, ()> = Outcome::Succeeded {
            value: 1,
            attempts: 1,
        };
        assert_succeeded!(ok.clone());
        assert_succeeded!(ok, 1);

        let failed: Outcome<(), &str> =
            Outcome::Failed(RetryExhausted::new("boom", 1, Duration::ZERO));
        assert_failed!(failed.clone());
        assert_failed!(failed, "boom");

        let cancelled: Outcome<(), ()> = Outcome::Cancelled(Cancelled::new(0, Duration::ZERO));
        assert_cancelled!(cancelled);
    }

    #[test]
    #[should_panic(expected = "Expected Succeeded")]
    fn assert_succeeded_panics_on_cancel() {
        let cancelled: Outcome<(), ()> = Outcome::Cancelled(Cancelled::new(0, Duration::ZERO));
        assert_succeeded!(cancelled);
    }

    #[cfg(feature = "proptest")]
    mod proptest_tests {
        use crate::RetryPolicy;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn arbitrary_policies_are_valid(policy in any::<RetryPolicy>()) {
                prop_assert!(policy.validate().is_ok());
                prop_assert!(policy.delay_for_attempt(policy.max_attempts()).is_none());
            }
        }
    }
}
