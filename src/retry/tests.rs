//! Runner behavior tests.
//!
//! Timing tests run on tokio's paused clock, so waits are exact and instant.

use super::*;
use crate::testing::ScriptedWork;
use crate::{assert_cancelled, assert_failed, assert_succeeded};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

fn linear(base_ms: u64, attempts: u32) -> RetryRunner<&'static str> {
    RetryRunner::new(RetryPolicy::linear(Duration::from_millis(base_ms)).with_max_attempts(attempts))
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_success_first_try_makes_one_call_and_no_wait() {
    let work = ScriptedWork::new(vec![Ok("synced")]);
    let mut runner = linear(1000, 3);
    let start = Instant::now();

    let outcome = runner.run(|| work.call(), &CancellationToken::new()).await;

    assert_eq!(
        outcome,
        Outcome::Succeeded {
            value: "synced",
            attempts: 1
        }
    );
    assert_eq!(work.calls(), 1);
    assert_eq!(start.elapsed(), Duration::ZERO);
    assert_eq!(runner.state(), RunState::Succeeded { attempts: 1 });
}

#[tokio::test(start_paused = true)]
async fn test_always_failing_work_exhausts_with_linear_waits() {
    let work = ScriptedWork::<(), _>::always_failing("net error");
    let mut runner = linear(1000, 3);
    let start = Instant::now();

    let outcome = runner.run(|| work.call(), &CancellationToken::new()).await;

    assert_eq!(work.calls(), 3);
    assert_eq!(
        work.gaps(),
        vec![Duration::from_millis(1000), Duration::from_millis(2000)]
    );
    assert_eq!(start.elapsed(), Duration::from_millis(3000));
    match outcome {
        Outcome::Failed(exhausted) => {
            assert_eq!(exhausted.final_error, "net error");
            assert_eq!(exhausted.attempts, 3);
            assert_eq!(exhausted.total_duration, Duration::from_millis(3000));
        }
        other => panic!("Expected failure, got {:?}", other),
    }
    assert_eq!(
        runner.state(),
        RunState::Failed {
            attempts: 3,
            error: "net error"
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_last_error_is_the_one_reported() {
    let work = ScriptedWork::<(), _>::new(vec![Err("first"), Err("second"), Err("third")]);
    let mut runner = linear(10, 3);

    let outcome = runner.run(|| work.call(), &CancellationToken::new()).await;

    assert_failed!(outcome, "third");
}

#[tokio::test(start_paused = true)]
async fn test_fails_then_succeeds_waits_once() {
    let work = ScriptedWork::succeeds_after(1, "net error", "synced");
    let mut runner = linear(1000, 3);
    let start = Instant::now();

    let outcome = runner.run(|| work.call(), &CancellationToken::new()).await;

    assert_eq!(outcome.attempts(), 2);
    assert_succeeded!(outcome, "synced");
    assert_eq!(work.gaps(), vec![Duration::from_millis(1000)]);
    assert_eq!(start.elapsed(), Duration::from_millis(1000));
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_before_start_never_calls_work() {
    let work = ScriptedWork::new(vec![Ok("synced")]);
    let mut runner = linear(1000, 5);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = runner.run(|| work.call(), &cancel).await;

    assert_eq!(work.calls(), 0);
    assert_eq!(outcome.attempts(), 0);
    assert_cancelled!(outcome);
    assert_eq!(runner.state(), RunState::Cancelled { attempts: 0 });
}

#[tokio::test(start_paused = true)]
async fn test_single_attempt_fails_without_waiting() {
    let work = ScriptedWork::<(), _>::always_failing("net error");
    let mut runner = linear(1000, 1);
    let start = Instant::now();

    let outcome = runner.run(|| work.call(), &CancellationToken::new()).await;

    assert_eq!(work.calls(), 1);
    assert_eq!(start.elapsed(), Duration::ZERO);
    assert_failed!(outcome, "net error");
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_wait_aborts_early() {
    let work = ScriptedWork::<(), _>::always_failing("net error");
    let cancel = CancellationToken::new();
    let start = Instant::now();

    let handle = tokio::spawn({
        let work = work.clone();
        let cancel = cancel.clone();
        async move {
            let mut runner = linear(1000, 3);
            runner.run(|| work.call(), &cancel).await
        }
    });

    // The runner is now inside its 1000ms wait after attempt 1.
    tokio::time::sleep(Duration::from_millis(400)).await;
    cancel.cancel();

    let outcome = handle.await.unwrap();

    assert_eq!(work.calls(), 1);
    assert_eq!(outcome.attempts(), 1);
    assert_cancelled!(outcome);
    assert!(start.elapsed() < Duration::from_millis(1000));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_from_hook_wins_over_zero_delay() {
    let work = ScriptedWork::<(), _>::always_failing("net error");
    let cancel = CancellationToken::new();
    let mut runner: RetryRunner<&str> =
        RetryRunner::new(RetryPolicy::constant(Duration::ZERO).with_max_attempts(5))
            .unwrap()
            .on_retry({
                let cancel = cancel.clone();
                move |_| cancel.cancel()
            });

    let outcome = runner.run(|| work.call(), &cancel).await;

    assert_eq!(work.calls(), 1);
    assert_cancelled!(outcome);
}

#[tokio::test(start_paused = true)]
async fn test_terminal_state_is_stable() {
    let work = ScriptedWork::<(), _>::always_failing("net error");
    let mut runner = linear(5, 2);

    let _ = runner.run(|| work.call(), &CancellationToken::new()).await;
    let settled = runner.state();

    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(runner.state(), settled);
    assert_eq!(work.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_non_retryable_error_fails_immediately() {
    #[derive(Debug, Clone, PartialEq)]
    #[allow(dead_code)]
    enum SyncError {
        Unavailable,
        Unauthorized,
    }

    let work = ScriptedWork::<(), _>::new(vec![Err(SyncError::Unauthorized)]);
    let mut runner: RetryRunner<SyncError> =
        RetryRunner::new(RetryPolicy::linear(Duration::from_millis(1000)).with_max_attempts(5))
            .unwrap()
            .retry_if(|e| matches!(e, SyncError::Unavailable));
    let start = Instant::now();

    let outcome = runner.run(|| work.call(), &CancellationToken::new()).await;

    assert_eq!(work.calls(), 1);
    assert_eq!(start.elapsed(), Duration::ZERO);
    assert_failed!(outcome, SyncError::Unauthorized);
}

#[tokio::test(start_paused = true)]
async fn test_retryable_errors_still_retried_with_predicate() {
    #[derive(Debug, Clone, PartialEq)]
    enum SyncError {
        Unavailable,
        Unauthorized,
    }

    let work = ScriptedWork::new(vec![
        Err(SyncError::Unavailable),
        Err(SyncError::Unavailable),
        Err(SyncError::Unauthorized),
    ]);
    let mut runner: RetryRunner<SyncError> =
        RetryRunner::new(RetryPolicy::constant(Duration::from_millis(10)).with_max_attempts(5))
            .unwrap()
            .retry_if(|e| matches!(e, SyncError::Unavailable));

    let outcome: Outcome<(), _> = runner.run(|| work.call(), &CancellationToken::new()).await;

    assert_eq!(work.calls(), 3);
    assert_failed!(outcome, SyncError::Unauthorized);
}

#[tokio::test(start_paused = true)]
async fn test_hook_sees_every_scheduled_retry() {
    let events: Arc<Mutex<Vec<(u32, &'static str, Duration)>>> = Arc::new(Mutex::new(Vec::new()));
    let work = ScriptedWork::<(), _>::new(vec![Err("a"), Err("b"), Err("c")]);
    let mut runner =
        RetryRunner::new(RetryPolicy::linear(Duration::from_millis(100)).with_max_attempts(3))
            .unwrap()
            .on_retry({
                let events = events.clone();
                move |event: &RetryEvent<'_, &'static str>| {
                    events
                        .lock()
                        .unwrap()
                        .push((event.attempt, *event.error, event.next_delay));
                }
            });

    let _ = runner.run(|| work.call(), &CancellationToken::new()).await;

    assert_eq!(
        *events.lock().unwrap(),
        vec![
            (1, "a", Duration::from_millis(100)),
            (2, "b", Duration::from_millis(200)),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_watch_observes_transitions() {
    let work = ScriptedWork::succeeds_after(2, "net error", "synced");
    let mut runner = linear(100, 5);
    let mut watch = runner.watch();
    assert_eq!(watch.current(), RunState::Idle);

    let observer = tokio::spawn(async move {
        let mut seen = Vec::new();
        while let Some(state) = watch.changed().await {
            let done = state.is_terminal();
            seen.push(state);
            if done {
                break;
            }
        }
        seen
    });

    let _ = runner.run(|| work.call(), &CancellationToken::new()).await;

    let seen = observer.await.unwrap();
    assert_eq!(seen.last(), Some(&RunState::Succeeded { attempts: 3 }));
    assert!(seen
        .iter()
        .all(|s| matches!(s, RunState::Running { .. } | RunState::Succeeded { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_settled_waits_for_outcome_from_another_task() {
    let work = ScriptedWork::<(), _>::always_failing("net error");
    let mut runner = linear(100, 2);
    let mut watch = runner.watch();

    let waiter = tokio::spawn(async move { watch.settled().await });
    let _ = runner.run(|| work.call(), &CancellationToken::new()).await;

    assert_eq!(
        waiter.await.unwrap(),
        RunState::Failed {
            attempts: 2,
            error: "net error"
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_dropping_run_during_wait_settles_watchers() {
    let work = ScriptedWork::<(), _>::always_failing("net error");
    let mut runner = linear(1000, 3);
    let mut watch = runner.watch();

    let waiter = tokio::spawn(async move { watch.settled().await });
    let result = tokio::time::timeout(
        Duration::from_millis(500),
        runner.run(|| work.call(), &CancellationToken::new()),
    )
    .await;

    assert!(result.is_err());
    assert_eq!(work.calls(), 1);
    assert_eq!(runner.state(), RunState::Cancelled { attempts: 1 });
    assert_eq!(waiter.await.unwrap(), RunState::Cancelled { attempts: 1 });
}

#[tokio::test(start_paused = true)]
async fn test_dropping_run_during_attempt_counts_that_attempt() {
    let mut runner = linear(1000, 3);

    let result = tokio::time::timeout(
        Duration::from_millis(500),
        runner.run(
            || std::future::pending::<Result<(), &'static str>>(),
            &CancellationToken::new(),
        ),
    )
    .await;

    assert!(result.is_err());
    assert_eq!(runner.state(), RunState::Cancelled { attempts: 1 });
}

#[tokio::test(start_paused = true)]
async fn test_reset_and_rerun() {
    let work = ScriptedWork::new(vec![Err("net error"), Ok("synced")]);
    let mut runner = linear(10, 1);

    let first = runner.run(|| work.call(), &CancellationToken::new()).await;
    assert_failed!(first);

    runner.reset();
    assert_eq!(runner.state(), RunState::Idle);

    let second = runner.run(|| work.call(), &CancellationToken::new()).await;
    assert_succeeded!(second, "synced");
    assert_eq!(runner.state(), RunState::Succeeded { attempts: 1 });
}

#[test]
fn test_zero_attempt_policy_is_rejected() {
    let result = RetryRunner::<()>::new(RetryPolicy::default().with_max_attempts(0));
    assert_eq!(result.unwrap_err(), PolicyError::ZeroAttempts);
}

#[tokio::test(start_paused = true)]
async fn test_timeouts_are_retried() {
    let calls = Arc::new(Mutex::new(0u32));
    let mut runner: RetryRunner<TimeoutError<&str>> =
        RetryRunner::new(RetryPolicy::constant(Duration::from_millis(10)).with_max_attempts(3))
            .unwrap();

    let outcome = runner
        .run(
            || {
                let calls = calls.clone();
                with_timeout(
                    async move {
                        let n = {
                            let mut calls = calls.lock().unwrap();
                            *calls += 1;
                            *calls
                        };
                        if n == 1 {
                            tokio::time::sleep(Duration::from_secs(60)).await;
                        }
                        Ok::<_, &str>(n)
                    },
                    Duration::from_millis(50),
                )
            },
            &CancellationToken::new(),
        )
        .await;

    assert_succeeded!(outcome, 2);
}

#[tokio::test(start_paused = true)]
async fn test_independent_runners_run_concurrently() {
    let a = ScriptedWork::succeeds_after(2, "net error", 1);
    let b = ScriptedWork::succeeds_after(2, "net error", 2);
    let cancel = CancellationToken::new();
    let start = Instant::now();

    let mut runner_a = linear(1000, 3);
    let mut runner_b = linear(1000, 3);
    let (out_a, out_b) = tokio::join!(
        runner_a.run(|| a.call(), &cancel),
        runner_b.run(|| b.call(), &cancel),
    );

    assert_succeeded!(out_a, 1);
    assert_succeeded!(out_b, 2);
    // Waits overlap rather than add up.
    assert_eq!(start.elapsed(), Duration::from_millis(3000));
}

#[cfg(feature = "tracing")]
mod tracing_tests {
    use super::*;
    use tracing_test::traced_test;

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn test_retries_are_logged() {
        let work = ScriptedWork::<(), _>::always_failing("net error");
        let mut runner = linear(10, 2);

        let _ = runner.run(|| work.call(), &CancellationToken::new()).await;

        assert!(logs_contain("attempt failed, retrying"));
        assert!(logs_contain("giving up on work"));
    }
}
