//! Sync engine: retries, one-shot syncs, and the periodic sync job behind one
//! cancellation scope.
//!
//! Every run the engine starts gets its own child of the engine's root token.
//! Cancelling one run's token leaves the others alone; [`SyncEngine::stop_sync`]
//! cancels the root and with it everything the engine started.

use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::SyncConfig;
use crate::retry::{Outcome, PolicyError, RetryPolicy, RetryRunner};
use crate::schedule::{PeriodicScheduler, ScheduleError};

/// Drives a caller-supplied sync operation with bounded retries.
///
/// The engine never performs I/O itself; the unit of work comes from the
/// caller. All methods that start work spawn onto the ambient tokio runtime
/// and must be called from within one.
///
/// # Example
///
/// ```rust
/// use resync::{SyncConfig, SyncEngine};
///
/// # tokio_test::block_on(async {
/// let engine = SyncEngine::new(SyncConfig::default()).unwrap();
///
/// let handle = engine.retry_sync(|| async { Ok::<_, String>("synced") });
/// let outcome = handle.await.unwrap();
///
/// assert_eq!(outcome.value(), Some(&"synced"));
/// engine.stop_sync();
/// # });
/// ```
#[derive(Debug)]
pub struct SyncEngine {
    config: SyncConfig,
    policy: RetryPolicy,
    scope: CancellationToken,
    scheduler: PeriodicScheduler,
}

impl SyncEngine {
    /// Create an engine from configuration.
    pub fn new(config: SyncConfig) -> Result<Self, PolicyError> {
        let policy = config.retry.to_policy()?;
        Self::with_policy(config, policy)
    }

    /// Create an engine with an explicit retry policy.
    ///
    /// `config.retry` is ignored in favor of `policy`.
    pub fn with_policy(config: SyncConfig, policy: RetryPolicy) -> Result<Self, PolicyError> {
        policy.validate()?;
        let scope = CancellationToken::new();
        let scheduler = PeriodicScheduler::with_parent(&scope);
        Ok(Self {
            config,
            policy,
            scope,
            scheduler,
        })
    }

    /// The retry policy applied to every run.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// The engine configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// A fresh token cancelled by [`stop_sync`](Self::stop_sync).
    ///
    /// For callers that drive their own [`RetryRunner`] but want it to stop
    /// together with the engine.
    pub fn run_token(&self) -> CancellationToken {
        self.scope.child_token()
    }

    /// A runner with the engine's policy.
    pub fn runner<E>(&self) -> RetryRunner<E> {
        RetryRunner::from_validated(self.policy.clone())
    }

    /// Run `work` with retries in the background.
    ///
    /// The returned handle resolves to the run's [`Outcome`]; dropping it
    /// detaches the run without cancelling it.
    pub fn retry_sync<T, E, F, Fut>(&self, work: F) -> JoinHandle<Outcome<T, E>>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Clone + Send + Sync + 'static,
    {
        let policy = self.policy.clone();
        let token = self.run_token();
        tokio::spawn(async move { run_with_policy(policy, work, &token).await })
    }

    /// Run `work` once, without retries, in the background.
    ///
    /// The handle resolves to `None` if the engine is stopped before the
    /// attempt completes.
    pub fn start_sync<T, E, Fut>(&self, work: Fut) -> JoinHandle<Option<Result<T, E>>>
    where
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let token = self.run_token();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => None,
                result = work => Some(result),
            }
        })
    }

    /// Run `work` with retries every configured interval under the configured
    /// job name, replacing any job already scheduled under that name.
    ///
    /// Returns `true` if an earlier periodic sync was replaced.
    pub fn start_periodic_sync<T, E, F, Fut>(&self, work: F) -> Result<bool, ScheduleError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Clone + Send + Sync + 'static,
    {
        let policy = self.policy.clone();
        let work = Arc::new(work);

        self.scheduler.schedule(
            self.config.job_name.clone(),
            self.config.interval(),
            move |token| {
                let policy = policy.clone();
                let work = Arc::clone(&work);
                async move {
                    let outcome = run_with_policy(policy, move || (*work)(), &token).await;

                    #[cfg(feature = "tracing")]
                    match &outcome {
                        Outcome::Succeeded { attempts, .. } => {
                            tracing::debug!(attempts, "periodic sync succeeded")
                        }
                        Outcome::Failed(e) => {
                            tracing::warn!(attempts = e.attempts, "periodic sync failed")
                        }
                        Outcome::Cancelled(_) => tracing::debug!("periodic sync cancelled"),
                    }

                    drop(outcome);
                }
            },
        )
    }

    /// Cancel the periodic sync job. Returns `false` if none was scheduled.
    pub fn stop_periodic_sync(&self) -> bool {
        self.scheduler.cancel(&self.config.job_name)
    }

    /// Returns true if the periodic sync job is live.
    pub fn is_periodic_sync_scheduled(&self) -> bool {
        self.scheduler.is_scheduled(&self.config.job_name)
    }

    /// Cancel every run, pending retry, and periodic job started by this engine.
    ///
    /// Permanent: runs started afterwards are cancelled before their first
    /// attempt. Other engines are unaffected.
    pub fn stop_sync(&self) {
        #[cfg(feature = "tracing")]
        tracing::info!("stopping sync engine");

        self.scope.cancel();
    }

    /// Returns true once [`stop_sync`](Self::stop_sync) has been called.
    pub fn is_stopped(&self) -> bool {
        self.scope.is_cancelled()
    }
}

async fn run_with_policy<T, E, F, Fut>(
    policy: RetryPolicy,
    work: F,
    token: &CancellationToken,
) -> Outcome<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Clone,
{
    // Engine policies are validated at construction.
    let mut runner = RetryRunner::from_validated(policy);
    runner.run(work, token).await
}
