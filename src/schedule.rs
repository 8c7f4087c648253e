//! Named periodic jobs with replace-on-enqueue semantics.
//!
//! Each job runs on its own tokio task under its own child cancellation token.
//! Scheduling a job under a name that is already taken cancels the old job and
//! installs the new one, so at most one job per name is ever live.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

type Job = Box<dyn Fn(CancellationToken) -> BoxFuture<'static, ()> + Send + Sync>;

/// Error returned when a job cannot be scheduled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// The interval was zero.
    ZeroInterval {
        /// Name of the rejected job.
        name: String,
    },
    /// The first tick would fall past the latest instant the clock can represent.
    IntervalTooLarge {
        /// Name of the rejected job.
        name: String,
    },
    /// The scheduler (or the engine owning it) has been shut down.
    ShutDown,
}

impl std::fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ZeroInterval { name } => write!(f, "job {:?} has a zero interval", name),
            Self::IntervalTooLarge { name } => {
                write!(f, "job {:?} has an interval too large to schedule", name)
            }
            Self::ShutDown => write!(f, "scheduler is shut down"),
        }
    }
}

impl std::error::Error for ScheduleError {}

struct ScheduledJob {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Runs jobs every fixed interval until they are cancelled or replaced.
///
/// Must be used from within a tokio runtime. Dropping the scheduler cancels
/// every job it owns.
///
/// # Example
///
/// ```rust
/// use resync::PeriodicScheduler;
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let scheduler = PeriodicScheduler::new();
///
/// scheduler
///     .schedule("sync", Duration::from_secs(900), |_token| async {
///         // one sync pass
///     })
///     .unwrap();
///
/// // Same name: the first job is cancelled and replaced.
/// let replaced = scheduler
///     .schedule("sync", Duration::from_secs(60), |_token| async {})
///     .unwrap();
///
/// assert!(replaced);
/// assert_eq!(scheduler.len(), 1);
/// scheduler.shutdown().await;
/// # });
/// ```
pub struct PeriodicScheduler {
    root: CancellationToken,
    jobs: Arc<Mutex<HashMap<String, ScheduledJob>>>,
}

impl std::fmt::Debug for PeriodicScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeriodicScheduler")
            .field("jobs", &self.names())
            .field("cancelled", &self.root.is_cancelled())
            .finish()
    }
}

impl Default for PeriodicScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl PeriodicScheduler {
    /// Create a scheduler with its own root token.
    pub fn new() -> Self {
        Self::with_root(CancellationToken::new())
    }

    /// Create a scheduler whose jobs are also cancelled when `parent` is.
    pub fn with_parent(parent: &CancellationToken) -> Self {
        Self::with_root(parent.child_token())
    }

    fn with_root(root: CancellationToken) -> Self {
        Self {
            root,
            jobs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Run `job` every `interval` under `name`, first run one interval from now.
    ///
    /// The job receives a token that is cancelled when the job is replaced or
    /// cancelled; long-running jobs should pass it on to their
    /// [`RetryRunner`](crate::RetryRunner). Returns `true` if an existing job
    /// with the same name was replaced.
    pub fn schedule<F, Fut>(
        &self,
        name: impl Into<String>,
        interval: Duration,
        job: F,
    ) -> Result<bool, ScheduleError>
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        if interval.is_zero() {
            return Err(ScheduleError::ZeroInterval { name });
        }
        let Some(start) = Instant::now().checked_add(interval) else {
            return Err(ScheduleError::IntervalTooLarge { name });
        };
        if self.root.is_cancelled() {
            return Err(ScheduleError::ShutDown);
        }

        let job: Job = Box::new(move |token| job(token).boxed());
        let token = self.root.child_token();
        let handle = tokio::spawn(run_periodic(
            name.clone(),
            start,
            interval,
            job,
            token.clone(),
        ));

        let previous = self
            .lock()
            .insert(name.clone(), ScheduledJob { token, handle });

        match previous {
            Some(old) => {
                old.token.cancel();

                #[cfg(feature = "tracing")]
                tracing::info!(job = %name, ?interval, "replaced periodic job");

                Ok(true)
            }
            None => {
                #[cfg(feature = "tracing")]
                tracing::info!(job = %name, ?interval, "scheduled periodic job");

                Ok(false)
            }
        }
    }

    /// Cancel the job scheduled under `name`. Returns `false` if there was none.
    pub fn cancel(&self, name: &str) -> bool {
        match self.live_jobs().remove(name) {
            Some(job) => {
                job.token.cancel();

                #[cfg(feature = "tracing")]
                tracing::info!(job = %name, "cancelled periodic job");

                true
            }
            None => false,
        }
    }

    /// Cancel every job. The scheduler stays usable.
    pub fn cancel_all(&self) {
        for (_, job) in self.lock().drain() {
            job.token.cancel();
        }
    }

    /// Cancel every job and wait for their tasks to finish.
    pub async fn shutdown(&self) {
        let jobs: Vec<ScheduledJob> = self.lock().drain().map(|(_, job)| job).collect();
        for job in &jobs {
            job.token.cancel();
        }
        for job in jobs {
            // A panicking job has already stopped; nothing left to clean up.
            let _ = job.handle.await;
        }
    }

    /// Returns true if a live job is scheduled under `name`.
    pub fn is_scheduled(&self, name: &str) -> bool {
        self.live_jobs().contains_key(name)
    }

    /// Names of the scheduled jobs, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.live_jobs().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of scheduled jobs.
    pub fn len(&self) -> usize {
        self.live_jobs().len()
    }

    /// Returns true if no jobs are scheduled.
    pub fn is_empty(&self) -> bool {
        self.live_jobs().is_empty()
    }

    /// Jobs cancelled through the parent token are dropped from the map here.
    fn live_jobs(&self) -> MutexGuard<'_, HashMap<String, ScheduledJob>> {
        let mut jobs = self.lock();
        jobs.retain(|_, job| !job.token.is_cancelled());
        jobs
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ScheduledJob>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for PeriodicScheduler {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

async fn run_periodic(
    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))] name: String,
    start: Instant,
    interval: Duration,
    job: Job,
    token: CancellationToken,
) {
    let mut ticker = time::interval_at(start, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(job = %name, "periodic job tick");

        job(token.clone()).await;
    }

    #[cfg(feature = "tracing")]
    tracing::debug!(job = %name, "periodic job stopped");
}
