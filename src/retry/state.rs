//! Observable run lifecycle.
//!
//! A runner publishes an immutable [`RunState`] snapshot on every transition
//! through a `tokio::sync::watch` channel. Any number of [`StateWatch`]
//! handles can read the latest snapshot or await the terminal one from other
//! tasks without touching the runner itself.
//!
//! ```text
//! Idle -> Running { attempt: 1 } -> Running { attempt: 2 } -> ... -> Succeeded
//!                                                                 -> Failed
//!                                                                 -> Cancelled
//! ```

use tokio::sync::watch;

/// Snapshot of a runner's lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState<E> {
    /// No run has started, or the runner was reset.
    Idle,
    /// An attempt is in flight or the runner is waiting before it.
    Running {
        /// The current attempt (1-indexed).
        attempt: u32,
    },
    /// The work succeeded.
    Succeeded {
        /// Attempts made, the successful one included.
        attempts: u32,
    },
    /// The run gave up.
    Failed {
        /// Attempts made.
        attempts: u32,
        /// The error from the last attempt.
        error: E,
    },
    /// The run was cancelled.
    Cancelled {
        /// Attempts made before cancellation was observed.
        attempts: u32,
    },
}

impl<E> RunState<E> {
    /// Returns true for `Succeeded`, `Failed`, and `Cancelled`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded { .. } | Self::Failed { .. } | Self::Cancelled { .. }
        )
    }

    /// Returns true while a run is in progress.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running { .. })
    }
}

/// Write side of the state channel. Owned by exactly one runner.
#[derive(Debug)]
pub(crate) struct StatePublisher<E> {
    tx: watch::Sender<RunState<E>>,
}

impl<E> StatePublisher<E> {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(RunState::Idle);
        Self { tx }
    }

    pub(crate) fn publish(&self, state: RunState<E>) {
        // send_replace succeeds even when nobody is watching.
        self.tx.send_replace(state);
    }

    pub(crate) fn is_idle(&self) -> bool {
        matches!(*self.tx.borrow(), RunState::Idle)
    }

    pub(crate) fn watch(&self) -> StateWatch<E> {
        StateWatch {
            rx: self.tx.subscribe(),
        }
    }
}

/// Read-only handle onto a runner's published state.
///
/// Cheap to clone and safe to move to other tasks.
#[derive(Debug, Clone)]
pub struct StateWatch<E> {
    rx: watch::Receiver<RunState<E>>,
}

impl<E: Clone> StateWatch<E> {
    /// The latest published snapshot.
    pub fn current(&self) -> RunState<E> {
        self.rx.borrow().clone()
    }

    /// Wait until the published state is terminal and return it.
    ///
    /// Returns immediately if the latest snapshot is already terminal, so a
    /// watch taken between two runs sees the previous run's result. A run
    /// whose future is dropped early settles as `Cancelled`. If the runner
    /// itself is dropped first, the last snapshot is returned as-is.
    pub async fn settled(&mut self) -> RunState<E> {
        let settled = self
            .rx
            .wait_for(RunState::is_terminal)
            .await
            .map(|state| state.clone());
        match settled {
            Ok(state) => state,
            Err(_) => self.rx.borrow().clone(),
        }
    }

    /// Wait for the next published transition.
    ///
    /// Returns `None` once the runner has been dropped.
    pub async fn changed(&mut self) -> Option<RunState<E>> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}
