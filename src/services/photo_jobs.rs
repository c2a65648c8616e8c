use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

const ABORT_HANDLER_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    TimedOut,
    Cancelled,
}

/// Supervisor for background photo analysis.
///
/// Every job runs with a deadline. On shutdown, new jobs are refused and
/// running ones get a grace period before they are cancelled.
#[derive(Clone)]
pub struct PhotoJobs {
    tracker: TaskTracker,
    cancel: CancellationToken,
    timeout: Duration,
}

impl PhotoJobs {
    pub fn new(timeout: Duration) -> Self {
        Self {
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
            timeout,
        }
    }

    /// Runs `job` in the background. `on_abort` runs instead of the rest of
    /// the job when it times out or is cancelled.
    pub fn spawn<J, A>(&self, job: J, on_abort: A) -> JoinHandle<JobOutcome>
    where
        J: Future<Output = ()> + Send + 'static,
        A: Future<Output = ()> + Send + 'static,
    {
        let cancel = self.cancel.clone();
        let timeout = self.timeout;

        self.tracker.spawn(async move {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => JobOutcome::Cancelled,
                finished = tokio::time::timeout(timeout, job) => match finished {
                    Ok(()) => JobOutcome::Completed,
                    Err(_) => JobOutcome::TimedOut,
                },
            };

            if outcome != JobOutcome::Completed {
                tracing::warn!(?outcome, "Photo job aborted");
                if tokio::time::timeout(ABORT_HANDLER_TIMEOUT, on_abort).await.is_err() {
                    tracing::warn!("Photo job abort handler timed out");
                }
            }
            outcome
        })
    }

    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.tracker.is_closed()
    }

    /// Refuses new jobs. Running jobs are left alone.
    pub fn close(&self) {
        self.tracker.close();
    }

    /// Waits up to `grace` for running jobs, then cancels the rest.
    pub async fn shutdown(&self, grace: Duration) {
        self.close();
        let pending = self.tracker.len();
        if pending > 0 {
            tracing::info!(pending, "Draining photo jobs");
        }

        if tokio::time::timeout(grace, self.tracker.wait()).await.is_err() {
            tracing::warn!(
                remaining = self.tracker.len(),
                "Grace period elapsed, cancelling photo jobs"
            );
            self.cancel.cancel();
            self.tracker.wait().await;
        }
    }
}
