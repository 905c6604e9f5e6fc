//! Deferred artifact cleanup
//!
//! Cleanup jobs are scheduled once a request's response body has finished
//! streaming, then wait a short grace delay before touching the filesystem.
//! Jobs run on a [`TaskTracker`] tied to a shutdown [`CancellationToken`]:
//! cancelling the token makes pending jobs run immediately, and
//! [`CleanupScheduler::shutdown`] waits for all of them.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::archive;

/// Filesystem work left over from one request
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupJob {
    /// Identifies the request in logs
    pub label: String,
    /// Matching archival original, deleted after a successful forward
    pub archive_delete: Option<PathBuf>,
    /// Final artifact relocated into the archival directory
    pub archive_move: Option<(PathBuf, PathBuf)>,
    /// Temp files removed if they still exist
    pub remove: Vec<PathBuf>,
}

impl CleanupJob {
    /// Runs archive actions first so a moved artifact is not deleted.
    pub async fn run(self) {
        if let Some(path) = &self.archive_delete {
            match tokio::fs::remove_file(path).await {
                Ok(()) => info!(label = %self.label, path = %path.display(), "Deleted archived original"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(label = %self.label, path = %path.display(), error = %e, "Failed to delete archived original"),
            }
        }

        if let Some((from, to)) = &self.archive_move {
            match archive::move_no_clobber(from, to).await {
                Ok(()) => info!(label = %self.label, from = %from.display(), to = %to.display(), "Moved result into archive"),
                Err(e) => warn!(label = %self.label, from = %from.display(), to = %to.display(), error = %e, "Archive move aborted"),
            }
        }

        for path in &self.remove {
            match tokio::fs::remove_file(path).await {
                Ok(()) => debug!(label = %self.label, path = %path.display(), "Removed temp artifact"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(label = %self.label, path = %path.display(), error = %e, "Failed to remove temp artifact"),
            }
        }
    }

    /// Best-effort removal for callers outside a Tokio runtime.
    fn run_blocking(self) {
        for path in &self.remove {
            if let Err(e) = std::fs::remove_file(path) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(label = %self.label, path = %path.display(), error = %e, "Failed to remove temp artifact");
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct CleanupScheduler {
    tracker: TaskTracker,
    shutdown: CancellationToken,
    delay: Duration,
}

impl CleanupScheduler {
    pub fn new(delay: Duration, shutdown: CancellationToken) -> Self {
        Self {
            tracker: TaskTracker::new(),
            shutdown,
            delay,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Number of scheduled jobs that have not finished yet
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    pub fn schedule(&self, job: CleanupJob) {
        if tokio::runtime::Handle::try_current().is_err() {
            warn!(label = %job.label, "No runtime available, cleaning up synchronously");
            job.run_blocking();
            return;
        }

        let delay = self.delay;
        let shutdown = self.shutdown.clone();
        self.tracker.spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.cancelled() => {
                    debug!(label = %job.label, "Shutdown requested, cleaning up now");
                }
            }
            job.run().await;
        });
    }

    /// Fires all pending jobs and waits for them to finish.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        info!("Pending cleanups finished");
    }
}
