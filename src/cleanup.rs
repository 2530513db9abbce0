//! Deferred artifact cleanup
//!
//! After an archive has been handed off, the per-request directory and
//! the archive file are deleted following a fixed grace period that
//! covers slow client reads. Scheduling is in-process only; pending
//! deletions are flushed (run immediately) on orderly shutdown rather
//! than abandoned.

use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, instrument, warn};

/// Default grace period between handoff and deletion
pub const GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Schedules best-effort deletion of request artifacts.
pub struct CleanupScheduler {
    grace: Duration,
    flush_tx: watch::Sender<bool>,
    flush_rx: watch::Receiver<bool>,
}

impl CleanupScheduler {
    /// Create a scheduler with the default grace period.
    pub fn new() -> Self {
        Self::with_grace(GRACE_PERIOD)
    }

    /// Create a scheduler with a custom grace period.
    pub fn with_grace(grace: Duration) -> Self {
        let (flush_tx, flush_rx) = watch::channel(false);
        Self {
            grace,
            flush_tx,
            flush_rx,
        }
    }

    /// Schedule deletion of a capture directory and its archive after
    /// the grace period, or immediately once `flush` is called.
    pub fn schedule(&self, dir: PathBuf, archive: PathBuf) {
        self.schedule_then(dir, archive, std::future::ready(()));
    }

    /// Like [`CleanupScheduler::schedule`], additionally running `after`
    /// once the artifacts are gone. Callers use this to drop bookkeeping
    /// that keeps the deleted paths addressable, such as archive index
    /// entries.
    #[instrument(skip(self, after))]
    pub fn schedule_then<F>(&self, dir: PathBuf, archive: PathBuf, after: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let grace = self.grace;
        let mut flush = self.flush_rx.clone();

        tokio::spawn(async move {
            if !*flush.borrow() {
                tokio::select! {
                    _ = tokio::time::sleep(grace) => {}
                    _ = flush.changed() => {
                        debug!("Flush requested, deleting early");
                    }
                }
            }
            remove_artifacts(&dir, &archive).await;
            after.await;
        });
    }

    /// Release every pending deletion immediately. Called on shutdown
    /// so temporary files are not orphaned by pending timers.
    pub fn flush(&self) {
        let _ = self.flush_tx.send(true);
    }
}

impl Default for CleanupScheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Best-effort removal; a path already gone is not an error.
async fn remove_artifacts(dir: &std::path::Path, archive: &std::path::Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => debug!("Removed capture directory {}", dir.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", dir.display(), e),
    }
    match tokio::fs::remove_file(archive).await {
        Ok(()) => debug!("Removed archive {}", archive.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", archive.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifacts(root: &std::path::Path) -> (PathBuf, PathBuf) {
        let dir = root.join("site_1");
        std::fs::create_dir(&dir).unwrap();
        std::fs::write(dir.join("home.png"), b"x").unwrap();
        let archive = root.join("screenshots_1.zip");
        std::fs::write(&archive, b"zip").unwrap();
        (dir, archive)
    }

    #[tokio::test]
    async fn artifacts_survive_grace_period_then_vanish() {
        let tmp = tempfile::tempdir().unwrap();
        let (dir, archive) = artifacts(tmp.path());

        let scheduler = CleanupScheduler::with_grace(Duration::from_millis(100));
        scheduler.schedule(dir.clone(), archive.clone());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(dir.exists());
        assert!(archive.exists());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!dir.exists());
        assert!(!archive.exists());
    }

    #[tokio::test]
    async fn flush_deletes_before_grace_expires() {
        let tmp = tempfile::tempdir().unwrap();
        let (dir, archive) = artifacts(tmp.path());

        let scheduler = CleanupScheduler::with_grace(Duration::from_secs(60));
        scheduler.schedule(dir.clone(), archive.clone());
        scheduler.flush();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!dir.exists());
        assert!(!archive.exists());
    }

    #[tokio::test]
    async fn missing_paths_are_tolerated() {
        let tmp = tempfile::tempdir().unwrap();
        let scheduler = CleanupScheduler::with_grace(Duration::from_millis(10));
        scheduler.schedule(
            tmp.path().join("never_existed"),
            tmp.path().join("absent.zip"),
        );
        // Nothing to assert beyond "does not panic or log an error".
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn hook_runs_after_artifacts_are_removed() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let tmp = tempfile::tempdir().unwrap();
        let (dir, archive) = artifacts(tmp.path());
        let fired = Arc::new(AtomicBool::new(false));

        let scheduler = CleanupScheduler::with_grace(Duration::from_millis(10));
        let flag = fired.clone();
        scheduler.schedule_then(dir.clone(), archive.clone(), async move {
            flag.store(true, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!dir.exists());
        assert!(!archive.exists());
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn schedule_after_flush_deletes_immediately() {
        let tmp = tempfile::tempdir().unwrap();
        let (dir, archive) = artifacts(tmp.path());

        let scheduler = CleanupScheduler::with_grace(Duration::from_secs(60));
        scheduler.flush();
        scheduler.schedule(dir.clone(), archive.clone());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!dir.exists());
        assert!(!archive.exists());
    }
}
