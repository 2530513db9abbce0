//! Shared session pool
//!
//! All requests share exactly one browser session. The pool guards the
//! slot with a mutex holding either a ready session or a single shared
//! pending-launch future, so concurrent acquirers await one launch
//! instead of racing to start their own. When a session dies, a monitor
//! task eagerly starts the relaunch so the next `acquire()` only joins
//! an in-progress launch rather than starting cold.

use crate::error::{Error, Result, SessionError};
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Minimal view of a live session the pool needs for lifecycle tracking.
pub trait Session: Send + Sync + 'static {
    /// Whether the underlying process is still running.
    fn is_alive(&self) -> bool;

    /// Resolves once the session has terminated. Must resolve
    /// immediately if the session is already dead.
    fn closed(&self) -> BoxFuture<'static, ()>;
}

/// Produces new sessions on demand.
pub trait Launcher<S>: Send + Sync + 'static {
    /// Start one launch attempt.
    fn launch(&self) -> BoxFuture<'static, Result<S>>;
}

type LaunchFuture<S> = Shared<BoxFuture<'static, std::result::Result<Arc<S>, Arc<Error>>>>;

enum Slot<S> {
    Empty,
    Launching(LaunchFuture<S>),
    Ready(Arc<S>),
}

/// Owns the process-wide session and its relaunch policy.
pub struct SessionPool<S: Session> {
    launcher: Arc<dyn Launcher<S>>,
    slot: Mutex<Slot<S>>,
}

impl<S: Session> SessionPool<S> {
    /// Create a pool around a launcher. No launch is started until
    /// [`SessionPool::warm_up`] or the first [`SessionPool::acquire`].
    pub fn new(launcher: Arc<dyn Launcher<S>>) -> Arc<Self> {
        Arc::new(Self {
            launcher,
            slot: Mutex::new(Slot::Empty),
        })
    }

    /// Start the initial launch without waiting for it.
    pub async fn warm_up(self: &Arc<Self>) {
        let mut slot = self.slot.lock().await;
        if matches!(*slot, Slot::Empty) {
            *slot = Slot::Launching(self.start_launch());
        }
    }

    /// Get the shared live session, waiting on an in-flight launch if
    /// one is pending and starting one if the slot is empty or dead.
    #[instrument(skip(self))]
    pub async fn acquire(self: &Arc<Self>) -> Result<Arc<S>> {
        let pending = {
            let mut slot = self.slot.lock().await;
            match &*slot {
                Slot::Ready(session) if session.is_alive() => return Ok(session.clone()),
                Slot::Launching(fut) => fut.clone(),
                _ => {
                    debug!("No live session, starting launch");
                    let fut = self.start_launch();
                    *slot = Slot::Launching(fut.clone());
                    fut
                }
            }
        };

        // A failed launch is reported as what it was; exhaustion is the
        // caller's verdict after its own relaunch attempt also fails.
        pending.await.map_err(|e| match &*e {
            Error::Session(session) => Error::Session(session.clone()),
            other => SessionError::LaunchFailed(other.to_string()).into(),
        })
    }

    /// Report a session that failed on first use. If it is still the
    /// current one, it is discarded and a relaunch begins immediately.
    pub async fn invalidate(self: &Arc<Self>, session: &Arc<S>) {
        let mut slot = self.slot.lock().await;
        if let Slot::Ready(current) = &*slot {
            if Arc::ptr_eq(current, session) {
                warn!("Invalidating current session, relaunching");
                *slot = Slot::Launching(self.start_launch());
            }
        }
    }

    /// Build the shared launch future, spawn a driver so it makes
    /// progress with no waiters, and register it in the slot on
    /// completion.
    fn start_launch(self: &Arc<Self>) -> LaunchFuture<S> {
        let launcher = self.launcher.clone();
        let pool = Arc::downgrade(self);

        let fut: BoxFuture<'static, std::result::Result<Arc<S>, Arc<Error>>> = async move {
            let session = launcher.launch().await.map_err(Arc::new)?;
            let session = Arc::new(session);

            if let Some(pool) = pool.upgrade() {
                pool.install(session.clone()).await;
            }

            Ok(session)
        }
        .boxed();

        let shared = fut.shared();

        // Eager driver: the launch completes even if every acquirer
        // has gone away. On failure the slot is cleared so the next
        // acquire starts a fresh attempt instead of replaying the
        // failed future.
        let driver = shared.clone();
        let pool = Arc::downgrade(self);
        tokio::spawn(async move {
            if let Err(e) = driver.await {
                warn!("Background launch failed: {}", e);
                if let Some(pool) = pool.upgrade() {
                    pool.clear_failed_launch().await;
                }
            }
        });

        shared
    }

    /// Drop a completed-but-failed launch from the slot. Only one
    /// launch is in flight at a time, so a `Launching` slot here is
    /// necessarily the one that just failed.
    async fn clear_failed_launch(self: &Arc<Self>) {
        let mut slot = self.slot.lock().await;
        if matches!(*slot, Slot::Launching(_)) {
            *slot = Slot::Empty;
        }
    }

    /// Store a freshly launched session and watch for its death.
    async fn install(self: &Arc<Self>, session: Arc<S>) {
        {
            let mut slot = self.slot.lock().await;
            *slot = Slot::Ready(session.clone());
        }
        info!("Session installed in pool");

        let pool = Arc::downgrade(self);
        let closed = session.closed();
        tokio::spawn(async move {
            closed.await;
            warn!("Session terminated");
            if let Some(pool) = pool.upgrade() {
                pool.replace_dead(&session).await;
            }
        });
    }

    /// Eager relaunch path: discard the dead session if it is still
    /// current and begin a new launch right away.
    async fn replace_dead(self: &Arc<Self>, dead: &Arc<S>) {
        let mut slot = self.slot.lock().await;
        if let Slot::Ready(current) = &*slot {
            if Arc::ptr_eq(current, dead) {
                info!("Relaunching after session termination");
                *slot = Slot::Launching(self.start_launch());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug)]
    struct FakeSession {
        alive: Arc<AtomicBool>,
        terminated: Arc<tokio::sync::Notify>,
    }

    impl FakeSession {
        fn new() -> Self {
            Self {
                alive: Arc::new(AtomicBool::new(true)),
                terminated: Arc::new(tokio::sync::Notify::new()),
            }
        }

        fn kill(&self) {
            self.alive.store(false, Ordering::SeqCst);
            self.terminated.notify_waiters();
        }
    }

    impl Session for FakeSession {
        fn is_alive(&self) -> bool {
            self.alive.load(Ordering::SeqCst)
        }

        fn closed(&self) -> BoxFuture<'static, ()> {
            let alive = self.alive.clone();
            let terminated = self.terminated.clone();
            async move {
                loop {
                    let mut notified = std::pin::pin!(terminated.notified());
                    notified.as_mut().enable();
                    if !alive.load(Ordering::SeqCst) {
                        return;
                    }
                    notified.await;
                }
            }
            .boxed()
        }
    }

    struct CountingLauncher {
        launches: AtomicUsize,
        delay: Duration,
        fail: AtomicBool,
    }

    impl CountingLauncher {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                launches: AtomicUsize::new(0),
                delay,
                fail: AtomicBool::new(false),
            })
        }

        fn count(&self) -> usize {
            self.launches.load(Ordering::SeqCst)
        }
    }

    impl Launcher<FakeSession> for CountingLauncher {
        fn launch(&self) -> BoxFuture<'static, Result<FakeSession>> {
            self.launches.fetch_add(1, Ordering::SeqCst);
            let delay = self.delay;
            let fail = self.fail.load(Ordering::SeqCst);
            async move {
                tokio::time::sleep(delay).await;
                if fail {
                    Err(SessionError::LaunchFailed("boom".to_string()).into())
                } else {
                    Ok(FakeSession::new())
                }
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn concurrent_acquirers_share_one_launch() {
        let launcher = CountingLauncher::new(Duration::from_millis(50));
        let pool = SessionPool::new(launcher.clone() as Arc<dyn Launcher<FakeSession>>);

        let (a, b, c) = tokio::join!(pool.acquire(), pool.acquire(), pool.acquire());
        let a = a.unwrap();
        assert!(Arc::ptr_eq(&a, &b.unwrap()));
        assert!(Arc::ptr_eq(&a, &c.unwrap()));
        assert_eq!(launcher.count(), 1);
    }

    #[tokio::test]
    async fn acquire_reuses_live_session() {
        let launcher = CountingLauncher::new(Duration::from_millis(1));
        let pool = SessionPool::new(launcher.clone() as Arc<dyn Launcher<FakeSession>>);

        let first = pool.acquire().await.unwrap();
        let second = pool.acquire().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(launcher.count(), 1);
    }

    #[tokio::test]
    async fn dead_session_triggers_eager_relaunch() {
        let launcher = CountingLauncher::new(Duration::from_millis(1));
        let pool = SessionPool::new(launcher.clone() as Arc<dyn Launcher<FakeSession>>);

        let session = pool.acquire().await.unwrap();
        session.kill();

        // The monitor task should begin the relaunch without any
        // acquire() prompting it.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(launcher.count(), 2);

        let replacement = pool.acquire().await.unwrap();
        assert!(!Arc::ptr_eq(&session, &replacement));
        assert!(replacement.is_alive());
    }

    #[tokio::test]
    async fn launch_failure_keeps_its_original_error() {
        let launcher = CountingLauncher::new(Duration::from_millis(1));
        launcher.fail.store(true, Ordering::SeqCst);
        let pool = SessionPool::new(launcher.clone() as Arc<dyn Launcher<FakeSession>>);

        // A cold launch failure is not exhaustion; no relaunch was
        // attempted yet.
        let err = pool.acquire().await.unwrap_err();
        assert!(matches!(err, Error::Session(SessionError::LaunchFailed(_))));
    }

    #[tokio::test]
    async fn acquire_retries_after_failed_launch() {
        let launcher = CountingLauncher::new(Duration::from_millis(1));
        launcher.fail.store(true, Ordering::SeqCst);
        let pool = SessionPool::new(launcher.clone() as Arc<dyn Launcher<FakeSession>>);

        assert!(pool.acquire().await.is_err());

        // Let the driver clear the failed slot, then a fixed launcher
        // should produce a session on the next acquire.
        launcher.fail.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(pool.acquire().await.is_ok());
        assert_eq!(launcher.count(), 2);
    }

    #[tokio::test]
    async fn invalidate_discards_current_session() {
        let launcher = CountingLauncher::new(Duration::from_millis(1));
        let pool = SessionPool::new(launcher.clone() as Arc<dyn Launcher<FakeSession>>);

        let session = pool.acquire().await.unwrap();
        pool.invalidate(&session).await;

        let replacement = pool.acquire().await.unwrap();
        assert!(!Arc::ptr_eq(&session, &replacement));
        assert_eq!(launcher.count(), 2);
    }

    #[tokio::test]
    async fn invalidate_of_stale_session_is_a_noop() {
        let launcher = CountingLauncher::new(Duration::from_millis(1));
        let pool = SessionPool::new(launcher.clone() as Arc<dyn Launcher<FakeSession>>);

        let first = pool.acquire().await.unwrap();
        pool.invalidate(&first).await;
        let second = pool.acquire().await.unwrap();

        // Invalidating the already-replaced session must not discard
        // the new one.
        pool.invalidate(&first).await;
        let third = pool.acquire().await.unwrap();
        assert!(Arc::ptr_eq(&second, &third));
        assert_eq!(launcher.count(), 2);
    }

    #[tokio::test]
    async fn warm_up_starts_launch_without_waiters() {
        let launcher = CountingLauncher::new(Duration::from_millis(1));
        let pool = SessionPool::new(launcher.clone() as Arc<dyn Launcher<FakeSession>>);

        pool.warm_up().await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(launcher.count(), 1);

        // The warmed session is ready without a second launch.
        pool.acquire().await.unwrap();
        assert_eq!(launcher.count(), 1);
    }
}
