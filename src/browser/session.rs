//! Browser session lifecycle
//!
//! This module handles launching the shared Chromium process and tracking
//! its liveness. A [`RenderSession`] wraps one live browser; when its CDP
//! event stream ends the session is considered dead and is replaced by the
//! pool, never repaired in place.

use crate::browser::context::{ContextOptions, PageContext, PageOps};
use crate::browser::pool::{Launcher, Session};
use crate::error::{Result, SessionError};
use chromiumoxide::browser::{Browser, BrowserConfig as CdpBrowserConfig};
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, info, instrument, warn};

/// A session the capture pipeline can open page contexts on.
///
/// Splitting this from [`Session`] keeps the pool purely about
/// lifecycle while orchestration code depends on this seam, so the
/// pipeline can run against sessions that are not backed by a browser.
pub trait ContextSource: Session {
    /// Context type this session produces.
    type Context: PageOps;

    /// Open an isolated page context for one navigation target.
    fn open_context<'a>(
        &'a self,
        options: &'a ContextOptions,
    ) -> BoxFuture<'a, Result<Self::Context>>;
}

/// Configuration for browser launch, fixed for the process lifetime
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Run in headless mode (default: true)
    pub headless: bool,
    /// Enable the Chromium sandbox (default: false, for containerized runs)
    pub sandbox: bool,
    /// Path to Chrome/Chromium executable (None = auto-detect)
    pub chrome_path: Option<String>,
    /// Additional Chrome arguments
    pub extra_args: Vec<String>,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: true,
            sandbox: false,
            chrome_path: None,
            extra_args: Vec::new(),
        }
    }
}

impl LaunchOptions {
    /// Create a new options builder
    pub fn builder() -> LaunchOptionsBuilder {
        LaunchOptionsBuilder::default()
    }
}

/// Builder for LaunchOptions
#[derive(Default)]
pub struct LaunchOptionsBuilder {
    options: LaunchOptions,
}

impl LaunchOptionsBuilder {
    /// Set headless mode
    pub fn headless(mut self, headless: bool) -> Self {
        self.options.headless = headless;
        self
    }

    /// Enable/disable the Chromium sandbox
    pub fn sandbox(mut self, sandbox: bool) -> Self {
        self.options.sandbox = sandbox;
        self
    }

    /// Set Chrome executable path
    pub fn chrome_path<S: Into<String>>(mut self, path: S) -> Self {
        self.options.chrome_path = Some(path.into());
        self
    }

    /// Add an extra Chrome argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.options.extra_args.push(arg.into());
        self
    }

    /// Build the options
    pub fn build(self) -> LaunchOptions {
        self.options
    }
}

/// Handle to one live browser process.
///
/// Liveness is observed through the CDP handler task: when the event
/// stream terminates (process exit, pipe closed) the `alive` flag drops
/// and `closed()` futures resolve.
pub struct RenderSession {
    browser: Browser,
    alive: Arc<AtomicBool>,
    terminated: Arc<Notify>,
}

impl RenderSession {
    /// Launch a new browser process with the given options.
    #[instrument(skip(options))]
    pub async fn launch(options: &LaunchOptions) -> Result<Self> {
        info!(headless = options.headless, "Launching browser");

        let mut builder = CdpBrowserConfig::builder();

        if !options.headless {
            builder = builder.with_head();
        }

        if !options.sandbox {
            builder = builder.arg("--no-sandbox").arg("--disable-setuid-sandbox");
        }

        if let Some(ref path) = options.chrome_path {
            builder = builder.chrome_executable(path);
        }

        for arg in &options.extra_args {
            builder = builder.arg(arg);
        }

        let cdp_config = builder
            .build()
            .map_err(|e| SessionError::ConfigError(e.to_string()))?;

        let (browser, mut handler) = Browser::launch(cdp_config)
            .await
            .map_err(|e| SessionError::LaunchFailed(e.to_string()))?;

        let alive = Arc::new(AtomicBool::new(true));
        let terminated = Arc::new(Notify::new());

        // Drive the CDP event stream; its end means the process is gone.
        let alive_flag = alive.clone();
        let terminated_signal = terminated.clone();
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    warn!("Browser handler event error");
                    break;
                }
            }
            debug!("Browser handler finished, session dead");
            alive_flag.store(false, Ordering::SeqCst);
            terminated_signal.notify_waiters();
        });

        info!("Browser launched successfully");

        Ok(Self {
            browser,
            alive,
            terminated,
        })
    }

}

impl ContextSource for RenderSession {
    type Context = PageContext;

    #[instrument(skip(self, options))]
    fn open_context<'a>(
        &'a self,
        options: &'a ContextOptions,
    ) -> BoxFuture<'a, Result<PageContext>> {
        async move {
            let page = self
                .browser
                .new_page("about:blank")
                .await
                .map_err(|e| SessionError::ContextFailed(e.to_string()))?;

            PageContext::configure(page, options).await
        }
        .boxed()
    }
}

impl Session for RenderSession {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn closed(&self) -> BoxFuture<'static, ()> {
        let alive = self.alive.clone();
        let terminated = self.terminated.clone();
        async move {
            // Register interest before re-checking the flag so a
            // termination between the check and the await is not missed.
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

/// Launches real Chromium sessions for the pool.
pub struct ChromeLauncher {
    options: LaunchOptions,
}

impl ChromeLauncher {
    /// Create a launcher with fixed process-lifetime options.
    pub fn new(options: LaunchOptions) -> Self {
        Self { options }
    }
}

impl Launcher<RenderSession> for ChromeLauncher {
    fn launch(&self) -> BoxFuture<'static, Result<RenderSession>> {
        let options = self.options.clone();
        async move { RenderSession::launch(&options).await }.boxed()
    }
}
