//! Capture pipeline
//!
//! Orchestrates one screenshot request end to end: validate the URL,
//! record it, acquire the shared session, capture the main page with
//! protocol fallback, discover and capture up to two same-origin
//! sub-pages, and package the results. Individual target failures are
//! downgraded to warnings; only structural failures (no session, zero
//! captures, packaging) abort the request.
//!
//! The pipeline is generic over [`ContextSource`] so the orchestration
//! rules are testable against scripted sessions; production wires in
//! [`RenderSession`].

use crate::browser::{
    ContextOptions, ContextSource, LaunchOptions, NavigationOptions, PageOps, RenderSession,
    SessionPool,
};
use crate::error::{Error, Result, SessionError};
use crate::links::{self, LinkSet};
use crate::record::{record_detached, RecordSink, RequestRecord};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use url::Url;

/// Number of sub-page candidates captured per request.
///
/// Fixed policy: the first two distinct candidates from the discovered
/// link set.
pub const MAX_SUB_PAGES: usize = 2;

/// Launch options the service runs with: headless, sandbox off for
/// containerized execution, optional explicit binary.
pub fn default_launch_options(chrome_path: Option<String>) -> LaunchOptions {
    let mut builder = LaunchOptions::builder().headless(true).sandbox(false);
    if let Some(path) = chrome_path {
        builder = builder.chrome_path(path);
    }
    builder.build()
}

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root directory for per-request capture directories and archives
    pub shots_root: PathBuf,
    /// Per-navigation timeout policy
    pub navigation: NavigationOptions,
    /// Page context identity (viewport, user agent, language)
    pub context: ContextOptions,
    /// Maximum sub-pages to capture
    pub max_sub_pages: usize,
}

impl PipelineConfig {
    /// Config rooted at `shots_root` with the fixed capture policy.
    pub fn new(shots_root: impl Into<PathBuf>) -> Self {
        Self {
            shots_root: shots_root.into(),
            navigation: NavigationOptions::default(),
            context: ContextOptions::default(),
            max_sub_pages: MAX_SUB_PAGES,
        }
    }
}

/// Result of one capture request
#[derive(Debug)]
pub struct CaptureOutcome {
    /// Request identifier (creation timestamp, milliseconds)
    pub id: i64,
    /// Per-request capture directory
    pub dir: PathBuf,
    /// Finished archive path
    pub archive: PathBuf,
    /// Accumulated per-target warnings
    pub warnings: Vec<String>,
}

/// Flip a URL between https and http.
///
/// Fallback for sites misconfigured on one scheme; applied at most once
/// per request.
pub(crate) fn flip_scheme(url: &Url) -> Option<Url> {
    let mut flipped = url.clone();
    let target = match url.scheme() {
        "https" => "http",
        "http" => "https",
        _ => return None,
    };
    flipped.set_scheme(target).ok()?;
    Some(flipped)
}

/// Artifact filename for the `index`-th selected sub-page.
pub(crate) fn sub_page_filename(link: &Url, index: usize) -> String {
    let stem = links::sanitize_filename(link).unwrap_or_else(|| format!("page_{}", index + 1));
    format!("{}.png", stem)
}

/// The capture orchestrator shared by all requests.
pub struct CapturePipeline<S: ContextSource = RenderSession> {
    pool: Arc<SessionPool<S>>,
    sink: Arc<dyn RecordSink>,
    config: PipelineConfig,
}

impl<S: ContextSource> CapturePipeline<S> {
    /// Build a pipeline around a session pool and record sink.
    pub fn new(
        pool: Arc<SessionPool<S>>,
        sink: Arc<dyn RecordSink>,
        config: PipelineConfig,
    ) -> Self {
        Self { pool, sink, config }
    }

    /// Run one capture request to completion.
    #[instrument(skip(self))]
    pub async fn capture(&self, raw_url: &str) -> Result<CaptureOutcome> {
        let url = self.parse_input(raw_url)?;
        let id = chrono::Utc::now().timestamp_millis();
        let dir = self.config.shots_root.join(format!("site_{}", id));
        tokio::fs::create_dir_all(&dir).await?;

        record_detached(
            &self.sink,
            RequestRecord {
                url: url.to_string(),
                timestamp: id,
            },
        );

        match self.run(url, id, dir.clone()).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                // No partial state may outlive a failed request; the
                // ZeroCapture path has already removed the directory,
                // for which removal is a no-op.
                let _ = tokio::fs::remove_dir_all(&dir).await;
                Err(e)
            }
        }
    }

    /// Parse and canonicalize client input. Fast failure, before any
    /// resource acquisition.
    fn parse_input(&self, raw_url: &str) -> Result<Url> {
        let trimmed = links::strip_trailing_slash(raw_url.trim());
        let url =
            Url::parse(trimmed).map_err(|e| Error::InvalidInput(format!("{}: {}", trimmed, e)))?;
        if !links::is_navigable(&url) {
            return Err(Error::InvalidInput(format!(
                "unsupported scheme '{}': {}",
                url.scheme(),
                trimmed
            )));
        }
        Ok(url)
    }

    async fn run(&self, url: Url, id: i64, dir: PathBuf) -> Result<CaptureOutcome> {
        let mut warnings = Vec::new();
        let mut got_shot = false;

        let (session, main_ctx) = self.open_main_context().await?;

        let link_set = {
            let result = self
                .capture_main_page(&main_ctx, &url, &dir, &mut warnings, &mut got_shot)
                .await;
            main_ctx.dispose().await;
            result
        };

        for (index, link) in link_set.iter().take(self.config.max_sub_pages).enumerate() {
            let filename = sub_page_filename(link, index);
            match self.capture_one(&session, link.as_str(), &dir, &filename).await {
                Ok(()) => {
                    info!("Captured sub-page {} as {}", link, filename);
                    got_shot = true;
                }
                Err(e) => {
                    warn!("Sub-page capture failed: {}: {}", link, e);
                    warnings.push(format!("Sub-page could not be captured: {}", link));
                }
            }
        }

        if !got_shot {
            let _ = tokio::fs::remove_dir_all(&dir).await;
            return Err(Error::ZeroCapture(warnings));
        }

        let archive = self
            .config
            .shots_root
            .join(format!("screenshots_{}.zip", id));
        crate::archive::package(&dir, &archive).await?;

        Ok(CaptureOutcome {
            id,
            dir,
            archive,
            warnings,
        })
    }

    /// Acquire the shared session and open the main context, tolerating
    /// a session that dies between launch and first use: one
    /// invalidate-and-retry before surfacing exhaustion.
    async fn open_main_context(&self) -> Result<(Arc<S>, S::Context)> {
        let session = self.pool.acquire().await?;
        match session.open_context(&self.config.context).await {
            Ok(ctx) => Ok((session, ctx)),
            Err(first) => {
                warn!("Session failed on first use, relaunching: {}", first);
                self.pool.invalidate(&session).await;
                let session = self
                    .pool
                    .acquire()
                    .await
                    .map_err(|e| SessionError::Exhausted(e.to_string()))?;
                let ctx = session
                    .open_context(&self.config.context)
                    .await
                    .map_err(|e| SessionError::Exhausted(e.to_string()))?;
                Ok((session, ctx))
            }
        }
    }

    /// Main-page navigation with one scheme flip, viewport capture, and
    /// link discovery. Returns the candidate set (empty when discovery
    /// failed or was skipped).
    async fn capture_main_page(
        &self,
        ctx: &S::Context,
        url: &Url,
        dir: &std::path::Path,
        warnings: &mut Vec<String>,
        got_shot: &mut bool,
    ) -> LinkSet {
        let mut effective = url.clone();

        if let Err(e) = ctx.navigate(effective.as_str(), &self.config.navigation).await {
            warn!("Main page load failed: {}: {}", effective, e);
            warnings.push(format!("Main page failed to load: {}", effective));

            match flip_scheme(&effective) {
                Some(flipped) => {
                    if let Err(e) = ctx.navigate(flipped.as_str(), &self.config.navigation).await {
                        warn!("Main page load failed after scheme flip: {}: {}", flipped, e);
                        warnings.push(format!("Main page failed to load: {}", flipped));
                    }
                    effective = flipped;
                }
                None => return LinkSet::default(),
            }
        }

        // Only capture when the context actually sits on a web page;
        // after two failed loads it is still about:blank.
        let location = ctx.current_location().await.ok().flatten().unwrap_or_default();
        if !location.starts_with("http") {
            return LinkSet::default();
        }

        match ctx.capture_png().await {
            Ok(png) => match tokio::fs::write(dir.join("home.png"), png).await {
                Ok(()) => {
                    info!("Captured main page {}", location);
                    *got_shot = true;
                }
                Err(e) => {
                    warn!("Failed to write home.png: {}", e);
                    warnings.push("Main page screenshot could not be saved".to_string());
                }
            },
            Err(e) => {
                warn!("Main page screenshot failed: {}", e);
                warnings.push(format!("Main page could not be captured: {}", effective));
            }
        }

        // Candidates are resolved against the page actually rendered,
        // which may differ from the request after redirects or the
        // scheme flip.
        let home = Url::parse(&location).unwrap_or(effective);
        match ctx.hrefs().await {
            Ok(hrefs) => LinkSet::collect(&home, hrefs),
            Err(e) => {
                warn!("Link extraction failed: {}", e);
                warnings.push("Links could not be extracted (frame detached)".to_string());
                LinkSet::default()
            }
        }
    }

    /// Capture one sub-page in its own context. The context is released
    /// on every path.
    async fn capture_one(
        &self,
        session: &S,
        url: &str,
        dir: &std::path::Path,
        filename: &str,
    ) -> Result<()> {
        let ctx = session.open_context(&self.config.context).await?;
        let result = async {
            ctx.navigate(url, &self.config.navigation).await?;
            let png = ctx.capture_png().await?;
            tokio::fs::write(dir.join(filename), png).await?;
            Ok(())
        }
        .await;
        ctx.dispose().await;
        result
    }
}
