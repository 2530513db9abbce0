//! Isolated page contexts
//!
//! Each navigation target gets its own tab inside the shared session,
//! configured with a fixed viewport, a realistic desktop user agent and
//! an `Accept-Language` header. The fixed identity reduces bot-blocking
//! false negatives and is deliberately not configurable per request.

use crate::browser::navigation::{NavigationOptions, PageNavigator};
use crate::error::{Error, Result, SessionError};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, instrument};

/// Desktop Chrome user agent presented to target sites
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36";

/// Language header sent with every navigation
pub const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

/// Viewport applied to every context
pub const VIEWPORT: (u32, u32) = (1366, 768);

/// Per-context configuration
#[derive(Debug, Clone)]
pub struct ContextOptions {
    /// Viewport width in CSS pixels
    pub width: u32,
    /// Viewport height in CSS pixels
    pub height: u32,
    /// User agent string
    pub user_agent: String,
    /// Accept-Language header value
    pub accept_language: String,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            width: VIEWPORT.0,
            height: VIEWPORT.1,
            user_agent: USER_AGENT.to_string(),
            accept_language: ACCEPT_LANGUAGE.to_string(),
        }
    }
}

/// What the capture pipeline needs from one open context.
///
/// [`PageContext`] is the production implementation; the seam exists so
/// orchestration logic can be driven without a browser process.
pub trait PageOps: Send {
    /// Navigate to `url` and wait for the page to settle.
    fn navigate<'a>(
        &'a self,
        url: &'a str,
        options: &'a NavigationOptions,
    ) -> BoxFuture<'a, Result<()>>;

    /// Location the context actually sits on, if any.
    fn current_location(&self) -> BoxFuture<'_, Result<Option<String>>>;

    /// PNG of the visible viewport.
    fn capture_png(&self) -> BoxFuture<'_, Result<Vec<u8>>>;

    /// Absolute anchor hrefs of the rendered document, in order.
    fn hrefs(&self) -> BoxFuture<'_, Result<Vec<String>>>;

    /// Release the context.
    fn dispose(self) -> BoxFuture<'static, ()>
    where
        Self: Sized;
}

/// One isolated browsing context, scoped to a single navigation target.
///
/// Created per target and closed after its capture completes or fails;
/// callers must release it on every exit path.
pub struct PageContext {
    page: Page,
}

impl PageContext {
    /// Apply viewport and identity overrides to a freshly opened page.
    pub(crate) async fn configure(page: Page, options: &ContextOptions) -> Result<Self> {
        page.execute(
            SetDeviceMetricsOverrideParams::builder()
                .width(options.width as i64)
                .height(options.height as i64)
                .device_scale_factor(1.0)
                .mobile(false)
                .build()
                .map_err(SessionError::ConfigError)?,
        )
        .await
        .map_err(|e| SessionError::ContextFailed(e.to_string()))?;

        page.execute(SetUserAgentOverrideParams {
            user_agent: options.user_agent.clone(),
            accept_language: Some(options.accept_language.clone()),
            platform: None,
            user_agent_metadata: None,
        })
        .await
        .map_err(|e| SessionError::ContextFailed(e.to_string()))?;

        Ok(Self { page })
    }

    /// The underlying chromiumoxide page.
    pub fn inner(&self) -> &Page {
        &self.page
    }

    /// Current location of the context, if any.
    pub async fn current_url(&self) -> Result<Option<String>> {
        self.page.url().await.map_err(|e| Error::cdp(e.to_string()))
    }

    /// Capture a PNG of the visible viewport (not full-page).
    #[instrument(skip(self))]
    pub async fn screenshot_png(&self) -> Result<Vec<u8>> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .from_surface(true)
            .capture_beyond_viewport(false)
            .build();

        let data = self
            .page
            .screenshot(params)
            .await
            .map_err(|e| Error::cdp(e.to_string()))?;

        debug!("Screenshot captured: {} bytes", data.len());
        Ok(data)
    }

    /// Collect the absolute href of every anchor in the rendered DOM,
    /// in document order. Same-origin filtering happens in the caller.
    #[instrument(skip(self))]
    pub async fn anchor_hrefs(&self) -> Result<Vec<String>> {
        let script = r#"
            (() => Array.from(document.querySelectorAll('a[href]'), a => a.href))()
        "#;

        let hrefs: Vec<String> = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| Error::cdp(e.to_string()))?
            .into_value()
            .map_err(|e| Error::cdp(e.to_string()))?;

        debug!("Extracted {} anchors", hrefs.len());
        Ok(hrefs)
    }

    /// Close the tab. Best-effort; a context belonging to a crashed
    /// session is already gone.
    pub async fn close(self) {
        if let Err(e) = self.page.close().await {
            debug!("Page close failed (session may be gone): {}", e);
        }
    }
}

impl PageOps for PageContext {
    fn navigate<'a>(
        &'a self,
        url: &'a str,
        options: &'a NavigationOptions,
    ) -> BoxFuture<'a, Result<()>> {
        PageNavigator::goto(self, url, options).boxed()
    }

    fn current_location(&self) -> BoxFuture<'_, Result<Option<String>>> {
        self.current_url().boxed()
    }

    fn capture_png(&self) -> BoxFuture<'_, Result<Vec<u8>>> {
        self.screenshot_png().boxed()
    }

    fn hrefs(&self) -> BoxFuture<'_, Result<Vec<String>>> {
        self.anchor_hrefs().boxed()
    }

    fn dispose(self) -> BoxFuture<'static, ()> {
        self.close().boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_options_default() {
        let options = ContextOptions::default();
        assert_eq!(options.width, 1366);
        assert_eq!(options.height, 768);
        assert!(options.user_agent.contains("Chrome"));
        assert_eq!(options.accept_language, "en-US,en;q=0.9");
    }

    #[test]
    fn test_user_agent_is_desktop() {
        assert!(USER_AGENT.contains("Windows NT"));
        assert!(!USER_AGENT.contains("Headless"));
    }
}
