//! Page navigation
//!
//! A single bounded navigation attempt: drive the page to the target
//! URL and wait for network quiescence, all under one timeout. Retry
//! policy (the https/http scheme flip) lives in the pipeline, not here.

use crate::browser::context::PageContext;
use crate::error::{Error, NavigationError, Result};
use std::time::Duration;
use tracing::{debug, instrument};

/// Default per-navigation timeout
pub const NAVIGATION_TIMEOUT_MS: u64 = 15_000;

/// Options for one navigation attempt
#[derive(Debug, Clone)]
pub struct NavigationOptions {
    /// Timeout in milliseconds for the whole attempt
    pub timeout_ms: u64,
}

impl Default for NavigationOptions {
    fn default() -> Self {
        Self {
            timeout_ms: NAVIGATION_TIMEOUT_MS,
        }
    }
}

/// Drives navigations on a [`PageContext`].
pub struct PageNavigator;

impl PageNavigator {
    /// Navigate the context to `url` and wait for the page to settle.
    ///
    /// Fails with [`NavigationError::Timeout`] when the load and settle
    /// phases together exceed the configured timeout.
    #[instrument(skip(ctx, options))]
    pub async fn goto(ctx: &PageContext, url: &str, options: &NavigationOptions) -> Result<()> {
        debug!("Navigating to {}", url);
        let timeout = Duration::from_millis(options.timeout_ms);

        tokio::time::timeout(timeout, async {
            ctx.inner()
                .goto(url)
                .await
                .map_err(|e| Error::from(NavigationError::LoadFailed(e.to_string())))?;
            Self::wait_for_quiescence(ctx).await
        })
        .await
        .map_err(|_| NavigationError::Timeout(options.timeout_ms))??;

        debug!("Navigation settled: {}", url);
        Ok(())
    }

    /// Wait for the document to finish loading plus a short idle window,
    /// approximating "network idle" without monitoring individual
    /// connections.
    async fn wait_for_quiescence(ctx: &PageContext) -> Result<()> {
        let script = r#"
            new Promise(resolve => {
                if (document.readyState === 'complete') {
                    setTimeout(() => resolve(true), 500);
                } else {
                    window.addEventListener('load', () => {
                        setTimeout(() => resolve(true), 500);
                    });
                }
            })
        "#;

        ctx.inner()
            .evaluate(script)
            .await
            .map_err(|e| NavigationError::LoadFailed(e.to_string()))?;

        Ok(())
    }
}
