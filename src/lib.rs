//! sitesnap - Screenshot Bundling Service
//!
//! Renders a target page and up to two of its same-origin sub-pages
//! through a single shared headless Chromium session, captures a
//! viewport screenshot of each, and bundles the captures into one zip
//! archive that is deleted after a short grace period.
//!
//! # Architecture
//!
//! ```text
//! HTTP Request ──▶ Capture Pipeline ──▶ Session Pool (one Chromium)
//!                       │                     │
//!                       ▼                     ▼
//!                 Page Contexts         crash detect +
//!                 (per target)          single-flight relaunch
//!                       │
//!                       ▼
//!                Capture directory ──▶ Zip Packager ──▶ response
//!                       │
//!                       ▼
//!                Cleanup Scheduler (grace period, then delete)
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use sitesnap::browser::{ChromeLauncher, SessionPool};
//! use sitesnap::pipeline::{default_launch_options, CapturePipeline, PipelineConfig};
//! use sitesnap::record::NullRecordSink;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let launcher = ChromeLauncher::new(default_launch_options(None));
//!     let pool = SessionPool::new(Arc::new(launcher));
//!     let pipeline = CapturePipeline::new(
//!         pool,
//!         Arc::new(NullRecordSink),
//!         PipelineConfig::new("shots"),
//!     );
//!
//!     let outcome = pipeline.capture("https://example.com").await?;
//!     println!("Archive at {}", outcome.archive.display());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod archive;
pub mod browser;
pub mod cleanup;
pub mod error;
pub mod links;
pub mod pipeline;
pub mod record;
pub mod server;

// Re-exports for convenience
pub use browser::{RenderSession, SessionPool};
pub use error::{Error, Result};
pub use pipeline::{CaptureOutcome, CapturePipeline, PipelineConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
