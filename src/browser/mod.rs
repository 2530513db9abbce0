//! Browser automation module
//!
//! High-level control of the shared Chromium session through
//! ChromiumOxide: lifecycle and pooling, per-target page contexts,
//! and bounded navigation.

pub mod context;
pub mod navigation;
pub mod pool;
pub mod session;

pub use context::{ContextOptions, PageContext, PageOps};
pub use navigation::{NavigationOptions, PageNavigator, NAVIGATION_TIMEOUT_MS};
pub use pool::{Launcher, Session, SessionPool};
pub use session::{ChromeLauncher, ContextSource, LaunchOptions, RenderSession};
