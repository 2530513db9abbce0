//! Error types for sitesnap
//!
//! This module provides the error type hierarchy using `thiserror`,
//! split along the failure classes the HTTP boundary distinguishes:
//! client input errors, session (browser) errors, per-target navigation
//! failures, and packaging/filesystem faults.

use thiserror::Error;

/// The main error type for sitesnap operations
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or missing URL from the client (maps to 400)
    #[error("Invalid URL: {0}")]
    InvalidInput(String),

    /// No screenshot could be produced for any target (maps to 400).
    ///
    /// Carries the accumulated warnings so the response can explain
    /// which targets failed and why.
    #[error("No screenshot could be captured")]
    ZeroCapture(Vec<String>),

    /// Browser session errors (maps to 500)
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Navigation errors
    #[error("Navigation error: {0}")]
    Navigation(#[from] NavigationError),

    /// Archive packaging errors (maps to 500)
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// ChromiumOxide errors
    #[error("CDP error: {0}")]
    Cdp(String),
}

/// Browser session lifecycle errors
#[derive(Error, Debug, Clone)]
pub enum SessionError {
    /// Failed to launch the browser process
    #[error("Failed to launch browser: {0}")]
    LaunchFailed(String),

    /// Invalid launch configuration
    #[error("Invalid launch configuration: {0}")]
    ConfigError(String),

    /// Failed to open an isolated page context
    #[error("Failed to open page context: {0}")]
    ContextFailed(String),

    /// No usable session even after a relaunch attempt
    #[error("No browser session obtainable: {0}")]
    Exhausted(String),
}

/// Per-target navigation failures.
///
/// These are downgraded to warnings by the pipeline; they only surface
/// as `Error` when a caller navigates outside the pipeline.
#[derive(Error, Debug)]
pub enum NavigationError {
    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Navigation timeout
    #[error("Navigation timed out after {0}ms")]
    Timeout(u64),

    /// Page load failed
    #[error("Page load failed: {0}")]
    LoadFailed(String),
}

/// Archive packaging errors
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// Writing the zip failed
    #[error("Failed to write archive: {0}")]
    WriteFailed(String),

    /// The capture directory could not be read
    #[error("Failed to read capture directory: {0}")]
    ReadDirFailed(String),
}

/// Result type alias for sitesnap operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a CDP error from a string
    pub fn cdp<S: Into<String>>(msg: S) -> Self {
        Error::Cdp(msg.into())
    }

    /// Whether this error reflects the target site rather than
    /// a fault of this service.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::InvalidInput(_) | Error::ZeroCapture(_))
    }
}

/// Convert chromiumoxide errors
impl From<chromiumoxide::error::CdpError> for Error {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        Error::Cdp(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Session(SessionError::LaunchFailed("no chrome".to_string()));
        assert!(err.to_string().contains("Failed to launch browser"));
        assert!(err.to_string().contains("no chrome"));
    }

    #[test]
    fn test_navigation_timeout_display() {
        let err = NavigationError::Timeout(15000);
        assert_eq!(err.to_string(), "Navigation timed out after 15000ms");
    }

    #[test]
    fn test_zero_capture_is_client_error() {
        let err = Error::ZeroCapture(vec!["main page failed".to_string()]);
        assert!(err.is_client_error());
        let err = Error::Session(SessionError::Exhausted("relaunch failed".to_string()));
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_invalid_input_display() {
        let err = Error::InvalidInput("not-a-url".to_string());
        assert!(err.to_string().contains("not-a-url"));
    }

    #[test]
    fn test_archive_error_display() {
        let err = ArchiveError::WriteFailed("disk full".to_string());
        assert!(err.to_string().contains("disk full"));
    }
}
