//! Error types for the capture pipeline and its stores.

use serde::Serialize;
use thiserror::Error;

/// Errors that can occur while capturing, converting, or storing screenshots.
#[derive(Debug, Error)]
pub enum Error {
    /// The rendering backend is not initialized or could not open a session
    #[error("Browser unavailable: {0}")]
    BrowserUnavailable(String),

    /// Navigation did not complete within the configured timeout
    #[error("Navigation to {url} timed out after {timeout_ms}ms")]
    NavigationTimeout {
        /// Target URL
        url: String,
        /// Timeout that elapsed
        timeout_ms: u64,
    },

    /// The target page failed to load
    #[error("Navigation failed: {0}")]
    Navigation(String),

    /// The browser loaded the page but could not produce a raster
    #[error("Render failed: {0}")]
    Render(String),

    /// Requested output format is not one of png, jpeg, bmp3, bmp
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Profile or screenshot does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// One or more fields are out of range or of the wrong type
    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// Local file I/O failed (disk full, permission denied, ...)
    #[error("I/O error: {0}")]
    Io(String),

    /// Image decoding or encoding failed
    #[error("Image error: {0}")]
    Image(String),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Serialization(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Failure categories reported in a failed [`CaptureResult`](crate::CaptureResult).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureErrorKind {
    /// Infrastructure not ready; callers should back off
    BrowserUnavailable,
    /// Target page did not finish loading in time
    NavigationTimeout,
    /// Target page failed to load
    NavigationError,
    /// Anything else that went wrong while producing the image
    CaptureError,
}

impl Error {
    /// Classify this error for a failed capture result.
    pub fn capture_kind(&self) -> CaptureErrorKind {
        match self {
            Error::BrowserUnavailable(_) => CaptureErrorKind::BrowserUnavailable,
            Error::NavigationTimeout { .. } => CaptureErrorKind::NavigationTimeout,
            Error::Navigation(_) => CaptureErrorKind::NavigationError,
            _ => CaptureErrorKind::CaptureError,
        }
    }

    /// Whether this is a local persistence fault that must propagate to the
    /// caller instead of resolving to a failed capture result.
    pub fn is_local_fault(&self) -> bool {
        matches!(self, Error::Io(_) | Error::Serialization(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::Image(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::NavigationTimeout {
            url: "http://dash.local/".to_string(),
            timeout_ms: 30_000,
        };
        assert!(err.to_string().contains("30000ms"));
        assert!(err.to_string().contains("http://dash.local/"));

        let err = Error::Validation(vec![
            "width must be between 100 and 4000".to_string(),
            "theme must be one of light, dark".to_string(),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("width"));
        assert!(msg.contains("theme"));
    }

    #[test]
    fn test_capture_kind() {
        assert_eq!(
            Error::BrowserUnavailable("down".into()).capture_kind(),
            CaptureErrorKind::BrowserUnavailable
        );
        assert_eq!(
            Error::Navigation("dns".into()).capture_kind(),
            CaptureErrorKind::NavigationError
        );
        assert_eq!(
            Error::Render("blank".into()).capture_kind(),
            CaptureErrorKind::CaptureError
        );
    }

    #[test]
    fn test_local_fault() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(Error::from(io).is_local_fault());
        assert!(!Error::Navigation("refused".into()).is_local_fault());
        assert!(!Error::NotFound("x".into()).is_local_fault());
    }
}
