//! Capture request and result types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CaptureErrorKind, Error};
use crate::{DEFAULT_HEIGHT, DEFAULT_WIDTH, MAX_DIMENSION, MIN_DIMENSION};

/// Color scheme the page is rendered with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    /// Default light scheme
    #[default]
    Light,
    /// `prefers-color-scheme: dark` emulation
    Dark,
}

impl Theme {
    /// Lowercase name as used in requests and profiles.
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }
}

impl FromStr for Theme {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            other => Err(Error::Validation(vec![format!(
                "theme must be one of light, dark (got '{}')",
                other
            )])),
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output image format.
///
/// `Bmp3` and `Bmp` both produce a dithered low-bit-depth BMP suitable for
/// e-ink panels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Lossless, untouched raster
    #[default]
    Png,
    /// Lossy re-encode
    Jpeg,
    /// Dithered BMP v3
    Bmp3,
    /// Alias of `Bmp3`
    Bmp,
}

impl OutputFormat {
    /// Lowercase name as used in requests and profiles.
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Bmp3 => "bmp3",
            OutputFormat::Bmp => "bmp",
        }
    }

    /// File extension for stored images.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Bmp3 | OutputFormat::Bmp => "bmp",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "png" => Ok(OutputFormat::Png),
            "jpeg" => Ok(OutputFormat::Jpeg),
            "bmp3" => Ok(OutputFormat::Bmp3),
            "bmp" => Ok(OutputFormat::Bmp),
            other => Err(Error::UnsupportedFormat(other.to_string())),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check that a viewport dimension lies within the accepted range.
pub(crate) fn check_dimension(field: &str, value: i64, violations: &mut Vec<String>) {
    if value < MIN_DIMENSION as i64 || value > MAX_DIMENSION as i64 {
        violations.push(format!(
            "{} must be between {} and {} (got {})",
            field, MIN_DIMENSION, MAX_DIMENSION, value
        ));
    }
}

/// Check that a target URL parses and uses http or https.
pub(crate) fn check_url(value: &str, violations: &mut Vec<String>) {
    match url::Url::parse(value) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
        Ok(parsed) => violations.push(format!(
            "url must use http or https (got '{}')",
            parsed.scheme()
        )),
        Err(e) => violations.push(format!("url is invalid: {}", e)),
    }
}

/// A single capture request.
///
/// # Example
///
/// ```
/// use inkshot::{CaptureRequest, OutputFormat, Theme};
///
/// let request = CaptureRequest::new("https://dash.example.com/")
///     .with_theme(Theme::Dark)
///     .with_format(OutputFormat::Bmp3);
///
/// assert_eq!(request.width, 800);
/// assert!(request.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    /// Page to capture
    pub url: String,
    /// Viewport width in pixels
    pub width: u32,
    /// Viewport height in pixels
    pub height: u32,
    /// Color scheme
    pub theme: Theme,
    /// Bearer token forwarded as `Authorization` header
    pub token: Option<String>,
    /// Output format
    pub format: OutputFormat,
}

impl CaptureRequest {
    /// Create a request for `url` with the default 800x480 light PNG settings.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            theme: Theme::Light,
            token: None,
            format: OutputFormat::Png,
        }
    }

    /// Set viewport size.
    #[must_use]
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set color scheme.
    #[must_use]
    pub fn with_theme(mut self, theme: Theme) -> Self {
        self.theme = theme;
        self
    }

    /// Set output format.
    #[must_use]
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Set (or clear) the bearer token.
    #[must_use]
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    /// Check URL and viewport bounds, reporting every violation.
    pub fn validate(&self) -> Result<(), Error> {
        let mut violations = Vec::new();
        check_url(&self.url, &mut violations);
        check_dimension("width", self.width as i64, &mut violations);
        check_dimension("height", self.height as i64, &mut violations);
        if violations.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(violations))
        }
    }
}

/// Outcome of one capture attempt. Immutable once produced.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureResult {
    /// Whether an image was produced and stored
    pub success: bool,

    /// Stored filename
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    /// Stored size in bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    /// Image width in pixels
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,

    /// Image height in pixels
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,

    /// Output format
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<OutputFormat>,

    /// When the attempt completed
    pub timestamp: DateTime<Utc>,

    /// Failure description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Failure category
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<CaptureErrorKind>,
}

impl CaptureResult {
    /// Build a successful result.
    pub fn success(
        filename: impl Into<String>,
        size: u64,
        width: u32,
        height: u32,
        format: OutputFormat,
    ) -> Self {
        Self {
            success: true,
            filename: Some(filename.into()),
            size: Some(size),
            width: Some(width),
            height: Some(height),
            format: Some(format),
            timestamp: Utc::now(),
            error: None,
            error_kind: None,
        }
    }

    /// Build a failed result from the error that ended the attempt.
    pub fn failure(err: &Error) -> Self {
        Self {
            success: false,
            filename: None,
            size: None,
            width: None,
            height: None,
            format: None,
            timestamp: Utc::now(),
            error: Some(err.to_string()),
            error_kind: Some(err.capture_kind()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parsing() {
        assert_eq!("png".parse::<OutputFormat>().unwrap(), OutputFormat::Png);
        assert_eq!("bmp3".parse::<OutputFormat>().unwrap(), OutputFormat::Bmp3);
        assert!(matches!(
            "gif".parse::<OutputFormat>(),
            Err(Error::UnsupportedFormat(f)) if f == "gif"
        ));
        assert_eq!(OutputFormat::Jpeg.extension(), "jpg");
        assert_eq!(OutputFormat::Bmp.extension(), "bmp");
    }

    #[test]
    fn test_theme_parsing() {
        assert_eq!("dark".parse::<Theme>().unwrap(), Theme::Dark);
        assert!(matches!("blue".parse::<Theme>(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_request_defaults() {
        let request = CaptureRequest::new("http://h/");
        assert_eq!(request.width, 800);
        assert_eq!(request.height, 480);
        assert_eq!(request.theme, Theme::Light);
        assert_eq!(request.format, OutputFormat::Png);
        assert!(request.token.is_none());
    }

    #[test]
    fn test_request_validation_reports_all() {
        let request = CaptureRequest::new("ftp://h/").with_size(50, 5000);
        match request.validate() {
            Err(Error::Validation(v)) => {
                assert_eq!(v.len(), 3);
                assert!(v[0].contains("http"));
                assert!(v[1].contains("width"));
                assert!(v[2].contains("height"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }

        assert!(CaptureRequest::new("http://h/")
            .with_size(100, 4000)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_result_serialization() {
        let ok = CaptureResult::success("a.png", 10, 800, 480, OutputFormat::Png);
        let json = serde_json::to_string(&ok).unwrap();
        assert!(json.contains("\"success\":true"));
        assert!(json.contains("\"format\":\"png\""));
        assert!(!json.contains("error"));

        let failed = CaptureResult::failure(&Error::BrowserUnavailable("not started".into()));
        let json = serde_json::to_string(&failed).unwrap();
        assert!(json.contains("\"success\":false"));
        assert!(json.contains("\"errorKind\":\"browser_unavailable\""));
        assert!(!json.contains("filename"));
    }
}
