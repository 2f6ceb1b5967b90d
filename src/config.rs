//! Service configuration.
//!
//! Every field has a default, so an empty YAML document is a valid config.
//!
//! # Example (YAML)
//!
//! ```yaml
//! screenshot_dir: /var/lib/inkshot/screenshots
//! profiles_path: /var/lib/inkshot/profiles.json
//! max_concurrent_captures: 2
//! navigation_timeout_ms: 20000
//! settle_delay_ms: 1500
//! bmp_bit_depth: 1
//! retention:
//!   max_age_hours: 48
//!   max_count: 200
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::convert::{BitDepth, ConvertOptions};
use crate::Error;

/// Retention limits applied by [`CaptureStore::retain`](crate::CaptureStore::retain).
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetentionConfig {
    /// Delete images older than this many hours
    pub max_age_hours: u64,
    /// Keep at most this many images
    pub max_count: usize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_age_hours: 168,
            max_count: 100,
        }
    }
}

/// Configuration for a [`CaptureService`](crate::CaptureService).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Directory captured images are written to (default: "data/screenshots")
    pub screenshot_dir: PathBuf,

    /// JSON document holding profiles (default: "data/profiles.json")
    pub profiles_path: PathBuf,

    /// Maximum renders in flight (default: 3)
    pub max_concurrent_captures: usize,

    /// Navigation timeout in milliseconds (default: 30000)
    pub navigation_timeout_ms: u64,

    /// Delay after navigation before the snapshot, in milliseconds (default: 1000)
    pub settle_delay_ms: u64,

    /// JPEG quality 1-100 (default: 90)
    pub jpeg_quality: u8,

    /// Bit depth for BMP output (default: 1)
    pub bmp_bit_depth: BitDepth,

    /// Bearer token forwarded to every page load
    pub auth_token: Option<String>,

    /// Retention sweep limits
    pub retention: RetentionConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            screenshot_dir: PathBuf::from("data/screenshots"),
            profiles_path: PathBuf::from("data/profiles.json"),
            max_concurrent_captures: 3,
            navigation_timeout_ms: 30_000,
            settle_delay_ms: 1_000,
            jpeg_quality: 90,
            bmp_bit_depth: BitDepth::One,
            auth_token: None,
            retention: RetentionConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Load config from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_yaml(&content)
    }

    /// Parse config from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, Error> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| Error::Config(format!("Invalid config YAML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `INKSHOT_*` environment overrides.
    ///
    /// Recognized: `INKSHOT_SCREENSHOT_DIR`, `INKSHOT_PROFILES_PATH`,
    /// `INKSHOT_MAX_CONCURRENT`, `INKSHOT_AUTH_TOKEN`.
    pub fn with_env_overrides(mut self) -> Result<Self, Error> {
        if let Ok(dir) = std::env::var("INKSHOT_SCREENSHOT_DIR") {
            self.screenshot_dir = PathBuf::from(dir);
        }
        if let Ok(path) = std::env::var("INKSHOT_PROFILES_PATH") {
            self.profiles_path = PathBuf::from(path);
        }
        if let Ok(max) = std::env::var("INKSHOT_MAX_CONCURRENT") {
            self.max_concurrent_captures = max.parse().map_err(|_| {
                Error::Config(format!("INKSHOT_MAX_CONCURRENT is not a number: '{}'", max))
            })?;
        }
        if let Ok(token) = std::env::var("INKSHOT_AUTH_TOKEN") {
            self.auth_token = Some(token).filter(|t| !t.is_empty());
        }
        self.validate()?;
        Ok(self)
    }

    /// Use a different screenshot directory.
    pub fn with_screenshot_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.screenshot_dir = path.into();
        self
    }

    /// Use a different profile document.
    pub fn with_profiles_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.profiles_path = path.into();
        self
    }

    /// Change the concurrency bound.
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent_captures = max;
        self
    }

    /// Change navigation timeout and settle delay.
    pub fn with_timings(mut self, navigation_timeout_ms: u64, settle_delay_ms: u64) -> Self {
        self.navigation_timeout_ms = navigation_timeout_ms;
        self.settle_delay_ms = settle_delay_ms;
        self
    }

    /// Forward a bearer token on every capture.
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), Error> {
        if self.max_concurrent_captures == 0 {
            return Err(Error::Config(
                "max_concurrent_captures must be at least 1".to_string(),
            ));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(Error::Config(format!(
                "jpeg_quality must be between 1 and 100 (got {})",
                self.jpeg_quality
            )));
        }
        Ok(())
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Converter settings derived from this config.
    pub fn convert_options(&self) -> ConvertOptions {
        ConvertOptions {
            jpeg_quality: self.jpeg_quality,
            bit_depth: self.bmp_bit_depth,
        }
    }
}
