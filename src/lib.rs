//! # inkshot
//!
//! Scheduled dashboard screenshots for e-ink displays.
//!
//! A headless browser renders a web page, the raster is converted to an
//! e-ink-friendly format (PNG, JPEG, or a Floyd–Steinberg dithered 1/2-bit
//! BMP), and the result lands in a flat directory of timestamped files.
//! Named capture profiles persist in a JSON document and carry their own
//! refresh interval and run history.
//!
//! This crate provides:
//! - A concurrency-bounded capture pipeline over a pluggable [`Renderer`]
//! - Format conversion with dithering for 1-bit and 2-bit panels
//! - A capture store with traversal-safe lookups and retention sweeps
//! - A validated, file-backed profile store
//! - A scheduling predicate deciding which profiles are due
//! - Optional axum router and Chrome headless backend
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use inkshot::{CaptureRequest, CaptureService, OutputFormat, ServiceConfig};
//! use inkshot::chrome::{ChromeConfig, ChromeRenderer};
//!
//! let renderer = ChromeRenderer::launch(ChromeConfig::default()).await?;
//! let service = CaptureService::open(ServiceConfig::default())
//!     .await?
//!     .with_renderer(Arc::new(renderer));
//!
//! let request = CaptureRequest::new("https://dash.example.com/")
//!     .with_format(OutputFormat::Bmp3);
//! let result = service.capture(&request).await?;
//! println!("{:?}", result.filename);
//! ```
//!
//! ## Output Formats
//!
//! | Format | Extension | Notes |
//! |--------|-----------|-------|
//! | `png`  | `.png` | Lossless, full color |
//! | `jpeg` | `.jpg` | Quality from config (default 90) |
//! | `bmp3` | `.bmp` | Dithered palette BMP, 1-bit by default |
//! | `bmp`  | `.bmp` | Same encoding as `bmp3` |
//!
//! ## Feature Flags
//!
//! - `axum` - HTTP router over a shared [`CaptureService`]
//! - `render` - Chrome headless rendering backend
//! - `full` - All features

mod bmp;
pub mod config;
mod convert;
mod dither;
mod error;
mod profile;
mod profile_store;
pub mod renderer;
pub mod schedule;
mod service;
mod storage;
mod throttle;
mod types;

pub use config::{RetentionConfig, ServiceConfig};
pub use convert::{convert, convert_named, BitDepth, ConvertOptions};
pub use error::{CaptureErrorKind, Error};
pub use profile::{validate_profile, Profile, ProfileInput};
pub use profile_store::ProfileStore;
pub use renderer::{RenderSession, Renderer, SessionOptions};
pub use schedule::{due_profiles, is_due};
pub use service::CaptureService;
pub use storage::{screenshot_filename, CaptureStore, StoredImage};
pub use throttle::{CapturePermit, CaptureThrottle};
pub use types::{CaptureRequest, CaptureResult, OutputFormat, Theme};

/// Default viewport width in pixels
pub const DEFAULT_WIDTH: u32 = 800;

/// Default viewport height in pixels
pub const DEFAULT_HEIGHT: u32 = 480;

/// Smallest accepted viewport dimension
pub const MIN_DIMENSION: u32 = 100;

/// Largest accepted viewport dimension
pub const MAX_DIMENSION: u32 = 4000;

// Optional modules
#[cfg(feature = "render")]
pub mod chrome;
#[cfg(feature = "render")]
pub use chrome::{ChromeConfig, ChromeRenderer};

#[cfg(feature = "axum")]
pub mod axum_ext;
