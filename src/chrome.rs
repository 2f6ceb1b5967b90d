//! Chrome headless rendering backend over the DevTools protocol.
//!
//! One Chrome process serves every capture. Each session opens its own
//! browser context (separate cookies, storage, and cache) with a single tab,
//! which gets the session's viewport, color scheme, and request headers.
//! `navigate` only loads the page; the screenshot is taken in `snapshot`, so
//! the pipeline's settle delay runs between the two.
//!
//! `headless_chrome` is synchronous, so every call runs on the blocking pool.
//!
//! # Requirements
//!
//! - Google Chrome or Chromium must be installed (`CHROME_PATH` overrides
//!   auto-detection)
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use inkshot::chrome::{ChromeConfig, ChromeRenderer};
//! use inkshot::{CaptureService, ServiceConfig};
//!
//! let renderer = ChromeRenderer::launch(ChromeConfig::default()).await?;
//! let service = CaptureService::open(ServiceConfig::default())
//!     .await?
//!     .with_renderer(Arc::new(renderer));
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use headless_chrome::browser::tab::Tab;
use headless_chrome::protocol::cdp::{Emulation, Page, Target};
use headless_chrome::types::Bounds;
use headless_chrome::{Browser, LaunchOptions};
use image::DynamicImage;

use crate::renderer::{RenderSession, Renderer, SessionOptions};
use crate::{Error, Theme, DEFAULT_HEIGHT, DEFAULT_WIDTH};

/// Configuration for the Chrome backend.
#[derive(Debug, Clone)]
pub struct ChromeConfig {
    /// Chrome executable (default: `$CHROME_PATH`, else auto-detected)
    pub chrome_path: Option<PathBuf>,

    /// Run Chrome with its sandbox (default: false, as in containers)
    pub sandbox: bool,

    /// How long Chrome may sit without DevTools traffic before the
    /// connection is dropped (default: 24h)
    pub idle_timeout: Duration,

    /// Upper bound for any single blocking wait inside a tab (default: 60s).
    /// The pipeline's navigation timeout normally fires first.
    pub wait_timeout: Duration,
}

impl Default for ChromeConfig {
    fn default() -> Self {
        Self {
            chrome_path: std::env::var_os("CHROME_PATH").map(PathBuf::from),
            sandbox: false,
            idle_timeout: Duration::from_secs(24 * 60 * 60),
            wait_timeout: Duration::from_secs(60),
        }
    }
}

impl ChromeConfig {
    /// Use a specific Chrome binary.
    pub fn with_chrome_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.chrome_path = Some(path.into());
        self
    }

    /// Change the per-wait upper bound.
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }
}

/// Run a synchronous browser call on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T, Error>
where
    F: FnOnce() -> Result<T, Error> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Render(format!("Browser task failed: {}", e)))?
}

/// [`Renderer`] backed by one headless Chrome process.
#[derive(Clone)]
pub struct ChromeRenderer {
    browser: Arc<Browser>,
    config: ChromeConfig,
}

impl std::fmt::Debug for ChromeRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChromeRenderer")
            .field("config", &self.config)
            .finish()
    }
}

impl ChromeRenderer {
    /// Start Chrome and connect to it.
    pub async fn launch(config: ChromeConfig) -> Result<Self, Error> {
        let launch = config.clone();
        let (browser, product) = blocking(move || {
            let options = LaunchOptions::default_builder()
                .headless(true)
                .sandbox(launch.sandbox)
                .path(launch.chrome_path)
                .window_size(Some((DEFAULT_WIDTH, DEFAULT_HEIGHT)))
                .idle_browser_timeout(launch.idle_timeout)
                .build()
                .map_err(|e| Error::BrowserUnavailable(format!("Invalid launch options: {}", e)))?;
            let browser = Browser::new(options)
                .map_err(|e| Error::BrowserUnavailable(format!("Failed to launch Chrome: {}", e)))?;
            let product = browser
                .get_version()
                .map(|v| v.product)
                .map_err(|e| Error::BrowserUnavailable(format!("Chrome is not responding: {}", e)))?;
            Ok((browser, product))
        })
        .await?;

        tracing::info!("Chrome ready: {}", product);
        Ok(Self {
            browser: Arc::new(browser),
            config,
        })
    }

    pub fn config(&self) -> &ChromeConfig {
        &self.config
    }
}

#[async_trait]
impl Renderer for ChromeRenderer {
    async fn open_session(&self) -> Result<Box<dyn RenderSession>, Error> {
        let browser = self.browser.clone();
        let wait_timeout = self.config.wait_timeout;
        let (context_id, tab) = blocking(move || {
            let context = browser
                .new_context()
                .map_err(|e| Error::BrowserUnavailable(format!("Failed to create context: {}", e)))?;
            let tab = context
                .new_tab()
                .map_err(|e| Error::BrowserUnavailable(format!("Failed to open tab: {}", e)))?;
            tab.set_default_timeout(wait_timeout);
            Ok((context.get_id().to_string(), tab))
        })
        .await?;

        tracing::debug!("Opened browser context {}", context_id);
        Ok(Box::new(ChromeSession {
            browser: self.browser.clone(),
            tab,
            context_id,
            viewport: None,
        }))
    }
}

struct ChromeSession {
    browser: Arc<Browser>,
    tab: Arc<Tab>,
    context_id: String,
    viewport: Option<(u32, u32)>,
}

/// Media feature override for a theme.
fn color_scheme(theme: Theme) -> Emulation::SetEmulatedMedia {
    Emulation::SetEmulatedMedia {
        media: None,
        features: Some(vec![Emulation::MediaFeature {
            name: "prefers-color-scheme".to_string(),
            value: theme.as_str().to_string(),
        }]),
    }
}

#[async_trait]
impl RenderSession for ChromeSession {
    async fn configure(&mut self, options: &SessionOptions) -> Result<(), Error> {
        let tab = self.tab.clone();
        let options = options.clone();
        let (width, height) = (options.width, options.height);

        blocking(move || {
            tab.set_bounds(Bounds::Normal {
                left: Some(0),
                top: Some(0),
                width: Some(width as f64),
                height: Some(height as f64),
            })
            .map_err(|e| Error::Render(format!("Failed to set viewport: {}", e)))?;

            tab.call_method(color_scheme(options.theme))
                .map_err(|e| Error::Render(format!("Failed to set color scheme: {}", e)))?;

            if !options.headers.is_empty() {
                let headers: HashMap<&str, &str> = options
                    .headers
                    .iter()
                    .map(|(k, v)| (k.as_str(), v.as_str()))
                    .collect();
                tab.set_extra_http_headers(headers)
                    .map_err(|e| Error::Render(format!("Failed to set headers: {}", e)))?;
            }
            Ok(())
        })
        .await?;

        self.viewport = Some((width, height));
        Ok(())
    }

    async fn navigate(&mut self, url: &str) -> Result<(), Error> {
        let tab = self.tab.clone();
        let url = url.to_string();
        blocking(move || {
            tab.navigate_to(&url)
                .map_err(|e| Error::Navigation(format!("{}: {}", url, e)))?;
            tab.wait_until_navigated()
                .map_err(|e| Error::Navigation(format!("{}: {}", url, e)))?;
            Ok(())
        })
        .await
    }

    async fn snapshot(&mut self) -> Result<DynamicImage, Error> {
        let (width, height) = self
            .viewport
            .ok_or_else(|| Error::Render("session used before configure".to_string()))?;
        let tab = self.tab.clone();

        let png = blocking(move || {
            let clip = Page::Viewport {
                x: 0.0,
                y: 0.0,
                width: width as f64,
                height: height as f64,
                scale: 1.0,
            };
            tab.capture_screenshot(
                Page::CaptureScreenshotFormatOption::Png,
                None,
                Some(clip),
                true,
            )
            .map_err(|e| Error::Render(format!("Screenshot failed: {}", e)))
        })
        .await?;

        let image = image::load_from_memory(&png)
            .map_err(|e| Error::Render(format!("Failed to decode screenshot: {}", e)))?;
        Ok(image.crop_imm(0, 0, width.min(image.width()), height.min(image.height())))
    }

    async fn close(self: Box<Self>) -> Result<(), Error> {
        let ChromeSession {
            browser,
            tab,
            context_id,
            ..
        } = *self;

        blocking(move || {
            if let Err(e) = tab.close(true) {
                tracing::debug!("Tab already gone: {}", e);
            }
            browser
                .call_method(Target::DisposeBrowserContext {
                    browser_context_id: context_id.clone(),
                })
                .map_err(|e| {
                    Error::Render(format!("Failed to dispose context {}: {}", context_id, e))
                })?;
            Ok(())
        })
        .await
    }
}
