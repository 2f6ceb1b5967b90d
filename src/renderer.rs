//! Rendering backend seam.
//!
//! The pipeline only needs one capability from a browser: open an isolated
//! session, configure it, navigate, take a snapshot, close. Backends (Chrome
//! headless, a test double, a server-side renderer) implement [`Renderer`].

use async_trait::async_trait;
use image::DynamicImage;

use crate::{Error, Theme};

/// Per-session settings applied before navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Viewport width in pixels
    pub width: u32,
    /// Viewport height in pixels
    pub height: u32,
    /// Color scheme to emulate
    pub theme: Theme,
    /// Extra request headers, forwarded verbatim
    pub headers: Vec<(String, String)>,
}

impl SessionOptions {
    /// Value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A browser able to open isolated sessions.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Open a session sharing no cookies, storage, or viewport with any
    /// other session.
    async fn open_session(&self) -> Result<Box<dyn RenderSession>, Error>;
}

/// One isolated browsing context.
#[async_trait]
pub trait RenderSession: Send {
    /// Apply viewport, color scheme, and headers.
    async fn configure(&mut self, options: &SessionOptions) -> Result<(), Error>;

    /// Load `url`. Timeouts are enforced by the caller.
    async fn navigate(&mut self, url: &str) -> Result<(), Error>;

    /// Rasterize the viewport.
    async fn snapshot(&mut self) -> Result<DynamicImage, Error>;

    /// Tear the session down.
    async fn close(self: Box<Self>) -> Result<(), Error>;
}
