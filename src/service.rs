//! Capture pipeline.
//!
//! Every capture, ad hoc or profile-driven, goes through one
//! [`CaptureThrottle`], so at most `max_concurrent_captures` renders run at
//! once. A slow page holds its slot for the full navigation, settle delay,
//! conversion, and save.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use image::DynamicImage;

use crate::convert::{convert, ConvertOptions};
use crate::renderer::{RenderSession, Renderer, SessionOptions};
use crate::schedule::is_due;
use crate::storage::{CaptureStore, StoredImage};
use crate::throttle::CaptureThrottle;
use crate::{CaptureRequest, CaptureResult, Error, OutputFormat, ProfileStore, ServiceConfig};

/// What a successful run produced, before it becomes a [`CaptureResult`].
struct Saved {
    filename: String,
    size: u64,
    width: u32,
    height: u32,
}

/// Capture pipeline plus the stores it writes to.
pub struct CaptureService {
    config: ServiceConfig,
    renderer: Option<Arc<dyn Renderer>>,
    throttle: CaptureThrottle,
    convert_options: ConvertOptions,
    store: CaptureStore,
    profiles: ProfileStore,
}

impl CaptureService {
    /// Open the capture and profile stores named by `config`.
    ///
    /// The service starts without a renderer; captures fail with
    /// `browser_unavailable` until one is attached.
    pub async fn open(config: ServiceConfig) -> Result<Self, Error> {
        config.validate()?;
        let store = CaptureStore::open(&config.screenshot_dir).await?;
        let profiles = ProfileStore::open(config.profiles_path.clone()).await?;
        Ok(Self::from_parts(config, store, profiles))
    }

    /// Assemble a service from already-open stores.
    pub fn from_parts(config: ServiceConfig, store: CaptureStore, profiles: ProfileStore) -> Self {
        Self {
            throttle: CaptureThrottle::new(config.max_concurrent_captures.max(1)),
            convert_options: config.convert_options(),
            renderer: None,
            config,
            store,
            profiles,
        }
    }

    /// Attach the rendering backend.
    #[must_use]
    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn store(&self) -> &CaptureStore {
        &self.store
    }

    pub fn profiles(&self) -> &ProfileStore {
        &self.profiles
    }

    pub fn throttle(&self) -> &CaptureThrottle {
        &self.throttle
    }

    /// Capture `request` and store the image.
    ///
    /// Browser, navigation, and conversion failures come back as a failed
    /// `CaptureResult`. `Err` is reserved for invalid requests and local
    /// persistence faults.
    pub async fn capture(&self, request: &CaptureRequest) -> Result<CaptureResult, Error> {
        request.validate()?;

        match self.run(request).await {
            Ok(saved) => Ok(CaptureResult::success(
                saved.filename,
                saved.size,
                saved.width,
                saved.height,
                request.format,
            )),
            Err(err) if err.is_local_fault() => {
                tracing::error!(url = %request.url, "Capture could not be stored: {}", err);
                Err(err)
            }
            Err(err) => {
                tracing::warn!(url = %request.url, "Capture failed: {}", err);
                Ok(CaptureResult::failure(&err))
            }
        }
    }

    /// Capture a stored profile and record the outcome in its run history.
    pub async fn capture_profile(&self, id: &str) -> Result<CaptureResult, Error> {
        let profile = self.profiles.get(id).await?;
        let request = profile.to_request(self.config.auth_token.clone());

        let outcome = self.capture(&request).await;
        let success = matches!(&outcome, Ok(result) if result.success);
        self.profiles.record_capture(id, success).await?;
        outcome
    }

    /// Capture every profile due at `now`, concurrently (bounded by the
    /// throttle). Returns the profile ids with their results.
    pub async fn run_due_profiles(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<(String, CaptureResult)>, Error> {
        let due: Vec<String> = self
            .profiles
            .list(true)
            .await
            .into_iter()
            .filter(|p| is_due(p, now))
            .map(|p| p.id)
            .collect();
        if due.is_empty() {
            return Ok(Vec::new());
        }
        tracing::info!("{} profile(s) due", due.len());

        let runs = due.iter().map(|id| async move {
            self.capture_profile(id).await.map(|r| (id.clone(), r))
        });

        let mut results = Vec::with_capacity(due.len());
        for run in join_all(runs).await {
            match run {
                Ok(pair) => results.push(pair),
                // Profile deleted between listing and capture
                Err(Error::NotFound(msg)) => tracing::debug!("Skipping {}", msg),
                Err(err) => return Err(err),
            }
        }
        Ok(results)
    }

    /// Stored images, newest first.
    pub async fn list_screenshots(&self, limit: usize) -> Result<Vec<StoredImage>, Error> {
        self.store.list(limit).await
    }

    pub async fn get_screenshot(&self, filename: &str) -> Result<Vec<u8>, Error> {
        self.store.get(filename).await
    }

    pub async fn delete_screenshot(&self, filename: &str) -> Result<bool, Error> {
        self.store.delete(filename).await
    }

    /// Retention sweep with the configured limits.
    pub async fn sweep(&self) -> Result<usize, Error> {
        let retention = &self.config.retention;
        self.store
            .retain(retention.max_age_hours, retention.max_count)
            .await
    }

    async fn run(&self, request: &CaptureRequest) -> Result<Saved, Error> {
        let renderer = self
            .renderer
            .as_ref()
            .ok_or_else(|| Error::BrowserUnavailable("renderer not initialized".to_string()))?;

        let permit = self.throttle.acquire().await?;
        let mut session = match renderer.open_session().await {
            Ok(session) => session,
            Err(err) => {
                return Err(match err {
                    Error::BrowserUnavailable(_) => err,
                    other => Error::BrowserUnavailable(other.to_string()),
                })
            }
        };

        let outcome = self.render_and_store(session.as_mut(), request).await;

        drop(permit);
        if let Err(err) = session.close().await {
            tracing::warn!(url = %request.url, "Failed to close render session: {}", err);
        }
        outcome
    }

    async fn render_and_store(
        &self,
        session: &mut dyn RenderSession,
        request: &CaptureRequest,
    ) -> Result<Saved, Error> {
        let mut headers = Vec::new();
        if let Some(token) = &request.token {
            headers.push(("Authorization".to_string(), format!("Bearer {}", token)));
        }
        session
            .configure(&SessionOptions {
                width: request.width,
                height: request.height,
                theme: request.theme,
                headers,
            })
            .await?;

        let timeout = self.config.navigation_timeout();
        match tokio::time::timeout(timeout, session.navigate(&request.url)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(Error::NavigationTimeout {
                    url: request.url.clone(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }

        let settle = self.config.settle_delay();
        if settle > Duration::ZERO {
            tokio::time::sleep(settle).await;
        }

        let raster = session.snapshot().await?;
        let (width, height) = (raster.width(), raster.height());
        let bytes = self.encode(raster, request.format).await?;

        let filename = self.store.save(&bytes, request.format.extension()).await?;
        tracing::info!(url = %request.url, filename = %filename, "Captured {}x{} {}", width, height, request.format);
        Ok(Saved {
            filename,
            size: bytes.len() as u64,
            width,
            height,
        })
    }

    /// Convert on the blocking pool; dithering a full frame is CPU-bound.
    async fn encode(&self, raster: DynamicImage, format: OutputFormat) -> Result<Vec<u8>, Error> {
        let options = self.convert_options;
        tokio::task::spawn_blocking(move || convert(&raster, format, &options))
            .await
            .map_err(|e| Error::Image(format!("Conversion task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    use crate::renderer::stub::{Behavior, StubRenderer};
    use crate::{CaptureErrorKind, ProfileInput, Theme};

    async fn service(dir: &tempfile::TempDir, max: usize) -> CaptureService {
        let config = ServiceConfig::default()
            .with_screenshot_dir(dir.path().join("shots"))
            .with_profiles_path(dir.path().join("profiles.json"))
            .with_max_concurrent(max)
            .with_timings(200, 0);
        CaptureService::open(config).await.unwrap()
    }

    #[tokio::test]
    async fn test_no_renderer_is_browser_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(&dir, 3).await;

        let result = service
            .capture(&CaptureRequest::new("http://h/"))
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(CaptureErrorKind::BrowserUnavailable));
        assert_eq!(service.throttle().in_flight(), 0);
    }

    #[tokio::test]
    async fn test_successful_capture_is_stored() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = Arc::new(StubRenderer::new(Behavior::Succeed));
        let stats = renderer.stats.clone();
        let service = service(&dir, 3).await.with_renderer(renderer);

        let request = CaptureRequest::new("http://h/")
            .with_size(320, 200)
            .with_theme(Theme::Dark)
            .with_format(OutputFormat::Bmp3)
            .with_token(Some("abc".into()));
        let result = service.capture(&request).await.unwrap();

        assert!(result.success);
        assert_eq!(result.width, Some(320));
        assert_eq!(result.height, Some(200));
        assert_eq!(result.format, Some(OutputFormat::Bmp3));
        let filename = result.filename.unwrap();
        assert!(filename.ends_with(".bmp"));

        let bytes = service.get_screenshot(&filename).await.unwrap();
        assert_eq!(bytes.len() as u64, result.size.unwrap());
        assert_eq!(&bytes[..2], b"BM");

        let options = stats.last_options.lock().unwrap().clone().unwrap();
        assert_eq!(options.theme, Theme::Dark);
        assert_eq!(options.header("authorization"), Some("Bearer abc"));
        assert_eq!(stats.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_snapshot_waits_for_settle_delay() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServiceConfig::default()
            .with_screenshot_dir(dir.path().join("shots"))
            .with_profiles_path(dir.path().join("profiles.json"))
            .with_timings(1_000, 150);
        let renderer = Arc::new(StubRenderer::new(Behavior::Succeed));
        let stats = renderer.stats.clone();
        let service = CaptureService::open(config)
            .await
            .unwrap()
            .with_renderer(renderer);

        let request = CaptureRequest::new("http://h/").with_size(100, 100);
        assert!(service.capture(&request).await.unwrap().success);

        let navigated = stats.navigated_at.lock().unwrap().unwrap();
        let snapshot = stats.snapshot_at.lock().unwrap().unwrap();
        assert!(snapshot.duration_since(navigated) >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_navigation_failure_is_a_result() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = Arc::new(StubRenderer::new(Behavior::FailNavigation));
        let stats = renderer.stats.clone();
        let service = service(&dir, 3).await.with_renderer(renderer);

        let result = service
            .capture(&CaptureRequest::new("http://nowhere.invalid/"))
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(CaptureErrorKind::NavigationError));
        assert!(result.error.unwrap().contains("ERR_NAME_NOT_RESOLVED"));

        // Permit released and session torn down
        assert_eq!(service.throttle().in_flight(), 0);
        assert_eq!(stats.closed.load(Ordering::SeqCst), 1);
        assert!(service.list_screenshots(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_navigation_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = Arc::new(StubRenderer::new(Behavior::Hang));
        let stats = renderer.stats.clone();
        let service = service(&dir, 1).await.with_renderer(renderer);

        let result = service
            .capture(&CaptureRequest::new("http://slow/"))
            .await
            .unwrap();
        assert_eq!(result.error_kind, Some(CaptureErrorKind::NavigationTimeout));
        assert_eq!(service.throttle().in_flight(), 0);
        assert_eq!(stats.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalid_request_is_rejected_before_capture() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = Arc::new(StubRenderer::new(Behavior::Succeed));
        let stats = renderer.stats.clone();
        let service = service(&dir, 3).await.with_renderer(renderer);

        let request = CaptureRequest::new("http://h/").with_size(50, 480);
        assert!(matches!(
            service.capture(&request).await,
            Err(Error::Validation(_))
        ));
        assert_eq!(stats.opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_concurrency_never_exceeds_bound() {
        let dir = tempfile::tempdir().unwrap();
        let renderer =
            Arc::new(StubRenderer::new(Behavior::Succeed).with_work(Duration::from_millis(20)));
        let stats = renderer.stats.clone();
        let service = Arc::new(service(&dir, 2).await.with_renderer(renderer));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                service
                    .capture(&CaptureRequest::new("http://h/").with_size(100, 100))
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().success);
        }

        assert_eq!(stats.max_active.load(Ordering::SeqCst), 2);
        assert_eq!(stats.opened.load(Ordering::SeqCst), 10);
        assert_eq!(service.list_screenshots(100).await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_profile_capture_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(&dir, 3)
            .await
            .with_renderer(Arc::new(StubRenderer::new(Behavior::Succeed)));

        let mut input = ProfileInput::new("X", "http://h/");
        input.width = Some(800);
        input.height = Some(480);
        let profile = service.profiles().create(input).await.unwrap();

        let result = service.capture_profile(&profile.id).await.unwrap();
        assert!(result.success);
        assert_eq!(service.list_screenshots(20).await.unwrap().len(), 1);

        let stored = service.profiles().get(&profile.id).await.unwrap();
        assert_eq!(stored.failure_count, 0);
        assert!(stored.last_run.is_some());
        assert_eq!(stored.last_run, stored.last_success);
    }

    #[tokio::test]
    async fn test_profile_capture_failure_counts() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(&dir, 3)
            .await
            .with_renderer(Arc::new(StubRenderer::new(Behavior::FailNavigation)));
        let id = service
            .profiles()
            .create(ProfileInput::new("X", "http://h/"))
            .await
            .unwrap()
            .id;

        for _ in 0..2 {
            assert!(!service.capture_profile(&id).await.unwrap().success);
        }
        let stored = service.profiles().get(&id).await.unwrap();
        assert_eq!(stored.failure_count, 2);
        assert!(stored.last_success.is_none());

        assert!(matches!(
            service.capture_profile("missing").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_run_due_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(&dir, 3)
            .await
            .with_renderer(Arc::new(StubRenderer::new(Behavior::Succeed)));

        let mut scheduled = ProfileInput::new("Every minute", "http://a/");
        scheduled.refresh_interval = Some(60);
        scheduled.width = Some(200);
        scheduled.height = Some(120);
        let scheduled = service.profiles().create(scheduled).await.unwrap();
        service
            .profiles()
            .create(ProfileInput::new("Manual", "http://b/"))
            .await
            .unwrap();

        let now = Utc::now();
        let ran = service.run_due_profiles(now).await.unwrap();
        assert_eq!(ran.len(), 1);
        assert_eq!(ran[0].0, scheduled.id);
        assert!(ran[0].1.success);

        // Just ran, so nothing is due until the interval passes
        assert!(service.run_due_profiles(Utc::now()).await.unwrap().is_empty());
        let later = Utc::now() + chrono::Duration::seconds(61);
        assert_eq!(service.run_due_profiles(later).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sweep_uses_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ServiceConfig::default()
            .with_screenshot_dir(dir.path().join("shots"))
            .with_profiles_path(dir.path().join("profiles.json"))
            .with_timings(200, 0);
        config.retention.max_count = 1;
        let service = CaptureService::open(config)
            .await
            .unwrap()
            .with_renderer(Arc::new(StubRenderer::new(Behavior::Succeed)));

        for _ in 0..3 {
            let request = CaptureRequest::new("http://h/").with_size(100, 100);
            assert!(service.capture(&request).await.unwrap().success);
        }
        assert_eq!(service.sweep().await.unwrap(), 2);
        assert_eq!(service.list_screenshots(10).await.unwrap().len(), 1);
    }
}
