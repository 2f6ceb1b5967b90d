//! Axum integration: an HTTP surface over a shared [`CaptureService`].
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use inkshot::{axum_ext, CaptureService, ServiceConfig};
//!
//! let service = Arc::new(CaptureService::open(ServiceConfig::default()).await?);
//! let app = axum_ext::router(service);
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, app).await?;
//! ```
//!
//! | Endpoint | Method | Purpose |
//! |----------|--------|---------|
//! | `/api/capture` | POST | Ad hoc capture |
//! | `/api/screenshots` | GET | Stored images, newest first (`?limit=`) |
//! | `/api/screenshots/{filename}` | GET, DELETE | Fetch or remove one image |
//! | `/api/profiles` | GET, POST | List (`?enabled=true`) or create profiles |
//! | `/api/profiles/{id}` | GET, PUT, DELETE | One profile |
//! | `/api/profiles/{id}/capture` | POST | Capture a profile now |
//! | `/api/retention` | POST | Run the retention sweep |

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use http::header::CONTENT_TYPE;
use http::StatusCode;
use serde::Deserialize;
use serde_json::json;

use crate::{
    CaptureErrorKind, CaptureRequest, CaptureResult, CaptureService, Error, OutputFormat,
    Profile, ProfileInput, StoredImage, Theme, DEFAULT_HEIGHT, DEFAULT_WIDTH,
};

/// Default page size for screenshot listings
const DEFAULT_LIST_LIMIT: usize = 20;

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Validation(violations) => {
                let body = json!({ "error": self.to_string(), "violations": violations });
                return (StatusCode::BAD_REQUEST, Json(body)).into_response();
            }
            Error::UnsupportedFormat(_) => StatusCode::BAD_REQUEST,
            Error::BrowserUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::NavigationTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Error::Navigation(_) => StatusCode::BAD_GATEWAY,
            Error::Render(_) | Error::Image(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Io(_) | Error::Serialization(_) | Error::Config(_) => {
                tracing::error!(error = %self, "internal error");
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal server error" })),
                )
                    .into_response();
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// HTTP status for a capture result.
fn capture_status(result: &CaptureResult) -> StatusCode {
    match result.error_kind {
        None => StatusCode::OK,
        Some(CaptureErrorKind::BrowserUnavailable) => StatusCode::SERVICE_UNAVAILABLE,
        Some(CaptureErrorKind::NavigationTimeout) => StatusCode::GATEWAY_TIMEOUT,
        Some(CaptureErrorKind::NavigationError) => StatusCode::BAD_GATEWAY,
        Some(CaptureErrorKind::CaptureError) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn capture_response(result: CaptureResult) -> Response {
    (capture_status(&result), Json(result)).into_response()
}

/// Content type for a stored image, from its extension.
fn content_type(filename: &str) -> &'static str {
    match filename.rsplit('.').next().map(str::to_ascii_lowercase).as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("bmp") => "image/bmp",
        _ => "application/octet-stream",
    }
}

/// Body of `POST /api/capture`.
#[derive(Debug, Deserialize)]
pub struct CaptureBody {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub theme: Option<String>,
    pub format: Option<String>,
}

impl CaptureBody {
    /// Build the capture request. An unknown format is rejected outright;
    /// every other bad field is reported together.
    fn into_request(self, token: Option<String>) -> Result<CaptureRequest, Error> {
        let mut request = CaptureRequest::new(self.url)
            .with_token(token)
            .with_size(
                self.width.unwrap_or(DEFAULT_WIDTH),
                self.height.unwrap_or(DEFAULT_HEIGHT),
            );
        if let Some(format) = self.format {
            request = request.with_format(format.parse::<OutputFormat>()?);
        }

        let mut violations = match request.validate() {
            Ok(()) => Vec::new(),
            Err(Error::Validation(violations)) => violations,
            Err(err) => return Err(err),
        };
        if let Some(theme) = self.theme {
            match theme.parse::<Theme>() {
                Ok(theme) => request = request.with_theme(theme),
                Err(Error::Validation(more)) => violations.extend(more),
                Err(err) => return Err(err),
            }
        }

        if violations.is_empty() {
            Ok(request)
        } else {
            Err(Error::Validation(violations))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ProfileQuery {
    #[serde(default)]
    pub enabled: bool,
}

/// Build the HTTP router over `service`.
pub fn router(service: Arc<CaptureService>) -> Router {
    Router::new()
        .route("/api/capture", post(capture))
        .route("/api/screenshots", get(list_screenshots))
        .route(
            "/api/screenshots/{filename}",
            get(get_screenshot).delete(delete_screenshot),
        )
        .route("/api/profiles", get(list_profiles).post(create_profile))
        .route(
            "/api/profiles/{id}",
            get(get_profile).put(update_profile).delete(delete_profile),
        )
        .route("/api/profiles/{id}/capture", post(capture_profile))
        .route("/api/retention", post(sweep))
        .with_state(service)
}

async fn capture(
    State(service): State<Arc<CaptureService>>,
    Json(body): Json<CaptureBody>,
) -> Result<Response, Error> {
    let request = body.into_request(service.config().auth_token.clone())?;
    Ok(capture_response(service.capture(&request).await?))
}

async fn list_screenshots(
    State(service): State<Arc<CaptureService>>,
    Query(q): Query<ListQuery>,
) -> Result<Json<Vec<StoredImage>>, Error> {
    let limit = q.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    Ok(Json(service.list_screenshots(limit).await?))
}

async fn get_screenshot(
    State(service): State<Arc<CaptureService>>,
    Path(filename): Path<String>,
) -> Result<Response, Error> {
    let bytes = service.get_screenshot(&filename).await?;
    Ok(([(CONTENT_TYPE, content_type(&filename))], bytes).into_response())
}

async fn delete_screenshot(
    State(service): State<Arc<CaptureService>>,
    Path(filename): Path<String>,
) -> Result<Json<serde_json::Value>, Error> {
    if service.delete_screenshot(&filename).await? {
        Ok(Json(json!({ "deleted": true })))
    } else {
        Err(Error::NotFound(format!("screenshot {}", filename)))
    }
}

async fn list_profiles(
    State(service): State<Arc<CaptureService>>,
    Query(q): Query<ProfileQuery>,
) -> Json<Vec<Profile>> {
    Json(service.profiles().list(q.enabled).await)
}

async fn create_profile(
    State(service): State<Arc<CaptureService>>,
    Json(input): Json<ProfileInput>,
) -> Result<(StatusCode, Json<Profile>), Error> {
    let profile = service.profiles().create(input).await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

async fn get_profile(
    State(service): State<Arc<CaptureService>>,
    Path(id): Path<String>,
) -> Result<Json<Profile>, Error> {
    Ok(Json(service.profiles().get(&id).await?))
}

async fn update_profile(
    State(service): State<Arc<CaptureService>>,
    Path(id): Path<String>,
    Json(patch): Json<ProfileInput>,
) -> Result<Json<Profile>, Error> {
    Ok(Json(service.profiles().update(&id, patch).await?))
}

async fn delete_profile(
    State(service): State<Arc<CaptureService>>,
    Path(id): Path<String>,
) -> Result<StatusCode, Error> {
    service.profiles().delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn capture_profile(
    State(service): State<Arc<CaptureService>>,
    Path(id): Path<String>,
) -> Result<Response, Error> {
    Ok(capture_response(service.capture_profile(&id).await?))
}

async fn sweep(State(service): State<Arc<CaptureService>>) -> Result<Json<serde_json::Value>, Error> {
    let deleted = service.sweep().await?;
    Ok(Json(json!({ "deleted": deleted })))
}
