//! Capture profiles: named, persisted capture configurations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{check_dimension, check_url};
use crate::{CaptureRequest, Error, OutputFormat, Theme, DEFAULT_HEIGHT, DEFAULT_WIDTH};

/// A stored capture configuration with its run history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// Opaque identifier, generated at creation
    pub id: String,
    /// Display name
    pub name: String,
    /// Page to capture
    pub url: String,
    /// Viewport width
    pub width: u32,
    /// Viewport height
    pub height: u32,
    /// Color scheme
    pub theme: Theme,
    /// Seconds between scheduled captures; 0 means manual only
    pub refresh_interval: u64,
    /// Output format
    pub output_format: OutputFormat,
    /// Whether the scheduler considers this profile
    pub enabled: bool,
    /// Free text
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Last attempt, successful or not
    #[serde(default)]
    pub last_run: Option<DateTime<Utc>>,
    /// Last successful attempt
    #[serde(default)]
    pub last_success: Option<DateTime<Utc>>,
    /// Consecutive failures since the last success
    #[serde(default)]
    pub failure_count: u32,
}

impl Profile {
    /// Capture request for this profile.
    pub fn to_request(&self, token: Option<String>) -> CaptureRequest {
        CaptureRequest::new(self.url.clone())
            .with_size(self.width, self.height)
            .with_theme(self.theme)
            .with_format(self.output_format)
            .with_token(token)
    }

    /// The mutable fields as an input, for merging with a patch.
    fn to_input(&self) -> ProfileInput {
        ProfileInput {
            name: Some(self.name.clone()),
            url: Some(self.url.clone()),
            width: Some(self.width as i64),
            height: Some(self.height as i64),
            theme: Some(self.theme.as_str().to_string()),
            refresh_interval: Some(self.refresh_interval as i64),
            output_format: Some(self.output_format.as_str().to_string()),
            enabled: Some(self.enabled),
            description: Some(self.description.clone()),
        }
    }
}

/// Profile fields as submitted by a caller, for create and update.
///
/// Only the mutable fields exist here, so identifiers, timestamps, and run
/// history in a submitted document are ignored. Numbers and enums are
/// loosely typed so validation can report every bad field at once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileInput {
    pub name: Option<String>,
    pub url: Option<String>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub theme: Option<String>,
    pub refresh_interval: Option<i64>,
    pub output_format: Option<String>,
    pub enabled: Option<bool>,
    pub description: Option<String>,
}

impl ProfileInput {
    /// Input with just the two required fields.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            url: Some(url.into()),
            ..Default::default()
        }
    }

    /// Overlay `patch` on `self`; fields present in `patch` win.
    pub fn merged(self, patch: ProfileInput) -> Self {
        Self {
            name: patch.name.or(self.name),
            url: patch.url.or(self.url),
            width: patch.width.or(self.width),
            height: patch.height.or(self.height),
            theme: patch.theme.or(self.theme),
            refresh_interval: patch.refresh_interval.or(self.refresh_interval),
            output_format: patch.output_format.or(self.output_format),
            enabled: patch.enabled.or(self.enabled),
            description: patch.description.or(self.description),
        }
    }
}

/// Check a profile input, collecting every violation.
///
/// `name` and `url` are required; everything else falls back to defaults.
///
/// # Example
///
/// ```
/// use inkshot::{validate_profile, ProfileInput};
///
/// let mut input = ProfileInput::new("Kitchen", "http://dash.local/");
/// input.width = Some(50);
/// input.theme = Some("blue".into());
///
/// let violations = validate_profile(&input);
/// assert_eq!(violations.len(), 2);
/// ```
pub fn validate_profile(input: &ProfileInput) -> Vec<String> {
    let mut violations = Vec::new();

    match input.name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => {}
        _ => violations.push("name is required".to_string()),
    }
    match input.url.as_deref() {
        Some(url) => check_url(url, &mut violations),
        None => violations.push("url is required".to_string()),
    }
    if let Some(width) = input.width {
        check_dimension("width", width, &mut violations);
    }
    if let Some(height) = input.height {
        check_dimension("height", height, &mut violations);
    }
    if let Some(theme) = &input.theme {
        if theme.parse::<Theme>().is_err() {
            violations.push(format!("theme must be one of light, dark (got '{}')", theme));
        }
    }
    if let Some(interval) = input.refresh_interval {
        if interval < 0 {
            violations.push(format!(
                "refreshInterval must be 0 or more seconds (got {})",
                interval
            ));
        }
    }
    if let Some(format) = &input.output_format {
        if format.parse::<OutputFormat>().is_err() {
            violations.push(format!(
                "outputFormat must be one of png, jpeg, bmp3, bmp (got '{}')",
                format
            ));
        }
    }

    violations
}

/// Validate `input` and build the typed profile fields from it.
fn checked(input: &ProfileInput) -> Result<ProfileFields, Error> {
    let violations = validate_profile(input);
    if !violations.is_empty() {
        return Err(Error::Validation(violations));
    }

    Ok(ProfileFields {
        name: input.name.clone().unwrap_or_default().trim().to_string(),
        url: input.url.clone().unwrap_or_default(),
        width: input.width.map_or(DEFAULT_WIDTH, |w| w as u32),
        height: input.height.map_or(DEFAULT_HEIGHT, |h| h as u32),
        theme: input
            .theme
            .as_deref()
            .map(str::parse::<Theme>)
            .transpose()?
            .unwrap_or_default(),
        refresh_interval: input.refresh_interval.map_or(0, |i| i as u64),
        output_format: input
            .output_format
            .as_deref()
            .map(str::parse::<OutputFormat>)
            .transpose()?
            .unwrap_or_default(),
        enabled: input.enabled.unwrap_or(true),
        description: input.description.clone().unwrap_or_default(),
    })
}

struct ProfileFields {
    name: String,
    url: String,
    width: u32,
    height: u32,
    theme: Theme,
    refresh_interval: u64,
    output_format: OutputFormat,
    enabled: bool,
    description: String,
}

impl ProfileFields {
    fn apply(self, profile: &mut Profile) {
        profile.name = self.name;
        profile.url = self.url;
        profile.width = self.width;
        profile.height = self.height;
        profile.theme = self.theme;
        profile.refresh_interval = self.refresh_interval;
        profile.output_format = self.output_format;
        profile.enabled = self.enabled;
        profile.description = self.description;
    }
}

/// Build a new profile from a validated input.
pub(crate) fn new_profile(input: &ProfileInput, now: DateTime<Utc>) -> Result<Profile, Error> {
    let fields = checked(input)?;
    let mut profile = Profile {
        id: uuid::Uuid::new_v4().simple().to_string(),
        name: String::new(),
        url: String::new(),
        width: DEFAULT_WIDTH,
        height: DEFAULT_HEIGHT,
        theme: Theme::Light,
        refresh_interval: 0,
        output_format: OutputFormat::Png,
        enabled: true,
        description: String::new(),
        created_at: now,
        updated_at: now,
        last_run: None,
        last_success: None,
        failure_count: 0,
    };
    fields.apply(&mut profile);
    Ok(profile)
}

/// Apply a patch of mutable fields to `profile`, validating the result.
pub(crate) fn apply_patch(
    profile: &mut Profile,
    patch: ProfileInput,
    now: DateTime<Utc>,
) -> Result<(), Error> {
    let fields = checked(&profile.to_input().merged(patch))?;
    fields.apply(profile);
    profile.updated_at = now;
    Ok(())
}

/// Update run history after a capture attempt.
///
/// Every attempt sets `last_run`; success also sets `last_success` and resets
/// `failure_count`, failure increments it.
pub(crate) fn record_outcome(profile: &mut Profile, success: bool, at: DateTime<Utc>) {
    profile.last_run = Some(at);
    if success {
        profile.last_success = Some(at);
        profile.failure_count = 0;
    } else {
        profile.failure_count = profile.failure_count.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> ProfileInput {
        ProfileInput::new("Kitchen", "http://dash.local/")
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(validate_profile(&input()).is_empty());

        let mut full = input();
        full.width = Some(800);
        full.height = Some(480);
        full.theme = Some("dark".into());
        full.output_format = Some("bmp3".into());
        full.refresh_interval = Some(60);
        assert!(validate_profile(&full).is_empty());
    }

    #[test]
    fn test_validate_rejects_each_field() {
        let mut narrow = input();
        narrow.width = Some(50);
        assert_eq!(validate_profile(&narrow).len(), 1);

        let mut blue = input();
        blue.theme = Some("blue".into());
        assert_eq!(validate_profile(&blue).len(), 1);

        let mut gif = input();
        gif.output_format = Some("gif".into());
        assert!(validate_profile(&gif)[0].contains("outputFormat"));

        let mut negative = input();
        negative.refresh_interval = Some(-1);
        assert_eq!(validate_profile(&negative).len(), 1);
    }

    #[test]
    fn test_validate_reports_all_violations() {
        let bad = ProfileInput {
            width: Some(5000),
            height: Some(99),
            theme: Some("blue".into()),
            output_format: Some("gif".into()),
            ..Default::default()
        };
        let violations = validate_profile(&bad);
        assert_eq!(violations.len(), 6);
        assert!(violations.iter().any(|v| v.contains("name")));
        assert!(violations.iter().any(|v| v.contains("url")));
    }

    #[test]
    fn test_new_profile_defaults() {
        let now = Utc::now();
        let profile = new_profile(&input(), now).unwrap();
        assert_eq!(profile.id.len(), 32);
        assert_eq!(profile.width, 800);
        assert_eq!(profile.height, 480);
        assert_eq!(profile.theme, Theme::Light);
        assert_eq!(profile.output_format, OutputFormat::Png);
        assert_eq!(profile.refresh_interval, 0);
        assert!(profile.enabled);
        assert_eq!(profile.created_at, now);
        assert!(profile.last_run.is_none());
        assert_eq!(profile.failure_count, 0);
    }

    #[test]
    fn test_patch_ignores_immutable_fields() {
        let created = Utc::now() - chrono::Duration::hours(1);
        let mut profile = new_profile(&input(), created).unwrap();
        let id = profile.id.clone();

        let patch: ProfileInput = serde_json::from_str(
            r#"{"id": "hijack", "createdAt": "2000-01-01T00:00:00Z",
                "failureCount": 9, "name": "Hall", "theme": "dark"}"#,
        )
        .unwrap();
        let now = Utc::now();
        apply_patch(&mut profile, patch, now).unwrap();

        assert_eq!(profile.id, id);
        assert_eq!(profile.created_at, created);
        assert_eq!(profile.updated_at, now);
        assert_eq!(profile.failure_count, 0);
        assert_eq!(profile.name, "Hall");
        assert_eq!(profile.theme, Theme::Dark);
        assert_eq!(profile.url, "http://dash.local/");
    }

    #[test]
    fn test_invalid_patch_leaves_profile() {
        let mut profile = new_profile(&input(), Utc::now()).unwrap();
        let before = profile.clone();
        let patch = ProfileInput {
            width: Some(10),
            ..Default::default()
        };
        assert!(matches!(
            apply_patch(&mut profile, patch, Utc::now()),
            Err(Error::Validation(_))
        ));
        assert_eq!(profile, before);
    }

    #[test]
    fn test_record_outcome() {
        let mut profile = new_profile(&input(), Utc::now()).unwrap();
        let t1 = Utc::now();
        record_outcome(&mut profile, false, t1);
        record_outcome(&mut profile, false, t1);
        assert_eq!(profile.failure_count, 2);
        assert_eq!(profile.last_run, Some(t1));
        assert!(profile.last_success.is_none());

        let t2 = t1 + chrono::Duration::seconds(5);
        record_outcome(&mut profile, true, t2);
        assert_eq!(profile.failure_count, 0);
        assert_eq!(profile.last_run, Some(t2));
        assert_eq!(profile.last_success, Some(t2));
    }

    #[test]
    fn test_profile_json_shape() {
        let profile = new_profile(&input(), Utc::now()).unwrap();
        let json = serde_json::to_string(&profile).unwrap();
        assert!(json.contains("\"refreshInterval\":0"));
        assert!(json.contains("\"outputFormat\":\"png\""));
        assert!(json.contains("\"failureCount\":0"));
        assert!(json.contains("\"lastRun\":null"));

        let back: Profile = serde_json::from_str(&json).unwrap();
        assert_eq!(back, profile);
    }
}
