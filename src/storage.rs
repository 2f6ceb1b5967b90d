//! File-backed store for captured images.
//!
//! Files live flat under one root directory and are named
//! `screenshot-<timestamp>-<8 hex>.<ext>`, where the timestamp is ISO 8601
//! with `:` and `.` replaced by `-`. Listing re-scans the directory on every
//! call; there is no index.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::Error;

/// Extensions recognized as stored images.
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

/// Attempts at finding a free name before giving up.
const MAX_NAME_ATTEMPTS: usize = 16;

/// Metadata of one stored image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredImage {
    /// File name relative to the store root
    pub filename: String,
    /// Size in bytes
    pub size: u64,
    /// Creation time (falls back to modification time where unsupported)
    pub created: DateTime<Utc>,
    /// Last modification time
    pub modified: DateTime<Utc>,
}

/// Build a capture filename for `at`.
///
/// # Example
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use inkshot::screenshot_filename;
///
/// let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
/// let name = screenshot_filename(at, "png");
/// assert!(name.starts_with("screenshot-2024-05-01T12-30-00-000Z-"));
/// assert!(name.ends_with(".png"));
/// ```
pub fn screenshot_filename(at: DateTime<Utc>, extension: &str) -> String {
    let stamp = at
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
        .replace([':', '.'], "-");
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("screenshot-{}-{}.{}", stamp, &suffix[..8], extension)
}

/// Directory of captured images.
#[derive(Debug, Clone)]
pub struct CaptureStore {
    root: PathBuf,
}

impl CaptureStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, Error> {
        let root = root.as_ref();
        tokio::fs::create_dir_all(root).await.map_err(|e| {
            Error::Io(format!(
                "Failed to create screenshot dir {}: {}",
                root.display(),
                e
            ))
        })?;
        let root = tokio::fs::canonicalize(root).await?;
        tracing::info!("Capture store at {}", root.display());
        Ok(Self { root })
    }

    /// Canonical store root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `bytes` under a fresh name and return that name.
    ///
    /// Files are created exclusively; a name that already exists is never
    /// overwritten, a new suffix is drawn instead.
    pub async fn save(&self, bytes: &[u8], extension: &str) -> Result<String, Error> {
        for _ in 0..MAX_NAME_ATTEMPTS {
            let filename = screenshot_filename(Utc::now(), extension);
            let path = self.root.join(&filename);
            let file = match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    tracing::debug!("Filename collision on {}, retrying", filename);
                    continue;
                }
                Err(e) => {
                    return Err(Error::Io(format!(
                        "Failed to create {}: {}",
                        path.display(),
                        e
                    )))
                }
            };
            write_or_remove(file, &path, bytes).await?;
            tracing::info!("Saved {} ({} bytes)", filename, bytes.len());
            return Ok(filename);
        }
        Err(Error::Io(
            "Could not find a free screenshot filename".to_string(),
        ))
    }

    /// Stored images, newest first, at most `limit` entries.
    pub async fn list(&self, limit: usize) -> Result<Vec<StoredImage>, Error> {
        let mut images = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await.map_err(|e| {
            Error::Io(format!(
                "Failed to read screenshot dir {}: {}",
                self.root.display(),
                e
            ))
        })?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !has_image_extension(&path) {
                continue;
            }
            let metadata = match entry.metadata().await {
                Ok(m) if m.is_file() => m,
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", path.display(), e);
                    continue;
                }
            };
            let modified: DateTime<Utc> = metadata.modified()?.into();
            let created = metadata.created().map(DateTime::<Utc>::from).unwrap_or(modified);
            images.push(StoredImage {
                filename: entry.file_name().to_string_lossy().into_owned(),
                size: metadata.len(),
                created,
                modified,
            });
        }

        images.sort_by(|a, b| {
            b.modified
                .cmp(&a.modified)
                .then_with(|| b.filename.cmp(&a.filename))
        });
        images.truncate(limit);
        Ok(images)
    }

    /// Read a stored image.
    ///
    /// Names that resolve outside the root are reported as not found.
    pub async fn get(&self, filename: &str) -> Result<Vec<u8>, Error> {
        let path = self
            .resolve(filename)
            .await
            .ok_or_else(|| Error::NotFound(format!("screenshot {}", filename)))?;
        Ok(tokio::fs::read(&path).await?)
    }

    /// Delete a stored image. Returns `false` if there was nothing to delete
    /// (including names that resolve outside the root).
    pub async fn delete(&self, filename: &str) -> Result<bool, Error> {
        let Some(path) = self.resolve(filename).await else {
            return Ok(false);
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!("Deleted {}", filename);
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete every image beyond the `max_count` newest or older than
    /// `max_age_hours`. Returns the number deleted.
    ///
    /// Failures on individual files are logged and skipped.
    pub async fn retain(&self, max_age_hours: u64, max_count: usize) -> Result<usize, Error> {
        let cutoff = i64::try_from(max_age_hours)
            .ok()
            .and_then(chrono::Duration::try_hours)
            .and_then(|age| Utc::now().checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let images = self.list(usize::MAX).await?;

        let mut deleted = 0;
        for (rank, image) in images.iter().enumerate() {
            if rank < max_count && image.modified >= cutoff {
                continue;
            }
            match tokio::fs::remove_file(self.root.join(&image.filename)).await {
                Ok(()) => deleted += 1,
                Err(e) => tracing::warn!("Retention could not delete {}: {}", image.filename, e),
            }
        }

        tracing::info!(
            "Retention removed {} of {} image(s) (max_age={}h, max_count={})",
            deleted,
            images.len(),
            max_age_hours,
            max_count
        );
        Ok(deleted)
    }

    /// Map a filename to a path inside the root, or `None` if it is not a
    /// plain name, does not exist, or escapes the root.
    async fn resolve(&self, filename: &str) -> Option<PathBuf> {
        if filename.is_empty()
            || filename == "."
            || filename == ".."
            || filename.contains(['/', '\\', '\0'])
        {
            return None;
        }
        let canonical = tokio::fs::canonicalize(self.root.join(filename)).await.ok()?;
        canonical.starts_with(&self.root).then_some(canonical)
    }
}

/// Write `bytes` to a freshly created file. On failure the partial file is
/// removed so it is never listed or served.
async fn write_or_remove<W>(mut file: W, path: &Path, bytes: &[u8]) -> Result<(), Error>
where
    W: AsyncWrite + Unpin,
{
    let written = match file.write_all(bytes).await {
        Ok(()) => file.flush().await,
        Err(e) => Err(e),
    };
    drop(file);

    if let Err(e) = written {
        if let Err(rm) = tokio::fs::remove_file(path).await {
            tracing::warn!("Could not remove partial {}: {}", path.display(), rm);
        }
        return Err(Error::Io(format!("Failed to write {}: {}", path.display(), e)));
    }
    Ok(())
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
