//! JSON-file-backed profile store.
//!
//! The whole map is rewritten on every mutation, before the call returns.
//! Mutations are applied to a copy that replaces the in-memory map only
//! once the write succeeded, so memory never runs ahead of disk.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::profile::{apply_patch, new_profile, record_outcome};
use crate::{Error, Profile, ProfileInput};

type ProfileMap = BTreeMap<String, Profile>;

/// Persistent profile collection keyed by profile id.
#[derive(Debug)]
pub struct ProfileStore {
    path: PathBuf,
    profiles: Mutex<ProfileMap>,
}

impl ProfileStore {
    /// Load the store from `path`. A missing file is an empty store.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::Io(format!(
                    "Failed to create profile dir {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let profiles: ProfileMap = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                Error::Serialization(format!("Invalid profile file {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == ErrorKind::NotFound => ProfileMap::new(),
            Err(e) => {
                return Err(Error::Io(format!(
                    "Failed to read profile file {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        tracing::info!(
            "Loaded {} profile(s) from {}",
            profiles.len(),
            path.display()
        );
        Ok(Self {
            path,
            profiles: Mutex::new(profiles),
        })
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Validate and store a new profile.
    pub async fn create(&self, input: ProfileInput) -> Result<Profile, Error> {
        let profile = new_profile(&input, Utc::now())?;
        let created = profile.clone();
        self.mutate(move |map| {
            map.insert(profile.id.clone(), profile);
            Ok(())
        })
        .await?;
        tracing::info!("Created profile {} ({})", created.id, created.name);
        Ok(created)
    }

    /// All profiles, oldest first; optionally only enabled ones.
    pub async fn list(&self, enabled_only: bool) -> Vec<Profile> {
        let profiles = self.profiles.lock().await;
        let mut list: Vec<Profile> = profiles
            .values()
            .filter(|p| !enabled_only || p.enabled)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        list
    }

    pub async fn get(&self, id: &str) -> Result<Profile, Error> {
        self.profiles
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("profile {}", id)))
    }

    /// Apply a patch of mutable fields.
    pub async fn update(&self, id: &str, patch: ProfileInput) -> Result<Profile, Error> {
        let profile = self
            .mutate(|map| {
                let profile = map
                    .get_mut(id)
                    .ok_or_else(|| Error::NotFound(format!("profile {}", id)))?;
                apply_patch(profile, patch, Utc::now())?;
                Ok(profile.clone())
            })
            .await?;
        tracing::info!("Updated profile {}", id);
        Ok(profile)
    }

    pub async fn delete(&self, id: &str) -> Result<(), Error> {
        self.mutate(|map| {
            map.remove(id)
                .map(|_| ())
                .ok_or_else(|| Error::NotFound(format!("profile {}", id)))
        })
        .await?;
        tracing::info!("Deleted profile {}", id);
        Ok(())
    }

    /// Record the outcome of a capture attempt, timestamped now.
    pub async fn record_capture(&self, id: &str, success: bool) -> Result<Profile, Error> {
        self.record_capture_at(id, success, Utc::now()).await
    }

    /// Record the outcome of a capture attempt made at `at`.
    pub async fn record_capture_at(
        &self,
        id: &str,
        success: bool,
        at: DateTime<Utc>,
    ) -> Result<Profile, Error> {
        let profile = self
            .mutate(|map| {
                let profile = map
                    .get_mut(id)
                    .ok_or_else(|| Error::NotFound(format!("profile {}", id)))?;
                record_outcome(profile, success, at);
                Ok(profile.clone())
            })
            .await?;
        tracing::debug!(
            "Recorded capture for {}: success={} failures={}",
            id,
            success,
            profile.failure_count
        );
        Ok(profile)
    }

    async fn mutate<T>(
        &self,
        f: impl FnOnce(&mut ProfileMap) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let mut current = self.profiles.lock().await;
        let mut next = current.clone();
        let out = f(&mut next)?;
        write_snapshot(&self.path, &next).await?;
        *current = next;
        Ok(out)
    }
}

async fn write_snapshot(path: &Path, profiles: &ProfileMap) -> Result<(), Error> {
    let json = serde_json::to_vec_pretty(profiles)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, &json)
        .await
        .map_err(|e| Error::Io(format!("Failed to write {}: {}", tmp.display(), e)))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| Error::Io(format!("Failed to replace {}: {}", path.display(), e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store(dir: &tempfile::TempDir) -> ProfileStore {
        ProfileStore::open(dir.path().join("profiles.json")).await.unwrap()
    }

    #[tokio::test]
    async fn test_crud_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;

        let created = store
            .create(ProfileInput::new("Kitchen", "http://dash.local/"))
            .await
            .unwrap();
        let mut patch = ProfileInput::default();
        patch.refresh_interval = Some(300);
        store.update(&created.id, patch).await.unwrap();

        let reopened = ProfileStore::open(store.path()).await.unwrap();
        let loaded = reopened.get(&created.id).await.unwrap();
        assert_eq!(loaded.name, "Kitchen");
        assert_eq!(loaded.refresh_interval, 300);

        reopened.delete(&created.id).await.unwrap();
        assert!(matches!(
            reopened.get(&created.id).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            reopened.delete(&created.id).await,
            Err(Error::NotFound(_))
        ));
        let again = ProfileStore::open(store.path()).await.unwrap();
        assert!(again.list(false).await.is_empty());
    }

    #[tokio::test]
    async fn test_list_enabled_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;

        let a = store.create(ProfileInput::new("A", "http://a/")).await.unwrap();
        let mut off = ProfileInput::new("B", "http://b/");
        off.enabled = Some(false);
        store.create(off).await.unwrap();

        assert_eq!(store.list(false).await.len(), 2);
        let enabled = store.list(true).await;
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].id, a.id);
    }

    #[tokio::test]
    async fn test_create_rejects_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;

        let mut bad = ProfileInput::new("X", "http://h/");
        bad.width = Some(50);
        bad.output_format = Some("gif".into());
        match store.create(bad).await {
            Err(Error::Validation(v)) => assert_eq!(v.len(), 2),
            other => panic!("expected validation error, got {:?}", other),
        }
        assert!(store.list(false).await.is_empty());
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_failures_reset_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        let id = store
            .create(ProfileInput::new("X", "http://h/"))
            .await
            .unwrap()
            .id;

        let start = Utc::now();
        for i in 0..3 {
            let p = store
                .record_capture_at(&id, false, start + chrono::Duration::seconds(i))
                .await
                .unwrap();
            assert_eq!(p.failure_count, i as u32 + 1);
        }
        let done = start + chrono::Duration::seconds(10);
        let p = store.record_capture_at(&id, true, done).await.unwrap();
        assert_eq!(p.failure_count, 0);
        assert_eq!(p.last_success, Some(done));
        assert_eq!(p.last_run, Some(done));

        let reopened = ProfileStore::open(store.path()).await.unwrap();
        assert_eq!(reopened.get(&id).await.unwrap().last_success, Some(done));
    }

    #[tokio::test]
    async fn test_failed_persist_keeps_memory_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        let store = ProfileStore::open(data.join("profiles.json")).await.unwrap();
        let id = store
            .create(ProfileInput::new("X", "http://h/"))
            .await
            .unwrap()
            .id;

        // Replace the data directory with a plain file so every write fails
        std::fs::remove_dir_all(&data).unwrap();
        std::fs::write(&data, b"not a directory").unwrap();

        assert!(matches!(
            store.create(ProfileInput::new("Y", "http://y/")).await,
            Err(Error::Io(_))
        ));
        assert!(matches!(
            store.record_capture(&id, false).await,
            Err(Error::Io(_))
        ));
        assert_eq!(store.list(false).await.len(), 1);
        assert_eq!(store.get(&id).await.unwrap().failure_count, 0);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.json");
        std::fs::write(&path, b"{not json").unwrap();
        assert!(matches!(
            ProfileStore::open(&path).await,
            Err(Error::Serialization(_))
        ));
    }
}
