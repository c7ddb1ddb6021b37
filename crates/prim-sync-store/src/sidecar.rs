use std::io::Write;
use std::path::{Path, PathBuf};

use prim_sync::{CacheMetadata, MetadataStore, SyncError};
use tracing::{debug, warn};

/// Suffix appended to a resource id to name its sidecar file.
pub const SIDECAR_SUFFIX: &str = ".meta.json";

/// Errors specific to filesystem persistence.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialize(String),
}

impl StoreError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl From<StoreError> for SyncError {
    fn from(e: StoreError) -> Self {
        SyncError::Storage(e.to_string())
    }
}

/// Sidecar files (`{id}.meta.json`) kept in the same directory as payloads.
#[derive(Debug, Clone)]
pub struct SidecarStore {
    dir: PathBuf,
}

impl SidecarStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn sidecar_path(&self, resource_id: &str) -> PathBuf {
        self.dir.join(format!("{resource_id}{SIDECAR_SUFFIX}"))
    }

    /// Write a sidecar, replacing any previous one in a single rename.
    pub fn write(&self, resource_id: &str, metadata: &CacheMetadata) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| StoreError::io(&self.dir, e))?;

        let json = serde_json::to_string_pretty(metadata)
            .map_err(|e| StoreError::Serialize(e.to_string()))?;

        let path = self.sidecar_path(resource_id);
        let mut tmp =
            tempfile::NamedTempFile::new_in(&self.dir).map_err(|e| StoreError::io(&self.dir, e))?;
        if let Err(e) = writeln!(tmp, "{json}") {
            return Err(StoreError::io(tmp.path(), e));
        }
        tmp.persist(&path)
            .map_err(|e| StoreError::io(&path, e.error))?;

        debug!(resource = %resource_id, path = %path.display(), "sidecar written");
        Ok(())
    }
}

impl MetadataStore for SidecarStore {
    /// Missing or unreadable sidecars read as "no prior record"; the next
    /// fetch is then unconditional.
    fn load(&self, resource_id: &str) -> Option<CacheMetadata> {
        let path = self.sidecar_path(resource_id);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not read sidecar");
                return None;
            }
        };

        match serde_json::from_str(&text) {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring corrupt sidecar");
                None
            }
        }
    }

    fn save(&self, resource_id: &str, metadata: &CacheMetadata) -> Result<(), SyncError> {
        Ok(self.write(resource_id, metadata)?)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn sample(id: &str) -> CacheMetadata {
        CacheMetadata {
            resource_id: id.to_owned(),
            source_url: "https://portal.example.org/export".into(),
            etag: Some("\"v1\"".into()),
            last_modified: Some("Wed, 21 Oct 2015 07:28:00 GMT".into()),
            content_hash: "ab".repeat(32),
            fetched_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn write_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = SidecarStore::new(dir.path().join("raw"));

        store.save("lignes", &sample("lignes")).unwrap();
        assert!(dir.path().join("raw/lignes.meta.json").exists());
        assert_eq!(store.load("lignes"), Some(sample("lignes")));
    }

    #[test]
    fn written_sidecar_uses_camel_case() {
        let dir = tempfile::tempdir().unwrap();
        let store = SidecarStore::new(dir.path());
        store.save("lignes", &sample("lignes")).unwrap();

        let text = std::fs::read_to_string(store.sidecar_path("lignes")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["resourceId"], "lignes");
        assert_eq!(value["lastModified"], "Wed, 21 Oct 2015 07:28:00 GMT");
        assert!(value.get("contentHash").is_some());
        assert!(value.get("fetchedAt").is_some());
    }

    #[test]
    fn missing_sidecar_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = SidecarStore::new(dir.path());
        assert!(store.load("absent").is_none());
    }

    #[test]
    fn corrupt_sidecar_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = SidecarStore::new(dir.path());
        std::fs::write(store.sidecar_path("broken"), "{ not json").unwrap();
        assert!(store.load("broken").is_none());
    }

    #[test]
    fn legacy_field_names_are_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let store = SidecarStore::new(dir.path());
        std::fs::write(
            store.sidecar_path("arrets"),
            r#"{
  "dataset_id": "arrets",
  "url": "https://portal.example.org/exports/jsonl",
  "etag": null,
  "last_modified": "Wed, 21 Oct 2015 07:28:00 GMT",
  "sha256": "deadbeef",
  "timestamp": "2024-05-01T12:00:00Z"
}"#,
        )
        .unwrap();

        let metadata = store.load("arrets").unwrap();
        assert_eq!(metadata.resource_id, "arrets");
        assert_eq!(metadata.content_hash, "deadbeef");
        assert!(metadata.etag.is_none());
        assert_eq!(
            metadata.last_modified.as_deref(),
            Some("Wed, 21 Oct 2015 07:28:00 GMT")
        );
    }

    #[test]
    fn overwrite_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = SidecarStore::new(dir.path());
        store.save("a", &sample("a")).unwrap();
        store.save("a", &sample("a").refreshed(Utc::now())).unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
