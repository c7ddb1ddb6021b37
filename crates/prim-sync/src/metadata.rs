use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fetch::Replacement;
use crate::sync::SyncError;

/// Sidecar record kept next to each payload.
///
/// Holds the validators for the next conditional GET and the digest of the
/// last known payload bytes. Field aliases accept sidecars written by older
/// tooling (`dataset_id`, `url`, `sha256`, `timestamp`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheMetadata {
    #[serde(alias = "dataset_id")]
    pub resource_id: String,
    #[serde(alias = "url")]
    pub source_url: String,
    #[serde(default)]
    pub etag: Option<String>,
    #[serde(default, alias = "last_modified")]
    pub last_modified: Option<String>,
    #[serde(default, alias = "sha256")]
    pub content_hash: String,
    #[serde(alias = "timestamp")]
    pub fetched_at: DateTime<Utc>,
}

impl CacheMetadata {
    /// Record describing freshly written content.
    pub fn from_replacement(
        resource_id: impl Into<String>,
        replacement: &Replacement,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        Self {
            resource_id: resource_id.into(),
            source_url: replacement.source_url.clone(),
            etag: replacement.etag.clone(),
            last_modified: replacement.last_modified.clone(),
            content_hash: replacement.content_hash.clone(),
            fetched_at,
        }
    }

    /// Same record with only the timestamp moved forward (304 path).
    pub fn refreshed(&self, fetched_at: DateTime<Utc>) -> Self {
        Self {
            fetched_at,
            ..self.clone()
        }
    }

    /// Adopt the validators of a response whose bytes matched the stored
    /// digest. The content hash is left alone; validators the server did not
    /// send this time keep their previous values.
    pub fn revalidated(&self, replacement: &Replacement, fetched_at: DateTime<Utc>) -> Self {
        Self {
            resource_id: self.resource_id.clone(),
            source_url: replacement.source_url.clone(),
            etag: replacement.etag.clone().or_else(|| self.etag.clone()),
            last_modified: replacement
                .last_modified
                .clone()
                .or_else(|| self.last_modified.clone()),
            content_hash: self.content_hash.clone(),
            fetched_at,
        }
    }
}

/// Persistence for sidecar records, keyed by resource id.
pub trait MetadataStore: Send + Sync {
    /// Load the sidecar for `resource_id`. Missing and unreadable records are
    /// both reported as `None`: corrupt metadata means no prior knowledge.
    fn load(&self, resource_id: &str) -> Option<CacheMetadata>;

    /// Replace the sidecar for `resource_id` in full.
    fn save(&self, resource_id: &str, metadata: &CacheMetadata) -> Result<(), SyncError>;
}
