//! Manifest loading: `datasets.yml` and `apis.yml` into resource descriptors.
//!
//! Any problem here is fatal and surfaces before a single fetch is attempted.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::resource::{DEFAULT_EXPORT_FORMAT, ResourceDescriptor, SourceLocator};
use crate::sync::SyncError;

/// Auth marker that opts an API entry into the bearer token.
const TOKEN_AUTH: &str = "prim_token";

/// Errors that can occur while loading a manifest.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("manifest not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read manifest {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse manifest: {0}")]
    Parse(String),

    #[error("invalid manifest format (missing '{0}' key)")]
    MissingKey(&'static str),

    #[error("invalid entry '{entry}': {reason}")]
    Invalid { entry: String, reason: String },
}

impl From<ManifestError> for SyncError {
    fn from(e: ManifestError) -> Self {
        SyncError::Manifest(e.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct DatasetManifest {
    datasets: Option<Vec<DatasetEntry>>,
}

#[derive(Debug, Deserialize)]
struct DatasetEntry {
    dataset_id: Option<String>,
    portal_base: Option<String>,
    export_format: Option<String>,
    #[serde(default)]
    validate: bool,
    schema_url_override: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiManifest {
    apis: Option<serde_yaml_ng::Mapping>,
}

#[derive(Debug, Deserialize)]
struct ApiEntry {
    #[serde(rename = "type")]
    kind: Option<String>,
    spec_url: Option<String>,
    page_url: Option<String>,
    spec_url_override: Option<String>,
    auth: Option<String>,
}

fn read_manifest(path: &Path) -> Result<String, ManifestError> {
    if !path.exists() {
        return Err(ManifestError::NotFound(path.to_path_buf()));
    }
    std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Load dataset descriptors from a `datasets.yml` file.
pub fn load_dataset_manifest(path: &Path) -> Result<Vec<ResourceDescriptor>, ManifestError> {
    parse_dataset_manifest(&read_manifest(path)?)
}

/// Load API spec descriptors from an `apis.yml` file.
pub fn load_api_manifest(path: &Path) -> Result<Vec<ResourceDescriptor>, ManifestError> {
    parse_api_manifest(&read_manifest(path)?)
}

pub fn parse_dataset_manifest(text: &str) -> Result<Vec<ResourceDescriptor>, ManifestError> {
    if text.trim().is_empty() {
        return Err(ManifestError::MissingKey("datasets"));
    }
    let manifest: DatasetManifest =
        serde_yaml_ng::from_str(text).map_err(|e| ManifestError::Parse(e.to_string()))?;
    let entries = manifest
        .datasets
        .ok_or(ManifestError::MissingKey("datasets"))?;

    let mut seen = HashSet::new();
    let mut descriptors = Vec::with_capacity(entries.len());

    for (index, entry) in entries.into_iter().enumerate() {
        let label = entry
            .dataset_id
            .clone()
            .unwrap_or_else(|| format!("#{}", index + 1));

        let (Some(dataset_id), Some(portal_base)) = (entry.dataset_id, entry.portal_base) else {
            return Err(ManifestError::Invalid {
                entry: label,
                reason: "missing required fields (dataset_id, portal_base)".into(),
            });
        };

        if !seen.insert(dataset_id.clone()) {
            return Err(ManifestError::Invalid {
                entry: dataset_id,
                reason: "duplicate dataset_id".into(),
            });
        }

        let mut descriptor = ResourceDescriptor::dataset(dataset_id, portal_base);
        descriptor.export_format = entry
            .export_format
            .filter(|f| !f.is_empty())
            .unwrap_or_else(|| DEFAULT_EXPORT_FORMAT.to_owned());
        descriptor.validate = entry.validate;
        descriptor.schema_url_override = entry.schema_url_override;
        descriptors.push(descriptor);
    }

    Ok(descriptors)
}

pub fn parse_api_manifest(text: &str) -> Result<Vec<ResourceDescriptor>, ManifestError> {
    if text.trim().is_empty() {
        return Err(ManifestError::MissingKey("apis"));
    }
    let manifest: ApiManifest =
        serde_yaml_ng::from_str(text).map_err(|e| ManifestError::Parse(e.to_string()))?;
    let apis = manifest.apis.ok_or(ManifestError::MissingKey("apis"))?;

    let mut descriptors = Vec::with_capacity(apis.len());

    for (key, value) in apis {
        let name = key
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| ManifestError::Parse(format!("API name must be a string: {key:?}")))?;

        let entry: ApiEntry = serde_yaml_ng::from_value(value).map_err(|e| {
            ManifestError::Invalid {
                entry: name.clone(),
                reason: e.to_string(),
            }
        })?;

        descriptors.push(api_descriptor(name, entry)?);
    }

    Ok(descriptors)
}

fn api_descriptor(name: String, entry: ApiEntry) -> Result<ResourceDescriptor, ManifestError> {
    let invalid = |reason: &str| ManifestError::Invalid {
        entry: name.clone(),
        reason: reason.to_owned(),
    };

    let locator = match entry.kind.as_deref() {
        Some("direct") => SourceLocator::Direct {
            url: entry
                .spec_url
                .ok_or_else(|| invalid("type=direct but no spec_url provided"))?,
        },
        Some("prim_page") => SourceLocator::PortalPage {
            page_url: entry
                .page_url
                .ok_or_else(|| invalid("type=prim_page but no page_url provided"))?,
            fallback_url: entry.spec_url_override,
        },
        Some(other) => return Err(invalid(&format!("unknown type '{other}'"))),
        None => return Err(invalid("missing type")),
    };

    let requires_auth = match entry.auth.as_deref() {
        None => false,
        Some(TOKEN_AUTH) => true,
        Some(other) => return Err(invalid(&format!("unknown auth '{other}'"))),
    };

    let mut descriptor = ResourceDescriptor::api_spec(name, locator);
    descriptor.requires_auth = requires_auth;
    Ok(descriptor)
}
