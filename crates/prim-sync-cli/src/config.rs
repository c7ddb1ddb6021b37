use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use prim_sync_http::HttpConfig;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Config file looked up in the working directory before the user config dir.
pub const LOCAL_CONFIG_FILE: &str = "prim-sync.toml";

/// Top-level application configuration. Directories are relative to `root`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub root: PathBuf,
    pub manifests_dir: PathBuf,
    pub raw_dir: PathBuf,
    pub schema_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub specs_dir: PathBuf,
    pub clients_dir: PathBuf,
    pub timeout_secs: u64,
    /// Name of the environment variable holding the bearer token.
    pub token_env: String,
    pub user_agent: String,
    pub generator_image: String,
    pub generator_timeout_secs: u64,
    /// Invalid records tolerated per dataset before validation fails.
    pub max_validation_errors: usize,
    pub refresh_interval_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            manifests_dir: PathBuf::from("manifests"),
            raw_dir: PathBuf::from("data/raw"),
            schema_dir: PathBuf::from("data/schema"),
            reports_dir: PathBuf::from("data/reports"),
            specs_dir: PathBuf::from("specs"),
            clients_dir: PathBuf::from("clients"),
            timeout_secs: 30,
            token_env: "PRIM_TOKEN".into(),
            user_agent: concat!("prim-sync/", env!("CARGO_PKG_VERSION")).into(),
            generator_image: "openapitools/openapi-generator-cli:v7.4.0".into(),
            generator_timeout_secs: 300,
            max_validation_errors: 0,
            refresh_interval_secs: 3600,
        }
    }
}

impl AppConfig {
    fn under_root(&self, dir: &Path) -> PathBuf {
        self.root.join(dir)
    }

    pub fn dataset_manifest(&self) -> PathBuf {
        self.under_root(&self.manifests_dir).join("datasets.yml")
    }

    pub fn api_manifest(&self) -> PathBuf {
        self.under_root(&self.manifests_dir).join("apis.yml")
    }

    pub fn raw_path(&self) -> PathBuf {
        self.under_root(&self.raw_dir)
    }

    pub fn schema_path(&self) -> PathBuf {
        self.under_root(&self.schema_dir)
    }

    pub fn reports_path(&self) -> PathBuf {
        self.under_root(&self.reports_dir)
    }

    pub fn specs_path(&self) -> PathBuf {
        self.under_root(&self.specs_dir)
    }

    pub fn clients_path(&self) -> PathBuf {
        self.under_root(&self.clients_dir)
    }

    /// Bearer token from the configured environment variable, if set.
    pub fn token(&self) -> Option<String> {
        std::env::var(&self.token_env)
            .ok()
            .filter(|t| !t.trim().is_empty())
    }

    pub fn http_config(&self) -> HttpConfig {
        HttpConfig {
            timeout: Duration::from_secs(self.timeout_secs),
            token: self.token(),
            user_agent: self.user_agent.clone(),
        }
    }
}

/// User config file: `~/.config/prim-sync/config.toml`
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("prim-sync").join("config.toml"))
}

/// Load configuration.
///
/// An explicitly requested file must exist and parse. Otherwise the first of
/// `./prim-sync.toml` and the user config file that exists is used, and a
/// file that fails to parse falls back to defaults with a warning.
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = explicit {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        return toml::from_str(&contents)
            .with_context(|| format!("failed to parse config {}", path.display()));
    }

    let candidates = std::iter::once(PathBuf::from(LOCAL_CONFIG_FILE)).chain(config_path());
    for path in candidates {
        let Ok(contents) = std::fs::read_to_string(&path) else {
            continue;
        };
        return Ok(toml::from_str(&contents).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "failed to parse config, using defaults");
            AppConfig::default()
        }));
    }

    Ok(AppConfig::default())
}
