pub mod generate_clients;
pub mod sync_all;
pub mod sync_datasets;
pub mod sync_specs;
pub mod validate_datasets;
pub mod watch;

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use prim_sync::{BatchReport, ResourceDescriptor, ResourceSynchronizer, run_all};
use prim_sync_http::HttpFetcher;
use prim_sync_store::{FsPayloadStore, SidecarStore};
use serde::Serialize;
use tracing::warn;

use crate::config::AppConfig;

pub fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Sync a batch whose payloads and sidecars share `dir`.
pub async fn sync_into(
    config: &AppConfig,
    dir: &Path,
    resources: &[ResourceDescriptor],
    dry_run: bool,
) -> Result<BatchReport> {
    if !dry_run && resources.iter().any(|r| r.requires_auth) && config.token().is_none() {
        warn!(
            env = %config.token_env,
            "token not set; resources requiring auth will be fetched without it"
        );
    }

    let fetcher = HttpFetcher::new(config.http_config()).context("failed to build HTTP client")?;
    let sidecars = SidecarStore::new(dir);
    let payloads = FsPayloadStore::new(dir);
    let synchronizer = ResourceSynchronizer::new(&fetcher, &sidecars, &payloads).dry_run(dry_run);

    Ok(run_all(&synchronizer, resources).await)
}

/// Print one line per resource and a closing count.
pub fn print_report(noun: &str, report: &BatchReport) {
    for outcome in &report.outcomes {
        println!("  {outcome}");
    }
    println!(
        "Synced {} {noun} ({} succeeded, {} failed).",
        report.total(),
        report.succeeded(),
        report.failed()
    );
}

/// Write pretty JSON, creating parent directories as needed.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(value).context("failed to serialize JSON")?;
    std::fs::write(path, json + "\n")
        .with_context(|| format!("failed to write {}", path.display()))
}
