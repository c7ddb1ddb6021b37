use std::process::ExitCode;

use anyhow::{Context, Result};
use prim_sync::load_api_manifest;

use super::{exit_code, print_report, sync_into};
use crate::config::AppConfig;

/// Fetch every API spec declared in `apis.yml` into the specs directory.
pub async fn run(config: &AppConfig, dry_run: bool) -> Result<ExitCode> {
    let manifest = config.api_manifest();
    let resources = load_api_manifest(&manifest)
        .with_context(|| format!("invalid API manifest {}", manifest.display()))?;

    println!("Syncing {} API specs...", resources.len());
    let report = sync_into(config, &config.specs_path(), &resources, dry_run).await?;
    print_report("API specs", &report);

    Ok(exit_code(report.all_succeeded()))
}
