use std::process::ExitCode;

use anyhow::{Context, Result};
use prim_sync::{ResourceDescriptor, load_dataset_manifest};

use super::{exit_code, print_report, sync_into};
use crate::config::AppConfig;

pub fn load(config: &AppConfig) -> Result<Vec<ResourceDescriptor>> {
    let manifest = config.dataset_manifest();
    load_dataset_manifest(&manifest)
        .with_context(|| format!("invalid dataset manifest {}", manifest.display()))
}

/// Download every dataset export declared in `datasets.yml` into the raw directory.
pub async fn run(config: &AppConfig, dry_run: bool) -> Result<ExitCode> {
    let resources = load(config)?;

    println!("Syncing {} datasets...", resources.len());
    let report = sync_into(config, &config.raw_path(), &resources, dry_run).await?;
    print_report("datasets", &report);

    Ok(exit_code(report.all_succeeded()))
}
