use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use prim_sync::{PeriodicRefresher, ResourceDescriptor, ResourceSynchronizer, run_all};
use prim_sync_http::HttpFetcher;
use prim_sync_store::{FsPayloadStore, SidecarStore};
use tracing::info;

use super::sync_datasets;
use crate::config::AppConfig;

struct DatasetSync {
    fetcher: HttpFetcher,
    sidecars: SidecarStore,
    payloads: FsPayloadStore,
    resources: Vec<ResourceDescriptor>,
    dry_run: bool,
}

impl DatasetSync {
    async fn run_once(&self) -> Result<(), String> {
        let synchronizer = ResourceSynchronizer::new(&self.fetcher, &self.sidecars, &self.payloads)
            .dry_run(self.dry_run);
        let report = run_all(&synchronizer, &self.resources).await;
        for outcome in &report.outcomes {
            println!("  {outcome}");
        }
        if report.all_succeeded() {
            Ok(())
        } else {
            Err(format!(
                "{} of {} datasets failed",
                report.failed(),
                report.total()
            ))
        }
    }
}

/// Sync datasets now and then every interval until Ctrl-C.
pub async fn run(config: &AppConfig, interval_secs: Option<u64>, dry_run: bool) -> Result<ExitCode> {
    let secs = interval_secs.unwrap_or(config.refresh_interval_secs);
    ensure!(secs > 0, "refresh interval must be at least one second");
    let interval = Duration::from_secs(secs);

    let raw = config.raw_path();
    let job = Arc::new(DatasetSync {
        fetcher: HttpFetcher::new(config.http_config()).context("failed to build HTTP client")?,
        sidecars: SidecarStore::new(&raw),
        payloads: FsPayloadStore::new(&raw),
        resources: sync_datasets::load(config)?,
        dry_run,
    });

    println!(
        "Watching {} datasets, refreshing every {secs}s. Press Ctrl-C to stop.",
        job.resources.len()
    );
    if let Err(e) = job.run_once().await {
        eprintln!("warning: {e}");
    }

    let refresher = PeriodicRefresher::new();
    refresher.start(interval, {
        let job = Arc::clone(&job);
        move || {
            let job = Arc::clone(&job);
            async move { job.run_once().await }
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("stopping refresher");
    refresher.shutdown().await;

    Ok(ExitCode::SUCCESS)
}
