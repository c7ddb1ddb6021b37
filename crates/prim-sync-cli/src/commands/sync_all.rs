use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use prim_sync::{Stage, StageRunner, StageStatus, run_pipeline};
use tokio::process::Command;

/// Runs each stage as a child invocation of this executable, so a crash in
/// one stage cannot affect the next.
pub struct ProcessStageRunner {
    exe: PathBuf,
    config: Option<PathBuf>,
    verbose: u8,
}

impl ProcessStageRunner {
    pub fn new(exe: PathBuf, config: Option<PathBuf>, verbose: u8) -> Self {
        Self {
            exe,
            config,
            verbose,
        }
    }

    pub fn current(config: Option<PathBuf>, verbose: u8) -> Result<Self> {
        let exe = std::env::current_exe().context("could not locate the current executable")?;
        Ok(Self::new(exe, config, verbose))
    }

    /// Command-line arguments for one stage.
    pub fn args(&self, stage: Stage, dry_run: bool) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(config) = &self.config {
            args.push("--config".to_owned());
            args.push(config.display().to_string());
        }
        if self.verbose > 0 {
            args.push(format!("-{}", "v".repeat(usize::from(self.verbose))));
        }
        args.push(stage.name().to_owned());
        if dry_run {
            args.push("--dry-run".to_owned());
        }
        args
    }
}

#[async_trait::async_trait]
impl StageRunner for ProcessStageRunner {
    async fn run(&self, stage: Stage, dry_run: bool) -> StageStatus {
        let status = Command::new(&self.exe)
            .args(self.args(stage, dry_run))
            .status()
            .await;

        match status {
            Ok(status) if status.success() => StageStatus::Succeeded,
            Ok(status) => StageStatus::Failed {
                code: status.code(),
            },
            Err(e) => StageStatus::SpawnFailed(e.to_string()),
        }
    }
}

pub async fn run(runner: &dyn StageRunner, dry_run: bool) -> Result<ExitCode> {
    let report = run_pipeline(runner, &Stage::ALL, dry_run).await;

    println!();
    for (stage, status) in &report.results {
        println!("{stage:<20} {status}");
    }

    if report.is_success() {
        println!("All stages succeeded.");
        return Ok(ExitCode::SUCCESS);
    }

    let failed: Vec<&str> = report.failed_stages().iter().map(Stage::name).collect();
    eprintln!("Failed stages: {}", failed.join(", "));
    Ok(ExitCode::FAILURE)
}
