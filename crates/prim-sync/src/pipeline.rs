use std::fmt;

use tracing::{info, warn};

/// One independently runnable unit of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    SyncSpecs,
    GenerateClients,
    SyncDatasets,
    ValidateDatasets,
}

impl Stage {
    /// Pipeline order: specs, clients, datasets, validation.
    pub const ALL: [Stage; 4] = [
        Stage::SyncSpecs,
        Stage::GenerateClients,
        Stage::SyncDatasets,
        Stage::ValidateDatasets,
    ];

    /// Subcommand name that runs this stage on its own.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SyncSpecs => "sync-specs",
            Self::GenerateClients => "generate-clients",
            Self::SyncDatasets => "sync-datasets",
            Self::ValidateDatasets => "validate-datasets",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// How a stage ended, as observed from outside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageStatus {
    Succeeded,
    /// Exited non-zero; `code` is `None` when killed by a signal.
    Failed { code: Option<i32> },
    /// Could not be started at all.
    SpawnFailed(String),
}

impl StageStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "OK"),
            Self::Failed { code: Some(code) } => write!(f, "FAILED (exit {code})"),
            Self::Failed { code: None } => write!(f, "FAILED (terminated by signal)"),
            Self::SpawnFailed(reason) => write!(f, "FAILED (could not start: {reason})"),
        }
    }
}

/// Executes a stage in isolation and reports only its exit status.
#[async_trait::async_trait]
pub trait StageRunner: Send + Sync {
    async fn run(&self, stage: Stage, dry_run: bool) -> StageStatus;
}

/// Status of every attempted stage, in order.
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub results: Vec<(Stage, StageStatus)>,
}

impl PipelineReport {
    pub fn is_success(&self) -> bool {
        self.results.iter().all(|(_, status)| status.is_success())
    }

    pub fn failed_stages(&self) -> Vec<Stage> {
        self.results
            .iter()
            .filter(|(_, status)| !status.is_success())
            .map(|(stage, _)| *stage)
            .collect()
    }
}

/// Run every stage in order with the same dry-run flag. Earlier failures do
/// not short-circuit later stages.
pub async fn run_pipeline(
    runner: &dyn StageRunner,
    stages: &[Stage],
    dry_run: bool,
) -> PipelineReport {
    let mut report = PipelineReport::default();

    for &stage in stages {
        info!(stage = %stage, dry_run, "starting stage");
        let status = runner.run(stage, dry_run).await;
        if status.is_success() {
            info!(stage = %stage, "stage succeeded");
        } else {
            warn!(stage = %stage, status = %status, "stage failed");
        }
        report.results.push((stage, status));
    }

    report
}
