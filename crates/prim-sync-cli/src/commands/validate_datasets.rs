use std::fs::File;
use std::io::{BufReader, ErrorKind};
use std::process::ExitCode;

use anyhow::{Context, Result};
use prim_sync::{
    MAX_COLLECTED_ERRORS, PayloadStore, ResourceDescriptor, ValidationReport, validate_lines,
};
use prim_sync_http::HttpFetcher;
use prim_sync_http::schema::fetch_dataset_schema;
use prim_sync_store::FsPayloadStore;
use tracing::{error, info, warn};

use super::{exit_code, sync_datasets, write_json};
use crate::config::AppConfig;

/// Only newline-delimited JSON exports can be checked record by record.
const VALIDATABLE_FORMAT: &str = "jsonl";

/// Validate every dataset flagged `validate: true` against its schema.
///
/// A dataset fails when its invalid record count exceeds `max_errors`, or
/// the configured `max_validation_errors` when no override is given.
pub async fn run(
    config: &AppConfig,
    dry_run: bool,
    max_errors: Option<usize>,
) -> Result<ExitCode> {
    let max_errors = max_errors.unwrap_or(config.max_validation_errors);
    let datasets: Vec<ResourceDescriptor> = sync_datasets::load(config)?
        .into_iter()
        .filter(|d| d.validate)
        .collect();

    if datasets.is_empty() {
        println!("No datasets marked for validation.");
        return Ok(ExitCode::SUCCESS);
    }

    let payloads = FsPayloadStore::new(config.raw_path());

    if dry_run {
        for dataset in &datasets {
            println!(
                "  would validate {} ({})",
                dataset.id,
                payloads.payload_path(dataset).display()
            );
        }
        return Ok(ExitCode::SUCCESS);
    }

    let fetcher = HttpFetcher::new(config.http_config()).context("failed to build HTTP client")?;
    let mut failed = Vec::new();

    println!("Validating {} datasets...", datasets.len());
    for dataset in &datasets {
        if dataset.export_format != VALIDATABLE_FORMAT {
            warn!(
                resource = %dataset.id,
                format = %dataset.export_format,
                "only jsonl exports can be validated, skipping"
            );
            println!("  [skipped] {}: {} export", dataset.id, dataset.export_format);
            continue;
        }

        match validate_one(config, &fetcher, &payloads, dataset).await {
            Ok(report) => {
                let passed = !report.exceeds(max_errors);
                println!(
                    "  [{}] {}: {} records, {} valid, {} invalid",
                    if passed { "ok" } else { "FAILED" },
                    dataset.id,
                    report.total_records,
                    report.valid_records,
                    report.invalid_records
                );
                if !passed {
                    failed.push(dataset.id.as_str());
                }
            }
            Err(e) => {
                error!(resource = %dataset.id, error = %format!("{e:#}"), "validation failed");
                println!("  [FAILED] {}: {e:#}", dataset.id);
                failed.push(dataset.id.as_str());
            }
        }
    }

    if !failed.is_empty() {
        eprintln!("Validation failed for: {}", failed.join(", "));
    }
    Ok(exit_code(failed.is_empty()))
}

async fn validate_one(
    config: &AppConfig,
    fetcher: &HttpFetcher,
    payloads: &FsPayloadStore,
    dataset: &ResourceDescriptor,
) -> Result<ValidationReport> {
    let schema = fetch_dataset_schema(fetcher, dataset)
        .await
        .context("failed to retrieve schema")?;

    let schema_path = config
        .schema_path()
        .join(format!("{}.schema.json", dataset.id));
    write_json(&schema_path, &schema.to_json_schema())?;
    info!(resource = %dataset.id, path = %schema_path.display(), "schema saved");

    let payload_path = payloads.payload_path(dataset);
    let report = match File::open(&payload_path) {
        Ok(file) => validate_lines(BufReader::new(file), &schema, MAX_COLLECTED_ERRORS)
            .with_context(|| format!("failed to read {}", payload_path.display()))?,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!(resource = %dataset.id, path = %payload_path.display(), "data file not found");
            ValidationReport::default()
        }
        Err(e) => {
            return Err(e).with_context(|| format!("failed to open {}", payload_path.display()));
        }
    };

    let report_path = config
        .reports_path()
        .join(format!("{}.validation.json", dataset.id));
    write_json(&report_path, &report)?;

    Ok(report)
}
