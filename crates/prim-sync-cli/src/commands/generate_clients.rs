use std::path::{Path, PathBuf};
use std::process::{ExitCode, Stdio};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use prim_sync::MetadataStore;
use prim_sync_store::{SIDECAR_SUFFIX, SidecarStore};
use tokio::process::Command;
use tracing::{debug, warn};

use super::exit_code;
use crate::config::AppConfig;

/// File inside a client directory recording the spec digest it was built from.
const SPEC_HASH_FILE: &str = ".spec_hash";

const DOCKER_INFO_TIMEOUT: Duration = Duration::from_secs(5);

/// Whether a client recorded against `recorded` must be rebuilt for `current`.
pub fn needs_generation(recorded: Option<&str>, current: &str) -> bool {
    recorded.map(str::trim) != Some(current)
}

/// Spec files in `dir`, sorted by name, excluding sidecars.
pub fn spec_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("failed to list {}", dir.display())),
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|name| name.ends_with(".json") && !name.ends_with(SIDECAR_SUFFIX))
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Arguments to `docker` that generate the Python client for `name`.
pub fn generator_args(config: &AppConfig, root: &Path, name: &str) -> Vec<String> {
    let container_path = |dir: &Path| dir.to_string_lossy().replace('\\', "/");
    vec![
        "run".into(),
        "--rm".into(),
        "-v".into(),
        format!("{}:/local", root.display()),
        config.generator_image.clone(),
        "generate".into(),
        "-i".into(),
        format!("/local/{}/{name}.json", container_path(&config.specs_dir)),
        "-g".into(),
        "python".into(),
        "-o".into(),
        format!("/local/{}/{name}", container_path(&config.clients_dir)),
        "--package-name".into(),
        name.to_owned(),
    ]
}

async fn docker_available() -> bool {
    let info = Command::new("docker")
        .arg("info")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    matches!(
        tokio::time::timeout(DOCKER_INFO_TIMEOUT, info).await,
        Ok(Ok(status)) if status.success()
    )
}

async fn generate(config: &AppConfig, root: &Path, name: &str) -> Result<()> {
    let args = generator_args(config, root, name);
    debug!(api = %name, args = ?args, "running generator");

    let output = Command::new("docker")
        .args(&args)
        .kill_on_drop(true)
        .output();
    let timeout = Duration::from_secs(config.generator_timeout_secs);
    let output = match tokio::time::timeout(timeout, output).await {
        Ok(result) => result.context("failed to run docker")?,
        Err(_) => bail!("generator timed out after {}s", timeout.as_secs()),
    };

    if !output.status.success() {
        bail!(
            "generator exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}

/// Regenerate clients whose spec digest changed since the last build.
pub async fn run(config: &AppConfig, dry_run: bool) -> Result<ExitCode> {
    if !dry_run && !docker_available().await {
        eprintln!("error: Docker is not available. Install Docker and make sure the daemon is running.");
        return Ok(ExitCode::FAILURE);
    }

    let specs_dir = config.specs_path();
    let clients_dir = config.clients_path();
    let specs = spec_files(&specs_dir)?;
    if specs.is_empty() {
        println!("No API specs found in {}.", specs_dir.display());
        return Ok(ExitCode::SUCCESS);
    }

    let root = std::fs::canonicalize(&config.root).unwrap_or_else(|_| config.root.clone());
    let sidecars = SidecarStore::new(&specs_dir);
    let mut generated = 0usize;
    let mut skipped = 0usize;
    let mut failed: Vec<String> = Vec::new();

    println!("Found {} API specs.", specs.len());
    for spec in &specs {
        let Some(name) = spec.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };

        let Some(hash) = sidecars
            .load(name)
            .map(|m| m.content_hash)
            .filter(|h| !h.is_empty())
        else {
            warn!(api = %name, "no content hash in sidecar");
            println!("  [FAILED] {name}: no spec hash available");
            failed.push(name.to_owned());
            continue;
        };

        let client_dir = clients_dir.join(name);
        let recorded = std::fs::read_to_string(client_dir.join(SPEC_HASH_FILE)).ok();
        if client_dir.is_dir() && !needs_generation(recorded.as_deref(), &hash) {
            println!("  [ok] {name}: up to date");
            skipped += 1;
            continue;
        }

        if dry_run {
            println!(
                "  [dry run] {name}: would run docker {}",
                generator_args(config, &root, name).join(" ")
            );
            generated += 1;
            continue;
        }

        let result = match generate(config, &root, name).await {
            Ok(()) => std::fs::create_dir_all(&client_dir)
                .and_then(|()| std::fs::write(client_dir.join(SPEC_HASH_FILE), &hash))
                .with_context(|| format!("failed to record spec hash in {}", client_dir.display())),
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => {
                println!("  [ok] {name}: generated");
                generated += 1;
            }
            Err(e) => {
                println!("  [FAILED] {name}: {e:#}");
                failed.push(name.to_owned());
            }
        }
    }

    println!(
        "Generated: {generated}, skipped: {skipped}, failed: {}",
        failed.len()
    );
    if !failed.is_empty() {
        eprintln!("Failed to generate: {}", failed.join(", "));
    }
    Ok(exit_code(failed.is_empty()))
}
