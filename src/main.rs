//! CLI entry point for the archiver tool.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info, warn};

use archiver_core::{
    Database, Ledger, ReconciliationEngine, RunConfig, load_default_file_config,
    manifest::split_delimited,
};

mod cli;
mod manual;
mod progress;

use cli::{Args, Command};
use manual::ManualSession;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    let loaded = load_default_file_config()?;
    if loaded.loaded_from_file {
        if let Some(path) = &loaded.path {
            debug!(path = %path.display(), "loaded config file");
        }
    }
    let mut config = loaded.config;
    if let Some(root) = args.root {
        config.download_root = root;
    }
    if let Some(database) = args.database {
        config.database_path = database;
    }

    match args.command {
        Command::Import { file } => import_clients(&config, &file).await,
        Command::Run {
            page_size,
            timeout,
            max_consecutive_errors,
            progress,
        } => {
            if let Some(page_size) = page_size {
                config.page_size = page_size;
            }
            if let Some(timeout) = timeout {
                config.artifact_timeout_secs = timeout;
            }
            if let Some(max) = max_consecutive_errors {
                config.max_consecutive_errors = max;
            }
            config.validate()?;
            run_batch(config, progress && !args.quiet).await
        }
        Command::Status { failures, json } => show_status(&config, failures, json).await,
    }
}

async fn open_ledger(config: &RunConfig) -> Result<Ledger> {
    let db = Database::new(&config.database_path)
        .await
        .with_context(|| {
            format!(
                "failed to open ledger database '{}'",
                config.database_path.display()
            )
        })?;
    Ok(Ledger::new(db))
}

/// Adds clients from a delimited backlog file to the pending backlog.
async fn import_clients(config: &RunConfig, file: &Path) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read backlog file '{}'", file.display()))?;
    let ledger = open_ledger(config).await?;

    let mut added = 0usize;
    let mut existing = 0usize;
    let mut invalid = 0usize;

    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        // Tolerate an exported header row.
        if index == 0 && line.to_ascii_lowercase().starts_with("client name") {
            continue;
        }

        let fields = split_delimited(line);
        let name = fields.first().map(|f| f.trim()).unwrap_or_default();
        let number = fields.get(1).map(|f| f.trim()).unwrap_or_default();
        let email = fields.get(2).map(|f| f.trim()).filter(|f| !f.is_empty());
        if name.is_empty() || number.is_empty() {
            warn!(line = index + 1, "skipping invalid backlog line");
            invalid += 1;
            continue;
        }

        match ledger.add_client(name, number, email).await? {
            Some(_) => added += 1,
            None => existing += 1,
        }
    }

    info!(added, existing, invalid, "backlog import finished");
    println!("added = {added}");
    println!("already_present = {existing}");
    println!("invalid = {invalid}");
    Ok(())
}

/// Processes every pending client with an operator-driven browser session.
async fn run_batch(config: RunConfig, use_spinner: bool) -> Result<()> {
    let ledger = open_ledger(&config).await?;
    let pending = ledger.pending_clients().await?;
    if pending.is_empty() {
        info!("backlog is empty, nothing to process");
        return Ok(());
    }
    info!(clients = pending.len(), root = %config.download_root.display(), "starting batch");

    let engine = ReconciliationEngine::new(config, ledger.clone())?;
    let (progress_handle, stop) =
        progress::spawn_progress_ui(use_spinner, ledger.clone(), pending.len());

    let mut session = ManualSession::new();
    let result = engine.process_batch(&mut session).await;

    stop.store(true, std::sync::atomic::Ordering::SeqCst);
    if let Some(handle) = progress_handle {
        let _ = handle.await;
    }

    let stats = result.context("batch aborted")?;
    println!("processed = {}", stats.processed);
    println!("succeeded = {}", stats.succeeded);
    println!("warnings = {}", stats.warnings);
    println!("failed = {}", stats.failed);
    Ok(())
}

/// Prints backlog counts and the most recent document failures.
async fn show_status(config: &RunConfig, failures: i64, json: bool) -> Result<()> {
    let ledger = open_ledger(config).await?;

    if json {
        let counts: serde_json::Map<String, serde_json::Value> = ledger
            .client_counts_by_status()
            .await?
            .into_iter()
            .map(|(status, count)| (status, count.into()))
            .collect();
        let failed: Vec<serde_json::Value> = ledger
            .failed_documents(failures)
            .await?
            .iter()
            .map(|doc| {
                serde_json::json!({
                    "client_name": doc.client_name,
                    "client_number": doc.client_number,
                    "document_id": doc.document_id,
                    "year": doc.year,
                    "description": doc.download_description,
                })
            })
            .collect();
        let report = serde_json::json!({
            "database": config.database_path.display().to_string(),
            "clients": counts,
            "recent_failures": failed,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("database = {}", config.database_path.display());
    let counts = ledger.client_counts_by_status().await?;
    if counts.is_empty() {
        println!("backlog is empty");
    }
    for (status, count) in counts {
        println!("{status} = {count}");
    }

    let failed = ledger.failed_documents(failures).await?;
    if !failed.is_empty() {
        println!();
        println!("recent document failures:");
        for doc in failed {
            println!(
                "  {} / {} ({}): {}",
                doc.client_name, doc.document_id, doc.year, doc.download_description
            );
        }
    }
    Ok(())
}
