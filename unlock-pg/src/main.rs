//! PostgreSQL catalog snapshot tool.
//!
//! Exports a list of catalog and statistics queries to delimited files and
//! packages them into one compressed archive for offline analysis.
//!
//! # Security Guarantees
//! - Queries are operator-supplied and run as given
//! - No credentials stored or logged
//! - Offline operation after the last export

use clap::Parser;
use tracing::{error, info, warn};
use unlock_core::{
    Archiver, Exporter, Result, SnapshotOutcome, UnlockError, init_logging, run_snapshot,
};
use unlock_pg::Cli;
use zeroize::Zeroizing;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.global.verbose, cli.global.quiet)?;

    let prompted = read_password(&cli)?;
    let descriptor = cli
        .connection
        .descriptor(prompted.as_deref().map(String::as_str))
        .map_err(|e| {
            error!("Invalid connection parameters: {}", e);
            e
        })?;

    let plan = cli.snapshot_plan().map_err(|e| {
        error!("Invalid job configuration: {}", e);
        e
    })?;
    let archive_settings = cli.archive_settings().map_err(|e| {
        error!("Invalid archive configuration: {}", e);
        e
    })?;
    let export_settings = cli.export_settings();

    tokio::fs::create_dir_all(&export_settings.output_dir)
        .await
        .map_err(|e| {
            UnlockError::write_failed(
                format!(
                    "Failed to create output directory {}",
                    export_settings.output_dir.display()
                ),
                e,
            )
        })?;

    info!("Starting snapshot...");
    info!("Target: {}", descriptor);
    info!("Output: {}", export_settings.output_dir.display());
    info!("Jobs: {}", plan.jobs().len());

    let exporter = Exporter::new(descriptor, export_settings);
    let archiver = Archiver::new(archive_settings);

    let outcome = run_snapshot(&exporter, &archiver, &plan)
        .await
        .map_err(|e| {
            error!("Snapshot aborted: {}", e);
            e
        })?;

    if outcome.is_clean() {
        info!("✓ Snapshot completed");
    } else {
        warn!("Snapshot completed with errors");
    }

    print_summary(&outcome, plan.jobs().len());
    Ok(())
}

/// Reads the password from the terminal when asked to and none was given.
fn read_password(cli: &Cli) -> Result<Option<Zeroizing<String>>> {
    if !cli.connection.needs_prompt() {
        return Ok(None);
    }

    let password = rpassword::prompt_password("Password: ").map_err(|e| {
        UnlockError::configuration(format!("Failed to read password: {}", e))
    })?;

    if password.is_empty() {
        return Err(UnlockError::configuration("Password cannot be empty"));
    }

    Ok(Some(Zeroizing::new(password)))
}

fn print_summary(outcome: &SnapshotOutcome, total_jobs: usize) {
    println!(
        "Exported {} of {} jobs",
        outcome.exported.len(),
        total_jobs
    );
    for file in &outcome.exported {
        println!("  {}: {} rows -> {}", file.name, file.rows, file.path.display());
    }
    for failed in &outcome.failed {
        println!("  {}: failed ({})", failed.name, failed.error);
    }

    if let Some(report) = &outcome.archive {
        println!(
            "Archive: {} ({} files, {} skipped)",
            report.artifact.display(),
            report.entries.len(),
            report.skipped.len()
        );
    } else if let Some(error) = &outcome.archive_error {
        println!("Archive: failed ({})", error);
    }
}
