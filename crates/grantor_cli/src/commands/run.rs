use std::process::ExitCode;
use std::sync::Arc;

use console::style;
use grantor::batch::{RecordOutcome, SkipReason};
use grantor::{BatchError, BatchProcessor, GitHubClient, RecordSet, Summary};

use crate::RunArgs;
use crate::config::{Config, ConfigError, RunSettings};
use crate::progress::ProgressReporter;
use crate::shutdown::StopRequest;

/// Exit status when `fail_on_error` is set and a record failed.
const EXIT_RECORD_FAILURES: u8 = 2;

pub(crate) async fn handle_run(
    args: &RunArgs,
    stop: &StopRequest,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let mut config = Config::load()?;
    args.apply(&mut config)?;
    let settings = config.resolve()?;

    let client = GitHubClient::new(&settings.api_url, &settings.token, settings.client.clone())
        .map_err(|e| ConfigError::Invalid(e.to_string()))?;

    let summary = execute(&settings, client, stop).await?;

    print_summary(&summary, settings.batch.dry_run, stop.is_requested());
    Ok(ExitCode::from(exit_status(&summary, settings.fail_on_error)))
}

/// Read the input and run the batch. Fatal errors surface before any
/// record is touched.
async fn execute(
    settings: &RunSettings,
    client: GitHubClient,
    stop: &StopRequest,
) -> Result<Summary, BatchError> {
    let records = RecordSet::from_path(&settings.input, settings.batch.target_override.as_ref())?;
    tracing::info!(
        file = %settings.input.display(),
        shape = %records.shape(),
        records = records.len(),
        "Loaded input"
    );

    let processor = BatchProcessor::new(client, settings.roles.clone(), settings.batch.clone())
        .with_cancel_flag(stop.flag());

    let reporter = Arc::new(ProgressReporter::new());
    let callback = reporter.as_callback();
    let summary = processor.process_all(&records, Some(&*callback)).await;
    reporter.finish();

    Ok(summary)
}

fn exit_status(summary: &Summary, fail_on_error: bool) -> u8 {
    if fail_on_error && summary.has_failures() {
        EXIT_RECORD_FAILURES
    } else {
        0
    }
}

fn print_summary(summary: &Summary, dry_run: bool, stopped: bool) {
    let dry_run_skips = summary
        .reports
        .iter()
        .filter(|r| {
            matches!(
                r.outcome,
                RecordOutcome::Skipped {
                    reason: SkipReason::DryRun
                }
            )
        })
        .count();

    println!();
    if dry_run {
        println!(
            "{} Dry run: {} record(s) would be granted, {} failed, {} skipped",
            style("ℹ").cyan(),
            dry_run_skips,
            summary.failed,
            summary.skipped - dry_run_skips
        );
    } else {
        println!(
            "{} {} granted, {} failed, {} skipped",
            if summary.has_failures() {
                style("⚠").yellow()
            } else {
                style("✓").green()
            },
            summary.succeeded,
            summary.failed,
            summary.skipped
        );
    }

    if stopped {
        println!(
            "{} Stopped early; remaining records were skipped",
            style("⚠").yellow()
        );
    }
}
