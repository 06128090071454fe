use std::sync::Mutex;
use std::time::Duration;

use console::style;
use grantor::BatchProgress;
use grantor::batch::SkipReason;
use grantor::github::BackoffCause;
use indicatif::{ProgressBar, ProgressStyle};

/// Interactive progress reporter using indicatif.
///
/// A single bar counts processed records. Failures and non-dry-run skips are
/// printed above the bar as they happen so they stay visible afterwards.
pub struct InteractiveReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl InteractiveReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    pub fn handle(&self, event: BatchProgress) {
        let mut bar = self.bar.lock().unwrap_or_else(|e| e.into_inner());

        match event {
            BatchProgress::Started { total, dry_run, .. } => {
                let pb = ProgressBar::new(total as u64);
                pb.set_style(Self::bar_style());
                pb.set_prefix(if dry_run { "Dry run" } else { "Granting" });
                pb.enable_steady_tick(Duration::from_millis(100));
                *bar = Some(pb);
            }

            BatchProgress::RecordSucceeded {
                login,
                target,
                permission,
                ..
            } => {
                if let Some(ref pb) = *bar {
                    pb.set_message(format!("{login} → {target} ({permission})"));
                    pb.inc(1);
                }
            }

            BatchProgress::RecordFailed {
                line,
                row,
                short_error,
                ..
            } => {
                if let Some(ref pb) = *bar {
                    pb.println(format!(
                        "{} line {line}: {short_error}\n    {}",
                        style("✗").red(),
                        style(row).dim()
                    ));
                    pb.inc(1);
                }
            }

            BatchProgress::RecordSkipped {
                line,
                identity,
                target,
                reason,
                permission,
            } => {
                if let Some(ref pb) = *bar {
                    match reason {
                        SkipReason::DryRun => pb.set_message(format!(
                            "{identity} → {target} ({})",
                            permission.as_deref().unwrap_or_default()
                        )),
                        other => pb.println(format!(
                            "{} line {line}: skipped {identity} → {target}: {other}",
                            style("⊘").yellow()
                        )),
                    }
                    pb.inc(1);
                }
            }

            BatchProgress::Backoff {
                request,
                wait,
                cause,
            } => {
                if let Some(ref pb) = *bar {
                    pb.set_message(backoff_message(&request, wait, &cause));
                }
            }

            BatchProgress::Completed { .. } => {
                if let Some(ref pb) = *bar {
                    pb.finish_and_clear();
                }
            }

            _ => {}
        }
    }

    /// Finish the bar if the batch did not.
    pub fn finish(&self) {
        let bar = self.bar.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(ref pb) = *bar
            && !pb.is_finished()
        {
            pb.finish_and_clear();
        }
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{prefix:.bold.cyan} [{bar:40.cyan/blue}] {pos:>3}/{len:3} {msg}")
            .map(|s| s.progress_chars("█▓░"))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
    }
}

fn backoff_message(request: &str, wait: Duration, cause: &BackoffCause) -> String {
    match cause {
        BackoffCause::RateLimited { reset_at } => format!(
            "⏳ rate limited on {request}, waiting {}s (until {})",
            wait.as_secs(),
            reset_at.format("%H:%M:%S UTC")
        ),
        BackoffCause::Retry {
            attempt,
            max_attempts,
            error,
        } => format!(
            "⏳ {request} failed ({error}), attempt {}/{max_attempts} in {:.1}s",
            attempt + 1,
            wait.as_secs_f64()
        ),
    }
}

impl Default for InteractiveReporter {
    fn default() -> Self {
        Self::new()
    }
}
