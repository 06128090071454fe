use grantor::BatchProgress;
use grantor::batch::SkipReason;
use grantor::github::BackoffCause;

/// Logging reporter using tracing for structured output.
///
/// Successes are logged at info, skips and backoffs at warn (dry-run skips
/// at info), and failures at error together with the offending row.
pub struct LoggingReporter;

impl LoggingReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, event: BatchProgress) {
        match event {
            BatchProgress::Started {
                total,
                shape,
                concurrency,
                dry_run,
            } => {
                tracing::info!(total, shape = %shape, concurrency, dry_run, "Processing records");
            }

            BatchProgress::RecordSucceeded {
                line,
                identity,
                login,
                target,
                endpoint,
                permission,
                status,
            } => {
                tracing::info!(
                    line,
                    identity = %identity,
                    login = %login,
                    target = %target,
                    endpoint = %endpoint,
                    permission = %permission,
                    status = %status,
                    "Granted"
                );
            }

            BatchProgress::RecordFailed {
                line,
                row,
                stage,
                error,
                ..
            } => {
                tracing::error!(line, row = %row, stage = stage.stage(), error = %error, "Record failed");
            }

            BatchProgress::RecordSkipped {
                line,
                identity,
                target,
                reason,
                permission,
            } => match reason {
                SkipReason::DryRun => {
                    tracing::info!(
                        line,
                        identity = %identity,
                        target = %target,
                        permission = permission.as_deref().unwrap_or_default(),
                        "Dry run, would grant"
                    );
                }
                other => {
                    tracing::warn!(line, identity = %identity, target = %target, reason = %other, "Skipped");
                }
            },

            BatchProgress::Backoff {
                request,
                wait,
                cause,
            } => match cause {
                BackoffCause::RateLimited { reset_at } => {
                    tracing::warn!(
                        request = %request,
                        wait_secs = wait.as_secs(),
                        reset_at = %reset_at,
                        "Rate limited, waiting"
                    );
                }
                BackoffCause::Retry {
                    attempt,
                    max_attempts,
                    error,
                } => {
                    tracing::warn!(
                        request = %request,
                        attempt,
                        max_attempts,
                        retry_in = ?wait,
                        error = %error,
                        "Request failed, retrying"
                    );
                }
            },

            BatchProgress::Completed {
                succeeded,
                failed,
                skipped,
            } => {
                tracing::info!(succeeded, failed, skipped, "Batch complete");
            }

            _ => {}
        }
    }
}

impl Default for LoggingReporter {
    fn default() -> Self {
        Self::new()
    }
}
