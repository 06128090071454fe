use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use console::{Term, style};

/// Exit status for a second Ctrl+C (128 + SIGINT).
const FORCE_QUIT_STATUS: i32 = 130;

/// Stop request shared between the Ctrl+C listener and the batch.
///
/// Once set, the processor stops starting new rows; rows already submitted
/// finish and the rest are reported as skipped.
#[derive(Debug, Clone, Default)]
pub(crate) struct StopRequest {
    flag: Arc<AtomicBool>,
}

impl StopRequest {
    /// Listen for Ctrl+C in the background.
    ///
    /// The first press sets the request. A second press exits at once with
    /// status 130, leaving any in-flight grants to GitHub.
    pub(crate) fn listen() -> Self {
        let stop = Self::default();
        let listener = stop.clone();

        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "Ctrl+C listener unavailable; stop with SIGTERM");
                return;
            }

            let interactive = Term::stderr().is_term();
            if interactive {
                eprintln!(
                    "\n{} Stopping after the rows in flight; remaining rows will be skipped. \
                     Press Ctrl+C again to quit now.",
                    style("⚠").yellow()
                );
            } else {
                tracing::warn!("Stop requested; remaining rows will be skipped");
            }
            listener.request();

            if tokio::signal::ctrl_c().await.is_ok() {
                if interactive {
                    eprintln!("{} Quitting without waiting", style("✗").red());
                }
                std::process::exit(FORCE_QUIT_STATUS);
            }
        });

        stop
    }

    pub(crate) fn request(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub(crate) fn is_requested(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// The flag handed to `BatchProcessor::with_cancel_flag`.
    pub(crate) fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processor_flag_follows_the_request() {
        let stop = StopRequest::default();
        let flag = stop.flag();
        assert!(!flag.load(Ordering::SeqCst));

        stop.clone().request();

        assert!(stop.is_requested());
        assert!(flag.load(Ordering::SeqCst));
    }
}
