//! Progress events for batch runs.
//!
//! The library never renders anything itself. A front end passes a
//! [`ProgressCallback`] and decides how each event is shown.

use std::time::Duration;

use crate::github::{BackoffCause, GrantStatus};
use crate::record::InputShape;

use super::types::{EndpointKind, RecordState, SkipReason};

/// Events emitted while a batch runs.
///
/// Record events arrive in input order. [`BatchProgress::Backoff`] arrives
/// as soon as the pause starts, whichever record it belongs to.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum BatchProgress {
    /// Header validated; processing is about to start.
    Started {
        total: usize,
        shape: InputShape,
        concurrency: usize,
        dry_run: bool,
    },

    /// A grant call succeeded.
    RecordSucceeded {
        line: u64,
        identity: String,
        login: String,
        target: String,
        endpoint: EndpointKind,
        permission: String,
        status: GrantStatus,
    },

    /// A record failed; processing continues with the next one.
    RecordFailed {
        line: u64,
        /// The offending row as it appeared in the input.
        row: String,
        stage: RecordState,
        error: String,
        /// Compact form of `error`.
        short_error: String,
    },

    /// A record was not attempted.
    RecordSkipped {
        line: u64,
        identity: String,
        target: String,
        reason: SkipReason,
        /// Mapped permission, when the record got that far.
        permission: Option<String>,
    },

    /// A request is paused for a rate limit or before a retry.
    Backoff {
        /// Method and path of the paused request.
        request: String,
        wait: Duration,
        cause: BackoffCause,
    },

    /// All records accounted for.
    Completed {
        succeeded: usize,
        failed: usize,
        skipped: usize,
    },
}

/// Callback receiving [`BatchProgress`] events.
pub type ProgressCallback = Box<dyn Fn(BatchProgress) + Send + Sync>;

/// Emit a progress event if a callback is provided.
#[inline]
pub fn emit(on_progress: Option<&ProgressCallback>, event: BatchProgress) {
    if let Some(cb) = on_progress {
        cb(event);
    }
}
