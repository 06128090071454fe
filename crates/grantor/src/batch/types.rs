//! Batch types: routing, record states, outcomes, and the run summary.

use crate::github::{GrantStatus, UserId};
use crate::record::{Target, TargetOverride};

/// Default number of records processed at once.
pub const DEFAULT_CONCURRENCY: usize = 1;

/// Which grant endpoint a record goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    /// `POST /orgs/{org}/invitations`.
    OrgInvite,
    /// `PUT /repos/{owner}/{repo}/collaborators/{username}`.
    RepoCollaborator,
}

impl std::fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EndpointKind::OrgInvite => f.write_str("org invite"),
            EndpointKind::RepoCollaborator => f.write_str("repo collaborator"),
        }
    }
}

/// Route a target: anything containing `/` is a repository.
#[must_use]
pub fn endpoint_kind(target: &str) -> EndpointKind {
    if target.contains('/') {
        EndpointKind::RepoCollaborator
    } else {
        EndpointKind::OrgInvite
    }
}

/// A record after validation and identity resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedGrant {
    pub target_user_id: UserId,
    pub login: String,
    /// Permission in GitHub's vocabulary.
    pub permission: String,
    pub endpoint_kind: EndpointKind,
    pub target: Target,
}

/// Lifecycle of a single record.
///
/// `Pending → Validated → Resolved → Submitted → {Succeeded | Failed}`. A
/// record can fail from any state before `Succeeded`; there are no
/// whole-record retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    Pending,
    Validated,
    Resolved,
    Submitted,
    Succeeded,
    Failed,
}

impl RecordState {
    /// The step a record in this state was working on when it failed.
    #[must_use]
    pub fn stage(self) -> &'static str {
        match self {
            RecordState::Pending => "validation",
            RecordState::Validated => "identity resolution",
            RecordState::Resolved | RecordState::Submitted => "grant",
            RecordState::Succeeded => "done",
            RecordState::Failed => "failed",
        }
    }
}

/// Why a record was not attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Resolved and mapped, but no grant call was made.
    DryRun,
    /// Same identity and target as an earlier row.
    Duplicate { first_line: u64 },
    /// Shutdown was requested before the record started.
    Shutdown,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::DryRun => f.write_str("dry run"),
            SkipReason::Duplicate { first_line } => {
                write!(f, "duplicate of line {first_line}")
            }
            SkipReason::Shutdown => f.write_str("shutdown requested"),
        }
    }
}

/// Final result for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Succeeded {
        status: GrantStatus,
    },
    Failed {
        /// Error kind, see [`crate::error::RecordError::kind`].
        kind: &'static str,
        message: String,
        /// State the record had reached.
        stage: RecordState,
    },
    Skipped {
        reason: SkipReason,
    },
}

/// What happened to one input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordReport {
    pub line: u64,
    pub identity: String,
    pub target: String,
    pub outcome: RecordOutcome,
}

/// Totals for a batch, plus one report per record in input order.
#[derive(Debug, Clone, Default)]
pub struct Summary {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub reports: Vec<RecordReport>,
}

impl Summary {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.skipped
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    pub(crate) fn push(&mut self, report: RecordReport) {
        match report.outcome {
            RecordOutcome::Succeeded { .. } => self.succeeded += 1,
            RecordOutcome::Failed { .. } => self.failed += 1,
            RecordOutcome::Skipped { .. } => self.skipped += 1,
        }
        self.reports.push(report);
    }
}

/// Options for a batch run.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Resolve and map without issuing grant calls.
    pub dry_run: bool,
    /// Maximum records in flight. `1` processes strictly in order.
    pub concurrency: usize,
    /// Target for rows that carry none.
    pub target_override: Option<TargetOverride>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            concurrency: DEFAULT_CONCURRENCY,
            target_override: None,
        }
    }
}
