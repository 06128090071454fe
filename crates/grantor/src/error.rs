//! Batch-level error types.
//!
//! Fatal errors ([`BatchError`], [`SchemaError`]) stop a run before any
//! record is processed. [`RecordError`] belongs to a single record: the batch
//! processor catches it at the record boundary, reports it, and moves on.

use std::path::PathBuf;

use thiserror::Error;

use crate::github::{GitHubError, short_error_message};

/// The input header matches none of the supported shapes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("input file is empty or has no header row")]
    MissingHeader,

    #[error("unrecognized header [{}]; expected one of: {expected}", found.join(", "))]
    UnrecognizedHeader { found: Vec<String>, expected: String },

    #[error(
        "header [{}] has no target column; configure an organization or repository override",
        columns.join(", ")
    )]
    MissingTarget { columns: Vec<String> },
}

/// Failures that abort a whole batch.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("failed to open {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read input: {0}")]
    Csv(#[from] csv::Error),
}

/// Failure of a single record.
#[derive(Debug, Error)]
pub enum RecordError {
    /// The record is malformed: missing fields, bad target, unknown role.
    #[error("invalid record: {0}")]
    Validation(String),

    /// The identity could not be matched to a GitHub account.
    #[error("user not found: {0}")]
    NotFound(String),

    /// A GitHub call failed after retries.
    #[error("GitHub request failed: {0}")]
    Api(GitHubError),
}

impl RecordError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Stable, machine-friendly name of the error kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            RecordError::Validation(_) => "validation",
            RecordError::NotFound(_) => "not_found",
            RecordError::Api(_) => "api",
        }
    }

    /// One-line message for compact displays.
    #[must_use]
    pub fn short_message(&self) -> String {
        match self {
            RecordError::Validation(message) => message.clone(),
            RecordError::NotFound(who) => format!("User not found: {who}"),
            RecordError::Api(err) => short_error_message(err),
        }
    }
}

impl From<GitHubError> for RecordError {
    fn from(err: GitHubError) -> Self {
        match err {
            GitHubError::NotFound(who) => RecordError::NotFound(who),
            other => RecordError::Api(other),
        }
    }
}
