//! GitHub API error types.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::http::HttpError;

/// Errors that can occur when interacting with the GitHub API.
#[derive(Debug, Error)]
pub enum GitHubError {
    /// The request never produced an HTTP response.
    #[error("Transport error: {0}")]
    Transport(String),

    /// GitHub answered with a non-success status.
    #[error("GitHub API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Rate limited more often than the client is allowed to wait.
    #[error("Rate limit exceeded. Resets at {reset_at}")]
    RateLimited { reset_at: DateTime<Utc> },

    /// The requested user does not exist.
    #[error("User not found: {0}")]
    NotFound(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<HttpError> for GitHubError {
    fn from(err: HttpError) -> Self {
        GitHubError::Transport(err.to_string())
    }
}

impl GitHubError {
    /// HTTP status of the failed call, if GitHub answered at all.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            GitHubError::Api { status, .. } => Some(*status),
            GitHubError::NotFound(_) => Some(404),
            _ => None,
        }
    }
}

/// Whether an error is worth another attempt with backoff.
///
/// Network failures and 5xx responses are transient. Client errors are not:
/// sending the same request again yields the same answer.
pub fn is_transient(e: &GitHubError) -> bool {
    match e {
        GitHubError::Transport(_) => true,
        GitHubError::Api { status, .. } => *status >= 500,
        _ => false,
    }
}

/// Get a short error message suitable for display.
pub fn short_error_message(err: &GitHubError) -> String {
    match err {
        GitHubError::Transport(_) => "Network error".to_string(),
        GitHubError::Api { status, message } => {
            if message.chars().count() > 50 {
                let truncated: String = message.chars().take(47).collect();
                format!("HTTP {}: {}...", status, truncated)
            } else {
                format!("HTTP {}: {}", status, message)
            }
        }
        GitHubError::RateLimited { .. } => "Rate limited".to_string(),
        GitHubError::NotFound(user) => format!("User not found: {}", user),
        GitHubError::Json(_) => "JSON parse error".to_string(),
        GitHubError::Config(msg) => format!("Config: {}", msg),
    }
}
