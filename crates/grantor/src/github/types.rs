//! GitHub wire types for the endpoints used by grantor.

use serde::{Deserialize, Serialize};

/// Numeric GitHub account ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A GitHub account, as returned by `GET /users/{username}` and by search.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GitHubUser {
    pub id: UserId,
    pub login: String,
}

/// Response body of `GET /search/users`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchUsersResponse {
    #[serde(default)]
    pub total_count: u64,
    #[serde(default)]
    pub items: Vec<GitHubUser>,
}

/// Body of `POST /orgs/{org}/invitations`.
#[derive(Debug, Clone, Serialize)]
pub struct OrgInvitationRequest {
    pub invitee_id: UserId,
    pub role: &'static str,
}

/// Body of `PUT /repos/{owner}/{repo}/collaborators/{username}`.
#[derive(Debug, Clone, Serialize)]
pub struct CollaboratorRequest<'a> {
    pub permission: &'a str,
}

/// Error body GitHub returns alongside 4xx/5xx statuses.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorBody {
    pub message: String,
}

/// What a successful grant call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantStatus {
    /// An invitation was created (201).
    Invited,
    /// The user already had access; nothing changed (204).
    AlreadyGranted,
}

impl GrantStatus {
    pub(crate) fn from_status(status: u16) -> Self {
        if status == 204 {
            GrantStatus::AlreadyGranted
        } else {
            GrantStatus::Invited
        }
    }
}

impl std::fmt::Display for GrantStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GrantStatus::Invited => f.write_str("invited"),
            GrantStatus::AlreadyGranted => f.write_str("already granted"),
        }
    }
}
