//! Resolution of usernames and email addresses to GitHub accounts.

use super::client::GitHubClient;
use super::error::GitHubError;
use super::types::{GitHubUser, UserId};

/// How an identifier was matched to an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Looked up directly as a username.
    Username,
    /// Found through user search by email.
    EmailSearch,
    /// Email search came back empty; the local part matched a username.
    EmailLocalPart,
}

/// An account matched to an identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedUser {
    pub id: UserId,
    pub login: String,
    pub via: Resolution,
}

impl ResolvedUser {
    fn new(user: GitHubUser, via: Resolution) -> Self {
        Self {
            id: user.id,
            login: user.login,
            via,
        }
    }
}

/// Maps a username or email to a GitHub account.
///
/// Emails go through user search first. When search finds nobody, the part
/// before `@` is tried once as a username; there is no further fallback.
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    client: GitHubClient,
}

impl IdentityResolver {
    pub fn new(client: GitHubClient) -> Self {
        Self { client }
    }

    /// Resolve to the numeric account ID.
    pub async fn resolve_id(&self, identifier: &str) -> Result<UserId, GitHubError> {
        self.resolve(identifier).await.map(|user| user.id)
    }

    /// Resolve to the account (ID and login).
    ///
    /// Fails with [`GitHubError::NotFound`] when no account matches. When
    /// search returns several accounts, the first one wins.
    pub async fn resolve(&self, identifier: &str) -> Result<ResolvedUser, GitHubError> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(GitHubError::NotFound(String::new()));
        }

        let Some((local_part, _domain)) = identifier.split_once('@') else {
            let user = self.client.get_user(identifier).await?;
            return Ok(ResolvedUser::new(user, Resolution::Username));
        };

        let found = self.client.search_users(identifier).await?;
        if let Some(user) = found.into_iter().next() {
            return Ok(ResolvedUser::new(user, Resolution::EmailSearch));
        }

        if local_part.is_empty() {
            return Err(GitHubError::NotFound(identifier.to_string()));
        }

        tracing::warn!(
            email = %identifier,
            username = %local_part,
            "No user found for email, trying local part as username"
        );

        match self.client.get_user(local_part).await {
            Ok(user) => Ok(ResolvedUser::new(user, Resolution::EmailLocalPart)),
            Err(GitHubError::NotFound(_)) => Err(GitHubError::NotFound(format!(
                "{identifier} (also tried username '{local_part}')"
            ))),
            Err(e) => Err(e),
        }
    }
}
