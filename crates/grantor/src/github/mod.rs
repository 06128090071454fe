//! GitHub API access for grantor.
//!
//! # Module Structure
//!
//! - [`error`] - Error types and retry classification
//! - [`types`] - Wire types for the endpoints used
//! - [`client`] - The resilient client: auth, rate-limit waits, retries
//! - [`rate_limit`] - Rate-limit detection, shared cooldown, request pacing
//! - [`identity`] - Username/email resolution
//!
//! # Example
//!
//! ```ignore
//! use grantor::github::{ClientOptions, GitHubClient, IdentityResolver, GITHUB_API_URL};
//! use grantor::role::OrgRole;
//!
//! let client = GitHubClient::new(GITHUB_API_URL, &token, ClientOptions::default())?;
//! let user = IdentityResolver::new(client.clone()).resolve("mona@example.com").await?;
//! client.invite_to_org("acme", user.id, OrgRole::DirectMember).await?;
//! ```

mod client;
mod error;
mod identity;
mod rate_limit;
mod types;

pub use error::{GitHubError, is_transient, short_error_message};

pub use types::{GitHubUser, GrantStatus, SearchUsersResponse, UserId};

pub use client::{
    Backoff, BackoffCause, BackoffObserver, ClientOptions, GITHUB_API_URL, GITHUB_API_VERSION,
    GitHubClient, RequestOutcome,
};

pub use rate_limit::{
    ApiRateLimiter, CooldownGate, MAX_RATE_LIMIT_WAIT, RateLimitWait, is_rate_limited,
    rate_limit_wait,
};

pub use identity::{IdentityResolver, Resolution, ResolvedUser};
