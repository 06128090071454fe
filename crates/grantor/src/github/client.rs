//! Resilient GitHub REST client.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use url::Url;

use super::error::{GitHubError, is_transient, short_error_message};
use super::rate_limit::{
    ApiRateLimiter, CooldownGate, RateLimitWait, is_rate_limited, rate_limit_wait,
};
use super::types::{
    CollaboratorRequest, ErrorBody, GitHubUser, GrantStatus, OrgInvitationRequest,
    SearchUsersResponse, UserId,
};
use crate::http::reqwest_transport::ReqwestTransport;
use crate::http::{HttpHeaders, HttpMethod, HttpRequest, HttpResponse, HttpTransport};
use crate::retry::{RetryConfig, with_retry};
use crate::role::OrgRole;

/// Public GitHub API root.
pub const GITHUB_API_URL: &str = "https://api.github.com";

/// REST API version pinned on every request.
pub const GITHUB_API_VERSION: &str = "2022-11-28";

const ACCEPT: &str = "application/vnd.github+json";
const USER_AGENT: &str = concat!("grantor/", env!("CARGO_PKG_VERSION"));

/// Tunables for [`GitHubClient`].
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    /// Attempts and backoff for transient failures.
    pub retry: RetryConfig,
    /// Maximum consecutive rate-limit waits for a single attempt.
    /// `None` waits for as long as GitHub keeps saying so.
    pub max_rate_limit_waits: Option<u32>,
    /// Proactive pacing; `None` disables it.
    pub requests_per_second: Option<u32>,
}

/// A pause the client is about to take before sending a request again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    /// Method and path, e.g. `POST /orgs/acme/invitations`.
    pub request: String,
    pub wait: StdDuration,
    pub cause: BackoffCause,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackoffCause {
    /// GitHub asked us to slow down; no attempt is used up.
    RateLimited { reset_at: DateTime<Utc> },
    /// A transient failure; `attempt` attempts have been made so far.
    Retry {
        attempt: u32,
        max_attempts: usize,
        error: String,
    },
}

/// Receives every [`Backoff`] as it starts.
pub type BackoffObserver = Arc<dyn Fn(Backoff) + Send + Sync>;

/// Result of the attempt that finally succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOutcome {
    pub status: u16,
    pub body: Vec<u8>,
    /// Zero-based attempt that produced this response.
    pub attempt: u32,
}

impl RequestOutcome {
    /// Deserialize the response body.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, GitHubError> {
        serde_json::from_slice(&self.body).map_err(GitHubError::Json)
    }
}

/// GitHub API client with bearer auth, rate-limit waits, and retries.
///
/// Clones share the transport, the rate-limit cooldown, and the request
/// pacer, so a batch fanned out over several workers still backs off as one.
#[derive(Clone)]
pub struct GitHubClient {
    transport: Arc<dyn HttpTransport>,
    api_url: Url,
    token: String,
    options: ClientOptions,
    cooldown: CooldownGate,
    rate_limiter: Option<ApiRateLimiter>,
    observer: Option<BackoffObserver>,
}

impl GitHubClient {
    /// Create a client backed by reqwest.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use grantor::github::{ClientOptions, GitHubClient, GITHUB_API_URL};
    ///
    /// let client = GitHubClient::new(GITHUB_API_URL, &token, ClientOptions::default())?;
    /// let user = client.get_user("octocat").await?;
    /// ```
    pub fn new(api_url: &str, token: &str, options: ClientOptions) -> Result<Self, GitHubError> {
        let transport = ReqwestTransport::with_connect_timeout(StdDuration::from_secs(30))
            .map_err(|e| GitHubError::Config(e.to_string()))?;

        Self::new_with_transport(api_url, token, options, Arc::new(transport))
    }

    pub fn new_with_transport(
        api_url: &str,
        token: &str,
        options: ClientOptions,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, GitHubError> {
        let api_url = Url::parse(api_url.trim())
            .map_err(|e| GitHubError::Config(format!("invalid API URL '{api_url}': {e}")))?;
        if api_url.cannot_be_a_base() {
            return Err(GitHubError::Config(format!(
                "invalid API URL '{api_url}': not a base URL"
            )));
        }

        let rate_limiter = options.requests_per_second.map(ApiRateLimiter::new);

        Ok(Self {
            transport,
            api_url,
            token: token.to_string(),
            options,
            cooldown: CooldownGate::new(),
            rate_limiter,
            observer: None,
        })
    }

    /// Report rate-limit waits and retries to `observer`.
    ///
    /// The returned client still shares the cooldown and pacer with `self`.
    #[must_use]
    pub fn with_backoff_observer(mut self, observer: BackoffObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    fn notify(&self, request: &str, wait: StdDuration, cause: BackoffCause) {
        if let Some(ref observer) = self.observer {
            observer(Backoff {
                request: request.to_string(),
                wait,
                cause,
            });
        }
    }

    /// The API root this client talks to.
    pub fn api_url(&self) -> &str {
        self.api_url.as_str()
    }

    /// The cooldown shared by all clones of this client.
    pub fn cooldown(&self) -> &CooldownGate {
        &self.cooldown
    }

    /// Build an endpoint URL from raw path segments.
    ///
    /// Segments are percent-encoded, so user-supplied names cannot escape
    /// their position in the path.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, GitHubError> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| GitHubError::Config(format!("invalid API URL '{}'", self.api_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn headers(&self, with_body: bool) -> HttpHeaders {
        let mut headers = vec![
            ("Accept".to_string(), ACCEPT.to_string()),
            (
                "X-GitHub-Api-Version".to_string(),
                GITHUB_API_VERSION.to_string(),
            ),
            ("User-Agent".to_string(), USER_AGENT.to_string()),
            ("Authorization".to_string(), format!("Bearer {}", self.token)),
        ];
        if with_body {
            headers.push(("Content-Type".to_string(), "application/json".to_string()));
        }
        headers
    }

    /// Perform an authenticated request.
    ///
    /// Rate-limited responses are waited out and re-sent without consuming
    /// an attempt. Transport failures and 5xx responses are retried with
    /// exponential backoff; any other non-2xx status fails immediately.
    pub async fn request(
        &self,
        method: HttpMethod,
        url: Url,
        body: Option<serde_json::Value>,
    ) -> Result<RequestOutcome, GitHubError> {
        let body = match body {
            Some(value) => serde_json::to_vec(&value)?,
            None => Vec::new(),
        };
        let request = HttpRequest {
            method,
            url: url.to_string(),
            headers: self.headers(!body.is_empty()),
            body,
        };
        let label = format!("{} {}", method, url.path());

        let request = &request;
        let label = label.as_str();
        let max_attempts = self.options.retry.max_attempts.max(1);
        with_retry(
            &self.options.retry,
            move |attempt| self.send_once(request, label, attempt),
            is_transient,
            |err, wait, attempt| {
                self.notify(
                    label,
                    wait,
                    BackoffCause::Retry {
                        attempt,
                        max_attempts,
                        error: short_error_message(err),
                    },
                );
            },
            label,
        )
        .await
    }

    /// One attempt: send, waiting out rate limits, and classify the answer.
    async fn send_once(
        &self,
        request: &HttpRequest,
        label: &str,
        attempt: u32,
    ) -> Result<RequestOutcome, GitHubError> {
        let mut rate_limit_waits = 0u32;

        loop {
            self.cooldown.wait().await;
            if let Some(ref limiter) = self.rate_limiter {
                limiter.wait().await;
            }

            tracing::debug!(
                method = %request.method,
                url = %request.url,
                attempt,
                "Sending request"
            );
            let response = self.transport.send(request.clone()).await?;

            if is_rate_limited(&response) {
                let RateLimitWait { wait, reset_at } = rate_limit_wait(&response, Utc::now());
                rate_limit_waits += 1;

                if let Some(max) = self.options.max_rate_limit_waits
                    && rate_limit_waits > max
                {
                    return Err(GitHubError::RateLimited { reset_at });
                }

                tracing::debug!(
                    method = %request.method,
                    url = %request.url,
                    wait_secs = wait.as_secs_f64(),
                    reset_at = %reset_at,
                    "Rate limit hit, sleeping until reset"
                );
                self.notify(label, wait, BackoffCause::RateLimited { reset_at });
                self.cooldown.hold_for(wait);
                continue;
            }

            if response.is_success() {
                return Ok(RequestOutcome {
                    status: response.status,
                    body: response.body,
                    attempt,
                });
            }

            return Err(api_error(&response));
        }
    }

    /// `GET /users/{username}`.
    pub async fn get_user(&self, username: &str) -> Result<GitHubUser, GitHubError> {
        let url = self.endpoint(&["users", username])?;
        match self.request(HttpMethod::Get, url, None).await {
            Ok(outcome) => outcome.json(),
            Err(GitHubError::Api { status: 404, .. }) => {
                Err(GitHubError::NotFound(username.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    /// `GET /search/users?q={query}`; results in GitHub's ranking order.
    pub async fn search_users(&self, query: &str) -> Result<Vec<GitHubUser>, GitHubError> {
        let mut url = self.endpoint(&["search", "users"])?;
        url.query_pairs_mut().append_pair("q", query);

        let outcome = self.request(HttpMethod::Get, url, None).await?;
        let response: SearchUsersResponse = outcome.json()?;
        Ok(response.items)
    }

    /// `POST /orgs/{org}/invitations`.
    pub async fn invite_to_org(
        &self,
        org: &str,
        invitee: UserId,
        role: OrgRole,
    ) -> Result<GrantStatus, GitHubError> {
        let url = self.endpoint(&["orgs", org, "invitations"])?;
        let body = serde_json::to_value(OrgInvitationRequest {
            invitee_id: invitee,
            role: role.as_str(),
        })?;

        let outcome = self.request(HttpMethod::Post, url, Some(body)).await?;
        Ok(GrantStatus::from_status(outcome.status))
    }

    /// `PUT /repos/{owner}/{repo}/collaborators/{username}`.
    pub async fn add_collaborator(
        &self,
        owner: &str,
        repo: &str,
        username: &str,
        permission: &str,
    ) -> Result<GrantStatus, GitHubError> {
        let url = self.endpoint(&["repos", owner, repo, "collaborators", username])?;
        let body = serde_json::to_value(CollaboratorRequest { permission })?;

        let outcome = self.request(HttpMethod::Put, url, Some(body)).await?;
        Ok(GrantStatus::from_status(outcome.status))
    }
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("api_url", &self.api_url.as_str())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

fn api_error(response: &HttpResponse) -> GitHubError {
    let message = serde_json::from_slice::<ErrorBody>(&response.body)
        .map(|b| b.message)
        .unwrap_or_else(|_| response.text());
    GitHubError::Api {
        status: response.status,
        message,
    }
}
