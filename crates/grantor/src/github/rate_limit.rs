//! Rate-limit detection, the shared cooldown gate, and optional request pacing.

use std::num::NonZeroU32;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use tokio::time::Instant;

use crate::http::HttpResponse;

type GovernorRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Padding added on top of the advertised wait.
const RESET_PADDING: Duration = Duration::from_secs(1);

/// Longest single pause honored; larger server values are clamped.
pub const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(24 * 60 * 60);

/// Whether a response means "slow down" rather than "denied".
///
/// GitHub signals its primary rate limit with a 403 whose message mentions
/// the rate limit, and secondary limits with 429 or a 403 carrying
/// `Retry-After`. A plain 403 (missing scope, SSO enforcement) is not a rate
/// limit and must surface as an error.
#[must_use]
pub fn is_rate_limited(resp: &HttpResponse) -> bool {
    match resp.status {
        429 => true,
        403 => {
            resp.header("retry-after").is_some()
                || resp.text().to_ascii_lowercase().contains("rate limit")
        }
        _ => false,
    }
}

/// How long to pause after a rate-limited response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitWait {
    pub wait: Duration,
    pub reset_at: DateTime<Utc>,
}

/// Compute the pause for a rate-limited response observed at `now`.
///
/// `Retry-After` (seconds) wins when present. Otherwise the wait runs until
/// the `X-RateLimit-Reset` epoch; a reset already in the past or a missing
/// header counts as zero. Either way one second of padding is added and the
/// result is capped at [`MAX_RATE_LIMIT_WAIT`].
#[must_use]
pub fn rate_limit_wait(resp: &HttpResponse, now: DateTime<Utc>) -> RateLimitWait {
    let base = match resp
        .header("retry-after")
        .and_then(|v| v.trim().parse::<u64>().ok())
    {
        Some(secs) => Duration::from_secs(secs),
        None => {
            let reset_epoch = resp
                .header("x-ratelimit-reset")
                .and_then(|v| v.trim().parse::<i64>().ok())
                .unwrap_or(0);
            let until_reset_ms = reset_epoch
                .saturating_mul(1000)
                .saturating_sub(now.timestamp_millis())
                .max(0) as u64;
            Duration::from_millis(until_reset_ms)
        }
    };

    let wait = base.saturating_add(RESET_PADDING).min(MAX_RATE_LIMIT_WAIT);
    let reset_at = chrono::Duration::from_std(wait)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(now);

    RateLimitWait { wait, reset_at }
}

/// A cooldown shared by every clone of a client.
///
/// When one request hits the rate limit it extends the cooldown; every other
/// request (including those running on other workers) waits for it to pass
/// before going out.
#[derive(Debug, Clone, Default)]
pub struct CooldownGate {
    until: Arc<Mutex<Option<Instant>>>,
}

impl CooldownGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block all requests for at least `wait` from now.
    ///
    /// A longer cooldown already in place is kept.
    pub fn hold_for(&self, wait: Duration) {
        let target = Instant::now() + wait;
        let mut until = self.until.lock().unwrap_or_else(|e| e.into_inner());
        if until.is_none_or(|current| current < target) {
            *until = Some(target);
        }
    }

    /// Time left on the cooldown, if one is active.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        let until = *self.until.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        until.filter(|t| *t > now).map(|t| t - now)
    }

    /// Wait until no cooldown is active.
    pub async fn wait(&self) {
        loop {
            let until = *self.until.lock().unwrap_or_else(|e| e.into_inner());
            match until {
                Some(t) if t > Instant::now() => tokio::time::sleep_until(t).await,
                _ => return,
            }
        }
    }
}

/// Proactive request pacing using the governor crate.
///
/// Independent of the reactive cooldown: pacing keeps a large batch under
/// GitHub's secondary limits so the cooldown is rarely needed.
#[derive(Clone)]
pub struct ApiRateLimiter {
    inner: Arc<GovernorRateLimiter>,
}

impl ApiRateLimiter {
    /// Create a limiter allowing `requests_per_second` (minimum 1).
    pub fn new(requests_per_second: u32) -> Self {
        let rps = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            inner: Arc::new(RateLimiter::direct(Quota::per_second(rps))),
        }
    }

    /// Wait until a request is allowed by the rate limiter.
    pub async fn wait(&self) {
        self.inner.until_ready().await;
    }
}

impl std::fmt::Debug for ApiRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiRateLimiter").finish_non_exhaustive()
    }
}
