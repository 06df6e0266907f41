//! Source connector: HTTP fetch with retry and official-domain validation
//!
//! One connector serves every game; the per-game URL and official domain are
//! passed in with each fetch.
//!
//! # Examples
//!
//! ```rust,ignore
//! use lotto_ingest::connector::{RetryPolicy, SourceConnector, DEFAULT_USER_AGENT};
//!
//! let connector = SourceConnector::new(RetryPolicy::default(), DEFAULT_USER_AGENT)?;
//! let page = connector
//!     .fetch_with_retry("https://www.pais.co.il/lotto/archive.aspx", "pais.co.il")
//!     .await?;
//! ```

use reqwest::{redirect, Client, StatusCode};
use std::time::Duration;
use tracing::{error, info, warn};
use url::Url;

use crate::error::FetchError;

// ============================================================================
// Connector Constants
// ============================================================================

/// Default number of attempts per fetch
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default per-request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default delay before the first retry, in milliseconds.
/// Each later retry doubles it.
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 1_000;

/// Ceiling for a single backoff delay, in seconds
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 60;

/// Maximum redirects followed before the request fails
pub const MAX_REDIRECTS: usize = 10;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Lottery Data Platform/1.0; +https://github.com/ubriga/lottery-platform-backend)";

/// Retry and timeout settings for one fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_retries: u32,

    /// Timeout for each attempt
    pub timeout: Duration,

    /// Delay after the first failed attempt
    pub backoff_base: Duration,

    /// Upper bound for any single delay
    pub backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            backoff_base: Duration::from_millis(DEFAULT_BACKOFF_BASE_MS),
            backoff_max: Duration::from_secs(DEFAULT_BACKOFF_MAX_SECS),
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt `attempt` (1-based): `base * 2^(attempt - 1)`,
    /// capped at `backoff_max`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.backoff_base
            .checked_mul(factor)
            .unwrap_or(self.backoff_max)
            .min(self.backoff_max)
    }
}

/// Page content returned by a successful fetch
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL that was requested
    pub url: String,

    /// URL the response resolved to after redirects
    pub final_url: String,

    pub status: u16,

    pub body: String,

    /// Attempts used, including the successful one
    pub attempts: u32,
}

/// Whether `url` is an http(s) URL whose host is `official_domain` or one of
/// its subdomains.
pub fn is_official(url: &Url, official_domain: &str) -> bool {
    if !matches!(url.scheme(), "http" | "https") {
        return false;
    }

    let domain = official_domain
        .trim()
        .trim_start_matches('.')
        .trim_end_matches('.')
        .to_ascii_lowercase();
    if domain.is_empty() {
        return false;
    }

    match url.host_str() {
        Some(host) => {
            let host = host.trim_end_matches('.').to_ascii_lowercase();
            host == domain || host.ends_with(&format!(".{}", domain))
        },
        None => false,
    }
}

/// Outcome of one attempt that did not produce content
enum AttemptFailure {
    Retryable(String),
    Fatal(FetchError),
}

/// HTTP connector shared by all games
pub struct SourceConnector {
    client: Client,
    policy: RetryPolicy,
}

impl SourceConnector {
    /// Create a connector with its own HTTP client
    pub fn new(policy: RetryPolicy, user_agent: &str) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(user_agent)
            .redirect(redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;

        Ok(Self { client, policy })
    }

    /// Fetch `url`, retrying transient failures with exponential backoff.
    ///
    /// The request URL and the final URL after redirects must both lie inside
    /// `official_domain`; a violation fails immediately without retrying.
    /// 4xx responses other than 408/429 are not retried either. Every attempt
    /// logs exactly one event with its number and outcome.
    pub async fn fetch_with_retry(
        &self,
        url: &str,
        official_domain: &str,
    ) -> Result<FetchedPage, FetchError> {
        let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        if !is_official(&parsed, official_domain) {
            error!(url, official_domain, "refusing to fetch from a non-official source");
            return Err(FetchError::SourceIntegrity {
                url: url.to_string(),
                final_url: url.to_string(),
                official_domain: official_domain.to_string(),
            });
        }

        let max_retries = self.policy.max_retries.max(1);
        let mut last_reason = String::new();

        for attempt in 1..=max_retries {
            match self.attempt(&parsed, official_domain).await {
                Ok((final_url, status, body)) => {
                    info!(
                        url,
                        attempt,
                        max_retries,
                        status,
                        bytes = body.len(),
                        "fetched archive page"
                    );
                    return Ok(FetchedPage {
                        url: url.to_string(),
                        final_url,
                        status,
                        body,
                        attempts: attempt,
                    });
                },
                Err(AttemptFailure::Fatal(err)) => {
                    error!(url, attempt, max_retries, error = %err, "fetch failed, not retrying");
                    return Err(err);
                },
                Err(AttemptFailure::Retryable(reason)) => {
                    warn!(url, attempt, max_retries, error = %reason, "fetch attempt failed");
                    last_reason = reason;

                    if attempt < max_retries {
                        tokio::time::sleep(self.policy.backoff(attempt)).await;
                    }
                },
            }
        }

        error!(url, attempts = max_retries, "fetch retries exhausted");
        Err(FetchError::Transient {
            url: url.to_string(),
            attempts: max_retries,
            reason: last_reason,
        })
    }

    async fn attempt(
        &self,
        url: &Url,
        official_domain: &str,
    ) -> Result<(String, u16, String), AttemptFailure> {
        let response = self
            .client
            .get(url.clone())
            .timeout(self.policy.timeout)
            .send()
            .await
            .map_err(|e| AttemptFailure::Retryable(e.to_string()))?;

        // checked before the status so a spoofed page never counts as content
        let final_url = response.url().clone();
        if !is_official(&final_url, official_domain) {
            return Err(AttemptFailure::Fatal(FetchError::SourceIntegrity {
                url: url.to_string(),
                final_url: final_url.to_string(),
                official_domain: official_domain.to_string(),
            }));
        }

        let status = response.status();
        if status.is_server_error()
            || status == StatusCode::REQUEST_TIMEOUT
            || status == StatusCode::TOO_MANY_REQUESTS
        {
            return Err(AttemptFailure::Retryable(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            return Err(AttemptFailure::Fatal(FetchError::Rejected {
                url: url.to_string(),
                status: status.as_u16(),
            }));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AttemptFailure::Retryable(e.to_string()))?;

        Ok((final_url.to_string(), status.as_u16(), body))
    }
}
