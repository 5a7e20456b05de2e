//! HTTP plumbing shared by the remote backends.
//!
//! Every remote call goes through [`send_with_retry`]: a client with a bounded
//! timeout, and at most [`RetryPolicy::retries`] extra attempts when the failure
//! is transient (connection errors, timeouts, 5xx, 429). Authentication failures
//! and other 4xx answers are returned immediately.

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Upper bound on how long a single backoff may sleep, whatever the server asks.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

const BODY_EXCERPT_CHARS: usize = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one
    pub retries: u32,
    /// Delay before a retry when the server gives no hint
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 1,
            backoff: Duration::from_millis(500),
        }
    }
}

/// Why a remote request did not produce a successful response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpFailure {
    /// HTTP 429
    RateLimited { retry_after: Option<Duration> },
    /// Connection failure, timeout or 5xx
    Unavailable { message: String },
    /// HTTP 401/403
    Unauthorized { status: u16 },
    /// Any other non-success status
    Rejected { status: u16, body: String },
}

impl HttpFailure {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            HttpFailure::RateLimited { .. } | HttpFailure::Unavailable { .. }
        )
    }

    fn retry_delay(&self, policy: &RetryPolicy) -> Duration {
        match self {
            HttpFailure::RateLimited {
                retry_after: Some(delay),
            } => (*delay).max(policy.backoff).min(MAX_RETRY_DELAY),
            _ => policy.backoff.min(MAX_RETRY_DELAY),
        }
    }
}

impl std::fmt::Display for HttpFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpFailure::RateLimited { .. } => write!(f, "rate limited"),
            HttpFailure::Unavailable { message } => write!(f, "{message}"),
            HttpFailure::Unauthorized { status } => {
                write!(f, "credentials rejected (HTTP {status})")
            }
            HttpFailure::Rejected { status, body } => write!(f, "HTTP {status}: {body}"),
        }
    }
}

/// Build a client whose requests give up after `timeout`.
pub fn build_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .build()
}

/// Send the request built by `request`, retrying transient failures per `policy`.
///
/// `request` is called once per attempt since a [`RequestBuilder`] is consumed on
/// send. Dropping the returned future abandons any remaining attempts.
pub async fn send_with_retry<F>(
    policy: RetryPolicy,
    target: &str,
    request: F,
) -> Result<Response, HttpFailure>
where
    F: Fn() -> RequestBuilder,
{
    let mut attempt = 0;
    loop {
        let outcome = match request().send().await {
            Ok(response) => check_status(response).await,
            Err(e) => Err(transport_failure(target, &e)),
        };

        match outcome {
            Ok(response) => return Ok(response),
            Err(failure) if failure.is_transient() && attempt < policy.retries => {
                let delay = failure.retry_delay(&policy);
                attempt += 1;
                tracing::warn!(
                    "Request to {} failed ({}), retrying in {}ms (attempt {}/{})",
                    target,
                    failure,
                    delay.as_millis(),
                    attempt,
                    policy.retries
                );
                tokio::time::sleep(delay).await;
            }
            Err(failure) => return Err(failure),
        }
    }
}

/// Read the body as JSON, describing what went wrong on failure.
pub async fn decode_json<T: DeserializeOwned>(response: Response) -> Result<T, String> {
    let body = response
        .text()
        .await
        .map_err(|e| format!("failed to read response body: {e}"))?;
    serde_json::from_str(&body).map_err(|e| format!("{e}; body: {}", excerpt(&body)))
}

/// Map an error status to a failure class.
pub fn classify_status(status: u16, retry_after: Option<Duration>, body: &str) -> HttpFailure {
    match status {
        429 => HttpFailure::RateLimited { retry_after },
        401 | 403 => HttpFailure::Unauthorized { status },
        500..=599 => HttpFailure::Unavailable {
            message: format!("HTTP {status}: {}", excerpt(body)),
        },
        _ => HttpFailure::Rejected {
            status,
            body: excerpt(body),
        },
    }
}

async fn check_status(response: Response) -> Result<Response, HttpFailure> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let retry_after = parse_retry_after(response.headers());
    let body = response.text().await.unwrap_or_default();
    Err(classify_status(status.as_u16(), retry_after, &body))
}

fn transport_failure(target: &str, e: &reqwest::Error) -> HttpFailure {
    let message = if e.is_timeout() {
        format!("request to {target} timed out")
    } else if e.is_connect() {
        format!("cannot connect to {target}")
    } else {
        format!("request to {target} failed: {e}")
    };
    HttpFailure::Unavailable { message }
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn excerpt(body: &str) -> String {
    let mut chars = body.chars();
    let head: String = chars.by_ref().take(BODY_EXCERPT_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}…")
    } else {
        head
    }
}
