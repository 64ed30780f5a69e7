//! HTTP implementation of [`Transport`] for GitHub-style REST APIs.
//!
//! Requests run through a [`seatbelt`] retry layer wrapped around a per-attempt timeout
//! layer. Every attempt first takes a [`RateLimiter`] permit, outside the timeout, so
//! waiting for the limiter never counts against the request.

use super::page_metadata::PageMetadata;
use super::rate_limiter::credit_limiter_wait;
use super::{ApiRequest, ApiResponse, ErrorKind, RateLimiter, SnapshotError, Transport};
use chrono::{DateTime, Utc};
use core::time::Duration;
use layered::{Execute, Service, Stack};
use ohno::IntoAppError;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, RETRY_AFTER};
use seatbelt::retry::{Backoff, Retry};
use seatbelt::timeout::Timeout;
use seatbelt::{RecoveryInfo, ResilienceContext};
use serde_json::Value;
use std::sync::Arc;
use tick::Clock;
use url::Url;

const LOG_TARGET: &str = "      http";
const USER_AGENT: &str = concat!("snapshotter/", env!("CARGO_PKG_VERSION"));
const ACCEPT_JSON: &str = "application/vnd.github+json";

/// Wait used when the upstream signals a rate limit without saying for how long.
const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(5);

/// Timeouts and retry budget for HTTP requests.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Timeout of a single attempt, not counting the wait for a rate limiter permit.
    pub request_timeout: Duration,

    /// Retries on top of the first attempt, shared by transient failures and rate limits.
    pub max_retry_attempts: u32,

    /// First backoff delay; doubles with every further retry.
    pub retry_base_delay: Duration,

    /// Longest rate-limit pause to sit out before giving up on a request.
    pub max_rate_limit_wait: Duration,
}

/// Rate limit information from response headers
#[derive(Debug, Clone, Copy)]
struct RateLimitInfo {
    remaining: usize,
    reset_at: DateTime<Utc>,
}

/// How a non-success response should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Failure {
    /// Pause the host for the given time (or a default) and try again.
    RateLimited(Option<Duration>),
    Transient,
    Unavailable,
    Upstream,
}

impl Failure {
    const fn kind(self) -> ErrorKind {
        match self {
            Self::RateLimited(_) => ErrorKind::RateLimitExceeded,
            Self::Transient => ErrorKind::TransientNetworkError,
            Self::Unavailable => ErrorKind::EntityUnavailable,
            Self::Upstream => ErrorKind::UpstreamError,
        }
    }
}

/// Status, headers, and body of one attempt, before any interpretation.
#[derive(Debug)]
struct RawResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

type AttemptResult = Result<RawResponse, SnapshotError>;

/// Rate-limited, retrying GET client for a single API base URL.
#[derive(Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
    host: String,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
    page_metadata: Box<dyn PageMetadata>,
}

impl HttpTransport {
    /// Create a transport for `base_url`, optionally authenticating with a bearer token.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid or the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        token: Option<&str>,
        limiter: Arc<RateLimiter>,
        policy: RetryPolicy,
        page_metadata: Box<dyn PageMetadata>,
    ) -> crate::Result<Self> {
        let base_url = Url::parse(base_url).into_app_err_with(|| format!("parsing API base URL '{base_url}'"))?;
        let host = host_key(&base_url).into_app_err_with(|| format!("API base URL '{base_url}' has no host"))?;

        let mut headers = HeaderMap::new();
        let _ = headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_JSON));

        if let Some(t) = token {
            let mut auth_val = HeaderValue::from_str(&format!("Bearer {t}"))?;
            auth_val.set_sensitive(true);
            let _ = headers.insert(AUTHORIZATION, auth_val);
        }

        let client = reqwest::Client::builder().user_agent(USER_AGENT).default_headers(headers).build()?;

        Ok(Self {
            client,
            base_url,
            host,
            limiter,
            policy,
            page_metadata,
        })
    }

    /// Key under which requests of this transport are rate limited.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    fn url_for(&self, request: &ApiRequest) -> Result<Url, SnapshotError> {
        let raw = format!("{}{}", self.base_url.as_str().trim_end_matches('/'), request.endpoint);
        let mut url = Url::parse(&raw).map_err(|e| SnapshotError::new(ErrorKind::UpstreamError, format!("invalid request URL '{raw}': {e}")))?;

        if !request.params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &request.params {
                let _ = pairs.append_pair(key, value);
            }
        }

        Ok(url)
    }

    /// Issue `url` through the retry and timeout layers, returning the last attempt.
    async fn send_with_retries(&self, url: Url) -> AttemptResult {
        let clock = Clock::new_tokio();
        let context = ResilienceContext::new(&clock).name("http_get");

        let client = self.client.clone();
        let attempt = Arc::new(
            (
                Timeout::layer("timeout", &context)
                    .timeout_error(|_| SnapshotError::transient("HTTP request timed out"))
                    .timeout(self.policy.request_timeout),
                Execute::new(move |url: Url| {
                    let client = client.clone();
                    async move { send(&client, url).await }
                }),
            )
                .into_service(),
        );

        let limiter = Arc::clone(&self.limiter);
        let host = self.host.clone();
        let recovery_limiter = Arc::clone(&self.limiter);
        let recovery_host = self.host.clone();
        let max_wait = self.policy.max_rate_limit_wait;

        let service = (
            Retry::layer("retry", &context)
                .clone_input()
                .recovery_with(move |result: &AttemptResult, _| recovery(result, &recovery_limiter, &recovery_host, max_wait))
                .max_retry_attempts(self.policy.max_retry_attempts)
                .base_delay(self.policy.retry_base_delay)
                .backoff(Backoff::Exponential)
                .on_retry(|_output, args| {
                    log::debug!(
                        target: LOG_TARGET,
                        "Retrying HTTP GET (attempt {}, delay {}ms)",
                        args.attempt().index() + 1,
                        args.retry_delay().as_millis(),
                    );
                }),
            Execute::new(move |url: Url| {
                let attempt = Arc::clone(&attempt);
                let limiter = Arc::clone(&limiter);
                let host = host.clone();
                async move {
                    let _permit = limiter.acquire(&host).await;
                    attempt.execute(url).await
                }
            }),
        )
            .into_service();

        service.execute(url).await
    }

    /// Turn the final attempt into a response or a classified error.
    fn interpret(&self, url: &Url, raw: RawResponse) -> Result<ApiResponse, SnapshotError> {
        if raw.status.is_success() {
            // 204 No Content is how GitHub lists the contributors of an empty repository
            let body = if raw.status == StatusCode::NO_CONTENT || raw.body.iter().all(u8::is_ascii_whitespace) {
                Value::Array(Vec::new())
            } else {
                serde_json::from_slice(&raw.body).map_err(|e| SnapshotError::malformed(format!("decoding body of {url}: {e}")))?
            };

            let last_page = self.page_metadata.last_page(&raw.headers, &body);
            return Ok(ApiResponse { body, last_page });
        }

        let failure = classify_status(raw.status, &raw.headers, Utc::now());
        Err(SnapshotError::new(failure.kind(), format!("GET {url}: {}", raw.status)))
    }
}

impl Transport for HttpTransport {
    async fn get(&self, request: &ApiRequest) -> Result<ApiResponse, SnapshotError> {
        let url = self.url_for(request)?;

        match self.send_with_retries(url.clone()).await {
            Ok(raw) => self.interpret(&url, raw),
            Err(e) => {
                log::debug!(target: LOG_TARGET, "Giving up on {url}: {e}");
                Err(e)
            }
        }
    }
}

async fn send(client: &reqwest::Client, url: Url) -> AttemptResult {
    let resp = client.get(url.clone()).send().await.map_err(|e| {
        if e.is_builder() {
            SnapshotError::new(ErrorKind::UpstreamError, format!("GET {url}: {e}"))
        } else {
            SnapshotError::transient(format!("GET {url}: {e}"))
        }
    })?;

    let status = resp.status();
    let headers = resp.headers().clone();
    let body = resp
        .bytes()
        .await
        .map_err(|e| SnapshotError::transient(format!("reading body of {url}: {e}")))?
        .to_vec();

    Ok(RawResponse { status, headers, body })
}

/// Decide whether an attempt should be retried, and after how long.
///
/// Rate limits pause the whole host in `limiter` so that other requests hold back too.
/// A rate limit that resets later than `max_wait` is not retried.
fn recovery(result: &AttemptResult, limiter: &RateLimiter, host: &str, max_wait: Duration) -> RecoveryInfo {
    let failure = match result {
        Err(e) if e.kind().is_retryable() => return RecoveryInfo::retry(),
        Err(_) => return RecoveryInfo::never(),
        Ok(raw) if raw.status.is_success() => return RecoveryInfo::never(),
        Ok(raw) => classify_status(raw.status, &raw.headers, Utc::now()),
    };

    match failure {
        Failure::RateLimited(wait) => {
            let wait = wait.unwrap_or(DEFAULT_RATE_LIMIT_WAIT);
            if wait > max_wait {
                log::warn!(
                    target: LOG_TARGET,
                    "Rate limit for '{host}' resets in {}s, longer than the allowed wait",
                    wait.as_secs()
                );
                return RecoveryInfo::never();
            }

            limiter.pause(host, wait);
            credit_limiter_wait(wait);
            RecoveryInfo::retry().delay(wait)
        }
        other if other.kind().is_retryable() => RecoveryInfo::retry(),
        _ => RecoveryInfo::never(),
    }
}

/// Key identifying the rate-limited host of a URL: the host name, plus the port if it is
/// not the scheme's default.
fn host_key(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(url.port().map_or_else(|| host.to_string(), |port| format!("{host}:{port}")))
}

fn classify_status(status: StatusCode, headers: &HeaderMap, now: DateTime<Utc>) -> Failure {
    let retry_after = parse_retry_after(headers);
    let rate_limit = extract_rate_limit_from_headers(headers);
    let quota_wait = rate_limit
        .filter(|info| info.remaining == 0)
        .map(|info| (info.reset_at - now).to_std().unwrap_or_default());

    match status {
        StatusCode::TOO_MANY_REQUESTS => Failure::RateLimited(retry_after.or(quota_wait)),

        // GitHub reports both secondary limits and exhausted quotas as 403.
        StatusCode::FORBIDDEN if retry_after.is_some() || quota_wait.is_some() => Failure::RateLimited(retry_after.or(quota_wait)),

        StatusCode::NOT_FOUND | StatusCode::FORBIDDEN | StatusCode::GONE => Failure::Unavailable,
        StatusCode::REQUEST_TIMEOUT => Failure::Transient,
        s if s.is_server_error() => Failure::Transient,
        _ => Failure::Upstream,
    }
}

/// Parse the `Retry-After` header value as seconds.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let secs = headers.get(RETRY_AFTER)?.to_str().ok()?.trim().parse::<u64>().ok()?;
    Some(Duration::from_secs(secs))
}

/// Extract rate limit information from API response headers
fn extract_rate_limit_from_headers(headers: &HeaderMap) -> Option<RateLimitInfo> {
    let remaining = headers.get("x-ratelimit-remaining")?.to_str().ok()?.parse::<usize>().ok()?;
    let reset_timestamp = headers.get("x-ratelimit-reset")?.to_str().ok()?.parse::<i64>().ok()?;
    let reset_at = DateTime::from_timestamp(reset_timestamp, 0)?;

    Some(RateLimitInfo { remaining, reset_at })
}
