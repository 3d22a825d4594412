//! Bounded retry with exponential backoff for HTTP embedding calls.
//!
//! - HTTP 429 → retry, waiting at least the server's `Retry-After` hint
//!   (delay in seconds or an HTTP-date)
//! - HTTP 5xx → retry
//! - Other HTTP 4xx → fail immediately
//! - Network errors and timeouts → retry
//!
//! Backoff: `base × 2^(attempt-1)`, with the multiplier capped at 2^5.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::RETRY_AFTER;
use reqwest::{RequestBuilder, Response, StatusCode};
use rowdex_core::error::{Error, Result};
use tracing::{debug, warn};

/// Upper bound on a server-provided `Retry-After` hint.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base: Duration::from_millis(base_ms),
        }
    }

    /// Delay before attempt number `attempt` (1-based; attempt 1 has no delay).
    pub fn delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let backoff = self.base * (1u32 << (attempt - 2).min(5));
        match retry_after {
            Some(hint) => backoff.max(hint.min(MAX_RETRY_AFTER)),
            None => backoff,
        }
    }
}

/// The `Retry-After` hint of `response`, if it carries a usable one.
pub fn retry_after(response: &Response) -> Option<Duration> {
    let value = response.headers().get(RETRY_AFTER)?.to_str().ok()?;
    parse_retry_after(value, Utc::now())
}

/// Parse a `Retry-After` value: whole seconds, or an HTTP-date relative to
/// `now`. A date in the past means no wait.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?;
    Some(
        at.with_timezone(&Utc)
            .signed_duration_since(now)
            .to_std()
            .unwrap_or(Duration::ZERO),
    )
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Send a JSON request built by `build`, retrying per `policy`.
///
/// `build` is called once per attempt because a sent request is consumed.
/// Returns the parsed JSON body of the first successful response.
pub async fn send_json_with_retry<F>(
    label: &str,
    policy: RetryPolicy,
    build: F,
) -> Result<serde_json::Value>
where
    F: Fn() -> RequestBuilder,
{
    let mut last_err = String::from("no attempts made");
    let mut hint = None;

    for attempt in 1..=policy.max_attempts {
        let delay = policy.delay(attempt, hint.take());
        if !delay.is_zero() {
            debug!(attempt, delay_ms = delay.as_millis() as u64, "{} retry backoff", label);
            tokio::time::sleep(delay).await;
        }

        match build().send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response.json().await.map_err(|e| Error::EmbeddingService {
                        attempts: attempt,
                        message: format!("{} returned invalid JSON: {}", label, e),
                    });
                }

                if is_retryable(status) {
                    if status == StatusCode::TOO_MANY_REQUESTS {
                        hint = retry_after(&response);
                    }
                    let body = response.text().await.unwrap_or_default();
                    warn!(attempt, %status, "{} request failed, will retry", label);
                    last_err = format!("{} API error {}: {}", label, status, body);
                    continue;
                }

                let body = response.text().await.unwrap_or_default();
                return Err(Error::EmbeddingService {
                    attempts: attempt,
                    message: format!("{} API error {}: {}", label, status, body),
                });
            }
            Err(e) => {
                warn!(attempt, error = %e, "{} request failed, will retry", label);
                last_err = format!("{} request failed: {}", label, e);
            }
        }
    }

    Err(Error::EmbeddingService {
        attempts: policy.max_attempts,
        message: last_err,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(10, 100);
        assert_eq!(policy.delay(1, None), Duration::ZERO);
        assert_eq!(policy.delay(2, None), Duration::from_millis(100));
        assert_eq!(policy.delay(3, None), Duration::from_millis(200));
        assert_eq!(policy.delay(4, None), Duration::from_millis(400));
        assert_eq!(policy.delay(9, None), Duration::from_millis(3200));
        assert_eq!(policy.delay(10, None), Duration::from_millis(3200));
    }

    #[test]
    fn test_retry_after_is_a_floor() {
        let policy = RetryPolicy::new(3, 100);
        assert_eq!(
            policy.delay(2, Some(Duration::from_secs(2))),
            Duration::from_secs(2)
        );
        assert_eq!(
            policy.delay(2, Some(Duration::from_millis(10))),
            Duration::from_millis(100)
        );
        assert_eq!(
            policy.delay(2, Some(Duration::from_secs(3600))),
            MAX_RETRY_AFTER
        );
    }

    #[test]
    fn test_retry_after_seconds_and_dates() {
        let now = DateTime::parse_from_rfc2822("Wed, 21 Oct 2015 07:28:00 GMT")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(parse_retry_after(" 7 ", now), Some(Duration::from_secs(7)));
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:30 GMT", now),
            Some(Duration::from_secs(30))
        );
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:00:00 GMT", now),
            Some(Duration::ZERO)
        );
        assert_eq!(parse_retry_after("soon", now), None);
        assert_eq!(parse_retry_after("-3", now), None);
    }

    #[test]
    fn test_zero_attempts_clamped() {
        assert_eq!(RetryPolicy::new(0, 1).max_attempts, 1);
    }
}
