//! Rate-limit handling for the Linear transport.
//!
//! Linear answers bursts with HTTP 429 and an optional `Retry-After` header
//! (seconds). We honour it once, capped, then give up with a typed error.

use std::time::Duration;

use reqwest::header::HeaderValue;
use reqwest::StatusCode;

use super::client::LinearError;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Used when `Retry-After` is missing or unparseable.
    pub default_retry_after_secs: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            default_retry_after_secs: 2,
            max_backoff_ms: 10_000,
        }
    }
}

/// Seconds requested by a `Retry-After` header, falling back to the policy
/// default. HTTP-date values are treated as unparseable.
pub fn retry_after_secs(retry_after: Option<&HeaderValue>, policy: &RetryPolicy) -> u64 {
    retry_after
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(policy.default_retry_after_secs)
}

/// How long to sleep before retrying a 429.
pub fn retry_after_delay(retry_after: Option<&HeaderValue>, policy: &RetryPolicy) -> Duration {
    let ms = retry_after_secs(retry_after, policy)
        .saturating_mul(1000)
        .min(policy.max_backoff_ms);
    Duration::from_millis(ms)
}

/// Send a request, retrying only on 429 until `max_attempts` is reached.
///
/// Non-429 responses (success or not) are returned to the caller untouched.
/// Transport errors are never retried.
pub async fn send_with_retry(
    request: reqwest::RequestBuilder,
    policy: &RetryPolicy,
) -> Result<reqwest::Response, LinearError> {
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        let Some(cloned) = request.try_clone() else {
            return request.send().await.map_err(LinearError::Http);
        };

        let response = cloned.send().await.map_err(LinearError::Http)?;
        if response.status() != StatusCode::TOO_MANY_REQUESTS {
            return Ok(response);
        }

        let header = response.headers().get(reqwest::header::RETRY_AFTER).cloned();
        if attempt < attempts {
            let delay = retry_after_delay(header.as_ref(), policy);
            log::warn!(
                "linear rate limited, retry {}/{} (sleep {:?})",
                attempt,
                attempts - 1,
                delay
            );
            tokio::time::sleep(delay).await;
            continue;
        }

        let retry_after_secs = retry_after_secs(header.as_ref(), policy);
        let body = response.text().await.unwrap_or_default();
        return Err(LinearError::RateLimited {
            retry_after_secs,
            body,
        });
    }

    Err(LinearError::Api {
        status: StatusCode::TOO_MANY_REQUESTS.as_u16(),
        message: "request exhausted retries".to_string(),
        body: String::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_after_defaults_to_two_seconds() {
        let policy = RetryPolicy::default();
        assert_eq!(retry_after_delay(None, &policy), Duration::from_secs(2));

        let garbage = HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT");
        assert_eq!(
            retry_after_delay(Some(&garbage), &policy),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn test_retry_after_header_is_honoured() {
        let policy = RetryPolicy::default();
        let header = HeaderValue::from_static("3");
        assert_eq!(
            retry_after_delay(Some(&header), &policy),
            Duration::from_secs(3)
        );
    }

    #[test]
    fn test_retry_after_capped_at_ten_seconds() {
        let policy = RetryPolicy::default();
        let header = HeaderValue::from_static("120");
        assert_eq!(
            retry_after_delay(Some(&header), &policy),
            Duration::from_secs(10)
        );
        assert_eq!(retry_after_secs(Some(&header), &policy), 120);
    }

    #[test]
    fn test_default_policy_allows_one_retry() {
        assert_eq!(RetryPolicy::default().max_attempts, 2);
    }
}
