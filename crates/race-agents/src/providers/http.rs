//! Shared HTTP plumbing: status classification, `retry-after` parsing, and
//! JSON POST with error mapping.
//!
//! | Response                 | Error                           |
//! |--------------------------|---------------------------------|
//! | 429                      | `RateLimited { retry_after }`   |
//! | 408, 504, client timeout | `Timeout`                       |
//! | 401, 403                 | `Configuration`                 |
//! | other non-2xx, transport | `Api { status }`                |

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use tracing::debug;

use triangulation::ProviderError;

/// Longest error body kept in error messages.
const MAX_ERROR_BODY: usize = 300;

/// Declared wait from a `retry-after` header given in seconds. HTTP dates are ignored.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?;
    let secs: f64 = raw.trim().parse().ok()?;
    // Negative, NaN and values past Duration::MAX are treated as absent.
    Duration::try_from_secs_f64(secs).ok()
}

/// Map a non-success status to a provider error.
pub fn classify_status(
    status: u16,
    retry_after: Option<Duration>,
    body: &str,
    timeout: Duration,
) -> ProviderError {
    let message = truncate(body);
    match status {
        429 => ProviderError::RateLimited { retry_after },
        408 | 504 => ProviderError::Timeout(timeout),
        401 | 403 => ProviderError::Configuration(format!("HTTP {status}: {message}")),
        _ => ProviderError::api(Some(status), message),
    }
}

/// Map a transport-level failure.
pub fn classify_transport(err: &reqwest::Error, timeout: Duration) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout(timeout)
    } else if err.is_builder() {
        ProviderError::Configuration(err.to_string())
    } else {
        ProviderError::api(err.status().map(|s| s.as_u16()), err.to_string())
    }
}

/// Send a prepared request and decode a JSON body.
pub async fn send_json<T: DeserializeOwned>(
    request: RequestBuilder,
    timeout: Duration,
) -> Result<T, ProviderError> {
    let response = request
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| classify_transport(&e, timeout))?;

    let status = response.status();
    if !status.is_success() {
        let retry_after = parse_retry_after(response.headers());
        let body = response.text().await.unwrap_or_default();
        debug!(status = status.as_u16(), "Provider returned error status");
        return Err(classify_status(status.as_u16(), retry_after, &body, timeout));
    }

    let body = response
        .text()
        .await
        .map_err(|e| classify_transport(&e, timeout))?;
    serde_json::from_str(&body)
        .map_err(|e| ProviderError::api(Some(status.as_u16()), format!("malformed response: {e}")))
}

fn truncate(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= MAX_ERROR_BODY {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(MAX_ERROR_BODY).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    const T: Duration = Duration::from_secs(30);

    #[test]
    fn test_rate_limit_carries_retry_after() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("12"));
        let err = classify_status(429, parse_retry_after(&headers), "slow down", T);
        assert_eq!(err.retry_after(), Some(Duration::from_secs(12)));
    }

    #[test]
    fn test_unparseable_retry_after_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(parse_retry_after(&headers), None);
        assert_eq!(parse_retry_after(&HeaderMap::new()), None);
    }

    #[test]
    fn test_out_of_range_retry_after_ignored() {
        for raw in ["1e20", "-5", "NaN", "inf"] {
            let mut headers = HeaderMap::new();
            headers.insert(RETRY_AFTER, HeaderValue::from_static(raw));
            assert_eq!(parse_retry_after(&headers), None, "retry-after: {raw}");
        }

        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("1.5"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_millis(1_500)));
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(classify_status(504, None, "", T), ProviderError::Timeout(_)));
        assert!(matches!(classify_status(408, None, "", T), ProviderError::Timeout(_)));
        assert!(matches!(
            classify_status(401, None, "bad key", T),
            ProviderError::Configuration(_)
        ));
        assert!(matches!(
            classify_status(503, None, "overloaded", T),
            ProviderError::Api { status: Some(503), .. }
        ));
    }

    #[test]
    fn test_long_bodies_truncated() {
        let body = "x".repeat(1_000);
        let err = classify_status(500, None, &body, T);
        assert!(err.to_string().len() < 400);
    }
}
