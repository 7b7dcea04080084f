//! Provider error taxonomy with retry classification.
//!
//! | Kind          | Retriable | Notes                                   |
//! |---------------|-----------|-----------------------------------------|
//! | RateLimited   | yes       | waits at least the declared retry_after |
//! | Timeout       | yes       | exponential backoff                     |
//! | Api           | yes       | exponential backoff                     |
//! | Configuration | no        | fatal at startup, skipped at call time  |

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification used by the engine to decide whether and how to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    RateLimited,
    Timeout,
    Api,
    Configuration,
}

impl ProviderErrorKind {
    pub fn is_retriable(self) -> bool {
        !matches!(self, Self::Configuration)
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimited => write!(f, "rate_limited"),
            Self::Timeout => write!(f, "timeout"),
            Self::Api => write!(f, "api"),
            Self::Configuration => write!(f, "configuration"),
        }
    }
}

/// Failure of a single provider call.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Provider signalled rate limiting; `retry_after` is its declared wait.
    #[error("Rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// The call exceeded its timeout.
    #[error("Provider timed out after {0:?}")]
    Timeout(Duration),

    /// Non-success response or transport failure.
    #[error("Provider API error (status {status:?}): {message}")]
    Api {
        status: Option<u16>,
        message: String,
    },

    /// Missing or rejected credentials, unknown model, bad base URL.
    #[error("Provider configuration error: {0}")]
    Configuration(String),
}

impl ProviderError {
    pub fn kind(&self) -> ProviderErrorKind {
        match self {
            Self::RateLimited { .. } => ProviderErrorKind::RateLimited,
            Self::Timeout(_) => ProviderErrorKind::Timeout,
            Self::Api { .. } => ProviderErrorKind::Api,
            Self::Configuration(_) => ProviderErrorKind::Configuration,
        }
    }

    pub fn is_retriable(&self) -> bool {
        self.kind().is_retriable()
    }

    /// Declared wait for rate-limit errors.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Build an `Api` error conveniently.
    pub fn api(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_is_retriable_with_wait() {
        let err = ProviderError::RateLimited {
            retry_after: Some(Duration::from_secs(7)),
        };
        assert!(err.is_retriable());
        assert_eq!(err.kind(), ProviderErrorKind::RateLimited);
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
    }

    #[test]
    fn configuration_is_terminal() {
        let err = ProviderError::Configuration("missing api key".into());
        assert!(!err.is_retriable());
        assert_eq!(err.retry_after(), None);
    }

    #[test]
    fn api_error_carries_status() {
        let err = ProviderError::api(Some(503), "overloaded");
        assert_eq!(err.kind(), ProviderErrorKind::Api);
        assert!(err.to_string().contains("503"));
    }
}
