//! Provider contract: one request/response shape across heterogeneous
//! summarization backends.
//!
//! Each backend implements [`SummaryProvider::complete`]. The provided
//! [`SummaryProvider::call`] wraps it with the per-call timeout and turns the
//! raw completion into a [`ProviderResponse`], computing the confidence
//! signal locally so no backend can supply its own.

pub mod error;
pub mod mock;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::confidence::{score_response, ConfidenceLevel};
use crate::issues::TaskType;

pub use error::{ProviderError, ProviderErrorKind};
pub use mock::{MockProvider, MockStep};

/// Identifier of a configured provider (e.g. `openai`, `anthropic`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(String);

impl ProviderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Model tier selected once at engine construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Cheap,
    #[default]
    Standard,
}

impl std::fmt::Display for ModelTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cheap => write!(f, "cheap"),
            Self::Standard => write!(f, "standard"),
        }
    }
}

/// Generation parameters passed through to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// One summarization request for one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderRequest {
    pub provider_id: ProviderId,
    pub race_id: String,
    pub task_type: TaskType,
    /// System instructions shared by every request of a task type.
    pub system: String,
    pub prompt: String,
    pub model_params: ModelParams,
}

/// Token accounting reported by the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Raw backend output before local scoring.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    pub text: String,
    pub usage: TokenUsage,
    /// Provider-specific extras (finish reason, model echo, ...).
    pub extensions: serde_json::Value,
}

impl Completion {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: TokenUsage::default(),
            extensions: serde_json::Value::Null,
        }
    }
}

/// A successful provider summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub provider_id: ProviderId,
    pub race_id: String,
    pub task_type: TaskType,
    pub text: String,
    /// Computed locally from `text`. See [`crate::confidence::score_response`].
    pub confidence_signal: ConfidenceLevel,
    pub token_usage: TokenUsage,
    pub latency_ms: u64,
    pub timestamp: DateTime<Utc>,
    /// Opaque provider-specific data, kept apart from the fixed fields.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub extensions: serde_json::Value,
}

impl ProviderResponse {
    /// Build a response from a completion, scoring the text locally.
    pub fn from_completion(
        request: &ProviderRequest,
        completion: Completion,
        latency: Duration,
    ) -> Self {
        Self {
            provider_id: request.provider_id.clone(),
            race_id: request.race_id.clone(),
            task_type: request.task_type,
            confidence_signal: score_response(&completion.text),
            text: completion.text,
            token_usage: completion.usage,
            latency_ms: latency.as_millis() as u64,
            timestamp: Utc::now(),
            extensions: completion.extensions,
        }
    }

    /// Whether the response carries any text at all.
    pub fn is_usable(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// A summarization backend.
#[async_trait]
pub trait SummaryProvider: Send + Sync {
    /// Provider identifier.
    fn id(&self) -> &ProviderId;

    /// Model identifier in use for this provider.
    fn model(&self) -> &str;

    /// Perform one backend request.
    async fn complete(
        &self,
        request: &ProviderRequest,
        timeout: Duration,
    ) -> Result<Completion, ProviderError>;

    /// Perform one request under `timeout`, producing a scored response.
    ///
    /// Exceeding the timeout cancels this call only.
    async fn call(
        &self,
        request: &ProviderRequest,
        timeout: Duration,
    ) -> Result<ProviderResponse, ProviderError> {
        let start = Instant::now();
        let completion = match tokio::time::timeout(timeout, self.complete(request, timeout)).await
        {
            Ok(result) => result?,
            Err(_) => return Err(ProviderError::Timeout(timeout)),
        };
        Ok(ProviderResponse::from_completion(
            request,
            completion,
            start.elapsed(),
        ))
    }
}
