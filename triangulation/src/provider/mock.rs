//! Scripted provider for tests and offline runs.
//!
//! Each call pops the next [`MockStep`]; once the script is exhausted the
//! fallback step (if any) repeats forever.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{
    Completion, ProviderError, ProviderId, ProviderRequest, SummaryProvider, TokenUsage,
};

/// One scripted outcome.
#[derive(Debug, Clone)]
pub struct MockStep {
    pub delay: Duration,
    pub result: Result<String, ProviderError>,
}

impl MockStep {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Ok(text.into()),
        }
    }

    pub fn ok_after(text: impl Into<String>, delay: Duration) -> Self {
        Self {
            delay,
            result: Ok(text.into()),
        }
    }

    pub fn err(error: ProviderError) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Err(error),
        }
    }
}

/// Provider whose behaviour is fully determined by its script.
pub struct MockProvider {
    id: ProviderId,
    model: String,
    script: Mutex<VecDeque<MockStep>>,
    fallback: Option<MockStep>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl MockProvider {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: ProviderId::new(id),
            model: "mock-model".to_string(),
            script: Mutex::new(VecDeque::new()),
            fallback: None,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Append a step to the script.
    pub fn then(self, step: MockStep) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(step);
        }
        self
    }

    /// Step repeated once the script runs out.
    pub fn otherwise(mut self, step: MockStep) -> Self {
        self.fallback = Some(step);
        self
    }

    /// Always answer with `text`.
    pub fn always(self, text: impl Into<String>) -> Self {
        self.otherwise(MockStep::ok(text))
    }

    /// Always fail with `error`.
    pub fn failing(self, error: ProviderError) -> Self {
        self.otherwise(MockStep::err(error))
    }

    /// Number of `complete` invocations so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompts received, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    fn next_step(&self) -> Option<MockStep> {
        let popped = self.script.lock().ok().and_then(|mut s| s.pop_front());
        popped.or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl SummaryProvider for MockProvider {
    fn id(&self) -> &ProviderId {
        &self.id
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        request: &ProviderRequest,
        _timeout: Duration,
    ) -> Result<Completion, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(request.prompt.clone());
        }

        let step = self
            .next_step()
            .ok_or_else(|| ProviderError::api(None, format!("{} script exhausted", self.id)))?;
        if !step.delay.is_zero() {
            tokio::time::sleep(step.delay).await;
        }

        let text = step.result?;
        let completion_tokens = text.split_whitespace().count() as u64;
        Ok(Completion {
            usage: TokenUsage {
                prompt_tokens: request.prompt.split_whitespace().count() as u64,
                completion_tokens,
            },
            text,
            extensions: serde_json::Value::Null,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issues::TaskType;
    use crate::provider::ModelParams;

    fn request() -> ProviderRequest {
        ProviderRequest {
            provider_id: ProviderId::new("mock"),
            race_id: "r".into(),
            task_type: TaskType::RaceSummary,
            system: String::new(),
            prompt: "summarize the race".into(),
            model_params: ModelParams {
                model: "mock-model".into(),
                max_tokens: 64,
                temperature: 0.0,
            },
        }
    }

    #[tokio::test]
    async fn test_script_then_fallback() {
        let mock = MockProvider::new("mock")
            .then(MockStep::err(ProviderError::api(Some(500), "boom")))
            .always("steady answer");

        let first = mock.complete(&request(), Duration::from_secs(1)).await;
        assert!(first.is_err());
        let second = mock
            .complete(&request(), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(second.text, "steady answer");
        assert_eq!(second.usage.prompt_tokens, 3);
        assert_eq!(mock.call_count(), 2);
        assert_eq!(mock.prompts().len(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_script_is_api_error() {
        let mock = MockProvider::new("empty");
        let err = mock
            .complete(&request(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Api { .. }));
    }
}
