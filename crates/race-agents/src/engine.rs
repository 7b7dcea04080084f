//! Summarization engine: concurrent provider fan-out with per-provider retry.
//!
//! ```text
//!   render prompt (task_type template + retrieved context)
//!        │
//!   JoinSet::spawn(provider_i) × N          each task: RetryPolicy::run(call)
//!        │
//!   join_next until all done | overall budget | cancelled
//!        │
//!   EngineOutcome { responses (0..N), failures }
//! ```
//!
//! Provider failures never escape this module. A provider still pending when
//! the overall budget expires is aborted and recorded as timed out.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

use triangulation::otel;
use triangulation::{
    ProviderError, ProviderErrorKind, ProviderId, ProviderResponse, RetrievedContext,
    RetryPolicy, SharedUsageTracker, TaskType, UnitKey,
};

use crate::config::EngineConfig;
use crate::prompts::{self, RenderedPrompt};
use crate::providers::{ProviderPool, SharedProviderPool};
use crate::race::RaceSpec;

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_OVERALL_BUDGET: Duration = Duration::from_secs(180);

/// A provider that produced no response for a unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderFailure {
    pub provider: ProviderId,
    pub kind: ProviderErrorKind,
    pub attempts: u32,
    pub message: String,
}

/// Everything the engine learned about one unit of work.
#[derive(Debug, Clone, Default)]
pub struct EngineOutcome {
    /// Successful responses, in completion order.
    pub responses: Vec<ProviderResponse>,
    pub failures: Vec<ProviderFailure>,
    /// Set when the caller's cancellation token fired before fan-in finished.
    pub cancelled: bool,
}

impl EngineOutcome {
    pub fn succeeded(&self) -> usize {
        self.responses.len()
    }

    pub fn failed(&self, provider: &str) -> bool {
        self.failures.iter().any(|f| f.provider.as_str() == provider)
    }
}

/// Result of one spawned provider task.
struct CallOutcome {
    provider: ProviderId,
    result: Result<ProviderResponse, ProviderError>,
    attempts: u32,
}

enum FanInEnd {
    Drained,
    BudgetExpired,
    Cancelled,
}

#[derive(Clone)]
pub struct SummarizationEngine {
    pool: SharedProviderPool,
    retry: RetryPolicy,
    call_timeout: Duration,
    overall_budget: Duration,
    usage: SharedUsageTracker,
}

impl SummarizationEngine {
    pub fn new(pool: SharedProviderPool, usage: SharedUsageTracker) -> Self {
        Self {
            pool,
            retry: RetryPolicy::default(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            overall_budget: DEFAULT_OVERALL_BUDGET,
            usage,
        }
    }

    pub fn from_config(
        pool: SharedProviderPool,
        config: &EngineConfig,
        usage: SharedUsageTracker,
    ) -> Self {
        Self::new(pool, usage)
            .with_retry(config.retry_policy())
            .with_call_timeout(config.call_timeout())
            .with_overall_budget(config.overall_budget())
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_overall_budget(mut self, budget: Duration) -> Self {
        self.overall_budget = budget;
        self
    }

    /// Record usage into `usage` instead of the tracker given at construction.
    pub fn with_usage(mut self, usage: SharedUsageTracker) -> Self {
        self.usage = usage;
        self
    }

    pub fn pool(&self) -> &ProviderPool {
        &self.pool
    }

    pub fn usage(&self) -> &SharedUsageTracker {
        &self.usage
    }

    /// Render the unit's prompt and collect responses from every provider.
    pub async fn summarize(
        &self,
        race: &RaceSpec,
        unit: &UnitKey,
        context: &RetrievedContext,
        cancel: &CancellationToken,
    ) -> EngineOutcome {
        let prompt = prompts::render(unit, race, context);
        self.fan_out(&race.race_id, unit.task_type(), &prompt, cancel)
            .await
    }

    /// Issue `prompt` to every provider concurrently and gather what succeeds.
    pub async fn fan_out(
        &self,
        race_id: &str,
        task_type: TaskType,
        prompt: &RenderedPrompt,
        cancel: &CancellationToken,
    ) -> EngineOutcome {
        let mut outcome = EngineOutcome::default();
        if self.pool.is_empty() {
            debug!(race_id, task_type = %task_type, "No providers enabled, skipping fan-out");
            return outcome;
        }

        let deadline = Instant::now() + self.overall_budget;
        let mut pending = self.pool.ids();
        let mut join_set: JoinSet<CallOutcome> = JoinSet::new();

        for entry in self.pool.entries() {
            let provider = entry.provider.clone();
            let request = ProviderPool::request_for(entry, race_id, task_type, prompt);
            let retry = self.retry;
            let call_timeout = self.call_timeout;
            let usage = self.usage.clone();
            let span = otel::provider_call_span(
                provider.id().as_str(),
                provider.model(),
                &task_type.to_string(),
            );

            join_set.spawn(
                async move {
                    let start = Instant::now();
                    let id = provider.id().clone();
                    let (provider_ref, request_ref, usage_ref, id_ref) =
                        (&provider, &request, &usage, &id);

                    let run = retry
                        .run(id.as_str(), move |_attempt| async move {
                            usage_ref.record_call(id_ref);
                            let result = provider_ref.call(request_ref, call_timeout).await;
                            if let Err(e) = &result {
                                usage_ref.record_error(id_ref, e.kind());
                            }
                            result
                        })
                        .await;

                    let tokens = match &run.result {
                        Ok(response) => {
                            usage.record_success(&id, &response.token_usage);
                            response.token_usage.total()
                        }
                        Err(_) => 0,
                    };
                    otel::record_provider_result(
                        &tracing::Span::current(),
                        run.result.is_ok(),
                        run.attempts,
                        tokens,
                        start.elapsed().as_millis() as u64,
                    );

                    CallOutcome {
                        provider: id,
                        result: run.result,
                        attempts: run.attempts,
                    }
                }
                .instrument(span),
            );
        }

        let end = loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break FanInEnd::Cancelled,
                next = tokio::time::timeout_at(deadline, join_set.join_next()) => next,
            };
            match next {
                Ok(Some(Ok(call))) => {
                    pending.retain(|p| p != &call.provider);
                    match call.result {
                        Ok(response) if response.is_usable() => {
                            debug!(
                                race_id,
                                provider = %call.provider,
                                attempts = call.attempts,
                                latency_ms = response.latency_ms,
                                signal = %response.confidence_signal,
                                "Provider responded"
                            );
                            outcome.responses.push(response);
                        }
                        Ok(_) => {
                            warn!(race_id, provider = %call.provider, task_type = %task_type, "Provider returned blank text");
                            outcome.failures.push(ProviderFailure {
                                provider: call.provider,
                                kind: ProviderErrorKind::Api,
                                attempts: call.attempts,
                                message: "blank response".to_string(),
                            });
                        }
                        Err(err) => {
                            warn!(
                                race_id,
                                provider = %call.provider,
                                task_type = %task_type,
                                attempts = call.attempts,
                                error_kind = %err.kind(),
                                error = %err,
                                "Provider dropped for this unit"
                            );
                            outcome.failures.push(ProviderFailure {
                                provider: call.provider,
                                kind: err.kind(),
                                attempts: call.attempts,
                                message: err.to_string(),
                            });
                        }
                    }
                }
                Ok(Some(Err(e))) => {
                    warn!(race_id, error = %e, "Provider task panicked");
                }
                Ok(None) => break FanInEnd::Drained,
                Err(_) => break FanInEnd::BudgetExpired,
            }
        };

        join_set.abort_all();

        let (kind, message) = match end {
            FanInEnd::Drained => (ProviderErrorKind::Api, "provider task panicked".to_string()),
            FanInEnd::BudgetExpired => {
                warn!(
                    race_id,
                    task_type = %task_type,
                    budget_ms = self.overall_budget.as_millis() as u64,
                    pending = pending.len(),
                    "Overall budget expired, abandoning pending providers"
                );
                (
                    ProviderErrorKind::Timeout,
                    format!("overall budget of {:?} expired", self.overall_budget),
                )
            }
            FanInEnd::Cancelled => {
                outcome.cancelled = true;
                info!(race_id, task_type = %task_type, pending = pending.len(), "Fan-out cancelled");
                (ProviderErrorKind::Timeout, "cancelled".to_string())
            }
        };
        for provider in pending {
            self.usage.record_error(&provider, kind);
            outcome.failures.push(ProviderFailure {
                provider,
                kind,
                attempts: 0,
                message: message.clone(),
            });
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use triangulation::{MockProvider, MockStep, SummaryProvider, UsageTracker};

    fn engine(providers: Vec<Arc<dyn SummaryProvider>>) -> SummarizationEngine {
        SummarizationEngine::new(
            ProviderPool::from_providers(providers).shared(),
            UsageTracker::shared(),
        )
        .with_retry(RetryPolicy::new(
            3,
            Duration::from_millis(100),
            Duration::from_secs(1),
        ))
    }

    fn prompt() -> RenderedPrompt {
        RenderedPrompt {
            system: "sys".into(),
            user: "Summarize the race.".into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_collects_all_successes() {
        let engine = engine(vec![
            Arc::new(MockProvider::new("a").always("Alpha text about the race.")),
            Arc::new(MockProvider::new("b").always("Beta text about the race.")),
        ]);
        let out = engine
            .fan_out("r", TaskType::RaceSummary, &prompt(), &CancellationToken::new())
            .await;
        assert_eq!(out.succeeded(), 2);
        assert!(out.failures.is_empty());
        assert_eq!(engine.usage().snapshot().total_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_pool_is_valid_empty_result() {
        let engine = engine(vec![]);
        let out = engine
            .fan_out("r", TaskType::IssueStance, &prompt(), &CancellationToken::new())
            .await;
        assert!(out.responses.is_empty());
        assert!(out.failures.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_blank_response_counts_as_failure() {
        let engine = engine(vec![Arc::new(MockProvider::new("a").always("   "))]);
        let out = engine
            .fan_out("r", TaskType::IssueStance, &prompt(), &CancellationToken::new())
            .await;
        assert!(out.responses.is_empty());
        assert!(out.failed("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_marks_pending() {
        let engine = engine(vec![Arc::new(
            MockProvider::new("slow").otherwise(MockStep::ok_after("late", Duration::from_secs(30))),
        )]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let out = engine
            .fan_out("r", TaskType::RaceSummary, &prompt(), &cancel)
            .await;
        assert!(out.cancelled);
        assert!(out.failed("slow"));
    }
}
