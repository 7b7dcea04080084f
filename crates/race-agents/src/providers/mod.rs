//! Provider client pool: one uniform handle per enabled provider.
//!
//! Credentials and the HTTP client are created once at startup and shared
//! read-only for the life of the process.

pub mod anthropic;
pub mod gemini;
pub mod http;
pub mod openai_compat;

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use triangulation::{ModelParams, ModelTier, ProviderId, ProviderRequest, SummaryProvider, TaskType};

use crate::config::{ProviderKind, ResolvedProvider};
use crate::prompts::RenderedPrompt;

pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use openai_compat::OpenAiCompatProvider;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// One enabled provider plus its generation parameters.
#[derive(Clone)]
pub struct PoolEntry {
    pub provider: Arc<dyn SummaryProvider>,
    pub params: ModelParams,
}

/// The set of enabled providers, in configuration order.
#[derive(Clone, Default)]
pub struct ProviderPool {
    entries: Vec<PoolEntry>,
    tier: ModelTier,
}

/// Shared reference to a provider pool
pub type SharedProviderPool = Arc<ProviderPool>;

impl ProviderPool {
    /// Build HTTP clients for every resolved provider.
    pub fn from_resolved(
        resolved: &[ResolvedProvider],
        tier: ModelTier,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("race-agents/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let entries = resolved
            .iter()
            .map(|r| {
                let provider: Arc<dyn SummaryProvider> = match r.config.kind {
                    ProviderKind::OpenaiCompat => Arc::new(OpenAiCompatProvider::new(
                        r.id.clone(),
                        &r.model,
                        &r.base_url,
                        &r.api_key,
                        client.clone(),
                    )),
                    ProviderKind::Anthropic => Arc::new(AnthropicProvider::new(
                        r.id.clone(),
                        &r.model,
                        &r.base_url,
                        &r.api_key,
                        client.clone(),
                    )),
                    ProviderKind::Gemini => Arc::new(GeminiProvider::new(
                        r.id.clone(),
                        &r.model,
                        &r.base_url,
                        &r.api_key,
                        client.clone(),
                    )),
                };
                info!(provider = %r.id, kind = %r.config.kind, model = %r.model, tier = %tier, "Provider enabled");
                PoolEntry {
                    provider,
                    params: ModelParams {
                        model: r.model.clone(),
                        max_tokens: r.config.max_tokens,
                        temperature: r.config.temperature,
                    },
                }
            })
            .collect();

        Ok(Self { entries, tier })
    }

    /// Pool over pre-built providers with default generation parameters.
    pub fn from_providers(providers: Vec<Arc<dyn SummaryProvider>>) -> Self {
        let entries = providers
            .into_iter()
            .map(|provider| {
                let params = ModelParams {
                    model: provider.model().to_string(),
                    max_tokens: 1_024,
                    temperature: 0.2,
                };
                PoolEntry { provider, params }
            })
            .collect();
        Self {
            entries,
            tier: ModelTier::default(),
        }
    }

    pub fn shared(self) -> SharedProviderPool {
        Arc::new(self)
    }

    pub fn entries(&self) -> &[PoolEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn tier(&self) -> ModelTier {
        self.tier
    }

    /// Enabled provider ids ("generators").
    pub fn ids(&self) -> Vec<ProviderId> {
        self.entries.iter().map(|e| e.provider.id().clone()).collect()
    }

    /// Request for `entry` carrying the rendered prompt.
    pub fn request_for(
        entry: &PoolEntry,
        race_id: &str,
        task_type: TaskType,
        prompt: &RenderedPrompt,
    ) -> ProviderRequest {
        ProviderRequest {
            provider_id: entry.provider.id().clone(),
            race_id: race_id.to_string(),
            task_type,
            system: prompt.system.clone(),
            prompt: prompt.user.clone(),
            model_params: entry.params.clone(),
        }
    }
}
