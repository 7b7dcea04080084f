//! Anthropic Messages API client.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use triangulation::{
    Completion, ProviderError, ProviderId, ProviderRequest, SummaryProvider, TokenUsage,
};

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "str::is_empty")]
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

pub struct AnthropicProvider {
    id: ProviderId,
    model: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(
        id: ProviderId,
        model: &str,
        base_url: &str,
        api_key: &str,
        client: reqwest::Client,
    ) -> Self {
        Self {
            id,
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/messages", self.base_url)
    }

    fn body<'a>(&'a self, request: &'a ProviderRequest) -> MessagesRequest<'a> {
        MessagesRequest {
            model: &self.model,
            max_tokens: request.model_params.max_tokens,
            temperature: request.model_params.temperature,
            system: &request.system,
            messages: vec![Message {
                role: "user",
                content: &request.prompt,
            }],
        }
    }
}

fn into_completion(response: MessagesResponse) -> Completion {
    let text = response
        .content
        .iter()
        .filter(|b| b.block_type == "text")
        .filter_map(|b| b.text.as_deref())
        .collect::<Vec<_>>()
        .join("\n");
    let usage = response.usage.map_or_else(TokenUsage::default, |u| TokenUsage {
        prompt_tokens: u.input_tokens,
        completion_tokens: u.output_tokens,
    });
    Completion {
        text,
        usage,
        extensions: serde_json::json!({
            "stop_reason": response.stop_reason,
            "model": response.model,
        }),
    }
}

#[async_trait]
impl SummaryProvider for AnthropicProvider {
    fn id(&self) -> &ProviderId {
        &self.id
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        request: &ProviderRequest,
        timeout: Duration,
    ) -> Result<Completion, ProviderError> {
        let http = self
            .client
            .post(self.endpoint())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&self.body(request));
        let response: MessagesResponse = super::http::send_json(http, timeout).await?;
        Ok(into_completion(response))
    }
}
