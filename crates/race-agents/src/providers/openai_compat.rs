//! OpenAI chat-completions client. Also serves xAI and other compatible
//! gateways through a different base URL.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use triangulation::{
    Completion, ProviderError, ProviderId, ProviderRequest, SummaryProvider, TokenUsage,
};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

pub struct OpenAiCompatProvider {
    id: ProviderId,
    model: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
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
        format!("{}/chat/completions", self.base_url)
    }

    fn body<'a>(&'a self, request: &'a ProviderRequest) -> ChatRequest<'a> {
        let mut messages = Vec::with_capacity(2);
        if !request.system.is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: &request.system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });
        ChatRequest {
            model: &self.model,
            messages,
            max_tokens: request.model_params.max_tokens,
            temperature: request.model_params.temperature,
        }
    }
}

fn into_completion(response: ChatResponse) -> Result<Completion, ProviderError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::api(None, "response contained no choices"))?;
    let usage = response.usage.map_or_else(TokenUsage::default, |u| TokenUsage {
        prompt_tokens: u.prompt_tokens,
        completion_tokens: u.completion_tokens,
    });
    Ok(Completion {
        text: choice.message.content.unwrap_or_default(),
        usage,
        extensions: serde_json::json!({
            "finish_reason": choice.finish_reason,
            "model": response.model,
        }),
    })
}

#[async_trait]
impl SummaryProvider for OpenAiCompatProvider {
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
            .bearer_auth(&self.api_key)
            .json(&self.body(request));
        let response: ChatResponse = super::http::send_json(http, timeout).await?;
        into_completion(response)
    }
}
