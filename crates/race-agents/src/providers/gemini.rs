//! Google Gemini `generateContent` client.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use triangulation::{
    Completion, ProviderError, ProviderId, ProviderRequest, SummaryProvider, TokenUsage,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    prompt_feedback: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

pub struct GeminiProvider {
    id: ProviderId,
    model: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiProvider {
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
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    fn body<'a>(&self, request: &'a ProviderRequest) -> GenerateRequest<'a> {
        let system_instruction = (!request.system.is_empty()).then(|| Content {
            role: None,
            parts: vec![Part {
                text: &request.system,
            }],
        });
        GenerateRequest {
            system_instruction,
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part {
                    text: &request.prompt,
                }],
            }],
            generation_config: GenerationConfig {
                max_output_tokens: request.model_params.max_tokens,
                temperature: request.model_params.temperature,
            },
        }
    }
}

fn into_completion(response: GenerateResponse) -> Result<Completion, ProviderError> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        // Blocked prompts come back with feedback and no candidates.
        return Err(ProviderError::api(
            None,
            format!(
                "no candidates returned (prompt feedback: {})",
                response.prompt_feedback.unwrap_or_default()
            ),
        ));
    };
    let text = candidate
        .content
        .map(|c| {
            c.parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();
    let usage = response
        .usage_metadata
        .map_or_else(TokenUsage::default, |u| TokenUsage {
            prompt_tokens: u.prompt_token_count,
            completion_tokens: u.candidates_token_count,
        });
    Ok(Completion {
        text,
        usage,
        extensions: serde_json::json!({ "finish_reason": candidate.finish_reason }),
    })
}

#[async_trait]
impl SummaryProvider for GeminiProvider {
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
            .header("x-goog-api-key", &self.api_key)
            .json(&self.body(request));
        let response: GenerateResponse = super::http::send_json(http, timeout).await?;
        into_completion(response)
    }
}
