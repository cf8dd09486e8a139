use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{ChatRequest, ChatTurn, LlmProvider, LlmResponse, SearchHit, UsageMetadata};

/// Remote LLM provider using OpenAI-compatible HTTP API.
/// Works against OpenAI and Perplexity chat completion endpoints.
pub struct RemoteLlmProvider {
    base_url: String,
    api_key: String,
    model: String,
    default_timeout: Duration,
    default_max_tokens: usize,
    default_temperature: f32,
    client: reqwest::Client,
}

impl RemoteLlmProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            default_timeout: Duration::from_secs(30),
            default_max_tokens: 500,
            default_temperature: 0.7,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_defaults(mut self, timeout_secs: u64, max_tokens: usize, temperature: f32) -> Self {
        self.default_timeout = Duration::from_secs(timeout_secs);
        self.default_max_tokens = max_tokens;
        self.default_temperature = temperature;
        self
    }

}

#[async_trait::async_trait]
impl LlmProvider for RemoteLlmProvider {
    async fn chat(&self, request: ChatRequest) -> Result<LlmResponse> {
        let timeout = request
            .timeout_seconds
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout);

        let req_body = OpenAiRequest {
            model: &self.model,
            messages: &request.messages,
            max_tokens: Some(request.max_tokens.unwrap_or(self.default_max_tokens)),
            temperature: Some(request.temperature.unwrap_or(self.default_temperature)),
        };

        debug!(model = %self.model, turns = request.messages.len(), "sending chat completion");

        // The timeout covers sending and reading the body
        let body = tokio::time::timeout(timeout, async {
            let response = self
                .client
                .post(&self.base_url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&req_body)
                .send()
                .await
                .context("LLM HTTP request failed")?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                anyhow::bail!("LLM API error {}: {}", status, body);
            }

            response
                .json::<OpenAiResponse>()
                .await
                .context("Failed to parse LLM response")
        })
        .await
        .context("LLM request timed out")??;

        let choice = body.choices.first().context("LLM response has no choices")?;

        let usage = body
            .usage
            .map(|u| UsageMetadata {
                prompt_tokens: u.prompt_tokens.unwrap_or(0),
                completion_tokens: u.completion_tokens.unwrap_or(0),
                total_tokens: u.total_tokens.unwrap_or(0),
            })
            .unwrap_or_default();

        // Perplexity returns either rich `search_results` or a bare `citations` url list
        let search_results = body.search_results.unwrap_or_default();
        let search_hits = if !search_results.is_empty() {
            search_results
        } else {
            body.citations
                .unwrap_or_default()
                .into_iter()
                .map(|url| SearchHit { url, title: None })
                .collect()
        };

        Ok(LlmResponse {
            content: choice.message.content.clone().unwrap_or_default(),
            usage,
            model: body.model.unwrap_or_else(|| self.model.clone()),
            search_hits,
        })
    }
}

// OpenAI API request/response structures
#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: &'a [ChatTurn],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    model: Option<String>,
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
    #[serde(default)]
    search_results: Option<Vec<SearchHit>>,
    #[serde(default)]
    citations: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    // null on refusals
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: Option<usize>,
    #[serde(default)]
    completion_tokens: Option<usize>,
    #[serde(default)]
    total_tokens: Option<usize>,
}
