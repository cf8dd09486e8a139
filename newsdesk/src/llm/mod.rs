use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

use common::{LlmConfig, RemoteLlmConfig};

pub mod remote;

/// Core trait for LLM providers
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Run a multi-turn chat completion
    async fn chat(&self, request: ChatRequest) -> Result<LlmResponse>;

    /// Generate completion for a single prompt
    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse> {
        self.chat(ChatRequest {
            messages: vec![ChatTurn::new(Role::User, request.prompt)],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            timeout_seconds: request.timeout_seconds,
        })
        .await
    }
}

/// Author of a chat turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message of a chat completion request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Request structure for single-prompt generation
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub prompt: String,
    pub max_tokens: Option<usize>,
    pub temperature: Option<f32>,
    pub timeout_seconds: Option<u64>,
}

/// Request structure for multi-turn chat
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatTurn>,
    pub max_tokens: Option<usize>,
    pub temperature: Option<f32>,
    pub timeout_seconds: Option<u64>,
}

/// Response from LLM generation
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub usage: UsageMetadata,
    pub model: String,
    /// Web results attached by search-backed models (Perplexity style), in rank order
    pub search_hits: Vec<SearchHit>,
}

/// One web result returned alongside a completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
}

/// Token usage metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageMetadata {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

/// Which configured endpoint a provider is built for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmTask {
    /// Article chat (interactive, fast)
    Chat,
    /// Source discovery (search-backed model)
    Search,
}

/// Pick the endpoint config for `task`, falling back to `[llm.remote]`
pub fn endpoint_config(llm_config: &LlmConfig, task: LlmTask) -> Option<&RemoteLlmConfig> {
    let specific = match task {
        LlmTask::Chat => llm_config.chat.as_ref(),
        LlmTask::Search => llm_config.search.as_ref(),
    };
    specific.or(llm_config.remote.as_ref())
}

/// Create an LLM provider based on configuration and task
pub fn from_config(llm_config: &LlmConfig, task: LlmTask) -> Result<Box<dyn LlmProvider>> {
    let adapter = llm_config.adapter.as_deref().unwrap_or("none");
    match adapter {
        "remote" => {
            let remote_config = endpoint_config(llm_config, task).ok_or_else(|| {
                anyhow::anyhow!("Remote adapter selected but no LLM config found for {:?}", task)
            })?;

            // Fetch API key from env var
            let api_key_env = remote_config
                .api_key_env
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("Missing api_key_env in remote config"))?;
            let api_key = std::env::var(api_key_env)
                .with_context(|| format!("LLM API key env var '{}' not set", api_key_env))?;

            let model = remote_config
                .model
                .clone()
                .unwrap_or_else(|| "gpt-4o-mini".to_string());
            let api_url = remote_config
                .api_url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1/chat/completions".to_string());

            let provider = remote::RemoteLlmProvider::new(api_url, api_key, model).with_defaults(
                remote_config.timeout_seconds.unwrap_or(30),
                remote_config.max_tokens.unwrap_or(500),
                remote_config.temperature.unwrap_or(0.7),
            );
            Ok(Box::new(provider))
        }
        "none" => anyhow::bail!("LLM adapter is disabled (llm.adapter = \"none\")"),
        _ => anyhow::bail!("Unknown LLM adapter type: {}", adapter),
    }
}
