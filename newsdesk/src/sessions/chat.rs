use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Mutex as TurnLock;
use tracing::{error, info};

use super::{ArticleContext, ChatMessage, Session, SessionId, SessionStore};
use crate::error::{ChatError, ContractError, SessionError};
use crate::llm::{ChatRequest, ChatTurn, LlmProvider, Role, UsageMetadata};
use crate::sources::Source;

const SYSTEM_PROMPT: &str = "You are a helpful analyst assistant discussing the provided article. \
Focus on the article's content, themes and related topics: clarify terms and concepts and give \
useful context. If a question is unrelated to the article, politely steer back to it. \
Answer in plain text without formatting.";

/// Payload for opening a chat about an article
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionCreateRequest {
    pub article_id: String,
    pub article_title: String,
    pub article_content: String,
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub impact_score: Option<i32>,
}

impl SessionCreateRequest {
    pub fn validate(&self) -> Result<(), ContractError> {
        if self.article_id.trim().is_empty() {
            return Err(ContractError::EmptyField("article_id"));
        }
        if self.article_title.trim().is_empty() {
            return Err(ContractError::EmptyField("article_title"));
        }
        if self.article_content.trim().is_empty() {
            return Err(ContractError::EmptyField("article_content"));
        }
        Ok(())
    }
}

/// Result of opening a session
#[derive(Debug, Clone, Serialize)]
pub struct OpenedSession {
    pub session_id: SessionId,
    pub messages: Vec<ChatMessage>,
}

/// Result of one chat turn
#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub reply: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip)]
    pub usage: UsageMetadata,
}

/// Build the system prompt grounding replies in the session's article
pub fn build_system_prompt(session: &Session) -> String {
    let ctx = &session.context;
    let mut prompt = String::from(SYSTEM_PROMPT);

    if ctx.title.is_none() && ctx.content.is_none() {
        prompt.push_str(&format!(
            "\nYou are discussing article {}. Use the conversation so far for context.",
            session.article_id
        ));
        return prompt;
    }

    if let Some(title) = &ctx.title {
        prompt.push_str(&format!("\n\nArticle Title: {}", title));
    }
    if let Some(score) = ctx.impact_score {
        prompt.push_str(&format!("\nImpact Score: {}", score));
    }
    if !ctx.tags.is_empty() {
        prompt.push_str(&format!("\nTags: {}", ctx.tags.join(", ")));
    }
    if let Some(content) = &ctx.content {
        prompt.push_str(&format!("\n\nArticle Content:\n{}", content));
    }
    if !ctx.sources.is_empty() {
        prompt.push_str("\n\nSources:\n");
        for source in &ctx.sources {
            let label = source.title.as_deref().unwrap_or(&source.domain);
            let link = source.url.as_deref().unwrap_or(&source.domain);
            match source.display_index {
                Some(idx) => prompt.push_str(&format!("[{}] {} ({})\n", idx, label, link)),
                None => prompt.push_str(&format!("- {} ({})\n", label, link)),
            }
        }
    }
    prompt
}

/// Article chat on top of the session store and an LLM provider.
///
/// A session takes one turn at a time: concurrent `send` calls on the same
/// session queue up, so each prompt carries the previous reply.
pub struct ChatService {
    store: Arc<SessionStore>,
    llm: Arc<dyn LlmProvider>,
    greeting: Option<String>,
    max_tokens: Option<usize>,
    turns: Mutex<HashMap<SessionId, Arc<TurnLock<()>>>>,
}

impl ChatService {
    pub fn new(store: Arc<SessionStore>, llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            store,
            llm,
            greeting: None,
            max_tokens: None,
            turns: Mutex::new(HashMap::new()),
        }
    }

    fn turn_lock(&self, id: SessionId) -> Arc<TurnLock<()>> {
        let mut turns = self.turns.lock().unwrap_or_else(PoisonError::into_inner);
        turns.entry(id).or_default().clone()
    }

    pub fn with_greeting(mut self, greeting: Option<String>) -> Self {
        self.greeting = greeting;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Validate the payload and open a session with its article context
    pub fn open(&self, request: SessionCreateRequest) -> Result<OpenedSession, ChatError> {
        request.validate()?;
        let context = ArticleContext {
            title: Some(request.article_title),
            content: Some(request.article_content),
            sources: request.sources,
            tags: request.tags,
            impact_score: request.impact_score,
        };
        let session_id =
            self.store
                .create_with_context(request.article_id, context, self.greeting.as_deref());
        let messages = self.store.messages(session_id)?;
        Ok(OpenedSession {
            session_id,
            messages,
        })
    }

    /// Send a user message and return the assistant's reply.
    ///
    /// The user message stays in the history even if the provider fails, so a
    /// retry sees what was asked.
    pub async fn send(&self, id: SessionId, text: &str) -> Result<ChatReply, ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ContractError::EmptyField("message").into());
        }

        // Unknown ids fail here without registering a turn lock
        self.store.get(id)?;
        let lock = self.turn_lock(id);
        let _turn = lock.lock().await;

        let session = self.store.get(id)?;
        if !session.is_active() {
            return Err(SessionError::InvalidState {
                id,
                status: session.status,
            }
            .into());
        }
        self.store.append_message(id, Role::User, text)?;

        let mut turns = Vec::with_capacity(session.messages.len() + 2);
        turns.push(ChatTurn::new(Role::System, build_system_prompt(&session)));
        turns.extend(
            session
                .messages
                .iter()
                .filter(|m| m.role != Role::System)
                .map(|m| ChatTurn::new(m.role, m.content.clone())),
        );
        turns.push(ChatTurn::new(Role::User, text));

        let response = self
            .llm
            .chat(ChatRequest {
                messages: turns,
                max_tokens: self.max_tokens,
                temperature: None,
                timeout_seconds: None,
            })
            .await
            .map_err(|e| {
                error!(session_id = %id, "chat completion failed: {:#}", e);
                ChatError::Provider(e)
            })?;

        self.store
            .append_message(id, Role::Assistant, response.content.clone())?;
        info!(
            session_id = %id,
            tokens = response.usage.total_tokens,
            "chat reply stored"
        );

        Ok(ChatReply {
            reply: response.content,
            messages: self.store.messages(id)?,
            usage: response.usage,
        })
    }

    /// End the session
    pub fn close(&self, id: SessionId) -> Result<(), ChatError> {
        self.store.end(id)?;
        self.turns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        Ok(())
    }
}
