use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::SessionError;
use crate::llm::Role;
use crate::sources::Source;

pub mod chat;

/// Opaque session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Ended,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionStatus::Active => "active",
            SessionStatus::Ended => "ended",
        })
    }
}

/// ChatMessage represents a single message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Article details a session was opened with, used to ground chat replies
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArticleContext {
    pub title: Option<String>,
    pub content: Option<String>,
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub impact_score: Option<i32>,
}

/// Session represents one chat about one article
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub article_id: String,
    pub context: ArticleContext,
    pub messages: Vec<ChatMessage>,
    pub status: SessionStatus,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub updated_at: DateTime<Utc>,
}

impl Session {
    fn new(article_id: String, context: ArticleContext) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            article_id,
            context,
            messages: Vec::new(),
            status: SessionStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }
}

/// Listing entry for a session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub article_id: String,
    pub status: SessionStatus,
    pub message_count: usize,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub updated_at: DateTime<Utc>,
}

/// In-memory session store.
///
/// Owns every session; callers only receive clones. Each operation holds the
/// lock for a short synchronous section, so appends to one session are
/// serialized. Nothing is persisted: dropping the store drops all sessions.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<SessionId, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    // The map is only mutated through complete single-step updates, so a
    // poisoned lock still guards consistent data.
    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create an empty active session anchored to `article_id`
    pub fn create(&self, article_id: impl Into<String>) -> SessionId {
        self.create_with_context(article_id, ArticleContext::default(), None)
    }

    /// Create a session carrying article context, optionally seeded with an
    /// assistant greeting
    pub fn create_with_context(
        &self,
        article_id: impl Into<String>,
        context: ArticleContext,
        greeting: Option<&str>,
    ) -> SessionId {
        let mut session = Session::new(article_id.into(), context);
        if let Some(greeting) = greeting.filter(|g| !g.trim().is_empty()) {
            session.messages.push(ChatMessage::assistant(greeting));
        }
        let id = session.id;
        info!(session_id = %id, article_id = %session.article_id, "created session");
        self.lock().insert(id, session);
        id
    }

    /// Append a message to an active session
    pub fn append(&self, id: SessionId, message: ChatMessage) -> Result<(), SessionError> {
        let mut sessions = self.lock();
        let session = sessions.get_mut(&id).ok_or(SessionError::NotFound(id))?;
        if !session.is_active() {
            return Err(SessionError::InvalidState {
                id,
                status: session.status,
            });
        }
        session.updated_at = message.created_at.max(session.updated_at);
        session.messages.push(message);
        debug!(session_id = %id, messages = session.messages.len(), "appended message");
        Ok(())
    }

    /// Convenience wrapper around `append` returning the stored message
    pub fn append_message(
        &self,
        id: SessionId,
        role: Role,
        content: impl Into<String>,
    ) -> Result<ChatMessage, SessionError> {
        let message = ChatMessage::new(role, content);
        self.append(id, message.clone())?;
        Ok(message)
    }

    /// Snapshot of a session
    pub fn get(&self, id: SessionId) -> Result<Session, SessionError> {
        self.lock()
            .get(&id)
            .cloned()
            .ok_or(SessionError::NotFound(id))
    }

    pub fn messages(&self, id: SessionId) -> Result<Vec<ChatMessage>, SessionError> {
        self.lock()
            .get(&id)
            .map(|s| s.messages.clone())
            .ok_or(SessionError::NotFound(id))
    }

    pub fn article_id(&self, id: SessionId) -> Result<String, SessionError> {
        self.lock()
            .get(&id)
            .map(|s| s.article_id.clone())
            .ok_or(SessionError::NotFound(id))
    }

    /// Mark a session ended. Ending an ended session is a no-op.
    pub fn end(&self, id: SessionId) -> Result<(), SessionError> {
        let mut sessions = self.lock();
        let session = sessions.get_mut(&id).ok_or(SessionError::NotFound(id))?;
        if session.is_active() {
            session.status = SessionStatus::Ended;
            session.updated_at = Utc::now();
            info!(session_id = %id, messages = session.messages.len(), "ended session");
        }
        Ok(())
    }

    /// Sessions ordered most recently updated first
    pub fn list(&self) -> Vec<SessionSummary> {
        let mut out: Vec<SessionSummary> = self
            .lock()
            .values()
            .map(|s| SessionSummary {
                id: s.id,
                article_id: s.article_id.clone(),
                status: s.status,
                message_count: s.messages.len(),
                updated_at: s.updated_at,
            })
            .collect();
        out.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        out
    }

    /// Drop ended sessions, returning how many were removed
    pub fn purge_ended(&self) -> usize {
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|_, s| s.is_active());
        before - sessions.len()
    }

    /// Drop every session (service shutdown)
    pub fn clear(&self) -> usize {
        let mut sessions = self.lock();
        let count = sessions.len();
        sessions.clear();
        if count > 0 {
            info!(count, "cleared session store");
        }
        count
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
