//! Typed errors for the core components.
//!
//! The application layers (config, LLM adapter, CLI) report through `anyhow`;
//! these enums exist where a caller needs to branch on the failure kind.

use thiserror::Error;

use crate::sessions::{SessionId, SessionStatus};

/// Failures of Session Store operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(SessionId),

    #[error("session {id} is {status} and cannot be modified")]
    InvalidState { id: SessionId, status: SessionStatus },
}

/// Inbound payload rejected at the boundary
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ContractError {
    #[error("source candidate has neither a domain nor a url")]
    MissingDomain,

    #[error("source candidate {domain} has a non-finite score")]
    InvalidScore { domain: String },

    #[error("field `{0}` must not be empty")]
    EmptyField(&'static str),
}

/// Failures of a chat turn
#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Contract(#[from] ContractError),

    #[error("LLM provider failed: {0:#}")]
    Provider(anyhow::Error),
}
