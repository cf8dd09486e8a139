// Library interface for newsdesk modules
// This allows tests and the binary to import modules

pub mod error;
pub mod llm;
pub mod sectors;
pub mod sessions;
pub mod sources;

pub use error::{ChatError, ContractError, SessionError};
pub use sessions::{Session, SessionId, SessionStore};
pub use sources::{Source, SourceFilter};
