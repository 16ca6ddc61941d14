//! Collaborator contracts consumed by the query cache and mutation coordinator.

use async_trait::async_trait;

use crate::models::{CreateNoteRequest, CreateTopicRequest, Note, SessionInfo, Topic};

/// Failure reported by a remote collaborator.
///
/// Cloneable so it can be fanned out to every subscriber of a mutation's failure event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The request never produced a response (connection refused, timeout, ...)
    Transport(String),
    /// The server answered with an error envelope
    Api {
        status: u16,
        code: String,
        message: String,
    },
    /// The response body could not be decoded
    Decode(String),
}

impl StoreError {
    /// Error code of an API failure, if the server produced one.
    pub fn code(&self) -> Option<&str> {
        match self {
            StoreError::Api { code, .. } => Some(code),
            _ => None,
        }
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Transport(msg) => write!(f, "transport error: {}", msg),
            StoreError::Api {
                status,
                code,
                message,
            } => write!(f, "{} ({}): {}", code, status, message),
            StoreError::Decode(msg) => write!(f, "decode error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

/// Issues and validates user sessions.
#[async_trait]
pub trait SessionAuthority: Send + Sync {
    /// The current session, or `None` when signed out.
    async fn current_session(&self) -> Result<Option<SessionInfo>, StoreError>;

    async fn sign_in(&self, name: &str) -> Result<SessionInfo, StoreError>;

    async fn sign_out(&self) -> Result<(), StoreError>;
}

/// The authoritative store of topics and notes.
///
/// None of these operations is idempotent: a retried create produces a duplicate.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn list_topics(&self) -> Result<Vec<Topic>, StoreError>;

    async fn create_topic(&self, request: &CreateTopicRequest) -> Result<Topic, StoreError>;

    async fn list_notes(&self, topic_id: &str) -> Result<Vec<Note>, StoreError>;

    async fn create_note(&self, request: &CreateNoteRequest) -> Result<Note, StoreError>;

    async fn delete_note(&self, id: &str) -> Result<(), StoreError>;
}
