//! Abstract session store.
//!
//! The store is the single source of truth for per-session state. The engine
//! reads a session, applies one request and writes the result back while
//! holding that session's writer lock.

use thiserror::Error;

use crate::concept::QuestionId;
use crate::error::{DiagnosticError, ExecutionError};
use crate::mastery::ConceptMasteryState;
use crate::session::{AnswerRecord, SessionId};

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Session not found.
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    /// Session already exists.
    #[error("Duplicate session: {0}")]
    DuplicateSession(SessionId),

    /// Backend error.
    #[error("Storage backend error: {0}")]
    BackendError(String),
}

impl From<StoreError> for DiagnosticError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::SessionNotFound(id) => Self::Execution(ExecutionError::SessionNotFound {
                id: id.to_string(),
            }),
            other => Self::Execution(ExecutionError::Storage {
                message: other.to_string(),
            }),
        }
    }
}

/// Everything persisted for one session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    /// Per-concept mastery.
    pub mastery: Vec<ConceptMasteryState>,
    /// Answers, oldest first.
    pub answers: Vec<AnswerRecord>,
}

/// Storage for per-session mastery and answer history.
///
/// # Safety Considerations
/// - `record_answer` must apply the answer and the mastery states atomically
/// - Implementations should handle concurrent access safely
pub trait SessionStore: Send + Sync {
    /// Create an empty session. Returns error if the id already exists.
    fn create(&self, id: SessionId) -> Result<(), StoreError>;

    /// Returns true if the session exists.
    fn exists(&self, id: SessionId) -> Result<bool, StoreError>;

    /// Delete a session. Returns error if not found.
    fn delete(&self, id: SessionId) -> Result<(), StoreError>;

    /// Load a session's full state.
    fn load(&self, id: SessionId) -> Result<SessionSnapshot, StoreError>;

    /// Per-concept mastery states.
    fn get_mastery(&self, id: SessionId) -> Result<Vec<ConceptMasteryState>, StoreError>;

    /// Replace the per-concept mastery states.
    fn set_mastery(&self, id: SessionId, mastery: Vec<ConceptMasteryState>) -> Result<(), StoreError>;

    /// Ids of answered questions, in answer order.
    fn answered_question_ids(&self, id: SessionId) -> Result<Vec<QuestionId>, StoreError>;

    /// Append an answer and replace mastery in one write.
    fn record_answer(
        &self,
        id: SessionId,
        answer: AnswerRecord,
        mastery: Vec<ConceptMasteryState>,
    ) -> Result<(), StoreError>;

    /// Clear a session's mastery and answers, keeping the session.
    fn reset(&self, id: SessionId) -> Result<(), StoreError>;

    /// All session ids, sorted.
    fn session_ids(&self) -> Result<Vec<SessionId>, StoreError>;
}
