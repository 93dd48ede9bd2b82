//! Error types for the diagnostic engine.
//!
//! Errors are strongly typed using thiserror and split by when they can
//! occur: validation errors surface while loading graphs, catalogs and
//! configuration (fatal at startup), execution errors surface per request
//! and are returned to the caller as typed failures.

use thiserror::Error;

use crate::concept::{ConceptId, QuestionId};

/// Validation errors raised while constructing graphs, catalogs or config.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid concept graph: {reason}")]
    InvalidGraph {
        reason: String,
    },

    #[error("Concept '{concept}' lists unknown prerequisite '{prerequisite}'")]
    UnknownPrerequisite {
        concept: String,
        prerequisite: String,
    },

    #[error("Duplicate {kind} id: {id}")]
    DuplicateId {
        kind: &'static str,
        id: String,
    },

    #[error("Invalid {kind} id '{id}'")]
    InvalidId {
        kind: &'static str,
        id: String,
    },

    #[error("Required field '{field}' is empty")]
    EmptyField {
        field: String,
    },

    #[error("Question '{question}' has correct option {correct} but only {options} options")]
    InvalidCorrectOption {
        question: String,
        correct: usize,
        options: usize,
    },

    #[error("Difficulty tier {tier} is not one of 1, 2, 3")]
    InvalidTier {
        tier: u8,
    },

    #[error("Threshold '{name}' = {value} is out of range [0.0, 1.0]")]
    ThresholdOutOfRange {
        name: String,
        value: f64,
    },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },

    #[error("Failed to parse {what}: {message}")]
    Parse {
        what: String,
        message: String,
    },
}

/// Execution errors returned by per-request operations.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Concept not found: {id}")]
    ConceptNotFound {
        id: ConceptId,
    },

    #[error("Question not found: {id}")]
    QuestionNotFound {
        id: QuestionId,
    },

    #[error("Session not found: {id}")]
    SessionNotFound {
        id: String,
    },

    #[error("Option {chosen} is out of range for question {question} ({options} options)")]
    InvalidAnswer {
        question: QuestionId,
        chosen: usize,
        options: usize,
    },

    #[error("Question {question} was already answered in this session")]
    AlreadyAnswered {
        question: QuestionId,
    },

    #[error("No unseen questions left for concept {concept}")]
    NoQuestionsAvailable {
        concept: ConceptId,
    },

    #[error("Storage error: {message}")]
    Storage {
        message: String,
    },
}

/// Top-level error type for the diagnostic engine.
#[derive(Debug, Error)]
pub enum DiagnosticError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl DiagnosticError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Shorthand for a concept lookup failure.
    #[must_use]
    pub fn concept_not_found(id: &ConceptId) -> Self {
        Self::Execution(ExecutionError::ConceptNotFound { id: id.clone() })
    }

    /// Shorthand for a question lookup failure.
    #[must_use]
    pub fn question_not_found(id: &QuestionId) -> Self {
        Self::Execution(ExecutionError::QuestionNotFound { id: id.clone() })
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is an execution error.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Returns true if an id (concept, question, session) could not be resolved.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Execution(
                ExecutionError::ConceptNotFound { .. }
                    | ExecutionError::QuestionNotFound { .. }
                    | ExecutionError::SessionNotFound { .. }
            )
        )
    }

    /// Returns true if the caller can recover without changing its request,
    /// i.e. the concept's question bank is exhausted.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Execution(ExecutionError::NoQuestionsAvailable { .. })
        )
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) => false,
            Self::Execution(e) => matches!(e, ExecutionError::Storage { .. }),
            Self::Internal { .. } => false,
        }
    }
}

/// Result type alias for diagnostic engine operations.
pub type DiagnosticResult<T> = Result<T, DiagnosticError>;

/// Rejects thresholds outside [0.0, 1.0] (NaN included).
pub(crate) fn ensure_unit_interval(name: &str, value: f64) -> Result<(), ValidationError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::ThresholdOutOfRange {
            name: name.to_string(),
            value,
        })
    }
}
