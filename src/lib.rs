//! # Diagnostic Engine - Adaptive Learning Diagnosis
//!
//! Estimates what a learner knows across a graph of interdependent concepts,
//! chooses the next most useful question, traces failures back to weak
//! prerequisites, names the misconception behind each wrong answer, and
//! assembles a phased remediation plan.
//!
//! ## Core Concepts
//!
//! - **ConceptGraph**: Prerequisite DAG with a question bank per concept
//! - **MasteryModel**: 1PL IRT ability plus a forgetting curve, blended into mastery
//! - **AssessmentEngine**: Adaptive question selection and stopping rules
//! - **MisconceptionCatalog**: Maps specific wrong answers to named misconceptions
//! - **PrescriptionPlanner**: Root cause, diagnosis and resources as a treatment plan
//! - **DiagnosticEngine**: Per-session orchestration over a pluggable session store
//!
//! ## Usage
//!
//! ```rust,no_run
//! use diagnostic_engine::{DiagnosticEngine, EngineConfig, SelectionStrategy};
//!
//! # fn main() -> diagnostic_engine::DiagnosticResult<()> {
//! let engine = DiagnosticEngine::builtin(EngineConfig::default())?;
//! let session = engine.create_session()?;
//!
//! let question = engine.next_question(session, "determinants", SelectionStrategy::MaximumInformation)?;
//! let outcome = engine.submit_answer(session, question.id.as_str(), 0, None)?;
//! if let Some(diagnosis) = outcome.diagnosis {
//!     println!("{}", diagnosis.explanation);
//! }
//!
//! let prescription = engine.prescribe(session, "eigenvalues")?;
//! println!("{}", prescription.render_markdown());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)]

// Records and load-time validation
pub mod concept;
pub mod config;
pub mod error;
pub mod graph;

// Models
pub mod assessment;
pub mod mastery;
pub mod misconception;

// Planning
pub mod curator;
pub mod prescription;

// Sessions and orchestration
pub mod engine;
pub mod session;
pub mod storage;

// Re-export primary types at crate root for convenience
pub use assessment::{
    AssessmentEngine, CheckpointResult, QuizSummary, SelectionStrategy, StopDecision, StopReason,
};
pub use concept::{
    parse_option_letter, Concept, ConceptId, DifficultyTier, MasteryScores, Question, QuestionId,
};
pub use config::{AssessmentConfig, EngineConfig, MasteryConfig, PlannerConfig};
pub use curator::{
    ResourceCurator, ResourceDescriptor, ResourceKind, StaticResourceCurator, TreatmentPhaseKind,
};
pub use engine::DiagnosticEngine;
pub use error::{DiagnosticError, DiagnosticResult, ExecutionError, ValidationError};
pub use graph::{
    ConceptGraph, ConceptGraphBuilder, GraphSnapshot, GraphStats, MasteryBand, RootCause,
    RootCauseKind,
};
pub use mastery::{
    fisher_information, probability_correct, ConceptMasteryState, MasteryModel, MasteryUpdate,
    ResponseRecord, ReviewItem,
};
pub use misconception::{
    AnswerEvidence, Diagnosis, Misconception, MisconceptionCatalog, PatternAnalysis,
    RemediationPlan, Severity,
};
pub use prescription::{
    LearningPrescription, PrescriptionPlanner, TreatmentPhase, VerificationCriteria,
};
pub use session::{AnswerOutcome, AnswerRecord, DiagnosticSession, SessionId, TutorContext};
pub use storage::{InMemorySessionStore, SessionSnapshot, SessionStore, StoreError};
