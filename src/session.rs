//! Per-session learner state.
//!
//! A [`DiagnosticSession`] owns one learner's [`MasteryModel`] and
//! [`AssessmentEngine`] and shares the read-only graph and catalog. Sessions
//! are rebuilt from the session store on every request; see
//! [`crate::engine::DiagnosticEngine`].

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::assessment::{AssessmentEngine, SelectionStrategy, StopDecision};
use crate::concept::{ConceptId, MasteryScores, Question, QuestionId};
use crate::config::EngineConfig;
use crate::error::{DiagnosticError, DiagnosticResult, ExecutionError, ValidationError};
use crate::graph::ConceptGraph;
use crate::mastery::{ConceptMasteryState, MasteryModel, MasteryUpdate, ResponseRecord};
use crate::misconception::{AnswerEvidence, Diagnosis, Misconception, MisconceptionCatalog};

/// Unique identifier for a learner session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Creates a new random session id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
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
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| ValidationError::InvalidId {
                kind: "session",
                id: s.to_string(),
            })
    }
}

/// RNG seed for a session at a given point in its history.
///
/// Replaying a request against the same stored state selects the same
/// question.
#[must_use]
pub fn session_seed(id: SessionId, responses: usize) -> u64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(id.as_uuid().as_bytes());
    hasher.update(&(responses as u64).to_le_bytes());
    let digest = hasher.finalize();
    let mut seed = [0u8; 8];
    seed.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_le_bytes(seed)
}

/// One answered question as persisted by the session store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    /// Scored response.
    pub response: ResponseRecord,
    /// Option the learner chose.
    pub chosen: usize,
    /// Correct option.
    pub correct_option: usize,
}

impl AnswerRecord {
    /// The answer as classifier input.
    #[must_use]
    pub fn evidence(&self) -> AnswerEvidence {
        AnswerEvidence {
            question: self.response.question.clone(),
            concept: self.response.concept.clone(),
            chosen: self.chosen,
            correct: self.correct_option,
        }
    }
}

/// Result of submitting an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerOutcome {
    /// Question answered.
    pub question: QuestionId,
    /// Its concept.
    pub concept: ConceptId,
    /// Whether the answer was correct.
    pub correct: bool,
    /// Correct option, for feedback.
    pub correct_option: usize,
    /// Question explanation, for feedback.
    pub explanation: String,
    /// Mastery change.
    pub update: MasteryUpdate,
    /// Misconception behind a wrong answer.
    pub diagnosis: Option<Diagnosis>,
    /// Persisted record.
    pub record: AnswerRecord,
}

/// Context handed to the dialogue layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TutorContext {
    /// Concept under discussion.
    pub concept: ConceptId,
    /// Its display name.
    pub concept_name: String,
    /// Current mastery.
    pub mastery: f64,
    /// Current correct streak.
    pub streak: u32,
    /// Catalogued misconceptions seen on this concept, most severe first.
    pub misconceptions: Vec<Misconception>,
}

/// One learner's mastery and testing state.
#[derive(Debug, Clone)]
pub struct DiagnosticSession {
    id: SessionId,
    graph: Arc<ConceptGraph>,
    catalog: Arc<MisconceptionCatalog>,
    mastery: MasteryModel,
    assessment: AssessmentEngine,
    answers: Vec<AnswerRecord>,
}

impl DiagnosticSession {
    /// Starts an empty session.
    #[must_use]
    pub fn new(
        id: SessionId,
        graph: Arc<ConceptGraph>,
        catalog: Arc<MisconceptionCatalog>,
        config: &EngineConfig,
    ) -> Self {
        Self::restore(id, graph, catalog, config, Vec::new(), Vec::new())
    }

    /// Rebuilds a session from stored mastery states and answers.
    #[must_use]
    pub fn restore(
        id: SessionId,
        graph: Arc<ConceptGraph>,
        catalog: Arc<MisconceptionCatalog>,
        config: &EngineConfig,
        mastery: Vec<ConceptMasteryState>,
        answers: Vec<AnswerRecord>,
    ) -> Self {
        let responses: Vec<ResponseRecord> = answers.iter().map(|a| a.response.clone()).collect();
        let assessment = AssessmentEngine::from_parts(
            config.assessment.clone(),
            Vec::<QuestionId>::new(),
            responses,
            session_seed(id, answers.len()),
        );
        Self {
            id,
            graph,
            catalog,
            mastery: MasteryModel::from_states(config.mastery.clone(), mastery),
            assessment,
            answers,
        }
    }

    /// Session id.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Shared concept graph.
    #[must_use]
    pub fn graph(&self) -> &ConceptGraph {
        &self.graph
    }

    /// Mastery state.
    #[must_use]
    pub const fn mastery(&self) -> &MasteryModel {
        &self.mastery
    }

    /// Testing state.
    #[must_use]
    pub const fn assessment(&self) -> &AssessmentEngine {
        &self.assessment
    }

    /// Answers, oldest first.
    #[must_use]
    pub fn answers(&self) -> &[AnswerRecord] {
        &self.answers
    }

    /// Returns true if `question` has a recorded answer.
    #[must_use]
    pub fn is_answered(&self, question: &str) -> bool {
        self.answers
            .iter()
            .any(|a| a.response.question.as_str() == question)
    }

    /// All answers as classifier input.
    #[must_use]
    pub fn evidence(&self) -> Vec<AnswerEvidence> {
        self.answers.iter().map(AnswerRecord::evidence).collect()
    }

    /// Answers on `failed` and its ancestors, the evidence a prescription
    /// for `failed` may draw on.
    ///
    /// # Errors
    ///
    /// Returns `ConceptNotFound` for unknown concepts.
    pub fn evidence_for(&self, failed: &str) -> DiagnosticResult<Vec<AnswerEvidence>> {
        let mut scope: HashSet<&ConceptId> =
            self.graph.all_ancestors_of(failed)?.into_iter().collect();
        scope.insert(&self.graph.concept(failed)?.id);
        Ok(self
            .answers
            .iter()
            .filter(|a| scope.contains(&a.response.concept))
            .map(AnswerRecord::evidence)
            .collect())
    }

    /// Mastery of every concept in the graph; unpracticed concepts take the
    /// configured default.
    #[must_use]
    pub fn graph_scores(&self) -> MasteryScores {
        self.mastery
            .scores_over(self.graph.concepts().map(|c| &c.id))
    }

    /// Picks the next question for `concept`.
    ///
    /// # Errors
    ///
    /// `ConceptNotFound`, or `NoQuestionsAvailable` once the bank is exhausted.
    pub fn next_question(
        &mut self,
        concept: &str,
        strategy: SelectionStrategy,
    ) -> DiagnosticResult<&Question> {
        self.assessment
            .select_next(&self.graph, &self.mastery, concept, strategy)
    }

    /// A checkpoint quiz for `concept`.
    ///
    /// # Errors
    ///
    /// Returns `ConceptNotFound` for unknown concepts.
    pub fn checkpoint(&mut self, concept: &str) -> DiagnosticResult<Vec<&Question>> {
        self.assessment
            .generate_checkpoint(&self.graph, &self.mastery, concept)
    }

    /// Stopping rule for `concept`.
    #[must_use]
    pub fn should_stop(&self, concept: &str) -> StopDecision {
        self.assessment.should_stop(concept, &self.mastery)
    }

    /// Scores and records an answer timestamped now.
    ///
    /// # Errors
    ///
    /// See [`Self::submit_answer_at`].
    pub fn submit_answer(
        &mut self,
        question: &str,
        chosen: usize,
        latency_ms: Option<u64>,
    ) -> DiagnosticResult<AnswerOutcome> {
        self.submit_answer_at(question, chosen, latency_ms, Utc::now())
    }

    /// Scores an answer, updates mastery and classifies wrong answers.
    ///
    /// # Errors
    ///
    /// Returns `QuestionNotFound` for unknown questions, `InvalidAnswer`
    /// if `chosen` is not one of the question's options, and
    /// `AlreadyAnswered` if the question already has a recorded response.
    pub fn submit_answer_at(
        &mut self,
        question: &str,
        chosen: usize,
        latency_ms: Option<u64>,
        now: DateTime<Utc>,
    ) -> DiagnosticResult<AnswerOutcome> {
        let graph = Arc::clone(&self.graph);
        let question = graph.question(question)?;
        if chosen >= question.options.len() {
            return Err(ExecutionError::InvalidAnswer {
                question: question.id.clone(),
                chosen,
                options: question.options.len(),
            }
            .into());
        }
        if self.is_answered(question.id.as_str()) {
            return Err(ExecutionError::AlreadyAnswered {
                question: question.id.clone(),
            }
            .into());
        }

        let correct = question.is_correct(chosen);
        let update =
            self.assessment
                .record_response_at(question, correct, latency_ms, &mut self.mastery, now);
        let diagnosis =
            self.catalog
                .classify(&question.id, &question.concept, chosen, question.correct);

        let response = self
            .assessment
            .responses()
            .last()
            .cloned()
            .ok_or_else(|| DiagnosticError::internal("response not recorded"))?;
        let record = AnswerRecord {
            response,
            chosen,
            correct_option: question.correct,
        };
        self.answers.push(record.clone());

        debug!(
            session = %self.id,
            question = %question.id,
            correct,
            mastery = update.mastery,
            "Answer recorded"
        );

        Ok(AnswerOutcome {
            question: question.id.clone(),
            concept: question.concept.clone(),
            correct,
            correct_option: question.correct,
            explanation: question.explanation.clone(),
            update,
            diagnosis,
            record,
        })
    }

    /// Context for the dialogue layer.
    ///
    /// # Errors
    ///
    /// Returns `ConceptNotFound` for unknown concepts.
    pub fn tutor_context(&self, concept: &str) -> DiagnosticResult<TutorContext> {
        let node = self.graph.concept(concept)?;
        let evidence: Vec<AnswerEvidence> = self
            .answers
            .iter()
            .filter(|a| a.response.concept == node.id)
            .map(AnswerRecord::evidence)
            .collect();
        let mut seen = HashSet::new();
        let misconceptions = self
            .catalog
            .aggregate_pattern(&evidence)
            .diagnoses()
            .iter()
            .filter(|d| seen.insert(d.misconception.id.clone()))
            .map(|d| d.misconception.clone())
            .collect();

        Ok(TutorContext {
            concept: node.id.clone(),
            concept_name: node.name.clone(),
            mastery: self.mastery.mastery(concept),
            streak: self.mastery.streak(concept),
            misconceptions,
        })
    }

    /// Clears mastery, answers and testing state.
    pub fn reset(&mut self) {
        self.mastery.reset();
        self.assessment.reset();
        self.answers.clear();
    }
}
