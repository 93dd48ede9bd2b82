//! Diagnostic engine.
//!
//! Ties the shared read-only components (concept graph, misconception
//! catalog, resource curator) to a pluggable [`SessionStore`]. Every request
//! rebuilds the session from the store, so the store is the only copy of
//! per-session state. Writes to one session are serialized by a per-session
//! lock; different sessions proceed in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::info;

use crate::assessment::{CheckpointResult, SelectionStrategy, StopDecision};
use crate::concept::{ConceptId, MasteryScores, Question};
use crate::config::EngineConfig;
use crate::curator::{ResourceCurator, StaticResourceCurator};
use crate::error::{DiagnosticError, DiagnosticResult, ExecutionError};
use crate::graph::{ConceptGraph, GraphSnapshot};
use crate::mastery::ReviewItem;
use crate::misconception::MisconceptionCatalog;
use crate::prescription::{LearningPrescription, PrescriptionPlanner};
use crate::session::{AnswerOutcome, DiagnosticSession, SessionId, TutorContext};
use crate::storage::{InMemorySessionStore, SessionStore};

fn lock_err(context: &'static str) -> DiagnosticError {
    DiagnosticError::Execution(ExecutionError::Storage {
        message: format!("poisoned lock: {context}"),
    })
}

/// Adaptive diagnostic engine.
#[derive(Clone)]
pub struct DiagnosticEngine {
    graph: Arc<ConceptGraph>,
    catalog: Arc<MisconceptionCatalog>,
    curator: Arc<dyn ResourceCurator>,
    store: Arc<dyn SessionStore>,
    config: EngineConfig,
    writers: Arc<Mutex<HashMap<SessionId, Arc<Mutex<()>>>>>,
}

impl DiagnosticEngine {
    /// Create an engine from its components.
    #[must_use]
    pub fn new(
        graph: Arc<ConceptGraph>,
        catalog: Arc<MisconceptionCatalog>,
        curator: Arc<dyn ResourceCurator>,
        store: Arc<dyn SessionStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            graph,
            catalog,
            curator,
            store,
            config,
            writers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Engine over the built-in linear algebra bank, catalog and resources,
    /// backed by an in-memory store.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `config` is invalid.
    pub fn builtin(config: EngineConfig) -> DiagnosticResult<Self> {
        let config = config.validate()?;
        Ok(Self::new(
            Arc::new(ConceptGraph::linear_algebra()?),
            Arc::new(MisconceptionCatalog::builtin()?),
            Arc::new(StaticResourceCurator::builtin()?),
            Arc::new(InMemorySessionStore::new()),
            config,
        ))
    }

    /// Get a reference to the concept graph.
    pub fn graph(&self) -> &Arc<ConceptGraph> {
        &self.graph
    }

    /// Get a reference to the misconception catalog.
    pub fn catalog(&self) -> &Arc<MisconceptionCatalog> {
        &self.catalog
    }

    /// Get a reference to the session store.
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Starts a new session.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the store rejects the session.
    pub fn create_session(&self) -> DiagnosticResult<SessionId> {
        let id = SessionId::new();
        self.store.create(id)?;
        info!(session = %id, "Session created");
        Ok(id)
    }

    /// Deletes a session and its history.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` for unknown sessions.
    pub fn end_session(&self, id: SessionId) -> DiagnosticResult<()> {
        let writer = self.writer(id)?;
        {
            let _guard = writer.lock().map_err(|_| lock_err("session.end"))?;
            self.store.delete(id)?;
        }
        self.writers
            .lock()
            .map_err(|_| lock_err("engine.writers"))?
            .remove(&id);
        info!(session = %id, "Session ended");
        Ok(())
    }

    /// Clears a session's mastery and answers.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` for unknown sessions.
    pub fn reset_session(&self, id: SessionId) -> DiagnosticResult<()> {
        let writer = self.writer(id)?;
        let _guard = writer.lock().map_err(|_| lock_err("session.reset"))?;
        self.store.reset(id)?;
        info!(session = %id, "Session reset");
        Ok(())
    }

    /// Selects the next question for `concept`.
    ///
    /// Selection does not change stored state; asking again before answering
    /// returns the same question.
    ///
    /// # Errors
    ///
    /// `SessionNotFound`, `ConceptNotFound`, or the recoverable
    /// `NoQuestionsAvailable` once the concept's bank is exhausted.
    pub fn next_question(
        &self,
        id: SessionId,
        concept: &str,
        strategy: SelectionStrategy,
    ) -> DiagnosticResult<Question> {
        let mut session = self.load(id)?;
        let question = session.next_question(concept, strategy)?.clone();
        Ok(question)
    }

    /// A checkpoint quiz for `concept`.
    ///
    /// # Errors
    ///
    /// `SessionNotFound` or `ConceptNotFound`.
    pub fn checkpoint(&self, id: SessionId, concept: &str) -> DiagnosticResult<Vec<Question>> {
        let mut session = self.load(id)?;
        let quiz = session.checkpoint(concept)?;
        Ok(quiz.into_iter().cloned().collect())
    }

    /// Scores a checkpoint from per-question correctness.
    #[must_use]
    pub fn evaluate_checkpoint(&self, results: &[bool]) -> CheckpointResult {
        CheckpointResult::score(results, self.config.assessment.checkpoint_pass)
    }

    /// Scores an answer and persists it with the updated mastery.
    ///
    /// # Errors
    ///
    /// `SessionNotFound`, `QuestionNotFound`, `InvalidAnswer`,
    /// `AlreadyAnswered` for a repeated submission, or a storage error.
    pub fn submit_answer(
        &self,
        id: SessionId,
        question: &str,
        chosen: usize,
        latency_ms: Option<u64>,
    ) -> DiagnosticResult<AnswerOutcome> {
        let writer = self.writer(id)?;
        let _guard = writer.lock().map_err(|_| lock_err("session.submit_answer"))?;

        let mut session = self.load(id)?;
        let outcome = session.submit_answer(question, chosen, latency_ms)?;
        self.store
            .record_answer(id, outcome.record.clone(), session.mastery().states())?;
        Ok(outcome)
    }

    /// Stopping rule for `concept`.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` for unknown sessions.
    pub fn should_stop(&self, id: SessionId, concept: &str) -> DiagnosticResult<StopDecision> {
        Ok(self.load(id)?.should_stop(concept))
    }

    /// Builds a prescription for a failed concept from the answers on that
    /// concept and its prerequisites, and the session's mastery.
    ///
    /// # Errors
    ///
    /// `SessionNotFound` or `ConceptNotFound`.
    pub fn prescribe(&self, id: SessionId, failed: &str) -> DiagnosticResult<LearningPrescription> {
        let session = self.load(id)?;
        let planner = PrescriptionPlanner::new(&self.graph, &self.catalog, self.curator.as_ref());
        let mut prescription = planner
            .with_config(self.config.planner.clone())
            .with_checkpoint(
                self.config.assessment.checkpoint_pass,
                self.config.assessment.checkpoint_questions,
            )
            .generate(failed, &session.evidence_for(failed)?, &session.graph_scores())?;
        // Suggested checkpoint questions the learner has not answered yet come first.
        prescription
            .verification
            .question_ids
            .sort_by_key(|q| session.assessment().is_asked(q.as_str()));
        info!(session = %id, concept = failed, "Prescription issued");
        Ok(prescription)
    }

    /// Context for the dialogue layer.
    ///
    /// # Errors
    ///
    /// `SessionNotFound` or `ConceptNotFound`.
    pub fn tutor_context(&self, id: SessionId, concept: &str) -> DiagnosticResult<TutorContext> {
        self.load(id)?.tutor_context(concept)
    }

    /// Mastery per practiced concept.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` for unknown sessions.
    pub fn mastery(&self, id: SessionId) -> DiagnosticResult<MasteryScores> {
        Ok(self.load(id)?.mastery().mastery_scores())
    }

    /// Practiced concepts whose retention dropped below the review threshold.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` for unknown sessions.
    pub fn due_for_review(&self, id: SessionId) -> DiagnosticResult<Vec<ReviewItem>> {
        let session = self.load(id)?;
        Ok(session
            .mastery()
            .due_for_review(self.config.mastery.review_threshold))
    }

    /// Concepts to study before `target`, prerequisites first.
    ///
    /// # Errors
    ///
    /// `SessionNotFound` or `ConceptNotFound`.
    pub fn learning_path(&self, id: SessionId, target: &str) -> DiagnosticResult<Vec<ConceptId>> {
        let scores = self.load(id)?.graph_scores();
        Ok(self
            .graph
            .learning_path(target, &scores, self.config.mastery.mastery_threshold)?
            .into_iter()
            .cloned()
            .collect())
    }

    /// The concept graph annotated with this session's mastery.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` for unknown sessions.
    pub fn snapshot(&self, id: SessionId) -> DiagnosticResult<GraphSnapshot> {
        let scores = self.load(id)?.graph_scores();
        Ok(self.graph.snapshot(&scores, &self.config.mastery))
    }

    fn load(&self, id: SessionId) -> DiagnosticResult<DiagnosticSession> {
        let snapshot = self.store.load(id)?;
        Ok(DiagnosticSession::restore(
            id,
            Arc::clone(&self.graph),
            Arc::clone(&self.catalog),
            &self.config,
            snapshot.mastery,
            snapshot.answers,
        ))
    }

    fn writer(&self, id: SessionId) -> DiagnosticResult<Arc<Mutex<()>>> {
        if !self.store.exists(id)? {
            return Err(ExecutionError::SessionNotFound { id: id.to_string() }.into());
        }
        let mut writers = self.writers.lock().map_err(|_| lock_err("engine.writers"))?;
        Ok(Arc::clone(writers.entry(id).or_default()))
    }
}

impl std::fmt::Debug for DiagnosticEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiagnosticEngine")
            .field("concepts", &self.graph.len())
            .field("misconceptions", &self.catalog.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> DiagnosticEngine {
        DiagnosticEngine::builtin(EngineConfig::default()).unwrap()
    }

    #[test]
    fn next_question_is_stable_until_answered() {
        let engine = engine();
        let id = engine.create_session().unwrap();
        let a = engine
            .next_question(id, "vectors", SelectionStrategy::MaximumInformation)
            .unwrap();
        let b = engine
            .next_question(id, "vectors", SelectionStrategy::MaximumInformation)
            .unwrap();
        assert_eq!(a.id, b.id);

        engine.submit_answer(id, a.id.as_str(), a.correct, None).unwrap();
        let c = engine
            .next_question(id, "vectors", SelectionStrategy::MaximumInformation)
            .unwrap();
        assert_ne!(c.id, a.id);
    }

    #[test]
    fn answers_persist_through_the_store() {
        let engine = engine();
        let id = engine.create_session().unwrap();
        engine.submit_answer(id, "det_5", 0, None).unwrap();
        engine.submit_answer(id, "det_1", 1, None).unwrap();

        let stored = engine.store().load(id).unwrap();
        assert_eq!(stored.answers.len(), 2);
        assert_eq!(stored.mastery.len(), 1);
        let scores = engine.mastery(id).unwrap();
        assert!(scores.contains_key("determinants"));

        let ctx = engine.tutor_context(id, "determinants").unwrap();
        assert_eq!(ctx.misconceptions.len(), 1);
        assert_eq!(ctx.streak, 1);
    }

    #[test]
    fn unknown_session_is_not_found() {
        let engine = engine();
        let id = SessionId::new();
        assert!(engine.mastery(id).unwrap_err().is_not_found());
        assert!(engine.submit_answer(id, "vec_1", 1, None).unwrap_err().is_not_found());
        assert!(engine.reset_session(id).unwrap_err().is_not_found());
    }

    #[test]
    fn prescribe_targets_weak_prerequisite() {
        let engine = engine();
        let id = engine.create_session().unwrap();
        for q in ["det_1", "det_2", "det_5"] {
            engine.submit_answer(id, q, 0, None).unwrap();
        }
        let p = engine.prescribe(id, "eigenvalues").unwrap();
        // vectors and matrix_ops are unpracticed, so they sit at the 0.5 default.
        assert_eq!(p.target_concept.as_str(), "vectors");
        assert!(p.root_cause.is_prerequisite_gap());
        assert_eq!(p.severity, 3);
    }

    #[test]
    fn repeated_submission_is_rejected_and_leaves_state_unchanged() {
        let engine = engine();
        let id = engine.create_session().unwrap();
        let first = engine.submit_answer(id, "vec_1", 1, None).unwrap();
        assert!(first.correct);

        for chosen in [1, 0] {
            let err = engine.submit_answer(id, "vec_1", chosen, None).unwrap_err();
            assert!(matches!(
                err,
                DiagnosticError::Execution(ExecutionError::AlreadyAnswered { .. })
            ));
        }

        let stored = engine.store().load(id).unwrap();
        assert_eq!(stored.answers.len(), 1);
        assert_eq!(stored.mastery[0].practice_count, 1);
        assert_eq!(engine.should_stop(id, "vectors").unwrap().responses, 1);
    }

    #[test]
    fn prescription_ignores_answers_outside_the_failed_ancestry() {
        let engine = engine();
        let id = engine.create_session().unwrap();
        engine.submit_answer(id, "eig_1", 0, None).unwrap();
        engine.submit_answer(id, "eig_3", 0, None).unwrap();
        engine.submit_answer(id, "vec_3", 1, None).unwrap();

        let p = engine.prescribe(id, "vectors").unwrap();
        assert!(p
            .misconceptions
            .iter()
            .all(|m| !m.id.starts_with("eig_")), "{:?}", p.misconceptions);
        assert!(!p.verification.success_criteria.contains("Eigen"));

        let eig = engine.prescribe(id, "eigenvalues").unwrap();
        assert!(eig.misconceptions.iter().any(|m| m.id.starts_with("eig_")));
    }

    #[test]
    fn configured_default_mastery_drives_root_cause_and_views() {
        let config = EngineConfig {
            mastery: crate::config::MasteryConfig {
                default_mastery: 0.9,
                ..Default::default()
            },
            ..EngineConfig::default()
        };
        let engine = DiagnosticEngine::builtin(config).unwrap();
        let id = engine.create_session().unwrap();
        for q in ["det_1", "det_2", "det_5"] {
            engine.submit_answer(id, q, 0, None).unwrap();
        }

        // Unpracticed vectors and matrix_ops now count as strong.
        let p = engine.prescribe(id, "eigenvalues").unwrap();
        assert_eq!(p.target_concept.as_str(), "determinants");
        let path: Vec<String> = engine
            .learning_path(id, "eigenvalues")
            .unwrap()
            .into_iter()
            .map(|c| c.to_string())
            .collect();
        assert_eq!(path, vec!["determinants"]);
        let snapshot = engine.snapshot(id).unwrap();
        assert!((snapshot.nodes[0].score - 0.9).abs() < 1e-12);
    }

    #[test]
    fn reset_and_end_session() {
        let engine = engine();
        let id = engine.create_session().unwrap();
        engine.submit_answer(id, "vec_1", 1, None).unwrap();
        engine.reset_session(id).unwrap();
        assert!(engine.mastery(id).unwrap().is_empty());

        engine.end_session(id).unwrap();
        assert!(engine.mastery(id).unwrap_err().is_not_found());
    }

    #[test]
    fn concurrent_answers_to_one_session_are_serialized() {
        let engine = engine();
        let id = engine.create_session().unwrap();
        let banks = [
            ["vec_1", "vec_2", "vec_3"],
            ["mat_1", "mat_2", "mat_3"],
            ["det_1", "det_2", "det_3"],
            ["inv_1", "inv_2", "inv_3"],
        ];

        std::thread::scope(|scope| {
            for bank in &banks {
                let engine = &engine;
                scope.spawn(move || {
                    for q in bank {
                        engine.submit_answer(id, q, 0, None).unwrap();
                    }
                });
            }
        });

        let stored = engine.store().load(id).unwrap();
        assert_eq!(stored.answers.len(), 12);
        assert_eq!(stored.mastery.len(), 4);
        assert!(stored.mastery.iter().all(|s| s.practice_count == 3));
    }

    #[test]
    fn evaluate_checkpoint_uses_config() {
        let engine = engine();
        assert!(engine.evaluate_checkpoint(&[true, true, false]).passed);
        assert!(!engine.evaluate_checkpoint(&[true, false, false]).passed);
    }
}
