//! Computerized adaptive testing.
//!
//! The [`AssessmentEngine`] holds one session's test state: the questions
//! already asked and the response history. It selects the next question from
//! the concept graph's bank, forwards responses to the [`MasteryModel`], and
//! decides when a concept has been measured well enough.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::concept::{ConceptId, DifficultyTier, Question, QuestionId};
use crate::config::AssessmentConfig;
use crate::error::{DiagnosticError, DiagnosticResult, ExecutionError};
use crate::graph::ConceptGraph;
use crate::mastery::{fisher_information, MasteryModel, MasteryUpdate, ResponseRecord};

/// How the next question is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// Random pick among the most informative unseen questions.
    MaximumInformation,
    /// Easy, then medium, then hard.
    Progressive,
    /// Uniform pick among unseen questions.
    Random,
}

impl Default for SelectionStrategy {
    fn default() -> Self {
        Self::MaximumInformation
    }
}

impl fmt::Display for SelectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MaximumInformation => write!(f, "maximum_information"),
            Self::Progressive => write!(f, "progressive"),
            Self::Random => write!(f, "random"),
        }
    }
}

/// Why testing of a concept should stop or continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Fewer than the minimum number of responses.
    MinNotReached,
    /// The maximum number of responses was reached.
    MaxReached,
    /// The ability standard error is below threshold.
    PrecisionReached,
    /// The most recent responses are all correct or all wrong.
    ConsistentPerformance,
    /// Keep asking.
    Continue,
}

/// Result of the stopping rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopDecision {
    /// Whether to stop.
    pub stop: bool,
    /// Why.
    pub reason: StopReason,
    /// Responses recorded for the concept.
    pub responses: usize,
}

/// Totals over all recorded responses.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuizSummary {
    /// Responses recorded.
    pub total: usize,
    /// Correct responses.
    pub correct: usize,
    /// `correct / total`.
    pub accuracy: f64,
}

/// Outcome of a fixed-length checkpoint quiz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointResult {
    /// Whether the learner may advance.
    pub passed: bool,
    /// Correct answers.
    pub correct: usize,
    /// Questions answered.
    pub total: usize,
    /// Correct answers required.
    pub required: usize,
}

impl CheckpointResult {
    /// Scores per-question correctness against a pass mark.
    #[must_use]
    pub fn score(results: &[bool], required: usize) -> Self {
        let correct = results.iter().filter(|&&c| c).count();
        Self {
            passed: correct >= required,
            correct,
            total: results.len(),
            required,
        }
    }
}

/// Per-session adaptive testing state.
#[derive(Debug, Clone)]
pub struct AssessmentEngine {
    config: AssessmentConfig,
    asked: HashSet<QuestionId>,
    responses: Vec<ResponseRecord>,
    rng: ChaCha8Rng,
}

impl AssessmentEngine {
    /// Creates an engine seeded from OS entropy.
    #[must_use]
    pub fn new(config: AssessmentConfig) -> Self {
        Self::with_seed(config, rand::random())
    }

    /// Creates an engine with a fixed RNG seed.
    #[must_use]
    pub fn with_seed(config: AssessmentConfig, seed: u64) -> Self {
        Self {
            config,
            asked: HashSet::new(),
            responses: Vec::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Rebuilds an engine from persisted state.
    ///
    /// Every response's question is treated as asked.
    #[must_use]
    pub fn from_parts(
        config: AssessmentConfig,
        asked: impl IntoIterator<Item = QuestionId>,
        responses: Vec<ResponseRecord>,
        seed: u64,
    ) -> Self {
        let mut engine = Self::with_seed(config, seed);
        engine.asked = asked.into_iter().collect();
        engine
            .asked
            .extend(responses.iter().map(|r| r.question.clone()));
        engine.responses = responses;
        engine
    }

    /// Test parameters.
    #[must_use]
    pub fn config(&self) -> &AssessmentConfig {
        &self.config
    }

    /// Returns true if the question was asked or handed out in a quiz.
    #[must_use]
    pub fn is_asked(&self, question: &str) -> bool {
        self.asked.contains(question)
    }

    /// Asked question ids, sorted.
    #[must_use]
    pub fn asked(&self) -> Vec<&QuestionId> {
        let mut ids: Vec<&QuestionId> = self.asked.iter().collect();
        ids.sort();
        ids
    }

    /// Full response history, oldest first.
    #[must_use]
    pub fn responses(&self) -> &[ResponseRecord] {
        &self.responses
    }

    /// Responses recorded for one concept, oldest first.
    pub fn responses_for<'a>(&'a self, concept: &'a str) -> impl Iterator<Item = &'a ResponseRecord> + 'a {
        self.responses
            .iter()
            .filter(move |r| r.concept.as_str() == concept)
    }

    /// Selects the next question for `concept`.
    ///
    /// # Errors
    ///
    /// - `ConceptNotFound` for unknown concepts
    /// - `NoQuestionsAvailable` once every question of the concept was asked
    pub fn select_next<'g>(
        &mut self,
        graph: &'g ConceptGraph,
        mastery: &MasteryModel,
        concept: &str,
        strategy: SelectionStrategy,
    ) -> DiagnosticResult<&'g Question> {
        let bank = &graph.concept(concept)?.questions;
        let unseen: Vec<&'g Question> = bank.iter().filter(|q| !self.asked.contains(&q.id)).collect();
        if unseen.is_empty() {
            return Err(DiagnosticError::Execution(ExecutionError::NoQuestionsAvailable {
                concept: ConceptId::new_unchecked(concept),
            }));
        }

        let picked = match strategy {
            SelectionStrategy::MaximumInformation => {
                let ability = mastery.ability(concept);
                let mut scored: Vec<(f64, &'g Question)> = unseen
                    .into_iter()
                    .map(|q| (fisher_information(ability, q.irt_difficulty()), q))
                    .collect();
                // Stable: equally informative questions keep bank order.
                scored.sort_by(|a, b| b.0.total_cmp(&a.0));
                scored.truncate(self.config.top_k.max(1));
                scored.choose(&mut self.rng).map(|(_, q)| *q)
            }
            SelectionStrategy::Progressive => {
                let asked_here = bank.iter().filter(|q| self.asked.contains(&q.id)).count();
                let tier = DifficultyTier::progressive(asked_here);
                let at_tier: Vec<&'g Question> =
                    unseen.iter().copied().filter(|q| q.tier == tier).collect();
                if at_tier.is_empty() {
                    unseen.choose(&mut self.rng).copied()
                } else {
                    at_tier.choose(&mut self.rng).copied()
                }
            }
            SelectionStrategy::Random => unseen.choose(&mut self.rng).copied(),
        };

        let question = picked.ok_or_else(|| DiagnosticError::internal("empty candidate list"))?;
        debug!(
            concept,
            question = %question.id,
            tier = %question.tier,
            strategy = %strategy,
            "Question selected"
        );
        Ok(question)
    }

    /// Records an answer timestamped now. See [`Self::record_response_at`].
    pub fn record_response(
        &mut self,
        question: &Question,
        correct: bool,
        latency_ms: Option<u64>,
        mastery: &mut MasteryModel,
    ) -> MasteryUpdate {
        self.record_response_at(question, correct, latency_ms, mastery, Utc::now())
    }

    /// Marks the question asked, updates mastery and appends a
    /// [`ResponseRecord`].
    pub fn record_response_at(
        &mut self,
        question: &Question,
        correct: bool,
        latency_ms: Option<u64>,
        mastery: &mut MasteryModel,
        now: DateTime<Utc>,
    ) -> MasteryUpdate {
        let difficulty = question.irt_difficulty();
        self.asked.insert(question.id.clone());
        let update = mastery.record_response_at(&question.concept, difficulty, correct, now);
        self.responses.push(ResponseRecord {
            question: question.id.clone(),
            concept: question.concept.clone(),
            correct,
            timestamp: now,
            difficulty,
            latency_ms,
        });
        update
    }

    /// Standard error of the ability estimate for `concept`.
    ///
    /// `1 / sqrt(sum of Fisher information)` over the concept's responses at
    /// the current ability; infinite with no responses.
    #[must_use]
    pub fn standard_error(&self, concept: &str, mastery: &MasteryModel) -> f64 {
        let ability = mastery.ability(concept);
        let total: f64 = self
            .responses_for(concept)
            .map(|r| fisher_information(ability, r.difficulty))
            .sum();
        if total > 0.0 {
            1.0 / total.sqrt()
        } else {
            f64::INFINITY
        }
    }

    /// Stopping rule for `concept`.
    ///
    /// Checked in order: minimum not reached, maximum reached, precision
    /// reached, consistent recent performance.
    #[must_use]
    pub fn should_stop(&self, concept: &str, mastery: &MasteryModel) -> StopDecision {
        let recent: Vec<bool> = self.responses_for(concept).map(|r| r.correct).collect();
        let responses = recent.len();
        let decide = |stop, reason| StopDecision {
            stop,
            reason,
            responses,
        };

        let decision = if responses < self.config.min_questions {
            decide(false, StopReason::MinNotReached)
        } else if responses >= self.config.max_questions {
            decide(true, StopReason::MaxReached)
        } else if self.standard_error(concept, mastery) < self.config.se_threshold {
            decide(true, StopReason::PrecisionReached)
        } else if responses >= self.config.plateau_window && {
            let tail = &recent[responses - self.config.plateau_window..];
            tail.iter().all(|&c| c) || tail.iter().all(|&c| !c)
        } {
            decide(true, StopReason::ConsistentPerformance)
        } else {
            decide(false, StopReason::Continue)
        };

        debug!(concept, responses, stop = decision.stop, reason = ?decision.reason, "Stop rule evaluated");
        decision
    }

    /// Picks up to `count` questions for a fixed-length quiz.
    ///
    /// Picked questions are marked asked so they are not repeated. Returns
    /// fewer than `count` questions if the bank runs out.
    ///
    /// # Errors
    ///
    /// Returns `ConceptNotFound` for unknown concepts.
    pub fn generate_quiz<'g>(
        &mut self,
        graph: &'g ConceptGraph,
        mastery: &MasteryModel,
        concept: &str,
        count: usize,
        strategy: SelectionStrategy,
    ) -> DiagnosticResult<Vec<&'g Question>> {
        let mut quiz = Vec::with_capacity(count);
        for _ in 0..count {
            match self.select_next(graph, mastery, concept, strategy) {
                Ok(question) => {
                    self.asked.insert(question.id.clone());
                    quiz.push(question);
                }
                Err(e) if e.is_recoverable() => break,
                Err(e) => return Err(e),
            }
        }
        Ok(quiz)
    }

    /// A checkpoint quiz of the configured length.
    ///
    /// # Errors
    ///
    /// Returns `ConceptNotFound` for unknown concepts.
    pub fn generate_checkpoint<'g>(
        &mut self,
        graph: &'g ConceptGraph,
        mastery: &MasteryModel,
        concept: &str,
    ) -> DiagnosticResult<Vec<&'g Question>> {
        let count = self.config.checkpoint_questions;
        self.generate_quiz(graph, mastery, concept, count, SelectionStrategy::Progressive)
    }

    /// Scores a checkpoint from per-question correctness.
    #[must_use]
    pub fn evaluate_checkpoint(&self, results: &[bool]) -> CheckpointResult {
        CheckpointResult::score(results, self.config.checkpoint_pass)
    }

    /// Totals over every recorded response; `None` before the first one.
    #[must_use]
    pub fn quiz_summary(&self) -> Option<QuizSummary> {
        if self.responses.is_empty() {
            return None;
        }
        let total = self.responses.len();
        let correct = self.responses.iter().filter(|r| r.correct).count();
        Some(QuizSummary {
            total,
            correct,
            accuracy: correct as f64 / total as f64,
        })
    }

    /// Forgets asked questions and responses. The RNG stream continues.
    pub fn reset(&mut self) {
        self.asked.clear();
        self.responses.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MasteryConfig;

    fn graph() -> ConceptGraph {
        ConceptGraph::linear_algebra().unwrap()
    }

    fn engine(seed: u64) -> AssessmentEngine {
        AssessmentEngine::with_seed(AssessmentConfig::default(), seed)
    }

    #[test]
    fn maximum_information_picks_from_top_three() {
        let graph = graph();
        let mastery = MasteryModel::default();
        // At ability 0 the two medium questions are most informative, then
        // the easy ones in bank order.
        let top = ["vec_3", "vec_4", "vec_1"];
        let mut seen = HashSet::new();
        for seed in 0..64 {
            let q = engine(seed)
                .select_next(&graph, &mastery, "vectors", SelectionStrategy::MaximumInformation)
                .unwrap();
            assert!(top.contains(&q.id.as_str()), "unexpected {}", q.id);
            seen.insert(q.id.as_str().to_string());
        }
        assert!(seen.len() > 1, "selection should not be deterministic across seeds");
    }

    #[test]
    fn same_seed_same_question() {
        let graph = graph();
        let mastery = MasteryModel::default();
        let a = engine(42)
            .select_next(&graph, &mastery, "eigenvalues", SelectionStrategy::Random)
            .unwrap();
        let b = engine(42)
            .select_next(&graph, &mastery, "eigenvalues", SelectionStrategy::Random)
            .unwrap();
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn progressive_quiz_climbs_tiers() {
        let graph = graph();
        let mastery = MasteryModel::default();
        let mut cat = engine(3);
        let quiz = cat
            .generate_quiz(&graph, &mastery, "determinants", 3, SelectionStrategy::Progressive)
            .unwrap();
        let tiers: Vec<DifficultyTier> = quiz.iter().map(|q| q.tier).collect();
        assert_eq!(
            tiers,
            vec![DifficultyTier::Easy, DifficultyTier::Medium, DifficultyTier::Hard]
        );
        assert!(quiz.iter().all(|q| cat.is_asked(q.id.as_str())));
        assert!(cat.responses().is_empty());
    }

    #[test]
    fn progressive_falls_back_when_tier_exhausted() {
        let graph = graph();
        let mut mastery = MasteryModel::default();
        let mut cat = engine(5);
        for id in ["mat_5", "mat_6"] {
            let q = graph.question(id).unwrap();
            cat.record_response(q, true, None, &mut mastery);
        }
        // Two asked, so hard is the target tier, and both hard questions are gone.
        let next = cat
            .select_next(&graph, &mastery, "matrix_ops", SelectionStrategy::Progressive)
            .unwrap();
        assert_ne!(next.tier, DifficultyTier::Hard);
    }

    #[test]
    fn exhausted_bank_is_recoverable() {
        let graph = graph();
        let mut mastery = MasteryModel::default();
        let mut cat = engine(9);
        for q in graph.questions("vectors", None).unwrap() {
            cat.record_response(q, false, Some(1200), &mut mastery);
        }
        let err = cat
            .select_next(&graph, &mastery, "vectors", SelectionStrategy::Random)
            .unwrap_err();
        assert!(err.is_recoverable());

        let quiz = cat
            .generate_quiz(&graph, &mastery, "vectors", 3, SelectionStrategy::Random)
            .unwrap();
        assert!(quiz.is_empty());
        assert_eq!(cat.responses()[0].latency_ms, Some(1200));
    }

    #[test]
    fn unknown_concept_is_not_found() {
        let graph = graph();
        let err = engine(1)
            .select_next(&graph, &MasteryModel::default(), "topology", SelectionStrategy::Random)
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn record_response_feeds_mastery() {
        let graph = graph();
        let mut mastery = MasteryModel::new(MasteryConfig::default());
        let mut cat = engine(0);
        let q = graph.question("det_3").unwrap();
        let update = cat.record_response(q, true, None, &mut mastery);
        assert!(update.ability > 0.0);
        assert_eq!(mastery.state("determinants").unwrap().practice_count, 1);
        assert_eq!(cat.responses().len(), 1);
        assert_eq!(cat.responses()[0].difficulty, 0.0);
        assert!(cat.is_asked("det_3"));
    }

    #[test]
    fn stop_rule_order() {
        let graph = graph();
        let mut mastery = MasteryModel::default();
        let mut cat = engine(0);
        let bank = graph.questions("eigenvalues", None).unwrap();

        assert!(cat.standard_error("eigenvalues", &mastery).is_infinite());
        for (i, q) in bank.iter().take(4).enumerate() {
            cat.record_response(q, i % 2 == 0, None, &mut mastery);
            let d = cat.should_stop("eigenvalues", &mastery);
            assert!(!d.stop);
            assert_eq!(d.reason, StopReason::MinNotReached);
        }
        // T F T F T: mixed tail, imprecise.
        cat.record_response(bank[4], true, None, &mut mastery);
        let d = cat.should_stop("eigenvalues", &mastery);
        assert_eq!(d.reason, StopReason::Continue);
        assert_eq!(d.responses, 5);
    }

    #[test]
    fn consistent_performance_stops_early() {
        let graph = graph();
        let mut mastery = MasteryModel::default();
        let mut cat = engine(0);
        for q in graph.questions("inverse_matrix", None).unwrap().into_iter().take(5) {
            cat.record_response(q, false, None, &mut mastery);
        }
        let d = cat.should_stop("inverse_matrix", &mastery);
        assert!(d.stop);
        assert_eq!(d.reason, StopReason::ConsistentPerformance);
    }

    #[test]
    fn precision_stops_with_loose_threshold() {
        let graph = graph();
        let mut mastery = MasteryModel::default();
        let config = AssessmentConfig {
            se_threshold: 0.95,
            ..AssessmentConfig::default()
        };
        let mut cat = AssessmentEngine::with_seed(config, 0);
        for (i, q) in graph.questions("vectors", None).unwrap().into_iter().take(5).enumerate() {
            cat.record_response(q, i % 2 == 0, None, &mut mastery);
        }
        assert!(cat.standard_error("vectors", &mastery) < 0.95);
        assert_eq!(
            cat.should_stop("vectors", &mastery).reason,
            StopReason::PrecisionReached
        );
    }

    #[test]
    fn checkpoint_and_summary() {
        let graph = graph();
        let mut mastery = MasteryModel::default();
        let mut cat = engine(0);
        assert!(cat.quiz_summary().is_none());

        let quiz = cat.generate_checkpoint(&graph, &mastery, "vectors").unwrap();
        assert_eq!(quiz.len(), 3);
        let results = [true, false, true];
        for (q, &ok) in quiz.iter().zip(&results) {
            cat.record_response(q, ok, None, &mut mastery);
        }
        let checkpoint = cat.evaluate_checkpoint(&results);
        assert!(checkpoint.passed);
        assert_eq!((checkpoint.correct, checkpoint.total, checkpoint.required), (2, 3, 2));
        assert!(!cat.evaluate_checkpoint(&[true, false, false]).passed);

        let summary = cat.quiz_summary().unwrap();
        assert_eq!((summary.total, summary.correct), (3, 2));
        assert!((summary.accuracy - 2.0 / 3.0).abs() < 1e-12);

        cat.reset();
        assert!(cat.responses().is_empty());
        assert!(cat.asked().is_empty());
    }

    #[test]
    fn from_parts_marks_answered_questions() {
        let graph = graph();
        let mut mastery = MasteryModel::default();
        let mut cat = engine(0);
        let q = graph.question("vec_1").unwrap();
        cat.record_response(q, true, None, &mut mastery);

        let restored = AssessmentEngine::from_parts(
            AssessmentConfig::default(),
            Vec::<QuestionId>::new(),
            cat.responses().to_vec(),
            7,
        );
        assert!(restored.is_asked("vec_1"));
        assert_eq!(restored.responses_for("vectors").count(), 1);
    }
}
