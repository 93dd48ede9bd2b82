//! Per-concept mastery tracking.
//!
//! Ability is estimated with a one-parameter logistic (Rasch) model and
//! updated by a single gradient step per response. The reported mastery score
//! blends the scaled ability, the raw accuracy and a forgetting-curve
//! retention term, and is penalised while evidence is thin.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::concept::{ConceptId, MasteryScores, QuestionId};
use crate::config::MasteryConfig;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// 1PL IRT probability of a correct response.
#[must_use]
pub fn probability_correct(ability: f64, difficulty: f64) -> f64 {
    1.0 / (1.0 + (-(ability - difficulty)).exp())
}

/// Fisher information of a 1PL item at the given ability.
#[must_use]
pub fn fisher_information(ability: f64, difficulty: f64) -> f64 {
    let p = probability_correct(ability, difficulty);
    p * (1.0 - p)
}

/// Mastery state of one concept for one learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptMasteryState {
    /// Concept this state belongs to.
    pub concept: ConceptId,
    /// IRT ability estimate (θ).
    pub ability: f64,
    /// Blended mastery score in [0, 1].
    pub mastery: f64,
    /// When the concept was last practiced; `None` if never.
    #[serde(default)]
    pub last_practiced: Option<DateTime<Utc>>,
    /// Number of responses recorded.
    #[serde(default)]
    pub practice_count: u32,
    /// Number of correct responses recorded.
    #[serde(default)]
    pub correct_count: u32,
    /// Current run of consecutive correct responses.
    #[serde(default)]
    pub streak: u32,
}

impl ConceptMasteryState {
    /// Fresh state: θ = 0 and the configured default mastery.
    #[must_use]
    pub fn new(concept: ConceptId, config: &MasteryConfig) -> Self {
        Self {
            concept,
            ability: 0.0,
            mastery: config.default_mastery,
            last_practiced: None,
            practice_count: 0,
            correct_count: 0,
            streak: 0,
        }
    }

    /// Fraction of correct responses, 0.5 before any practice.
    #[must_use]
    pub fn accuracy(&self) -> f64 {
        if self.practice_count == 0 {
            0.5
        } else {
            f64::from(self.correct_count) / f64::from(self.practice_count)
        }
    }

    /// Memory strength in days; grows with every correct answer.
    #[must_use]
    pub fn strength_days(&self, config: &MasteryConfig) -> f64 {
        config.base_half_life_days * config.half_life_growth.powf(f64::from(self.correct_count))
    }

    /// Forgetting-curve retention at `now`; 1.0 if never practiced.
    #[must_use]
    pub fn retention_at(&self, now: DateTime<Utc>, config: &MasteryConfig) -> f64 {
        let Some(last) = self.last_practiced else {
            return 1.0;
        };
        let elapsed = (now - last).num_milliseconds().max(0) as f64 / 1000.0;
        let days = elapsed / SECONDS_PER_DAY;
        (-days / self.strength_days(config))
            .exp()
            .max(config.min_retention)
    }

    fn blended_mastery(&self, now: DateTime<Utc>, config: &MasteryConfig) -> f64 {
        let span = config.max_ability - config.min_ability;
        let ability_score = ((self.ability - config.min_ability) / span).clamp(0.0, 1.0);
        let practice_weight =
            (f64::from(self.practice_count) / f64::from(config.full_weight_practice)).min(1.0);
        let retention = self.retention_at(now, config);

        let mut score =
            0.4 * ability_score * practice_weight + 0.4 * self.accuracy() + 0.2 * retention;
        if self.practice_count < config.low_evidence_practice {
            score *= config.low_evidence_penalty;
        }
        score.clamp(0.0, 1.0)
    }
}

/// One answered question. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseRecord {
    /// Question answered.
    pub question: QuestionId,
    /// Concept the question belongs to.
    pub concept: ConceptId,
    /// Whether the answer was correct.
    pub correct: bool,
    /// When the answer was recorded.
    pub timestamp: DateTime<Utc>,
    /// IRT difficulty used for the update.
    pub difficulty: f64,
    /// Response latency in milliseconds, if measured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

/// Result of recording one response.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MasteryUpdate {
    /// Ability after the update.
    pub ability: f64,
    /// Mastery after the update.
    pub mastery: f64,
    /// Mastery before the update.
    pub previous_mastery: f64,
    /// Correct streak after the update.
    pub streak: u32,
    /// Whether the response was correct.
    pub correct: bool,
}

impl MasteryUpdate {
    /// Change in mastery caused by this response.
    #[must_use]
    pub fn delta(&self) -> f64 {
        self.mastery - self.previous_mastery
    }
}

/// A practiced concept whose retention fell below the review threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewItem {
    /// Concept due for review.
    pub concept: ConceptId,
    /// Current retention.
    pub retention: f64,
}

/// Mastery states of one learner, keyed by concept.
#[derive(Debug, Clone, Default)]
pub struct MasteryModel {
    config: MasteryConfig,
    states: BTreeMap<ConceptId, ConceptMasteryState>,
}

impl MasteryModel {
    /// Creates an empty model.
    #[must_use]
    pub fn new(config: MasteryConfig) -> Self {
        Self {
            config,
            states: BTreeMap::new(),
        }
    }

    /// Rebuilds a model from persisted states.
    #[must_use]
    pub fn from_states(
        config: MasteryConfig,
        states: impl IntoIterator<Item = ConceptMasteryState>,
    ) -> Self {
        Self {
            config,
            states: states.into_iter().map(|s| (s.concept.clone(), s)).collect(),
        }
    }

    /// Persistable snapshot of every state, ordered by concept id.
    #[must_use]
    pub fn states(&self) -> Vec<ConceptMasteryState> {
        self.states.values().cloned().collect()
    }

    /// Model parameters.
    #[must_use]
    pub fn config(&self) -> &MasteryConfig {
        &self.config
    }

    /// State of a concept, if it has been touched.
    #[must_use]
    pub fn state(&self, concept: &str) -> Option<&ConceptMasteryState> {
        self.states.get(concept)
    }

    /// Current ability estimate; 0.0 for untouched concepts.
    #[must_use]
    pub fn ability(&self, concept: &str) -> f64 {
        self.state(concept).map_or(0.0, |s| s.ability)
    }

    /// Current mastery; the configured default for untouched concepts.
    #[must_use]
    pub fn mastery(&self, concept: &str) -> f64 {
        self.state(concept)
            .map_or(self.config.default_mastery, |s| s.mastery)
    }

    /// Current correct streak.
    #[must_use]
    pub fn streak(&self, concept: &str) -> u32 {
        self.state(concept).map_or(0, |s| s.streak)
    }

    /// Records a response timestamped now.
    pub fn record_response(
        &mut self,
        concept: &ConceptId,
        difficulty: f64,
        correct: bool,
    ) -> MasteryUpdate {
        self.record_response_at(concept, difficulty, correct, Utc::now())
    }

    /// Records a response at an explicit time.
    ///
    /// Applies one gradient step to the ability, updates the counters and
    /// recomputes the blended mastery.
    pub fn record_response_at(
        &mut self,
        concept: &ConceptId,
        difficulty: f64,
        correct: bool,
        now: DateTime<Utc>,
    ) -> MasteryUpdate {
        let config = &self.config;
        let state = self
            .states
            .entry(concept.clone())
            .or_insert_with(|| ConceptMasteryState::new(concept.clone(), config));
        let previous_mastery = state.mastery;

        let observed = if correct { 1.0 } else { 0.0 };
        let gradient = observed - probability_correct(state.ability, difficulty);
        state.ability = (state.ability + config.learning_rate * gradient)
            .clamp(config.min_ability, config.max_ability);

        state.practice_count += 1;
        state.last_practiced = Some(now);
        if correct {
            state.correct_count += 1;
            state.streak += 1;
        } else {
            state.streak = 0;
        }
        state.mastery = state.blended_mastery(now, config);

        debug!(
            concept = %concept,
            correct,
            ability = state.ability,
            mastery = state.mastery,
            "Mastery updated"
        );

        MasteryUpdate {
            ability: state.ability,
            mastery: state.mastery,
            previous_mastery,
            streak: state.streak,
            correct,
        }
    }

    /// Current retention of a concept; 1.0 if never practiced.
    #[must_use]
    pub fn retention_at(&self, concept: &str, now: DateTime<Utc>) -> f64 {
        self.state(concept)
            .map_or(1.0, |s| s.retention_at(now, &self.config))
    }

    /// Practiced concepts whose retention is below `threshold`, lowest first.
    #[must_use]
    pub fn due_for_review(&self, threshold: f64) -> Vec<ReviewItem> {
        self.due_for_review_at(threshold, Utc::now())
    }

    /// [`Self::due_for_review`] evaluated at an explicit time.
    #[must_use]
    pub fn due_for_review_at(&self, threshold: f64, now: DateTime<Utc>) -> Vec<ReviewItem> {
        let mut due: Vec<ReviewItem> = self
            .states
            .values()
            .filter(|s| s.practice_count > 0)
            .map(|s| ReviewItem {
                concept: s.concept.clone(),
                retention: s.retention_at(now, &self.config),
            })
            .filter(|item| item.retention < threshold)
            .collect();
        due.sort_by(|a, b| a.retention.total_cmp(&b.retention));
        due
    }

    /// When retention of `concept` will fall to `target_retention`.
    ///
    /// Returns `now` for concepts never practiced and for targets outside (0, 1).
    /// Intervals past the representable range saturate at `DateTime::<Utc>::MAX_UTC`.
    #[must_use]
    pub fn optimal_review_time(
        &self,
        concept: &str,
        target_retention: f64,
        now: DateTime<Utc>,
    ) -> DateTime<Utc> {
        let Some(state) = self.state(concept) else {
            return now;
        };
        let Some(last) = state.last_practiced else {
            return now;
        };
        if !(target_retention > 0.0 && target_retention < 1.0) {
            return now;
        }
        let days = -state.strength_days(&self.config) * target_retention.ln();
        let millis = (days * SECONDS_PER_DAY * 1000.0).round() as i64;
        Duration::try_milliseconds(millis)
            .and_then(|interval| last.checked_add_signed(interval))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Concepts with mastery below `threshold`, by concept id.
    #[must_use]
    pub fn weak_concepts(&self, threshold: f64) -> Vec<&ConceptId> {
        self.states
            .values()
            .filter(|s| s.mastery < threshold)
            .map(|s| &s.concept)
            .collect()
    }

    /// Concepts with mastery at or above `threshold`, by concept id.
    #[must_use]
    pub fn mastered_concepts(&self, threshold: f64) -> Vec<&ConceptId> {
        self.states
            .values()
            .filter(|s| s.mastery >= threshold)
            .map(|s| &s.concept)
            .collect()
    }

    /// Mastery of every touched concept.
    #[must_use]
    pub fn mastery_scores(&self) -> MasteryScores {
        self.states
            .iter()
            .map(|(id, s)| (id.clone(), s.mastery))
            .collect()
    }

    /// Mastery of each of `concepts`, untouched ones at the configured default.
    #[must_use]
    pub fn scores_over<'a>(
        &self,
        concepts: impl IntoIterator<Item = &'a ConceptId>,
    ) -> MasteryScores {
        concepts
            .into_iter()
            .map(|id| (id.clone(), self.mastery(id.as_str())))
            .collect()
    }

    /// Number of touched concepts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Returns true if no concept has been touched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Drops every state.
    pub fn reset(&mut self) {
        self.states.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn cid(s: &str) -> ConceptId {
        ConceptId::new_unchecked(s)
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn probability_at_equal_ability_is_half() {
        assert_eq!(probability_correct(0.0, 0.0), 0.5);
        assert!((fisher_information(0.0, 0.0) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn probability_is_monotonic() {
        let grid: Vec<f64> = (-30..=30).map(|i| f64::from(i) / 10.0).collect();
        for &b in &grid {
            for pair in grid.windows(2) {
                assert!(probability_correct(pair[1], b) > probability_correct(pair[0], b));
                assert!(probability_correct(b, pair[1]) < probability_correct(b, pair[0]));
            }
        }
    }

    #[test]
    fn first_correct_answer_blend() {
        let mut model = MasteryModel::default();
        let update = model.record_response_at(&cid("vectors"), 0.0, true, t0());
        assert!((update.ability - 0.15).abs() < 1e-12);
        // 0.4 * 0.525 * 0.1 + 0.4 * 1.0 + 0.2 * 1.0, penalised by 0.8
        assert!((update.mastery - 0.4968).abs() < 1e-9);
        assert_eq!(update.previous_mastery, 0.5);
        assert_eq!(update.streak, 1);
    }

    #[test]
    fn three_wrong_and_three_right_stay_in_range() {
        let mut wrong = MasteryModel::default();
        let mut right = MasteryModel::default();
        let concept = cid("determinants");
        for _ in 0..3 {
            wrong.record_response_at(&concept, 0.0, false, t0());
            right.record_response_at(&concept, 0.0, true, t0());
        }
        let low = wrong.mastery("determinants");
        let high = right.mastery("determinants");
        assert!((0.0..=1.0).contains(&low));
        assert!((0.0..=1.0).contains(&high));
        assert!(low < 0.5 && high > low);
        assert_eq!(wrong.streak("determinants"), 0);
        assert_eq!(right.streak("determinants"), 3);
    }

    #[test]
    fn ability_and_mastery_stay_bounded() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut model = MasteryModel::default();
        let concept = cid("eigenvalues");
        for i in 0..500 {
            let difficulty = rng.gen_range(-1.0..=1.0);
            let correct = if i < 250 { true } else { rng.gen_bool(0.2) };
            let update = model.record_response_at(&concept, difficulty, correct, t0());
            assert!((-3.0..=3.0).contains(&update.ability));
            assert!((0.0..=1.0).contains(&update.mastery));
        }
    }

    #[test]
    fn retention_follows_forgetting_curve() {
        let config = MasteryConfig::default();
        let mut state = ConceptMasteryState::new(cid("vectors"), &config);
        assert_eq!(state.retention_at(t0(), &config), 1.0);

        state.last_practiced = Some(t0());
        state.practice_count = 1;
        let one_day = state.retention_at(t0() + Duration::days(1), &config);
        assert!((one_day - (-1.0f64).exp()).abs() < 1e-9);

        let floor = state.retention_at(t0() + Duration::days(30), &config);
        assert_eq!(floor, 0.3);

        state.correct_count = 2;
        let stronger = state.retention_at(t0() + Duration::days(1), &config);
        assert!(stronger > one_day);
    }

    #[test]
    fn due_for_review_sorted_by_retention() {
        let mut model = MasteryModel::default();
        model.record_response_at(&cid("vectors"), 0.0, false, t0() + Duration::days(1));
        model.record_response_at(&cid("matrix_ops"), 0.0, false, t0() + Duration::hours(36));
        model.record_response_at(&cid("determinants"), 0.0, true, t0() + Duration::days(2));

        let due = model.due_for_review_at(0.7, t0() + Duration::days(2));
        let ids: Vec<&str> = due.iter().map(|d| d.concept.as_str()).collect();
        assert_eq!(ids, vec!["vectors", "matrix_ops"]);
        assert!(due[0].retention <= due[1].retention);
    }

    #[test]
    fn optimal_review_time_matches_curve() {
        let mut model = MasteryModel::default();
        let now = t0();
        assert_eq!(model.optimal_review_time("vectors", 0.7, now), now);

        model.record_response_at(&cid("vectors"), 0.0, false, now);
        let review = model.optimal_review_time("vectors", 0.7, now);
        let days = (review - now).num_milliseconds() as f64 / 86_400_000.0;
        assert!((days - -(0.7f64).ln()).abs() < 1e-6);

        let later = now + Duration::days(5);
        let retention = model.retention_at("vectors", review);
        assert!((retention - 0.7).abs() < 1e-6);
        assert!(model.retention_at("vectors", later) < 0.7);
    }

    #[test]
    fn optimal_review_time_saturates_for_long_streaks() {
        let mut model = MasteryModel::default();
        let now = t0();
        for _ in 0..60 {
            model.record_response_at(&cid("vectors"), 0.0, true, now);
        }
        assert_eq!(
            model.optimal_review_time("vectors", 0.7, now),
            DateTime::<Utc>::MAX_UTC
        );
        assert!(model.due_for_review_at(0.7, now).is_empty());

        // Short histories still land on the curve.
        model.record_response_at(&cid("matrix_ops"), 0.0, true, now);
        assert!(model.optimal_review_time("matrix_ops", 0.7, now) > now);
    }

    #[test]
    fn scores_over_fills_untouched_concepts_with_configured_default() {
        let mut model = MasteryModel::new(MasteryConfig {
            default_mastery: 0.8,
            ..MasteryConfig::default()
        });
        model.record_response_at(&cid("vectors"), 0.0, false, t0());

        let ids = [cid("vectors"), cid("matrix_ops")];
        let scores = model.scores_over(&ids);
        assert_eq!(scores.len(), 2);
        assert!((scores[&cid("matrix_ops")] - 0.8).abs() < 1e-12);
        assert!((scores[&cid("vectors")] - model.mastery("vectors")).abs() < 1e-12);
        assert_eq!(model.mastery_scores().len(), 1);
    }

    #[test]
    fn weak_and_mastered_lists() {
        let mut model = MasteryModel::default();
        for _ in 0..12 {
            model.record_response_at(&cid("vectors"), -1.0, true, t0());
            model.record_response_at(&cid("determinants"), 1.0, false, t0());
        }
        let weak: Vec<&str> = model.weak_concepts(0.4).into_iter().map(ConceptId::as_str).collect();
        let strong: Vec<&str> = model
            .mastered_concepts(0.6)
            .into_iter()
            .map(ConceptId::as_str)
            .collect();
        assert_eq!(weak, vec!["determinants"]);
        assert_eq!(strong, vec!["vectors"]);
    }

    #[test]
    fn states_round_trip_and_reset() {
        let mut model = MasteryModel::default();
        model.record_response_at(&cid("vectors"), 0.0, true, t0());
        model.record_response_at(&cid("matrix_ops"), 1.0, false, t0());

        let json = serde_json::to_string(&model.states()).unwrap();
        let states: Vec<ConceptMasteryState> = serde_json::from_str(&json).unwrap();
        let restored = MasteryModel::from_states(MasteryConfig::default(), states);
        assert_eq!(restored.mastery_scores(), model.mastery_scores());
        assert_eq!(restored.ability("vectors"), model.ability("vectors"));

        model.reset();
        assert!(model.is_empty());
        assert_eq!(model.mastery("vectors"), 0.5);
        assert_eq!(model.ability("vectors"), 0.0);
    }
}
