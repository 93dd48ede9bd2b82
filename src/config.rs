//! Engine configuration.
//!
//! Every tunable constant of the mastery model, the adaptive tester and the
//! prescription planner lives here. Defaults reproduce the documented model;
//! JSON files may override any subset of fields.

use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::concept::DEFAULT_MASTERY;
use crate::error::{ensure_unit_interval, ValidationError};

/// Environment variable overriding [`PlannerConfig::root_cause_threshold`].
pub const ENV_ROOT_THRESHOLD: &str = "DIAGNOSTIC_ROOT_THRESHOLD";
/// Environment variable overriding [`AssessmentConfig::max_questions`].
pub const ENV_MAX_QUESTIONS: &str = "DIAGNOSTIC_MAX_QUESTIONS";
/// Environment variable overriding [`AssessmentConfig::min_questions`].
pub const ENV_MIN_QUESTIONS: &str = "DIAGNOSTIC_MIN_QUESTIONS";

/// Mastery model parameters (1PL IRT + forgetting curve).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MasteryConfig {
    /// Step size of the ability gradient update.
    pub learning_rate: f64,
    /// Lower ability bound.
    pub min_ability: f64,
    /// Upper ability bound.
    pub max_ability: f64,
    /// Memory strength with zero correct answers, in days.
    pub base_half_life_days: f64,
    /// Multiplicative strength growth per correct answer.
    pub half_life_growth: f64,
    /// Retention floor.
    pub min_retention: f64,
    /// Mastery at or above which a concept counts as mastered.
    pub mastery_threshold: f64,
    /// Mastery below which a concept counts as weak.
    pub weak_threshold: f64,
    /// Retention below which a concept is due for review.
    pub review_threshold: f64,
    /// Practice count at which the ability term gets full weight.
    pub full_weight_practice: u32,
    /// Practice counts below this are penalised as low evidence.
    pub low_evidence_practice: u32,
    /// Multiplier applied to low-evidence mastery.
    pub low_evidence_penalty: f64,
    /// Mastery assumed for a concept with no state.
    pub default_mastery: f64,
}

impl Default for MasteryConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.3,
            min_ability: -3.0,
            max_ability: 3.0,
            base_half_life_days: 1.0,
            half_life_growth: 1.5,
            min_retention: 0.3,
            mastery_threshold: 0.6,
            weak_threshold: 0.4,
            review_threshold: 0.7,
            full_weight_practice: 10,
            low_evidence_practice: 3,
            low_evidence_penalty: 0.8,
            default_mastery: DEFAULT_MASTERY,
        }
    }
}

impl MasteryConfig {
    /// Validates ranges.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for out-of-range values.
    pub fn validate(self) -> Result<Self, ValidationError> {
        for (name, value) in [
            ("min_retention", self.min_retention),
            ("mastery_threshold", self.mastery_threshold),
            ("weak_threshold", self.weak_threshold),
            ("review_threshold", self.review_threshold),
            ("low_evidence_penalty", self.low_evidence_penalty),
            ("default_mastery", self.default_mastery),
        ] {
            ensure_unit_interval(name, value)?;
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(invalid(format!(
                "learning_rate must be positive (got {})",
                self.learning_rate
            )));
        }
        if !(self.min_ability < self.max_ability) {
            return Err(invalid(format!(
                "ability bounds are empty: [{}, {}]",
                self.min_ability, self.max_ability
            )));
        }
        if !(self.base_half_life_days > 0.0 && self.half_life_growth >= 1.0) {
            return Err(invalid(
                "base_half_life_days must be positive and half_life_growth at least 1".to_string(),
            ));
        }
        if self.weak_threshold > self.mastery_threshold {
            return Err(invalid(format!(
                "weak_threshold {} exceeds mastery_threshold {}",
                self.weak_threshold, self.mastery_threshold
            )));
        }
        if self.full_weight_practice == 0 {
            return Err(invalid("full_weight_practice must be at least 1".to_string()));
        }
        Ok(self)
    }
}

/// Adaptive testing parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssessmentConfig {
    /// Never stop before this many responses in a concept.
    pub min_questions: usize,
    /// Always stop at this many responses in a concept.
    pub max_questions: usize,
    /// Stop once the ability standard error drops below this.
    pub se_threshold: f64,
    /// Number of trailing responses checked for a consistent plateau.
    pub plateau_window: usize,
    /// Maximum-information selection picks at random among this many.
    pub top_k: usize,
    /// Questions in a checkpoint quiz.
    pub checkpoint_questions: usize,
    /// Correct answers needed to pass a checkpoint.
    pub checkpoint_pass: usize,
}

impl Default for AssessmentConfig {
    fn default() -> Self {
        Self {
            min_questions: 5,
            max_questions: 20,
            se_threshold: 0.3,
            plateau_window: 3,
            top_k: 3,
            checkpoint_questions: 3,
            checkpoint_pass: 2,
        }
    }
}

impl AssessmentConfig {
    /// Validates ranges.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` for inconsistent limits.
    pub fn validate(self) -> Result<Self, ValidationError> {
        if self.max_questions == 0 || self.min_questions > self.max_questions {
            return Err(invalid(format!(
                "min_questions {} must not exceed max_questions {} (and max must be positive)",
                self.min_questions, self.max_questions
            )));
        }
        if !(self.se_threshold > 0.0 && self.se_threshold.is_finite()) {
            return Err(invalid(format!(
                "se_threshold must be positive (got {})",
                self.se_threshold
            )));
        }
        if self.plateau_window == 0 || self.top_k == 0 {
            return Err(invalid("plateau_window and top_k must be at least 1".to_string()));
        }
        if self.checkpoint_questions == 0 || self.checkpoint_pass > self.checkpoint_questions {
            return Err(invalid(format!(
                "checkpoint_pass {} must not exceed checkpoint_questions {}",
                self.checkpoint_pass, self.checkpoint_questions
            )));
        }
        Ok(self)
    }
}

/// Prescription planner parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Ancestors below this mastery are root-cause candidates.
    pub root_cause_threshold: f64,
    /// Floor for the prescription's total estimated time.
    pub minimum_total_minutes: u32,
    /// Estimated duration of the verification phase.
    pub verify_minutes: u32,
    /// Prescriptions below this confidence are flagged low confidence.
    pub low_confidence_threshold: f64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            root_cause_threshold: 0.6,
            minimum_total_minutes: 15,
            verify_minutes: 5,
            low_confidence_threshold: 0.6,
        }
    }
}

impl PlannerConfig {
    /// Validates ranges.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::ThresholdOutOfRange` for thresholds outside [0, 1].
    pub fn validate(self) -> Result<Self, ValidationError> {
        ensure_unit_interval("root_cause_threshold", self.root_cause_threshold)?;
        ensure_unit_interval("low_confidence_threshold", self.low_confidence_threshold)?;
        Ok(self)
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Mastery model.
    pub mastery: MasteryConfig,
    /// Adaptive tester.
    pub assessment: AssessmentConfig,
    /// Prescription planner.
    pub planner: PlannerConfig,
}

impl EngineConfig {
    /// Parses a JSON configuration; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::Parse` for malformed JSON and range errors
    /// from [`Self::validate`].
    pub fn from_json_str(json: &str) -> Result<Self, ValidationError> {
        let config: Self = serde_json::from_str(json).map_err(|e| ValidationError::Parse {
            what: "engine config".to_string(),
            message: e.to_string(),
        })?;
        config.validate()
    }

    /// Reads a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::Parse` if the file cannot be read or parsed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ValidationError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| ValidationError::Parse {
            what: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_json_str(&json)
    }

    /// Validates every section.
    ///
    /// # Errors
    ///
    /// Returns the first range violation found.
    pub fn validate(self) -> Result<Self, ValidationError> {
        Ok(Self {
            mastery: self.mastery.validate()?,
            assessment: self.assessment.validate()?,
            planner: self.planner.validate()?,
        })
    }

    /// Applies `DIAGNOSTIC_*` environment overrides and re-validates.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` if a variable is set but does
    /// not parse, or the result fails validation.
    pub fn with_env_overrides(self) -> Result<Self, ValidationError> {
        self.with_overrides(|key| env::var(key).ok())
    }

    fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ValidationError> {
        if let Some(raw) = lookup(ENV_ROOT_THRESHOLD) {
            self.planner.root_cause_threshold = parse_env(ENV_ROOT_THRESHOLD, &raw)?;
        }
        if let Some(raw) = lookup(ENV_MAX_QUESTIONS) {
            self.assessment.max_questions = parse_env(ENV_MAX_QUESTIONS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_MIN_QUESTIONS) {
            self.assessment.min_questions = parse_env(ENV_MIN_QUESTIONS, &raw)?;
        }
        self.validate()
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ValidationError> {
    raw.trim()
        .parse()
        .map_err(|_| invalid(format!("{key}={raw:?} is not a valid value")))
}

fn invalid(reason: String) -> ValidationError {
    ValidationError::InvalidConfig { reason }
}
