//! Misconception catalog.
//!
//! Every wrong answer is mapped to a named misconception. Catalog entries are
//! keyed by `(question, chosen option)`; answers with no entry get a generic
//! "unclassified" diagnosis scoped to the question's concept, so
//! classification never fails.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::concept::{ConceptId, QuestionId};
use crate::error::ValidationError;

/// Id of the synthesized diagnosis for uncatalogued wrong answers.
pub const UNCLASSIFIED_ID: &str = "unclassified";

const BUILTIN_CATALOG: &str = include_str!("../data/misconceptions.json");

/// How much a misconception blocks further progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Edge-case slip.
    Minor,
    /// Partial misunderstanding.
    Moderate,
    /// Wrong mental model of a core idea.
    Critical,
}

impl Default for Severity {
    fn default() -> Self {
        Self::Moderate
    }
}

impl Severity {
    /// Fix strategy steps, from the catalog's remediation playbook.
    #[must_use]
    pub fn fix_strategy(self) -> &'static [&'static str] {
        match self {
            Self::Critical => &[
                "Watch a foundational video explanation",
                "Work through 3-5 basic examples by hand",
                "Take a diagnostic quiz to verify the fix",
            ],
            Self::Moderate => &[
                "Review the specific formula or concept",
                "Practice 2-3 targeted problems",
                "Retry a similar question",
            ],
            Self::Minor => &["Quick review of edge cases", "Retry the question"],
        }
    }

    /// Estimated time to fix.
    #[must_use]
    pub const fn estimated_time(self) -> &'static str {
        match self {
            Self::Critical => "10-15 minutes",
            Self::Moderate => "5-10 minutes",
            Self::Minor => "2-5 minutes",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Minor => write!(f, "minor"),
            Self::Moderate => write!(f, "moderate"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// A named incorrect mental model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Misconception {
    /// Stable id, e.g. `"det_ad_plus_bc"`.
    pub id: String,
    /// Short human name.
    pub name: String,
    /// What the learner likely believes.
    pub description: String,
    /// Severity.
    #[serde(default)]
    pub severity: Severity,
    /// Concept remediation should revisit.
    pub remediation_concept: ConceptId,
    /// Specific aspect to focus on.
    pub remediation_focus: String,
    /// Learner groups in which this is common.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub common_in: Vec<String>,
}

impl Misconception {
    /// Generic diagnosis for an uncatalogued wrong answer.
    #[must_use]
    pub fn unclassified(concept: ConceptId) -> Self {
        Self {
            id: UNCLASSIFIED_ID.to_string(),
            name: "Unclassified Error".to_string(),
            description: "Error pattern not yet catalogued".to_string(),
            severity: Severity::Moderate,
            remediation_concept: concept,
            remediation_focus: "general_review".to_string(),
            common_in: Vec::new(),
        }
    }

    /// Returns true for the synthesized "unclassified" diagnosis.
    #[must_use]
    pub fn is_generic(&self) -> bool {
        self.id == UNCLASSIFIED_ID
    }
}

/// One answer as seen by the classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerEvidence {
    /// Question answered.
    pub question: QuestionId,
    /// Concept the question belongs to.
    pub concept: ConceptId,
    /// Option the learner chose.
    pub chosen: usize,
    /// Correct option.
    pub correct: usize,
}

impl AnswerEvidence {
    /// Returns true if the chosen option is the correct one.
    #[must_use]
    pub const fn is_correct(&self) -> bool {
        self.chosen == self.correct
    }
}

/// A classified wrong answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnosis {
    /// Question answered.
    pub question: QuestionId,
    /// Option the learner chose.
    pub chosen: usize,
    /// Correct option.
    pub correct: usize,
    /// Matched misconception.
    pub misconception: Misconception,
    /// Why this particular choice points at the misconception.
    pub explanation: String,
}

impl Diagnosis {
    /// Returns true if no catalog entry matched.
    #[must_use]
    pub fn is_generic(&self) -> bool {
        self.misconception.is_generic()
    }
}

/// Outcome of analysing a set of answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PatternAnalysis {
    /// No wrong answers.
    AllCorrect,
    /// At least one wrong answer. `diagnoses` holds only catalogued
    /// misconceptions and may be empty.
    MisconceptionsDetected {
        /// Catalogued diagnoses, most severe first.
        diagnoses: Vec<Diagnosis>,
        /// Remediation concept with the most diagnoses.
        primary_weakness: Option<ConceptId>,
        /// Diagnoses per remediation concept.
        concept_tally: BTreeMap<ConceptId, usize>,
        /// Most severe diagnosis.
        most_critical: Option<Diagnosis>,
    },
}

impl PatternAnalysis {
    /// Returns true if there were no wrong answers.
    #[must_use]
    pub const fn is_all_correct(&self) -> bool {
        matches!(self, Self::AllCorrect)
    }

    /// Catalogued diagnoses, most severe first.
    #[must_use]
    pub fn diagnoses(&self) -> &[Diagnosis] {
        match self {
            Self::AllCorrect => &[],
            Self::MisconceptionsDetected { diagnoses, .. } => diagnoses,
        }
    }

    /// Remediation concept with the most diagnoses.
    #[must_use]
    pub fn primary_weakness(&self) -> Option<&ConceptId> {
        match self {
            Self::AllCorrect => None,
            Self::MisconceptionsDetected {
                primary_weakness, ..
            } => primary_weakness.as_ref(),
        }
    }

    /// Most severe diagnosis.
    #[must_use]
    pub fn most_critical(&self) -> Option<&Diagnosis> {
        match self {
            Self::AllCorrect => None,
            Self::MisconceptionsDetected { most_critical, .. } => most_critical.as_ref(),
        }
    }

    /// Number of distinct catalogued misconceptions.
    #[must_use]
    pub fn distinct_misconceptions(&self) -> usize {
        let mut ids: Vec<&str> = self
            .diagnoses()
            .iter()
            .map(|d| d.misconception.id.as_str())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids.len()
    }
}

/// Actionable steps for one misconception.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationPlan {
    /// Misconception name.
    pub misconception: String,
    /// Severity.
    pub severity: Severity,
    /// What the learner got wrong.
    pub what_went_wrong: String,
    /// Ordered fix steps.
    pub fix_strategy: Vec<String>,
    /// Concept to revisit.
    pub target_concept: ConceptId,
    /// Focus area within the concept.
    pub focus_area: String,
    /// Estimated time, e.g. `"5-10 minutes"`.
    pub estimated_time: String,
    /// What success looks like.
    pub success_criteria: String,
}

/// A `(question, option)` pair that indicates a misconception.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Trigger {
    /// Question id.
    pub question: QuestionId,
    /// Wrong option index.
    pub option: usize,
}

/// A catalog entry with the answers that trigger it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// The misconception.
    #[serde(flatten)]
    pub misconception: Misconception,
    /// Answers that indicate it.
    #[serde(default)]
    pub triggers: Vec<Trigger>,
}

/// Hand-written explanation for one specific wrong answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecificExplanation {
    /// Question id.
    pub question: QuestionId,
    /// Wrong option index.
    pub option: usize,
    /// Explanation text.
    pub text: String,
}

#[derive(Debug, Deserialize)]
struct RawCatalog {
    #[serde(default)]
    misconceptions: Vec<CatalogEntry>,
    #[serde(default)]
    explanations: Vec<SpecificExplanation>,
}

/// Immutable misconception catalog shared by all sessions.
#[derive(Debug, Clone, Default)]
pub struct MisconceptionCatalog {
    entries: Vec<Misconception>,
    by_id: HashMap<String, usize>,
    by_answer: HashMap<(QuestionId, usize), usize>,
    by_concept: HashMap<ConceptId, Vec<usize>>,
    explanations: HashMap<(QuestionId, usize), String>,
}

impl MisconceptionCatalog {
    /// Builds and validates a catalog.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for duplicate ids or triggers, blank fields,
    /// or use of the reserved `"unclassified"` id.
    pub fn new(
        entries: Vec<CatalogEntry>,
        explanations: Vec<SpecificExplanation>,
    ) -> Result<Self, ValidationError> {
        let mut catalog = Self::default();
        for entry in entries {
            let misconception = entry.misconception;
            for (field, value) in [
                ("id", &misconception.id),
                ("name", &misconception.name),
                ("description", &misconception.description),
            ] {
                if value.trim().is_empty() {
                    return Err(ValidationError::EmptyField {
                        field: format!("misconception.{field}"),
                    });
                }
            }
            if misconception.is_generic() {
                return Err(ValidationError::InvalidId {
                    kind: "misconception",
                    id: misconception.id,
                });
            }

            let index = catalog.entries.len();
            if catalog.by_id.insert(misconception.id.clone(), index).is_some() {
                return Err(ValidationError::DuplicateId {
                    kind: "misconception",
                    id: misconception.id,
                });
            }
            for trigger in entry.triggers {
                let id = format!("{}/{}", trigger.question, trigger.option);
                if catalog
                    .by_answer
                    .insert((trigger.question, trigger.option), index)
                    .is_some()
                {
                    return Err(ValidationError::DuplicateId {
                        kind: "misconception trigger",
                        id,
                    });
                }
            }
            catalog
                .by_concept
                .entry(misconception.remediation_concept.clone())
                .or_default()
                .push(index);
            catalog.entries.push(misconception);
        }

        for explanation in explanations {
            catalog
                .explanations
                .insert((explanation.question, explanation.option), explanation.text);
        }

        info!(
            misconceptions = catalog.entries.len(),
            triggers = catalog.by_answer.len(),
            explanations = catalog.explanations.len(),
            "Misconception catalog loaded"
        );
        Ok(catalog)
    }

    /// Parses a JSON catalog.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::Parse` for malformed JSON.
    pub fn from_json_str(json: &str) -> Result<Self, ValidationError> {
        let raw: RawCatalog = serde_json::from_str(json).map_err(|e| ValidationError::Parse {
            what: "misconception catalog".to_string(),
            message: e.to_string(),
        })?;
        Self::new(raw.misconceptions, raw.explanations)
    }

    /// Reads a JSON catalog from disk.
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

    /// The built-in linear algebra catalog.
    ///
    /// # Errors
    ///
    /// Only fails if the embedded catalog is itself invalid.
    pub fn builtin() -> Result<Self, ValidationError> {
        Self::from_json_str(BUILTIN_CATALOG)
    }

    /// Number of catalogued misconceptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up a misconception by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Misconception> {
        self.by_id.get(id).map(|&i| &self.entries[i])
    }

    /// Catalogued misconceptions whose remediation targets `concept`.
    #[must_use]
    pub fn misconceptions_for_concept(&self, concept: &str) -> Vec<&Misconception> {
        self.by_concept
            .get(concept)
            .map(|indices| indices.iter().map(|&i| &self.entries[i]).collect())
            .unwrap_or_default()
    }

    /// Classifies one answer.
    ///
    /// Returns `None` for a correct answer. Every wrong answer yields a
    /// diagnosis, falling back to [`Misconception::unclassified`].
    #[must_use]
    pub fn classify(
        &self,
        question: &QuestionId,
        concept: &ConceptId,
        chosen: usize,
        correct: usize,
    ) -> Option<Diagnosis> {
        if chosen == correct {
            return None;
        }
        let key = (question.clone(), chosen);
        let misconception = match self.by_answer.get(&key) {
            Some(&i) => self.entries[i].clone(),
            None => {
                warn!(
                    question = %question,
                    concept = %concept,
                    chosen,
                    "Uncatalogued wrong answer; using generic diagnosis"
                );
                Misconception::unclassified(concept.clone())
            }
        };
        let explanation = self.explanations.get(&key).cloned().unwrap_or_else(|| {
            format!("This answer pattern suggests: {}", misconception.description)
        });
        Some(Diagnosis {
            question: key.0,
            chosen,
            correct,
            misconception,
            explanation,
        })
    }

    /// Classifies one [`AnswerEvidence`].
    #[must_use]
    pub fn classify_evidence(&self, answer: &AnswerEvidence) -> Option<Diagnosis> {
        self.classify(&answer.question, &answer.concept, answer.chosen, answer.correct)
    }

    /// Analyses a set of answers for systematic misconceptions.
    ///
    /// Correct answers are ignored. Generic diagnoses are left out of the
    /// result; a set of wrong answers that are all uncatalogued still reports
    /// `MisconceptionsDetected` with an empty list.
    #[must_use]
    pub fn aggregate_pattern(&self, answers: &[AnswerEvidence]) -> PatternAnalysis {
        let wrong: Vec<&AnswerEvidence> = answers.iter().filter(|a| !a.is_correct()).collect();
        if wrong.is_empty() {
            return PatternAnalysis::AllCorrect;
        }

        let mut diagnoses: Vec<Diagnosis> = wrong
            .into_iter()
            .filter_map(|a| self.classify_evidence(a))
            .filter(|d| !d.is_generic())
            .collect();
        // Stable: equal severities keep answer order.
        diagnoses.sort_by(|a, b| b.misconception.severity.cmp(&a.misconception.severity));

        let mut first_seen: Vec<&ConceptId> = Vec::new();
        let mut concept_tally: BTreeMap<ConceptId, usize> = BTreeMap::new();
        for diagnosis in &diagnoses {
            let concept = &diagnosis.misconception.remediation_concept;
            let count = concept_tally.entry(concept.clone()).or_insert(0);
            if *count == 0 {
                first_seen.push(concept);
            }
            *count += 1;
        }

        // Ties go to the concept seen first in severity order.
        let primary_weakness = first_seen
            .iter()
            .rev()
            .max_by_key(|c| concept_tally.get(c.as_str()).copied().unwrap_or(0))
            .map(|c| (*c).clone());
        let most_critical = diagnoses.first().cloned();

        PatternAnalysis::MisconceptionsDetected {
            diagnoses,
            primary_weakness,
            concept_tally,
            most_critical,
        }
    }

    /// Fix strategy for one misconception.
    #[must_use]
    pub fn remediation_plan(&self, misconception: &Misconception) -> RemediationPlan {
        RemediationPlan {
            misconception: misconception.name.clone(),
            severity: misconception.severity,
            what_went_wrong: misconception.description.clone(),
            fix_strategy: misconception
                .severity
                .fix_strategy()
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            target_concept: misconception.remediation_concept.clone(),
            focus_area: misconception.remediation_focus.clone(),
            estimated_time: misconception.severity.estimated_time().to_string(),
            success_criteria: format!(
                "Answer 2 questions on {} correctly",
                misconception.remediation_focus
            ),
        }
    }
}
