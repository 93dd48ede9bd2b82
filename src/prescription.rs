//! Prescription planner.
//!
//! Combines root-cause tracing, misconception aggregation and resource
//! lookup into a phased [`LearningPrescription`].

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::concept::{ConceptId, DifficultyTier, MasteryScores, QuestionId};
use crate::config::PlannerConfig;
use crate::curator::{default_resource, ResourceCurator, ResourceDescriptor, TreatmentPhaseKind};
use crate::error::DiagnosticResult;
use crate::graph::{ConceptGraph, RootCause};
use crate::misconception::{AnswerEvidence, Diagnosis, Misconception, MisconceptionCatalog};

const BASE_CONFIDENCE: f64 = 0.5;
const CONFIDENCE_STEP: f64 = 0.1;
const MAX_CONFIDENCE: f64 = 0.95;

/// One step of a treatment plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreatmentPhase {
    /// Phase kind.
    pub kind: TreatmentPhaseKind,
    /// Heading.
    pub title: String,
    /// Instructions for the learner.
    pub instructions: String,
    /// Prescribed resources; empty for the verify phase.
    pub resources: Vec<ResourceDescriptor>,
    /// Estimated minutes.
    pub estimated_minutes: u32,
}

/// How the learner proves the gap is closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationCriteria {
    /// Correct answers required.
    pub questions_to_pass: usize,
    /// Questions in the checkpoint.
    pub questions_total: usize,
    /// Whether worked solutions are required.
    pub must_show_work: bool,
    /// Suggested checkpoint questions.
    pub question_ids: Vec<QuestionId>,
    /// Success statement shown to the learner.
    pub success_criteria: String,
}

/// A complete remediation plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningPrescription {
    /// Concept the learner failed.
    pub failed_concept: ConceptId,
    /// Display name of the failed concept.
    pub failed_concept_name: String,
    /// Machine-readable root cause.
    pub root_cause: RootCause,
    /// Display text for the root cause.
    pub root_cause_description: String,
    /// Concept the treatment targets.
    pub target_concept: ConceptId,
    /// Display name of the target concept.
    pub target_concept_name: String,
    /// Distinct catalogued misconceptions, most severe first.
    pub misconceptions: Vec<Misconception>,
    /// Most severe catalogued diagnosis.
    pub primary_diagnosis: Option<Diagnosis>,
    /// Remediation concept with the most diagnoses.
    pub primary_weakness: Option<ConceptId>,
    /// Confidence in the diagnosis, in [0, 0.95].
    pub confidence: f64,
    /// Confidence below the planner's threshold.
    pub low_confidence: bool,
    /// 1 (single issue) to 3 (prerequisite gap).
    pub severity: u8,
    /// Understand, practice, verify.
    pub phases: Vec<TreatmentPhase>,
    /// Total estimated minutes.
    pub total_minutes: u32,
    /// Checkpoint rules.
    pub verification: VerificationCriteria,
    /// Generation time.
    pub generated_at: DateTime<Utc>,
}

impl LearningPrescription {
    /// Returns true if the diagnosis rests on thin evidence.
    ///
    /// This is a quality signal for the caller, not an error.
    #[must_use]
    pub const fn is_low_confidence(&self) -> bool {
        self.low_confidence
    }

    /// Renders the prescription as Markdown.
    #[must_use]
    pub fn render_markdown(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for LearningPrescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# Learning Prescription")?;
        writeln!(
            f,
            "**Concept:** {} (severity {}/3)",
            self.failed_concept_name, self.severity
        )?;
        writeln!(f, "**Diagnosis:** {}", self.root_cause_description)?;
        writeln!(f, "**Confidence:** {:.0}%", self.confidence * 100.0)?;
        if self.low_confidence {
            writeln!(f, "*Limited evidence; treat this diagnosis as provisional.*")?;
        }
        writeln!(f)?;

        if self.root_cause.is_prerequisite_gap() {
            writeln!(
                f,
                "**Root cause:** your foundation in **{}** needs strengthening first.\n",
                self.target_concept_name
            )?;
        }

        if !self.misconceptions.is_empty() {
            writeln!(f, "## Detected Issues")?;
            for m in &self.misconceptions {
                writeln!(f, "- **{}** ({}): {}", m.name, m.severity, m.description)?;
            }
            writeln!(f)?;
        }

        writeln!(f, "## Treatment Plan")?;
        writeln!(f, "*Total time: ~{} minutes*\n", self.total_minutes)?;
        for (i, phase) in self.phases.iter().enumerate() {
            writeln!(
                f,
                "### Phase {}: {} ({} min)",
                i + 1,
                phase.title,
                phase.estimated_minutes
            )?;
            writeln!(f, "{}", phase.instructions)?;
            for r in &phase.resources {
                let start = r
                    .timestamp
                    .as_deref()
                    .map(|t| format!(" (start at {t})"))
                    .unwrap_or_default();
                match &r.url {
                    Some(url) => writeln!(f, "- [{}]({url}){start}", r.title)?,
                    None => writeln!(f, "- {}{start}", r.title)?,
                }
                if !r.why.is_empty() {
                    writeln!(f, "  *{}*", r.why)?;
                }
            }
            writeln!(f)?;
        }

        let v = &self.verification;
        writeln!(f, "## Verification")?;
        writeln!(
            f,
            "Pass {}/{} questions to advance.",
            v.questions_to_pass, v.questions_total
        )?;
        writeln!(f, "{}", v.success_criteria)?;
        if v.must_show_work {
            writeln!(f, "*Show your work for full credit.*")?;
        }
        Ok(())
    }
}

/// Builds prescriptions from shared, read-only components.
pub struct PrescriptionPlanner<'a> {
    graph: &'a ConceptGraph,
    catalog: &'a MisconceptionCatalog,
    curator: &'a dyn ResourceCurator,
    config: PlannerConfig,
    checkpoint_pass: usize,
    checkpoint_total: usize,
}

impl<'a> PrescriptionPlanner<'a> {
    /// Creates a planner with default settings and a 2-of-3 checkpoint.
    #[must_use]
    pub fn new(
        graph: &'a ConceptGraph,
        catalog: &'a MisconceptionCatalog,
        curator: &'a dyn ResourceCurator,
    ) -> Self {
        Self {
            graph,
            catalog,
            curator,
            config: PlannerConfig::default(),
            checkpoint_pass: 2,
            checkpoint_total: 3,
        }
    }

    /// Sets planner parameters.
    #[must_use]
    pub fn with_config(mut self, config: PlannerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the checkpoint pass mark.
    #[must_use]
    pub fn with_checkpoint(mut self, pass: usize, total: usize) -> Self {
        self.checkpoint_pass = pass;
        self.checkpoint_total = total;
        self
    }

    /// Generates a prescription for a failed concept.
    ///
    /// `answers` may include correct answers; only wrong ones count as
    /// evidence. Concepts missing from `mastery` count as the default mastery.
    ///
    /// # Errors
    ///
    /// Returns `ConceptNotFound` for an unknown `failed` concept and
    /// `ThresholdOutOfRange` if the configured root-cause threshold is invalid.
    pub fn generate(
        &self,
        failed: &str,
        answers: &[AnswerEvidence],
        mastery: &MasteryScores,
    ) -> DiagnosticResult<LearningPrescription> {
        let root_cause = self
            .graph
            .trace_root_cause(failed, mastery, self.config.root_cause_threshold)?;
        let pattern = self.catalog.aggregate_pattern(answers);

        let mut seen = HashSet::new();
        let misconceptions: Vec<Misconception> = pattern
            .diagnoses()
            .iter()
            .filter(|d| seen.insert(d.misconception.id.clone()))
            .map(|d| d.misconception.clone())
            .collect();
        let wrong = answers.iter().filter(|a| !a.is_correct()).count();
        let confidence = diagnosis_confidence(wrong, misconceptions.len());
        let severity = if root_cause.is_prerequisite_gap() {
            3
        } else if misconceptions.len() >= 2 {
            2
        } else {
            1
        };

        let failed_concept = root_cause.failed.clone();
        let target = root_cause.concept().clone();
        let failed_name = self.graph.display_name(failed_concept.as_str()).to_string();
        let target_name = self.graph.display_name(target.as_str()).to_string();

        let phases = vec![
            self.resource_phase(
                &target,
                &target_name,
                TreatmentPhaseKind::Understand,
                "Build Understanding",
                format!(
                    "Watch or read these to build intuition about {target_name}. \
                     Focus on the ideas, not on memorizing formulas."
                ),
            ),
            self.resource_phase(
                &target,
                &target_name,
                TreatmentPhaseKind::Practice,
                "Guided Practice",
                "Work through these problems step by step. \
                 If you get stuck, revisit the first phase."
                    .to_string(),
            ),
            TreatmentPhase {
                kind: TreatmentPhaseKind::Verify,
                title: "Prove Mastery".to_string(),
                instructions: format!(
                    "Take the checkpoint quiz. Pass {}/{} to advance.",
                    self.checkpoint_pass, self.checkpoint_total
                ),
                resources: Vec::new(),
                estimated_minutes: self.config.verify_minutes,
            },
        ];
        let total_minutes = phases
            .iter()
            .map(|p| p.estimated_minutes)
            .sum::<u32>()
            .max(self.config.minimum_total_minutes);

        let primary_diagnosis = pattern.most_critical().cloned();
        let success_criteria = match &primary_diagnosis {
            Some(d) => format!(
                "Answer {} of {} {target_name} questions correctly without the '{}' error.",
                self.checkpoint_pass, self.checkpoint_total, d.misconception.name
            ),
            None => format!(
                "Answer {} of {} {target_name} questions correctly.",
                self.checkpoint_pass, self.checkpoint_total
            ),
        };
        let verification = VerificationCriteria {
            questions_to_pass: self.checkpoint_pass,
            questions_total: self.checkpoint_total,
            must_show_work: severity >= 2,
            question_ids: self.verification_questions(&target),
            success_criteria,
        };

        info!(
            concept = %failed_concept,
            target = %target,
            severity,
            confidence,
            misconceptions = misconceptions.len(),
            "Prescription generated"
        );

        Ok(LearningPrescription {
            failed_concept,
            failed_concept_name: failed_name,
            root_cause_description: root_cause.describe(self.graph),
            root_cause,
            target_concept: target,
            target_concept_name: target_name,
            misconceptions,
            primary_weakness: pattern.primary_weakness().cloned(),
            primary_diagnosis,
            confidence,
            low_confidence: confidence < self.config.low_confidence_threshold,
            severity,
            phases,
            total_minutes,
            verification,
            generated_at: Utc::now(),
        })
    }

    fn resource_phase(
        &self,
        concept: &ConceptId,
        concept_name: &str,
        kind: TreatmentPhaseKind,
        title: &str,
        instructions: String,
    ) -> TreatmentPhase {
        let mut resources = self.curator.resources_for(concept, kind);
        if resources.is_empty() {
            warn!(concept = %concept, phase = %kind, "No curated resources; using built-in default");
            resources.push(default_resource(concept_name, kind));
        }
        TreatmentPhase {
            kind,
            title: title.to_string(),
            instructions,
            estimated_minutes: resources.iter().map(|r| r.duration_minutes).sum(),
            resources,
        }
    }

    /// One question per tier where possible, topped up in bank order.
    fn verification_questions(&self, concept: &ConceptId) -> Vec<QuestionId> {
        let Some(concept) = self.graph.get(concept.as_str()) else {
            return Vec::new();
        };
        let mut picked: Vec<QuestionId> = DifficultyTier::ALL
            .iter()
            .filter_map(|&tier| concept.questions.iter().find(|q| q.tier == tier))
            .map(|q| q.id.clone())
            .take(self.checkpoint_total)
            .collect();
        for q in &concept.questions {
            if picked.len() >= self.checkpoint_total {
                break;
            }
            if !picked.contains(&q.id) {
                picked.push(q.id.clone());
            }
        }
        picked
    }
}

/// Confidence from the amount of evidence: 0.5 base, up to +0.2 for extra
/// wrong answers and up to +0.2 for distinct catalogued misconceptions.
fn diagnosis_confidence(wrong_answers: usize, distinct_misconceptions: usize) -> f64 {
    let extra_wrong = wrong_answers.saturating_sub(1).min(2);
    let patterns = distinct_misconceptions.min(2);
    let bonus = CONFIDENCE_STEP * (extra_wrong + patterns) as f64;
    (BASE_CONFIDENCE + bonus).min(MAX_CONFIDENCE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curator::{ResourceKind, StaticResourceCurator};
    use crate::graph::RootCauseKind;

    fn answer(question: &str, concept: &str, chosen: usize, correct: usize) -> AnswerEvidence {
        AnswerEvidence {
            question: QuestionId::new_unchecked(question),
            concept: ConceptId::new_unchecked(concept),
            chosen,
            correct,
        }
    }

    fn scores(pairs: &[(&str, f64)]) -> MasteryScores {
        pairs
            .iter()
            .map(|(id, s)| (ConceptId::new_unchecked(*id), *s))
            .collect()
    }

    struct Fixture {
        graph: ConceptGraph,
        catalog: MisconceptionCatalog,
        curator: StaticResourceCurator,
    }

    fn fixture() -> Fixture {
        Fixture {
            graph: ConceptGraph::linear_algebra().unwrap(),
            catalog: MisconceptionCatalog::builtin().unwrap(),
            curator: StaticResourceCurator::builtin().unwrap(),
        }
    }

    #[test]
    fn confidence_steps() {
        assert!((diagnosis_confidence(1, 0) - 0.5).abs() < 1e-12);
        assert!((diagnosis_confidence(2, 0) - 0.6).abs() < 1e-12);
        assert!((diagnosis_confidence(3, 1) - 0.8).abs() < 1e-12);
        assert!((diagnosis_confidence(10, 10) - 0.9).abs() < 1e-12);
        assert!(diagnosis_confidence(100, 100) <= MAX_CONFIDENCE);
    }

    #[test]
    fn weak_prerequisite_targets_prerequisite_resources() {
        let f = fixture();
        let planner = PrescriptionPlanner::new(&f.graph, &f.catalog, &f.curator);
        let mastery = scores(&[
            ("vectors", 0.9),
            ("matrix_ops", 0.8),
            ("determinants", 0.45),
            ("inverse_matrix", 0.7),
        ]);
        let answers = [
            answer("eig_1", "eigenvalues", 0, 1),
            answer("eig_5", "eigenvalues", 0, 1),
            answer("eig_2", "eigenvalues", 0, 0),
        ];
        let p = planner.generate("eigenvalues", &answers, &mastery).unwrap();

        assert_eq!(p.target_concept.as_str(), "determinants");
        assert!(matches!(
            p.root_cause.kind,
            RootCauseKind::WeakPrerequisite { .. }
        ));
        assert_eq!(p.severity, 3);
        assert!(p.verification.must_show_work);
        // Two wrong answers, two distinct catalogued misconceptions.
        assert!((p.confidence - 0.8).abs() < 1e-12);
        assert!(!p.is_low_confidence());

        let kinds: Vec<TreatmentPhaseKind> = p.phases.iter().map(|ph| ph.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TreatmentPhaseKind::Understand,
                TreatmentPhaseKind::Practice,
                TreatmentPhaseKind::Verify
            ]
        );
        assert!(p.phases[0]
            .resources
            .iter()
            .all(|r| r.kind == ResourceKind::Video && r.url.is_some()));
        assert!(p.phases[2].resources.is_empty());
        assert!(p.verification.question_ids.iter().all(|q| q.as_str().starts_with("det_")));
        assert_eq!(p.verification.question_ids.len(), 3);
        assert!(p.total_minutes >= 15);
    }

    #[test]
    fn new_gap_description_never_self_references() {
        let f = fixture();
        let planner = PrescriptionPlanner::new(&f.graph, &f.catalog, &f.curator);
        let mastery = scores(&[("vectors", 0.9), ("matrix_ops", 0.9)]);
        let p = planner
            .generate("determinants", &[answer("det_5", "determinants", 0, 1)], &mastery)
            .unwrap();
        assert_eq!(p.root_cause.kind, RootCauseKind::NewGapInSelf);
        assert_eq!(p.target_concept.as_str(), "determinants");
        assert!(!p.root_cause_description.contains("caused by"));
        assert_eq!(p.severity, 1);
        // One wrong answer, one named misconception.
        assert!((p.confidence - 0.6).abs() < 1e-12);
        assert!(p.verification.success_criteria.contains("Addition in Determinant"));
    }

    #[test]
    fn empty_curator_falls_back_to_defaults() {
        let f = fixture();
        let empty = StaticResourceCurator::new();
        let planner = PrescriptionPlanner::new(&f.graph, &f.catalog, &empty);
        let p = planner
            .generate("vectors", &[answer("vec_3", "vectors", 1, 0)], &MasteryScores::new())
            .unwrap();
        assert_eq!(p.root_cause.kind, RootCauseKind::Foundation);
        assert_eq!(p.phases[0].resources.len(), 1);
        assert!(p.phases[0].resources[0].url.is_none());
        // 5 + 5 + 5 floors to 15.
        assert_eq!(p.total_minutes, 15);
        // Uncatalogued answer: no named misconceptions.
        assert!(p.misconceptions.is_empty());
        assert!(p.primary_diagnosis.is_none());
        assert!(p.is_low_confidence());
    }

    #[test]
    fn unknown_concept_is_not_found() {
        let f = fixture();
        let planner = PrescriptionPlanner::new(&f.graph, &f.catalog, &f.curator);
        let err = planner
            .generate("calculus", &[], &MasteryScores::new())
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn markdown_mentions_phases_and_timestamps() {
        let f = fixture();
        let planner = PrescriptionPlanner::new(&f.graph, &f.catalog, &f.curator)
            .with_checkpoint(3, 4);
        let mastery = scores(&[
            ("vectors", 0.9),
            ("matrix_ops", 0.9),
            ("determinants", 0.9),
            ("inverse_matrix", 0.9),
        ]);
        let answers = [
            answer("eig_1", "eigenvalues", 0, 1),
            answer("eig_3", "eigenvalues", 0, 1),
        ];
        let p = planner.generate("eigenvalues", &answers, &mastery).unwrap();
        assert_eq!(p.severity, 2);
        assert_eq!(p.verification.questions_to_pass, 3);
        assert_eq!(p.verification.question_ids.len(), 4);

        let md = p.render_markdown();
        assert!(md.contains("# Learning Prescription"));
        assert!(md.contains("### Phase 3: Prove Mastery"));
        assert!(md.contains("(start at 1:35)"));
        assert!(md.contains("Pass 3/4 questions to advance."));
        assert!(md.contains("Show your work"));
        assert!(!md.contains("Root cause:"));
        assert_eq!(md, format!("{p}"));
    }
}
