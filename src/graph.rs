//! Concept dependency graph.
//!
//! The graph is a DAG of concepts connected by prerequisite edges
//! (prerequisite → dependent). It is validated and topologically sorted
//! once, at load time, and is immutable afterwards so it can be shared
//! read-only across sessions behind an `Arc`.
//!
//! Root-cause tracing walks a failed concept's ancestors in topological
//! order (prerequisites first) and reports the first one whose mastery is
//! below threshold. The result is a tagged [`RootCause`]: the concept id used
//! for lookups is kept apart from the prose used for display.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::concept::{
    mastery_or_default, Concept, ConceptId, DifficultyTier, MasteryScores, Question, QuestionId,
};
use crate::config::MasteryConfig;
use crate::error::{ensure_unit_interval, DiagnosticError, DiagnosticResult, ValidationError};

/// Mastery below which an ancestor is reported as the root cause.
pub const DEFAULT_ROOT_CAUSE_THRESHOLD: f64 = 0.6;

const BUILTIN_LINEAR_ALGEBRA: &str = include_str!("../data/linear_algebra.json");

/// Why a concept was failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RootCauseKind {
    /// The failed concept has no prerequisites.
    Foundation,

    /// An ancestor is below threshold; it is the earliest such ancestor.
    WeakPrerequisite {
        /// The weak ancestor.
        concept: ConceptId,
        /// Its mastery at tracing time.
        mastery: f64,
    },

    /// All ancestors are at or above threshold; the gap is in the concept itself.
    NewGapInSelf,
}

/// Result of tracing a failure back through the prerequisite chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootCause {
    /// The concept the learner failed.
    pub failed: ConceptId,
    /// What the trace found.
    #[serde(flatten)]
    pub kind: RootCauseKind,
}

impl RootCause {
    /// The concept remediation should target. Use this id for resource
    /// lookups, never the display text.
    #[must_use]
    pub fn concept(&self) -> &ConceptId {
        match &self.kind {
            RootCauseKind::WeakPrerequisite { concept, .. } => concept,
            RootCauseKind::Foundation | RootCauseKind::NewGapInSelf => &self.failed,
        }
    }

    /// Returns true if the failure traces to a weak prerequisite.
    #[must_use]
    pub const fn is_prerequisite_gap(&self) -> bool {
        matches!(self.kind, RootCauseKind::WeakPrerequisite { .. })
    }

    /// Human-readable cause using concept display names.
    #[must_use]
    pub fn describe(&self, graph: &ConceptGraph) -> String {
        let failed = graph.display_name(self.failed.as_str());
        match &self.kind {
            RootCauseKind::Foundation => {
                format!("{failed} is foundational (no prerequisites)")
            }
            RootCauseKind::WeakPrerequisite { concept, mastery } => format!(
                "{failed} traces back to weak prerequisite {} (mastery {:.0}%)",
                graph.display_name(concept.as_str()),
                mastery * 100.0
            ),
            RootCauseKind::NewGapInSelf => {
                format!("{failed} is a new gap; its prerequisites are solid")
            }
        }
    }
}

impl fmt::Display for RootCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            RootCauseKind::Foundation => write!(f, "{}: foundation, no prerequisites", self.failed),
            RootCauseKind::WeakPrerequisite { concept, mastery } => {
                write!(f, "{}: weak prerequisite {concept} ({mastery:.2})", self.failed)
            }
            RootCauseKind::NewGapInSelf => {
                write!(f, "{}: new gap, prerequisites solid", self.failed)
            }
        }
    }
}

/// Coarse mastery classification used for visualisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MasteryBand {
    /// Below the weak threshold.
    Weak,
    /// Between weak and mastered.
    Learning,
    /// At or above the mastery threshold.
    Mastered,
}

impl MasteryBand {
    /// Classifies a mastery score against the configured thresholds.
    #[must_use]
    pub fn from_score(score: f64, config: &MasteryConfig) -> Self {
        if score < config.weak_threshold {
            Self::Weak
        } else if score < config.mastery_threshold {
            Self::Learning
        } else {
            Self::Mastered
        }
    }
}

/// A concept node in a [`GraphSnapshot`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Concept id.
    pub id: ConceptId,
    /// Display name.
    pub label: String,
    /// Mastery score used for the band.
    pub score: f64,
    /// Classification of `score`.
    pub band: MasteryBand,
}

/// A prerequisite edge in a [`GraphSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    /// The prerequisite.
    pub source: ConceptId,
    /// The dependent concept.
    pub target: ConceptId,
}

/// Mastery-annotated view of the graph for rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    /// Nodes in topological order.
    pub nodes: Vec<GraphNode>,
    /// All prerequisite edges.
    pub edges: Vec<GraphEdge>,
}

/// Size statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    /// Number of concepts.
    pub concepts: usize,
    /// Number of prerequisite edges.
    pub edges: usize,
    /// Number of questions across all banks.
    pub questions: usize,
    /// Edge count of the longest prerequisite chain.
    pub max_depth: usize,
}

/// Incrementally assembles a [`ConceptGraph`]. All validation happens in
/// [`ConceptGraphBuilder::build`].
#[derive(Debug, Clone, Default)]
pub struct ConceptGraphBuilder {
    concepts: Vec<Concept>,
}

impl ConceptGraphBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a concept (fluent form).
    #[must_use]
    pub fn concept(mut self, concept: Concept) -> Self {
        self.concepts.push(concept);
        self
    }

    /// Adds a concept.
    pub fn add_concept(&mut self, concept: Concept) -> &mut Self {
        self.concepts.push(concept);
        self
    }

    /// Adds a prerequisite edge to an already-added concept.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidGraph` if `dependent` has not been added.
    pub fn add_prerequisite(
        &mut self,
        dependent: &str,
        prerequisite: ConceptId,
    ) -> Result<&mut Self, ValidationError> {
        let concept = self
            .concepts
            .iter_mut()
            .find(|c| c.id.as_str() == dependent)
            .ok_or_else(|| ValidationError::InvalidGraph {
                reason: format!("cannot add prerequisite to unknown concept '{dependent}'"),
            })?;
        concept.prerequisites.push(prerequisite);
        Ok(self)
    }

    /// Validates the concept set and computes the topological order.
    ///
    /// # Errors
    ///
    /// - `DuplicateId` for repeated concept or question ids
    /// - `EmptyField` for a blank concept name
    /// - `UnknownPrerequisite` for an edge to a concept not in the set
    /// - `InvalidGraph` for self-loops, cycles, or questions filed under the
    ///   wrong concept
    pub fn build(self) -> Result<ConceptGraph, ValidationError> {
        let mut concepts = self.concepts;
        let n = concepts.len();

        let mut index: HashMap<ConceptId, usize> = HashMap::with_capacity(n);
        for (i, concept) in concepts.iter().enumerate() {
            if concept.name.trim().is_empty() {
                return Err(ValidationError::EmptyField {
                    field: format!("concept[{}].name", concept.id),
                });
            }
            if index.insert(concept.id.clone(), i).is_some() {
                return Err(ValidationError::DuplicateId {
                    kind: "concept",
                    id: concept.id.to_string(),
                });
            }
        }

        let mut questions: HashMap<QuestionId, (usize, usize)> = HashMap::new();
        for (ci, concept) in concepts.iter().enumerate() {
            for (qi, question) in concept.questions.iter().enumerate() {
                if question.concept != concept.id {
                    return Err(ValidationError::InvalidGraph {
                        reason: format!(
                            "question '{}' declares concept '{}' but is listed under '{}'",
                            question.id, question.concept, concept.id
                        ),
                    });
                }
                if questions.insert(question.id.clone(), (ci, qi)).is_some() {
                    return Err(ValidationError::DuplicateId {
                        kind: "question",
                        id: question.id.to_string(),
                    });
                }
            }
        }

        let mut prerequisites: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (ci, concept) in concepts.iter_mut().enumerate() {
            let mut seen = HashSet::new();
            concept.prerequisites.retain(|p| seen.insert(p.clone()));

            for prerequisite in &concept.prerequisites {
                let Some(&pi) = index.get(prerequisite) else {
                    return Err(ValidationError::UnknownPrerequisite {
                        concept: concept.id.to_string(),
                        prerequisite: prerequisite.to_string(),
                    });
                };
                if pi == ci {
                    return Err(ValidationError::InvalidGraph {
                        reason: format!("concept '{}' lists itself as a prerequisite", concept.id),
                    });
                }
                prerequisites[ci].push(pi);
                dependents[pi].push(ci);
            }
        }

        // Kahn's algorithm; ties go to the concept loaded first so the order is stable.
        let mut in_degree: Vec<usize> = prerequisites.iter().map(Vec::len).collect();
        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(i, _)| Reverse(i))
            .collect();
        let mut order = Vec::with_capacity(n);
        while let Some(Reverse(i)) = ready.pop() {
            order.push(i);
            for &d in &dependents[i] {
                in_degree[d] -= 1;
                if in_degree[d] == 0 {
                    ready.push(Reverse(d));
                }
            }
        }

        if order.len() < n {
            let unresolved: Vec<&str> = (0..n)
                .filter(|&i| in_degree[i] > 0)
                .map(|i| concepts[i].id.as_str())
                .collect();
            return Err(ValidationError::InvalidGraph {
                reason: format!(
                    "prerequisite cycle detected; unresolved concepts: {}",
                    unresolved.join(", ")
                ),
            });
        }

        let mut position = vec![0; n];
        for (pos, &i) in order.iter().enumerate() {
            position[i] = pos;
        }

        let graph = ConceptGraph {
            concepts,
            index,
            prerequisites,
            dependents,
            order,
            position,
            questions,
        };
        let stats = graph.stats();
        info!(
            concepts = stats.concepts,
            edges = stats.edges,
            questions = stats.questions,
            max_depth = stats.max_depth,
            "Concept graph loaded"
        );
        Ok(graph)
    }
}

/// Immutable, validated concept DAG with its question banks.
#[derive(Debug, Clone)]
pub struct ConceptGraph {
    concepts: Vec<Concept>,
    index: HashMap<ConceptId, usize>,
    prerequisites: Vec<Vec<usize>>,
    dependents: Vec<Vec<usize>>,
    order: Vec<usize>,
    position: Vec<usize>,
    questions: HashMap<QuestionId, (usize, usize)>,
}

impl ConceptGraph {
    /// Starts a new builder.
    #[must_use]
    pub fn builder() -> ConceptGraphBuilder {
        ConceptGraphBuilder::new()
    }

    /// Builds a graph from a list of concepts.
    ///
    /// # Errors
    ///
    /// See [`ConceptGraphBuilder::build`].
    pub fn from_concepts(concepts: Vec<Concept>) -> Result<Self, ValidationError> {
        ConceptGraphBuilder { concepts }.build()
    }

    /// Returns a builder pre-populated with this graph's concepts.
    #[must_use]
    pub fn to_builder(&self) -> ConceptGraphBuilder {
        ConceptGraphBuilder {
            concepts: self.concepts.clone(),
        }
    }

    /// Returns a new graph with one more prerequisite edge.
    ///
    /// # Errors
    ///
    /// Rejects the edge with `InvalidGraph` if it would create a cycle, and
    /// with `UnknownPrerequisite` if `prerequisite` is not in the graph.
    pub fn with_prerequisite(&self, dependent: &str, prerequisite: &str) -> Result<Self, ValidationError> {
        let mut builder = self.to_builder();
        builder.add_prerequisite(dependent, ConceptId::parse(prerequisite)?)?;
        builder.build()
    }

    /// Parses a JSON question bank.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::Parse` for malformed JSON and the usual
    /// build errors for invalid content.
    pub fn from_json_str(json: &str) -> Result<Self, ValidationError> {
        let raw: RawBank = serde_json::from_str(json).map_err(|e| ValidationError::Parse {
            what: "question bank".to_string(),
            message: e.to_string(),
        })?;
        let concepts = raw
            .concepts
            .into_iter()
            .map(RawConcept::into_concept)
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_concepts(concepts)
    }

    /// Reads and parses a JSON question bank from disk.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::Parse` if the file cannot be read.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ValidationError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| ValidationError::Parse {
            what: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_json_str(&json)
    }

    /// The built-in linear algebra bank (vectors → eigenvalues).
    ///
    /// # Errors
    ///
    /// Only fails if the embedded bank is itself invalid.
    pub fn linear_algebra() -> Result<Self, ValidationError> {
        Self::from_json_str(BUILTIN_LINEAR_ALGEBRA)
    }

    /// Number of concepts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.concepts.len()
    }

    /// Returns true if the graph has no concepts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }

    /// Returns true if `id` is a known concept.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Looks up a concept.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Concept> {
        self.index.get(id).map(|&i| &self.concepts[i])
    }

    /// Looks up a concept, failing with `NotFound`.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionError::ConceptNotFound` for unknown ids.
    pub fn concept(&self, id: &str) -> DiagnosticResult<&Concept> {
        self.get(id).ok_or_else(|| not_found(id))
    }

    /// Concepts in load order.
    pub fn concepts(&self) -> impl Iterator<Item = &Concept> + '_ {
        self.concepts.iter()
    }

    /// Display name of a concept, or the id itself when unknown.
    #[must_use]
    pub fn display_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.get(id).map_or(id, |c| c.name.as_str())
    }

    fn index_of(&self, id: &str) -> DiagnosticResult<usize> {
        self.index.get(id).copied().ok_or_else(|| not_found(id))
    }

    /// Immediate prerequisites, in declaration order.
    ///
    /// # Errors
    ///
    /// Returns `ConceptNotFound` for unknown ids.
    pub fn prerequisites_of(&self, id: &str) -> DiagnosticResult<&[ConceptId]> {
        Ok(&self.concept(id)?.prerequisites)
    }

    /// Concepts that list `id` as an immediate prerequisite, in topological order.
    ///
    /// # Errors
    ///
    /// Returns `ConceptNotFound` for unknown ids.
    pub fn dependents_of(&self, id: &str) -> DiagnosticResult<Vec<&ConceptId>> {
        let i = self.index_of(id)?;
        let mut out = self.dependents[i].clone();
        out.sort_by_key(|&d| self.position[d]);
        Ok(out.into_iter().map(|d| &self.concepts[d].id).collect())
    }

    /// Every transitive prerequisite of `id`, prerequisites first.
    ///
    /// # Errors
    ///
    /// Returns `ConceptNotFound` for unknown ids.
    pub fn all_ancestors_of(&self, id: &str) -> DiagnosticResult<Vec<&ConceptId>> {
        let start = self.index_of(id)?;
        Ok(self.in_topological_order(self.reachable(start, &self.prerequisites)))
    }

    /// Every transitive dependent of `id`, in topological order.
    ///
    /// # Errors
    ///
    /// Returns `ConceptNotFound` for unknown ids.
    pub fn all_dependents_of(&self, id: &str) -> DiagnosticResult<Vec<&ConceptId>> {
        let start = self.index_of(id)?;
        Ok(self.in_topological_order(self.reachable(start, &self.dependents)))
    }

    fn reachable(&self, start: usize, edges: &[Vec<usize>]) -> Vec<bool> {
        let mut seen = vec![false; self.concepts.len()];
        let mut stack: Vec<usize> = edges[start].clone();
        while let Some(i) = stack.pop() {
            if !seen[i] {
                seen[i] = true;
                stack.extend(edges[i].iter().copied().filter(|&j| !seen[j]));
            }
        }
        seen
    }

    fn in_topological_order(&self, members: Vec<bool>) -> Vec<&ConceptId> {
        self.order
            .iter()
            .filter(|&&i| members[i])
            .map(|&i| &self.concepts[i].id)
            .collect()
    }

    /// All concepts in a stable order consistent with every prerequisite edge.
    pub fn topological_order(&self) -> impl ExactSizeIterator<Item = &ConceptId> + '_ {
        self.order.iter().map(|&i| &self.concepts[i].id)
    }

    /// Position of a concept in [`Self::topological_order`].
    #[must_use]
    pub fn topological_position(&self, id: &str) -> Option<usize> {
        self.index.get(id).map(|&i| self.position[i])
    }

    /// Traces a failure on `failed` to its root cause.
    ///
    /// Returns the first ancestor (prerequisites first) whose mastery is below
    /// `threshold`. Concepts absent from `mastery` count as
    /// [`crate::concept::DEFAULT_MASTERY`].
    ///
    /// # Errors
    ///
    /// Returns `ConceptNotFound` for an unknown `failed` concept and
    /// `ThresholdOutOfRange` for a threshold outside [0, 1].
    pub fn trace_root_cause(
        &self,
        failed: &str,
        mastery: &MasteryScores,
        threshold: f64,
    ) -> DiagnosticResult<RootCause> {
        ensure_unit_interval("root_cause_threshold", threshold)?;
        let failed_id = self.concept(failed)?.id.clone();
        let ancestors = self.all_ancestors_of(failed)?;

        if ancestors.is_empty() {
            return Ok(RootCause {
                failed: failed_id,
                kind: RootCauseKind::Foundation,
            });
        }

        let weak = ancestors.into_iter().find_map(|id| {
            let score = mastery_or_default(mastery, id);
            (score < threshold).then(|| (id.clone(), score))
        });

        let kind = match weak {
            Some((concept, mastery)) => RootCauseKind::WeakPrerequisite { concept, mastery },
            None => RootCauseKind::NewGapInSelf,
        };
        Ok(RootCause {
            failed: failed_id,
            kind,
        })
    }

    /// Concepts to study before `target`: the target and its ancestors whose
    /// mastery is below `threshold`, prerequisites first.
    ///
    /// # Errors
    ///
    /// Returns `ConceptNotFound` or `ThresholdOutOfRange`.
    pub fn learning_path(
        &self,
        target: &str,
        mastery: &MasteryScores,
        threshold: f64,
    ) -> DiagnosticResult<Vec<&ConceptId>> {
        ensure_unit_interval("learning_path_threshold", threshold)?;
        let start = self.index_of(target)?;
        let mut members = self.reachable(start, &self.prerequisites);
        members[start] = true;
        Ok(self
            .in_topological_order(members)
            .into_iter()
            .filter(|id| mastery_or_default(mastery, id) < threshold)
            .collect())
    }

    /// Looks up a question by id.
    ///
    /// # Errors
    ///
    /// Returns `QuestionNotFound` for unknown ids.
    pub fn question(&self, id: &str) -> DiagnosticResult<&Question> {
        self.questions
            .get(id)
            .map(|&(ci, qi)| &self.concepts[ci].questions[qi])
            .ok_or_else(|| DiagnosticError::question_not_found(&QuestionId::new_unchecked(id)))
    }

    /// Questions of a concept, optionally restricted to one tier.
    ///
    /// # Errors
    ///
    /// Returns `ConceptNotFound` for unknown ids.
    pub fn questions(&self, concept: &str, tier: Option<DifficultyTier>) -> DiagnosticResult<Vec<&Question>> {
        Ok(self
            .concept(concept)?
            .questions
            .iter()
            .filter(|q| tier.map_or(true, |t| q.tier == t))
            .collect())
    }

    /// Questions of a concept not yet in `asked`, optionally restricted to one tier.
    ///
    /// # Errors
    ///
    /// Returns `ConceptNotFound` for unknown ids.
    pub fn unseen_questions(
        &self,
        concept: &str,
        asked: &HashSet<QuestionId>,
        tier: Option<DifficultyTier>,
    ) -> DiagnosticResult<Vec<&Question>> {
        let mut questions = self.questions(concept, tier)?;
        questions.retain(|q| !asked.contains(&q.id));
        Ok(questions)
    }

    /// One question per concept, in topological order, preferring medium tier.
    #[must_use]
    pub fn diagnostic_set(&self) -> Vec<&Question> {
        self.order
            .iter()
            .filter_map(|&i| {
                let bank = &self.concepts[i].questions;
                bank.iter()
                    .find(|q| q.tier == DifficultyTier::Medium)
                    .or_else(|| bank.first())
            })
            .collect()
    }

    /// Mastery-annotated nodes and edges for rendering.
    ///
    /// Concepts absent from `mastery` take `config.default_mastery`.
    #[must_use]
    pub fn snapshot(&self, mastery: &MasteryScores, config: &MasteryConfig) -> GraphSnapshot {
        let nodes = self
            .order
            .iter()
            .map(|&i| {
                let concept = &self.concepts[i];
                let score = mastery
                    .get(&concept.id)
                    .copied()
                    .unwrap_or(config.default_mastery);
                GraphNode {
                    id: concept.id.clone(),
                    label: concept.name.clone(),
                    score,
                    band: MasteryBand::from_score(score, config),
                }
            })
            .collect();

        let edges = self
            .order
            .iter()
            .flat_map(|&i| {
                self.prerequisites[i].iter().map(move |&p| GraphEdge {
                    source: self.concepts[p].id.clone(),
                    target: self.concepts[i].id.clone(),
                })
            })
            .collect();

        GraphSnapshot { nodes, edges }
    }

    /// Size statistics, including the longest prerequisite chain.
    #[must_use]
    pub fn stats(&self) -> GraphStats {
        let mut depth = vec![0usize; self.concepts.len()];
        for &i in &self.order {
            depth[i] = self.prerequisites[i]
                .iter()
                .map(|&p| depth[p] + 1)
                .max()
                .unwrap_or(0);
        }
        GraphStats {
            concepts: self.concepts.len(),
            edges: self.prerequisites.iter().map(Vec::len).sum(),
            questions: self.questions.len(),
            max_depth: depth.into_iter().max().unwrap_or(0),
        }
    }
}

fn not_found(id: &str) -> DiagnosticError {
    DiagnosticError::concept_not_found(&ConceptId::new_unchecked(id))
}

#[derive(Debug, Deserialize)]
struct RawBank {
    concepts: Vec<RawConcept>,
}

#[derive(Debug, Deserialize)]
struct RawConcept {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    prerequisites: Vec<String>,
    #[serde(default)]
    questions: Vec<RawQuestion>,
}

#[derive(Debug, Deserialize)]
struct RawQuestion {
    id: String,
    #[serde(default)]
    text: String,
    options: Vec<String>,
    correct: usize,
    #[serde(default = "default_tier")]
    difficulty: u8,
    #[serde(default, alias = "hint")]
    explanation: String,
}

const fn default_tier() -> u8 {
    2
}

impl RawConcept {
    fn into_concept(self) -> Result<Concept, ValidationError> {
        let id = ConceptId::parse(&self.id)?;
        let name = self.name.unwrap_or_else(|| id.to_string());
        let prerequisites = self
            .prerequisites
            .iter()
            .map(|p| ConceptId::parse(p))
            .collect::<Result<Vec<_>, _>>()?;
        let questions = self
            .questions
            .into_iter()
            .map(|q| {
                Question::new(
                    QuestionId::parse(&q.id)?,
                    id.clone(),
                    q.text,
                    q.options,
                    q.correct,
                    DifficultyTier::try_from(q.difficulty)?,
                    q.explanation,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Concept {
            id,
            name,
            prerequisites,
            questions,
        })
    }
}
