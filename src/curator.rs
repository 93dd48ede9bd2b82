//! Learning resource lookup.
//!
//! The planner asks a [`ResourceCurator`] for resources by concept id and
//! treatment phase. Curators may return nothing; the planner then falls back
//! to [`default_resource`].

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::concept::ConceptId;
use crate::error::{ensure_unit_interval, ValidationError};

const BUILTIN_RESOURCES: &str = include_str!("../data/resources.json");

/// Resources returned per concept and phase.
pub const RESOURCES_PER_PHASE: usize = 2;

/// Kind of learning resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Video lecture.
    #[serde(alias = "youtube")]
    Video,
    /// Written explanation.
    Article,
    /// Interactive exercise with feedback.
    Interactive,
    /// Plain problem set.
    Practice,
}

impl ResourceKind {
    /// Phase this kind of resource is prescribed in.
    #[must_use]
    pub const fn phase(self) -> TreatmentPhaseKind {
        match self {
            Self::Video | Self::Article => TreatmentPhaseKind::Understand,
            Self::Interactive | Self::Practice => TreatmentPhaseKind::Practice,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Article => write!(f, "article"),
            Self::Interactive => write!(f, "interactive"),
            Self::Practice => write!(f, "practice"),
        }
    }
}

/// Phase of a treatment plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreatmentPhaseKind {
    /// Build intuition from an explanation.
    Understand,
    /// Work problems with guidance.
    Practice,
    /// Prove mastery on a checkpoint quiz.
    Verify,
}

impl fmt::Display for TreatmentPhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Understand => write!(f, "understand"),
            Self::Practice => write!(f, "practice"),
            Self::Verify => write!(f, "verify"),
        }
    }
}

/// A resource the planner can prescribe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Title shown to the learner.
    pub title: String,
    /// Link; `None` for built-in guided activities.
    #[serde(default)]
    pub url: Option<String>,
    /// Resource kind.
    pub kind: ResourceKind,
    /// Estimated duration.
    pub duration_minutes: u32,
    /// Why this resource is prescribed.
    #[serde(default)]
    pub why: String,
    /// Start offset for videos, e.g. `"2:34"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Curation quality in [0, 1].
    #[serde(default = "default_quality")]
    pub quality: f64,
}

const fn default_quality() -> f64 {
    0.8
}

impl ResourceDescriptor {
    /// Human label of the resource's origin.
    #[must_use]
    pub fn source(&self) -> &'static str {
        let Some(url) = self.url.as_deref() else {
            return "built-in";
        };
        let url = url.to_ascii_lowercase();
        if url.contains("youtube.com") || url.contains("youtu.be") {
            "YouTube"
        } else if url.contains("khanacademy.org") {
            "Khan Academy"
        } else if url.contains("brilliant.org") {
            "Brilliant"
        } else if url.contains("mit.edu") {
            "MIT"
        } else if url.contains("wolfram") {
            "Wolfram"
        } else {
            "Web"
        }
    }
}

/// Extracts a `m:ss` start offset from a video URL's `t=` parameter.
///
/// Accepts `t=95`, `t=95s` and `t=1m35s`.
#[must_use]
pub fn extract_timestamp(url: &str) -> Option<String> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"[?&#]t=(?:(\d+)m)?(\d+)s?(?:&|$)").expect("timestamp pattern is a valid regex")
    });
    let caps = pattern.captures(url)?;
    let minutes = caps.get(1).map_or(Ok(0), |m| m.as_str().parse::<u64>()).ok()?;
    let seconds: u64 = caps.get(2)?.as_str().parse().ok()?;
    let total = minutes * 60 + seconds;
    Some(format!("{}:{:02}", total / 60, total % 60))
}

/// Built-in fallback used when a curator has nothing for a concept.
#[must_use]
pub fn default_resource(concept_name: &str, phase: TreatmentPhaseKind) -> ResourceDescriptor {
    let (title, kind, why) = match phase {
        TreatmentPhaseKind::Understand => (
            format!("Guided {concept_name} review"),
            ResourceKind::Article,
            "Walk through the key ideas step by step",
        ),
        TreatmentPhaseKind::Practice | TreatmentPhaseKind::Verify => (
            format!("Targeted {concept_name} problems"),
            ResourceKind::Practice,
            "Problems aimed at the weak spot",
        ),
    };
    ResourceDescriptor {
        title,
        url: None,
        kind,
        duration_minutes: 5,
        why: why.to_string(),
        timestamp: None,
        quality: default_quality(),
    }
}

/// Source of learning resources.
///
/// Implementations must be thread-safe; they are shared by every session.
pub trait ResourceCurator: Send + Sync {
    /// Resources for a concept in a given phase, best first. May be empty.
    fn resources_for(&self, concept: &ConceptId, phase: TreatmentPhaseKind) -> Vec<ResourceDescriptor>;
}

#[derive(Debug, Deserialize)]
struct RawResources {
    resources: Vec<RawResource>,
}

#[derive(Debug, Deserialize)]
struct RawResource {
    concept: ConceptId,
    #[serde(default)]
    id: Option<String>,
    #[serde(flatten)]
    descriptor: ResourceDescriptor,
}

/// In-memory curator backed by a fixed resource list.
#[derive(Debug, Clone, Default)]
pub struct StaticResourceCurator {
    by_concept: HashMap<ConceptId, Vec<ResourceDescriptor>>,
}

impl StaticResourceCurator {
    /// Creates an empty curator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a resource (fluent form).
    #[must_use]
    pub fn with_resource(mut self, concept: ConceptId, resource: ResourceDescriptor) -> Self {
        self.add(concept, resource);
        self
    }

    /// Adds a resource, deriving its timestamp from the URL when absent.
    pub fn add(&mut self, concept: ConceptId, mut resource: ResourceDescriptor) {
        if resource.timestamp.is_none() {
            resource.timestamp = resource.url.as_deref().and_then(extract_timestamp);
        }
        let list = self.by_concept.entry(concept).or_default();
        list.push(resource);
        list.sort_by(|a, b| b.quality.total_cmp(&a.quality));
    }

    /// Parses a JSON resource list.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::Parse` for malformed JSON,
    /// `EmptyField` for untitled resources and `ThresholdOutOfRange` for
    /// quality outside [0, 1].
    pub fn from_json_str(json: &str) -> Result<Self, ValidationError> {
        let raw: RawResources = serde_json::from_str(json).map_err(|e| ValidationError::Parse {
            what: "resource list".to_string(),
            message: e.to_string(),
        })?;
        let mut curator = Self::new();
        for resource in raw.resources {
            if resource.descriptor.title.trim().is_empty() {
                return Err(ValidationError::EmptyField {
                    field: format!(
                        "resource[{}].title",
                        resource.id.as_deref().unwrap_or(resource.concept.as_str())
                    ),
                });
            }
            ensure_unit_interval("resource.quality", resource.descriptor.quality)?;
            curator.add(resource.concept, resource.descriptor);
        }
        info!(
            concepts = curator.by_concept.len(),
            resources = curator.len(),
            "Resource list loaded"
        );
        Ok(curator)
    }

    /// Reads a JSON resource list from disk.
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

    /// The built-in linear algebra resources.
    ///
    /// # Errors
    ///
    /// Only fails if the embedded list is itself invalid.
    pub fn builtin() -> Result<Self, ValidationError> {
        Self::from_json_str(BUILTIN_RESOURCES)
    }

    /// Total number of resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_concept.values().map(Vec::len).sum()
    }

    /// Returns true if no resources are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResourceCurator for StaticResourceCurator {
    fn resources_for(&self, concept: &ConceptId, phase: TreatmentPhaseKind) -> Vec<ResourceDescriptor> {
        self.by_concept
            .get(concept)
            .map(|list| {
                list.iter()
                    .filter(|r| r.kind.phase() == phase)
                    .take(RESOURCES_PER_PHASE)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}
