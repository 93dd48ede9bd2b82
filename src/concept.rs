//! Concept and question records.
//!
//! Concepts are the nodes of the prerequisite graph; each owns an immutable
//! bank of multiple-choice questions. Identifiers are validated once, at load
//! time, and are immutable afterwards.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Maximum identifier length accepted at load time.
pub const MAX_ID_LENGTH: usize = 128;

/// Mastery assumed for a concept that has no recorded score, unless
/// overridden by `MasteryConfig::default_mastery`.
pub const DEFAULT_MASTERY: f64 = 0.5;

/// Blended mastery score per concept, as exchanged with the session store.
pub type MasteryScores = HashMap<ConceptId, f64>;

/// Looks up a concept's mastery, falling back to [`DEFAULT_MASTERY`].
#[must_use]
pub fn mastery_or_default(scores: &MasteryScores, id: &ConceptId) -> f64 {
    scores.get(id).copied().unwrap_or(DEFAULT_MASTERY)
}

static ID_PATTERN: OnceLock<Regex> = OnceLock::new();

fn id_pattern() -> &'static Regex {
    ID_PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.\-]*$").expect("identifier pattern is a valid regex")
    })
}

fn validate_id(kind: &'static str, raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField {
            field: format!("{kind}.id"),
        });
    }
    if trimmed.len() > MAX_ID_LENGTH || !id_pattern().is_match(trimmed) {
        return Err(ValidationError::InvalidId {
            kind,
            id: raw.to_string(),
        });
    }
    Ok(trimmed.to_string())
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Parses and validates an identifier.
            ///
            /// # Errors
            ///
            /// Returns `ValidationError` if the id is empty, too long, or
            /// contains characters outside `[A-Za-z0-9_.-]`.
            pub fn parse(raw: &str) -> Result<Self, ValidationError> {
                validate_id($kind, raw).map(Self)
            }

            /// Wraps an identifier without validation.
            ///
            /// Intended for ids that already passed through [`Self::parse`]
            /// or that are compile-time literals.
            #[must_use]
            pub fn new_unchecked(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let raw = String::deserialize(deserializer)?;
                Self::parse(&raw).map_err(serde::de::Error::custom)
            }
        }
    };
}

string_id!(
    /// Stable identifier of a concept (e.g. `"eigenvalues"`).
    ConceptId,
    "concept"
);

string_id!(
    /// Stable identifier of a question (e.g. `"eig_1"`).
    QuestionId,
    "question"
);

/// Question difficulty tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DifficultyTier {
    /// Tier 1.
    Easy,
    /// Tier 2.
    Medium,
    /// Tier 3.
    Hard,
}

impl DifficultyTier {
    /// All tiers, easiest first.
    pub const ALL: [Self; 3] = [Self::Easy, Self::Medium, Self::Hard];

    /// Maps the tier onto the IRT difficulty scale (1→-1, 2→0, 3→1).
    #[must_use]
    pub const fn irt_difficulty(self) -> f64 {
        match self {
            Self::Easy => -1.0,
            Self::Medium => 0.0,
            Self::Hard => 1.0,
        }
    }

    /// Tier number as stored in question banks.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Easy => 1,
            Self::Medium => 2,
            Self::Hard => 3,
        }
    }

    /// Target tier for the n-th question (0-based) of a progressive sequence.
    #[must_use]
    pub const fn progressive(already_asked: usize) -> Self {
        match already_asked {
            0 => Self::Easy,
            1 => Self::Medium,
            _ => Self::Hard,
        }
    }
}

impl TryFrom<u8> for DifficultyTier {
    type Error = ValidationError;

    fn try_from(tier: u8) -> Result<Self, Self::Error> {
        match tier {
            1 => Ok(Self::Easy),
            2 => Ok(Self::Medium),
            3 => Ok(Self::Hard),
            _ => Err(ValidationError::InvalidTier { tier }),
        }
    }
}

impl From<DifficultyTier> for u8 {
    fn from(tier: DifficultyTier) -> Self {
        tier.as_u8()
    }
}

impl fmt::Display for DifficultyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Easy => write!(f, "easy"),
            Self::Medium => write!(f, "medium"),
            Self::Hard => write!(f, "hard"),
        }
    }
}

/// An immutable multiple-choice question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    /// Question identifier.
    pub id: QuestionId,
    /// Concept that owns this question.
    pub concept: ConceptId,
    /// Prompt text.
    pub text: String,
    /// Answer options, index-addressed.
    pub options: Vec<String>,
    /// Index of the correct option.
    pub correct: usize,
    /// Difficulty tier.
    #[serde(rename = "difficulty")]
    pub tier: DifficultyTier,
    /// Explanation or hint shown after answering.
    #[serde(default)]
    pub explanation: String,
}

impl Question {
    /// Constructs a validated question.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if there are no options or `correct` does not
    /// address one of them.
    pub fn new(
        id: QuestionId,
        concept: ConceptId,
        text: impl Into<String>,
        options: Vec<String>,
        correct: usize,
        tier: DifficultyTier,
        explanation: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        if options.is_empty() {
            return Err(ValidationError::EmptyField {
                field: format!("question[{id}].options"),
            });
        }
        if correct >= options.len() {
            return Err(ValidationError::InvalidCorrectOption {
                question: id.to_string(),
                correct,
                options: options.len(),
            });
        }
        Ok(Self {
            id,
            concept,
            text: text.into(),
            options,
            correct,
            tier,
            explanation: explanation.into(),
        })
    }

    /// Difficulty on the IRT scale.
    #[must_use]
    pub const fn irt_difficulty(&self) -> f64 {
        self.tier.irt_difficulty()
    }

    /// Returns true if `chosen` is the correct option.
    #[must_use]
    pub const fn is_correct(&self, chosen: usize) -> bool {
        chosen == self.correct
    }
}

/// A concept node with its prerequisites and question bank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    /// Concept identifier.
    pub id: ConceptId,
    /// Display name.
    pub name: String,
    /// Immediate prerequisites, in declaration order.
    #[serde(default)]
    pub prerequisites: Vec<ConceptId>,
    /// Question bank.
    #[serde(default)]
    pub questions: Vec<Question>,
}

impl Concept {
    /// Creates a concept with no prerequisites and an empty bank.
    #[must_use]
    pub fn new(id: ConceptId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            prerequisites: Vec::new(),
            questions: Vec::new(),
        }
    }

    /// Adds a prerequisite.
    #[must_use]
    pub fn with_prerequisite(mut self, prerequisite: ConceptId) -> Self {
        self.prerequisites.push(prerequisite);
        self
    }

    /// Adds a question to the bank.
    #[must_use]
    pub fn with_question(mut self, question: Question) -> Self {
        self.questions.push(question);
        self
    }

    /// Finds a question in this concept's bank.
    #[must_use]
    pub fn question(&self, id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id.as_str() == id)
    }
}

/// Converts a letter answer ("A", "b", " C ") into an option index.
///
/// Returns `None` for anything that is not a single ASCII letter.
#[must_use]
pub fn parse_option_letter(answer: &str) -> Option<usize> {
    let mut chars = answer.trim().chars();
    let letter = chars.next()?;
    if chars.next().is_some() || !letter.is_ascii_alphabetic() {
        return None;
    }
    Some(usize::from(letter.to_ascii_uppercase() as u8 - b'A'))
}
