// SPDX-License-Identifier: MIT

//! Typed error handling for intake-rs
//!
//! Admin-facing messages come from `Display` and always name the concept
//! identities involved. Applicant-facing messages come from
//! [`IntakeError::applicant_message`] and never do.

use thiserror::Error;

use crate::engine::question::ConceptId;

/// Top-level error type for intake-rs
#[derive(Debug, Error)]
pub enum IntakeError {
    /// A predicate or pin references something that does not exist or has
    /// the wrong type. Fatal, surfaced to the admin who last published.
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// A second draft was requested while one already exists
    #[error("Program '{program}' already has a draft")]
    DraftConflict { program: ConceptId },

    /// The active version moved while an application was being reconciled
    #[error("Program '{program}' was republished during reconciliation (computed against v{computed_against}, active is now v{active})")]
    StaleVersionRace {
        program: ConceptId,
        computed_against: u32,
        active: u32,
    },

    /// Predicate text that could not be parsed
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Version graph errors
    #[error("Version error: {0}")]
    Version(#[from] VersionError),

    /// Application lifecycle errors
    #[error("Application error: {0}")]
    Application(#[from] ApplicationError),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// Generic error wrapper for compatibility
    #[error("{0}")]
    Other(String),
}

/// Predicate and pin integrity errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigurationError {
    /// Predicate references a question the program version does not ask
    #[error("predicate references question '{question}', which is not part of program '{program}' v{version}")]
    UnknownQuestion {
        question: ConceptId,
        program: ConceptId,
        version: u32,
    },

    /// Question type does not expose the scalar path
    #[error("question '{question}' ({question_type}) has no scalar '{scalar}'")]
    UnknownScalar {
        question: ConceptId,
        question_type: String,
        scalar: String,
    },

    /// Operator cannot be applied to the scalar type
    #[error("operator {operator} cannot be applied to '{question}.{scalar}' of type {scalar_type}")]
    OperatorMismatch {
        question: ConceptId,
        scalar: String,
        operator: String,
        scalar_type: String,
    },

    /// Literal type does not fit the operator and scalar
    #[error("operator {operator} on '{question}.{scalar}' expects a {expected} value, got {found}")]
    LiteralMismatch {
        question: ConceptId,
        scalar: String,
        operator: String,
        expected: String,
        found: String,
    },

    /// Stored answer type does not match the scalar it was stored under
    #[error("answer for '{question}.{scalar}' is {found}, but the question declares {expected}")]
    AnswerTypeMismatch {
        question: ConceptId,
        scalar: String,
        expected: String,
        found: String,
    },

    /// AND/OR node with no children
    #[error("{combinator} node has no children")]
    EmptyCombinator { combinator: String },

    /// Pin points at a revision that does not exist
    #[error("question '{question}' has no revision {revision}")]
    MissingRevision { question: ConceptId, revision: u32 },

    /// One program version pins a question at two different revisions
    #[error("question '{question}' is pinned at both revision {first} and revision {second}")]
    ConflictingPins {
        question: ConceptId,
        first: u32,
        second: u32,
    },

    /// Pin points at a revision that was never published and is not the current draft
    #[error("question '{question}' revision {revision} is not published")]
    UnpublishedRevision { question: ConceptId, revision: u32 },

    /// Predicate references a question asked too late in the program
    #[error("block '{block}' {kind} predicate references question '{question}' before it is asked")]
    PredicateOrdering {
        block: ConceptId,
        kind: String,
        question: ConceptId,
    },

    /// Literal is malformed for reasons other than its type
    #[error("invalid value for '{question}.{scalar}': {reason}")]
    InvalidLiteral {
        question: ConceptId,
        scalar: String,
        reason: String,
    },
}

/// Predicate text that could not be parsed
#[derive(Debug, Clone, Error, PartialEq)]
#[error("Could not parse predicate '{input}': {reason}")]
pub struct ParseError {
    pub input: String,
    pub reason: String,
}

impl ParseError {
    pub fn new(input: &str, reason: impl Into<String>) -> Self {
        Self {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

/// Version graph errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum VersionError {
    #[error("Unknown program '{0}'")]
    UnknownProgram(ConceptId),

    #[error("Program '{program}' has no version {version}")]
    UnknownVersion { program: ConceptId, version: u32 },

    #[error("Program '{0}' has no active version")]
    NoActiveVersion(ConceptId),

    #[error("Program '{0}' has no draft")]
    NoDraft(ConceptId),

    #[error("Block '{block}' not found in program '{program}'")]
    BlockNotFound { program: ConceptId, block: ConceptId },

    #[error("Block '{block}' already exists in program '{program}'")]
    DuplicateBlock { program: ConceptId, block: ConceptId },

    #[error("Question '{0}' has no revisions")]
    UnknownQuestion(ConceptId),
}

/// Application lifecycle errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ApplicationError {
    #[error("Application {0} not found")]
    NotFound(uuid::Uuid),

    #[error("Application {0} is already submitted")]
    AlreadySubmitted(uuid::Uuid),

    #[error("Block '{0}' is not visible to this application")]
    BlockNotVisible(ConceptId),

    #[error("Invalid answer for '{question}.{scalar}': {reason}")]
    InvalidAnswer {
        question: ConceptId,
        scalar: String,
        reason: String,
    },

    #[error("Application {0} does not meet the program's eligibility requirements")]
    Ineligible(uuid::Uuid),
}

impl IntakeError {
    /// Create an application-not-found error
    pub fn not_found(id: uuid::Uuid) -> Self {
        Self::Application(ApplicationError::NotFound(id))
    }

    /// Create from a generic error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Whether the caller may simply retry the operation
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            IntakeError::DraftConflict { .. } | IntakeError::StaleVersionRace { .. }
        )
    }

    /// Message safe to show an applicant. Never names concept identities.
    pub fn applicant_message(&self) -> String {
        match self {
            IntakeError::Configuration(_) => {
                "This application is temporarily unavailable. Please try again later.".to_string()
            }
            IntakeError::StaleVersionRace { .. } => {
                "This application was just updated. Please reload and try again.".to_string()
            }
            IntakeError::Application(ApplicationError::NotFound(_)) => {
                "We could not find that application.".to_string()
            }
            IntakeError::Application(ApplicationError::AlreadySubmitted(_)) => {
                "This application has already been submitted.".to_string()
            }
            IntakeError::Application(ApplicationError::BlockNotVisible(_)) => {
                "That section is not part of your application.".to_string()
            }
            IntakeError::Application(ApplicationError::InvalidAnswer { reason, .. }) => {
                format!("Please check your answer: {}", reason)
            }
            IntakeError::Application(ApplicationError::Ineligible(_)) => {
                "Based on your answers, you may not qualify for this program.".to_string()
            }
            _ => "Something went wrong. Please try again later.".to_string(),
        }
    }
}

// Allow conversion from &str for backward compatibility
impl From<&str> for IntakeError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

impl From<String> for IntakeError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}
