// SPDX-License-Identifier: MIT

//! Question identity, type and revision definitions

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier shared by every revision of the same question, block or program
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ConceptId(String);

impl ConceptId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ConceptId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ConceptId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for ConceptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Revision number of a question under its concept identity
pub type Revision = u32;

/// Two-level key: which question, and which revision of it
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
pub struct RevisionKey {
    pub concept: ConceptId,
    pub revision: Revision,
}

impl RevisionKey {
    pub fn new(concept: impl Into<ConceptId>, revision: Revision) -> Self {
        Self {
            concept: concept.into(),
            revision,
        }
    }
}

impl fmt::Display for RevisionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.concept, self.revision)
    }
}

/// Types of value a scalar path holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScalarType {
    String,
    Long,
    Date,
    ListOfStrings,
    ListOfLongs,
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScalarType::String => "STRING",
            ScalarType::Long => "LONG",
            ScalarType::Date => "DATE",
            ScalarType::ListOfStrings => "LIST_OF_STRINGS",
            ScalarType::ListOfLongs => "LIST_OF_LONGS",
        };
        f.write_str(s)
    }
}

/// Named scalar paths a question exposes for comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Scalar {
    Text,
    Number,
    CurrencyCents,
    Date,
    FirstName,
    MiddleName,
    LastName,
    Email,
    Selection,
    Selections,
}

impl Scalar {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scalar::Text => "text",
            Scalar::Number => "number",
            Scalar::CurrencyCents => "currency_cents",
            Scalar::Date => "date",
            Scalar::FirstName => "first_name",
            Scalar::MiddleName => "middle_name",
            Scalar::LastName => "last_name",
            Scalar::Email => "email",
            Scalar::Selection => "selection",
            Scalar::Selections => "selections",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let scalar = match s {
            "text" => Scalar::Text,
            "number" => Scalar::Number,
            "currency_cents" => Scalar::CurrencyCents,
            "date" => Scalar::Date,
            "first_name" => Scalar::FirstName,
            "middle_name" => Scalar::MiddleName,
            "last_name" => Scalar::LastName,
            "email" => Scalar::Email,
            "selection" => Scalar::Selection,
            "selections" => Scalar::Selections,
            _ => return None,
        };
        Some(scalar)
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supported question types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Text,
    Number,
    Currency,
    Date,
    Name,
    Email,
    Address,
    Dropdown,
    RadioButton,
    Checkbox,
    FileUpload,
    Static,
}

impl QuestionType {
    /// Scalar paths this type exposes to predicates, with their types
    pub fn scalars(&self) -> &'static [(Scalar, ScalarType)] {
        match self {
            QuestionType::Text => &[(Scalar::Text, ScalarType::String)],
            QuestionType::Number => &[(Scalar::Number, ScalarType::Long)],
            QuestionType::Currency => &[(Scalar::CurrencyCents, ScalarType::Long)],
            QuestionType::Date => &[(Scalar::Date, ScalarType::Date)],
            QuestionType::Name => &[
                (Scalar::FirstName, ScalarType::String),
                (Scalar::MiddleName, ScalarType::String),
                (Scalar::LastName, ScalarType::String),
            ],
            QuestionType::Email => &[(Scalar::Email, ScalarType::String)],
            QuestionType::Dropdown | QuestionType::RadioButton => {
                &[(Scalar::Selection, ScalarType::String)]
            }
            QuestionType::Checkbox => &[(Scalar::Selections, ScalarType::ListOfStrings)],
            // Address has no directly comparable scalar in this engine
            QuestionType::Address | QuestionType::FileUpload | QuestionType::Static => &[],
        }
    }

    /// Type of the given scalar path, if this question type exposes it
    pub fn scalar_type(&self, scalar: Scalar) -> Option<ScalarType> {
        self.scalars()
            .iter()
            .find(|(s, _)| *s == scalar)
            .map(|(_, t)| *t)
    }

    pub fn has_options(&self) -> bool {
        matches!(
            self,
            QuestionType::Dropdown | QuestionType::RadioButton | QuestionType::Checkbox
        )
    }

    /// Whether any predicate can target this type
    pub fn is_predicate_target(&self) -> bool {
        !self.scalars().is_empty()
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QuestionType::Text => "TEXT",
            QuestionType::Number => "NUMBER",
            QuestionType::Currency => "CURRENCY",
            QuestionType::Date => "DATE",
            QuestionType::Name => "NAME",
            QuestionType::Email => "EMAIL",
            QuestionType::Address => "ADDRESS",
            QuestionType::Dropdown => "DROPDOWN",
            QuestionType::RadioButton => "RADIO_BUTTON",
            QuestionType::Checkbox => "CHECKBOX",
            QuestionType::FileUpload => "FILE_UPLOAD",
            QuestionType::Static => "STATIC",
        };
        f.write_str(s)
    }
}

/// One immutable revision of a question's definition
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct QuestionRevision {
    pub concept: ConceptId,
    pub revision: Revision,
    pub question_type: QuestionType,
    /// Text shown to the applicant
    #[serde(default)]
    pub text: String,
    /// Option ids for select questions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl QuestionRevision {
    pub fn key(&self) -> RevisionKey {
        RevisionKey::new(self.concept.clone(), self.revision)
    }

    pub fn scalar_type(&self, scalar: Scalar) -> Option<ScalarType> {
        self.question_type.scalar_type(scalar)
    }
}
