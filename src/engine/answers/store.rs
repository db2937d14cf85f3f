// SPDX-License-Identifier: MIT

//! Per-application answer storage

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use super::value::ScalarValue;
use crate::engine::question::{ConceptId, Scalar};

/// Address of one stored value
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
pub struct AnswerKey {
    pub question: ConceptId,
    pub scalar: Scalar,
}

impl AnswerKey {
    pub fn new(question: impl Into<ConceptId>, scalar: Scalar) -> Self {
        Self {
            question: question.into(),
            scalar,
        }
    }
}

impl fmt::Display for AnswerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.question, self.scalar)
    }
}

/// A stored value plus which block/version last wrote it
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Answer {
    pub value: ScalarValue,
    pub block: ConceptId,
    pub program_version: u32,
    pub updated_at: DateTime<Utc>,
}

impl Answer {
    pub fn new(value: ScalarValue, block: impl Into<ConceptId>, program_version: u32) -> Self {
        Self {
            value,
            block: block.into(),
            program_version,
            updated_at: Utc::now(),
        }
    }
}

/// Mapping from (question, scalar) to typed answer for one application
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct AnswerStore {
    answers: BTreeMap<ConceptId, BTreeMap<Scalar, Answer>>,
}

impl AnswerStore {
    /// Create an empty AnswerStore
    pub fn empty() -> Self {
        Self::default()
    }

    /// Store an answer. Last write wins.
    pub fn update(&mut self, key: AnswerKey, answer: Answer) {
        self.answers
            .entry(key.question)
            .or_default()
            .insert(key.scalar, answer);
    }

    pub fn get(&self, question: &ConceptId, scalar: Scalar) -> Option<&Answer> {
        self.answers.get(question)?.get(&scalar)
    }

    /// Get just the value
    pub fn value(&self, question: &ConceptId, scalar: Scalar) -> Option<&ScalarValue> {
        self.get(question, scalar).map(|a| &a.value)
    }

    pub fn remove(&mut self, key: &AnswerKey) -> Option<Answer> {
        let scalars = self.answers.get_mut(&key.question)?;
        let removed = scalars.remove(&key.scalar);
        if scalars.is_empty() {
            self.answers.remove(&key.question);
        }
        removed
    }

    /// All answers stored for one question
    pub fn answers_for(&self, question: &ConceptId) -> impl Iterator<Item = (Scalar, &Answer)> {
        self.answers
            .get(question)
            .into_iter()
            .flat_map(|scalars| scalars.iter().map(|(s, a)| (*s, a)))
    }

    pub fn is_answered(&self, question: &ConceptId) -> bool {
        self.answers.get(question).is_some_and(|s| !s.is_empty())
    }

    /// Get all stored keys, in deterministic order
    pub fn keys(&self) -> impl Iterator<Item = AnswerKey> + '_ {
        self.answers.iter().flat_map(|(question, scalars)| {
            scalars
                .keys()
                .map(move |scalar| AnswerKey::new(question.clone(), *scalar))
        })
    }

    pub fn len(&self) -> usize {
        self.answers.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    /// Convert to a plain `{question: {scalar: value}}` JSON object
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.answers
                .iter()
                .map(|(question, scalars)| {
                    let inner = scalars
                        .iter()
                        .map(|(scalar, answer)| {
                            (scalar.as_str().to_string(), plain_json(&answer.value))
                        })
                        .collect();
                    (question.to_string(), Value::Object(inner))
                })
                .collect(),
        )
    }
}

fn plain_json(value: &ScalarValue) -> Value {
    match value {
        ScalarValue::String(s) => Value::String(s.clone()),
        ScalarValue::Long(n) => Value::from(*n),
        ScalarValue::Date(_) => Value::String(value.to_string()),
        ScalarValue::ListOfStrings(items) => {
            Value::Array(items.iter().cloned().map(Value::String).collect())
        }
        ScalarValue::ListOfLongs(items) => Value::Array(items.iter().copied().map(Value::from).collect()),
    }
}
