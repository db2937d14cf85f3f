// SPDX-License-Identifier: MIT

//! Question catalog: every revision of every question concept

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::types::{ConceptId, QuestionRevision, QuestionType, Revision, RevisionKey};
use crate::engine::error::{ConfigurationError, VersionError};

/// Lifecycle status of a question revision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RevisionStatus {
    Draft,
    Active,
    Obsolete,
}

#[derive(Debug, Clone, Default)]
struct QuestionHistory {
    revisions: BTreeMap<Revision, QuestionRevision>,
    published: BTreeSet<Revision>,
    draft: Option<Revision>,
    active: Option<Revision>,
}

/// All revisions of all question concepts
#[derive(Debug, Clone, Default)]
pub struct QuestionCatalog {
    questions: HashMap<ConceptId, QuestionHistory>,
}

impl QuestionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a draft revision, or overwrite the content of the existing draft
    pub fn create_revision(
        &mut self,
        concept: impl Into<ConceptId>,
        question_type: QuestionType,
        text: impl Into<String>,
        options: Vec<String>,
    ) -> QuestionRevision {
        let concept = concept.into();
        let history = self.questions.entry(concept.clone()).or_default();

        let revision = match history.draft {
            Some(existing) => existing,
            None => history.revisions.keys().next_back().map_or(1, |r| r + 1),
        };

        let question = QuestionRevision {
            concept,
            revision,
            question_type,
            text: text.into(),
            options,
        };
        history.revisions.insert(revision, question.clone());
        history.draft = Some(revision);
        question
    }

    /// Promote the concept's draft revision to active. Returns the
    /// published revision, or `None` when there was no draft.
    pub fn publish(&mut self, concept: &ConceptId) -> Result<Option<Revision>, VersionError> {
        let history = self
            .questions
            .get_mut(concept)
            .ok_or_else(|| VersionError::UnknownQuestion(concept.clone()))?;

        let Some(draft) = history.draft.take() else {
            return Ok(None);
        };
        history.published.insert(draft);
        history.active = Some(draft);
        log::info!("Published question {} revision {}", concept, draft);
        Ok(Some(draft))
    }

    /// Look up an exact revision
    pub fn resolve(&self, key: &RevisionKey) -> Result<&QuestionRevision, ConfigurationError> {
        self.questions
            .get(&key.concept)
            .and_then(|h| h.revisions.get(&key.revision))
            .ok_or_else(|| ConfigurationError::MissingRevision {
                question: key.concept.clone(),
                revision: key.revision,
            })
    }

    /// Most recent revision: the draft if one exists, else the active one
    pub fn latest(&self, concept: &ConceptId) -> Option<&QuestionRevision> {
        let history = self.questions.get(concept)?;
        history
            .draft
            .or(history.active)
            .and_then(|r| history.revisions.get(&r))
    }

    pub fn active(&self, concept: &ConceptId) -> Option<&QuestionRevision> {
        let history = self.questions.get(concept)?;
        history.active.and_then(|r| history.revisions.get(&r))
    }

    pub fn draft(&self, concept: &ConceptId) -> Option<&QuestionRevision> {
        let history = self.questions.get(concept)?;
        history.draft.and_then(|r| history.revisions.get(&r))
    }

    pub fn status(&self, key: &RevisionKey) -> Option<RevisionStatus> {
        let history = self.questions.get(&key.concept)?;
        if !history.revisions.contains_key(&key.revision) {
            return None;
        }
        if history.draft == Some(key.revision) {
            Some(RevisionStatus::Draft)
        } else if history.active == Some(key.revision) {
            Some(RevisionStatus::Active)
        } else {
            Some(RevisionStatus::Obsolete)
        }
    }

    pub fn is_published(&self, key: &RevisionKey) -> bool {
        self.questions
            .get(&key.concept)
            .is_some_and(|h| h.published.contains(&key.revision))
    }

    /// Resolve a set of pins into the lookup the predicate engine uses
    pub fn resolve_pins<'a, I>(
        &self,
        program: &ConceptId,
        version: u32,
        pins: I,
    ) -> Result<ProgramQuestions, ConfigurationError>
    where
        I: IntoIterator<Item = &'a RevisionKey>,
    {
        let mut seen: HashMap<&ConceptId, Revision> = HashMap::new();
        let mut questions = Vec::new();
        for pin in pins {
            match seen.get(&pin.concept) {
                Some(&first) if first != pin.revision => {
                    return Err(ConfigurationError::ConflictingPins {
                        question: pin.concept.clone(),
                        first,
                        second: pin.revision,
                    });
                }
                Some(_) => continue,
                None => {
                    seen.insert(&pin.concept, pin.revision);
                    questions.push(self.resolve(pin)?.clone());
                }
            }
        }
        Ok(ProgramQuestions::new(program.clone(), version, questions))
    }
}

/// The concrete question revisions one program version pins
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramQuestions {
    program: ConceptId,
    version: u32,
    questions: HashMap<ConceptId, QuestionRevision>,
}

impl ProgramQuestions {
    pub fn new(program: ConceptId, version: u32, questions: Vec<QuestionRevision>) -> Self {
        let questions = questions
            .into_iter()
            .map(|q| (q.concept.clone(), q))
            .collect();
        Self {
            program,
            version,
            questions,
        }
    }

    pub fn program(&self) -> &ConceptId {
        &self.program
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn get(&self, concept: &ConceptId) -> Option<&QuestionRevision> {
        self.questions.get(concept)
    }

    /// Like [`get`](Self::get), but a missing question is a configuration error
    pub fn require(&self, concept: &ConceptId) -> Result<&QuestionRevision, ConfigurationError> {
        self.questions
            .get(concept)
            .ok_or_else(|| ConfigurationError::UnknownQuestion {
                question: concept.clone(),
                program: self.program.clone(),
                version: self.version,
            })
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}
