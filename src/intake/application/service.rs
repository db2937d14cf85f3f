// SPDX-License-Identifier: MIT

//! Applicant-facing operations over a [`Persistence`] backend

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::reconcile::{
    reconcile, view_of, EligibilityStatus, EligibilitySummary, ReconciledView, Reconciliation,
};
use super::Application;
use crate::engine::answers::{Answer, AnswerKey, ScalarValue};
use crate::engine::error::{ApplicationError, IntakeError};
use crate::engine::predicate::{validate_predicate, PredicateExpr, ValidationResult};
use crate::engine::question::{ConceptId, ProgramQuestions, QuestionRevision, Scalar};
use crate::intake::config::IntakeConfig;
use crate::intake::program::{Block, ProgramVersion, VersionSelector};
use crate::intake::store::Persistence;

/// One field of applicant input, as typed
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RawAnswer {
    pub question: ConceptId,
    pub scalar: Scalar,
    /// Blank clears the answer
    pub value: String,
}

impl RawAnswer {
    pub fn new(question: impl Into<ConceptId>, scalar: Scalar, value: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            scalar,
            value: value.into(),
        }
    }
}

/// An application resolved against the version it is shown under
struct Loaded {
    reconciliation: Reconciliation,
    version: Arc<ProgramVersion>,
    questions: ProgramQuestions,
}

pub struct ApplicantService<S: Persistence> {
    store: S,
    config: IntakeConfig,
}

impl<S: Persistence> ApplicantService<S> {
    pub fn new(store: S, config: IntakeConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &IntakeConfig {
        &self.config
    }

    /// Start an application pinned to the program's active version
    pub async fn start_application(&self, program: &ConceptId) -> Result<Application, IntakeError> {
        let active = self
            .store
            .load_program_version(program, VersionSelector::Active)
            .await?;
        let application = Application::new(program.clone(), active.version);
        self.store.save_application(&application).await?;
        log::info!(
            "Started application {} for {} v{}",
            application.id,
            program,
            active.version
        );
        Ok(application)
    }

    /// Load an application, fast-forwarding it to the active version first
    pub async fn load(&self, id: Uuid) -> Result<Reconciliation, IntakeError> {
        Ok(self.load_current(id).await?.reconciliation)
    }

    pub async fn get_visible_blocks(&self, id: Uuid) -> Result<Vec<Block>, IntakeError> {
        let loaded = self.load_current(id).await?;
        Ok(loaded
            .reconciliation
            .view
            .visible
            .iter()
            .filter_map(|block| loaded.version.block(block).cloned())
            .collect())
    }

    /// First visible block that still has an unanswered question
    pub async fn next_block(&self, id: Uuid) -> Result<Option<Block>, IntakeError> {
        let loaded = self.load_current(id).await?;
        let answers = &loaded.reconciliation.application.answers;

        for block_id in &loaded.reconciliation.view.visible {
            let Some(block) = loaded.version.block(block_id) else {
                continue;
            };
            let pending = block.question_ids().any(|question| {
                let answerable = loaded
                    .questions
                    .get(question)
                    .is_some_and(|q| q.question_type.is_predicate_target());
                answerable && !answers.is_answered(question)
            });
            if pending {
                return Ok(Some(block.clone()));
            }
        }
        Ok(None)
    }

    /// Record answers for one visible block. Every answer is checked
    /// before any is stored.
    pub async fn answer_block(
        &self,
        id: Uuid,
        block_id: &ConceptId,
        answers: Vec<RawAnswer>,
    ) -> Result<ReconciledView, IntakeError> {
        let loaded = self.load_current(id).await?;
        let mut application = loaded.reconciliation.application;

        if application.is_submitted() {
            return Err(ApplicationError::AlreadySubmitted(id).into());
        }
        let block = loaded
            .version
            .block(block_id)
            .filter(|_| loaded.reconciliation.view.visible.contains(block_id))
            .ok_or_else(|| ApplicationError::BlockNotVisible(block_id.clone()))?;

        let mut parsed = Vec::with_capacity(answers.len());
        for raw in answers {
            let invalid = |reason: String| ApplicationError::InvalidAnswer {
                question: raw.question.clone(),
                scalar: raw.scalar.to_string(),
                reason,
            };
            if !block.asks(&raw.question) {
                return Err(invalid("not asked in this section".to_string()).into());
            }
            let question = loaded.questions.require(&raw.question)?;
            let scalar_type = question
                .scalar_type(raw.scalar)
                .ok_or_else(|| invalid("this question has no such field".to_string()))?;

            let value = if raw.value.trim().is_empty() {
                None
            } else {
                let value = ScalarValue::parse_answer(raw.scalar, scalar_type, &raw.value).map_err(&invalid)?;
                check_options(question, &value).map_err(&invalid)?;
                Some(value)
            };
            parsed.push((AnswerKey::new(raw.question.clone(), raw.scalar), value));
        }

        for (key, value) in parsed {
            match value {
                Some(value) => application
                    .answers
                    .update(key, Answer::new(value, block.id.clone(), loaded.version.version)),
                None => {
                    application.answers.remove(&key);
                }
            }
        }
        self.store
            .save_answers(id, application.answers.clone())
            .await?;
        log::debug!("Application {} answered block {}", id, block.id);

        let ctx = self.config.eval_context();
        Ok(view_of(
            &loaded.version,
            &application.answers,
            &loaded.questions,
            &ctx,
        )?)
    }

    pub async fn get_eligibility_status(&self, id: Uuid) -> Result<EligibilityStatus, IntakeError> {
        Ok(self.load_current(id).await?.reconciliation.view.eligibility)
    }

    /// Eligibility with failing requirements described by section and question text
    pub async fn eligibility_summary(&self, id: Uuid) -> Result<EligibilitySummary, IntakeError> {
        let loaded = self.load_current(id).await?;
        Ok(EligibilitySummary::new(
            &loaded.reconciliation.view.eligibility,
            &loaded.version,
            &loaded.questions,
        ))
    }

    /// Freeze the application. Refused when the program gates on
    /// eligibility and an answer already makes the applicant ineligible.
    pub async fn submit(&self, id: Uuid) -> Result<Application, IntakeError> {
        let loaded = self.load_current(id).await?;
        let mut application = loaded.reconciliation.application;

        if application.is_submitted() {
            return Err(ApplicationError::AlreadySubmitted(id).into());
        }
        let eligibility = &loaded.reconciliation.view.eligibility;
        if loaded.version.eligibility_is_gating && eligibility.is_definitively_ineligible() {
            log::warn!(
                "Refusing submission of {}: ineligible on {:?}",
                id,
                eligibility.ineligible_questions
            );
            return Err(ApplicationError::Ineligible(id).into());
        }

        application.submit();
        self.store.save_application(&application).await?;
        log::info!(
            "Submitted application {} on {} v{}",
            id,
            application.program,
            application.pinned
        );
        Ok(application)
    }

    /// Check a predicate against the questions of one program version
    pub async fn validate_predicate(
        &self,
        program: &ConceptId,
        selector: VersionSelector,
        expr: &PredicateExpr,
    ) -> Result<ValidationResult, IntakeError> {
        let version = self.store.load_program_version(program, selector).await?;
        let questions = self.store.load_questions_for(&version).await?;
        Ok(validate_predicate(expr, &questions))
    }

    pub async fn publish_program(&self, program: &ConceptId) -> Result<Arc<ProgramVersion>, IntakeError> {
        self.store.swap_active_version(program).await
    }

    /// Reconcile against the active version, persisting a fast-forward.
    /// Retries when the program is republished mid-reconciliation.
    async fn load_current(&self, id: Uuid) -> Result<Loaded, IntakeError> {
        let ctx = self.config.eval_context();
        let attempts = self.config.max_reconcile_attempts.max(1);
        let mut race = None;

        for attempt in 1..=attempts {
            let application = self.store.load_application(id).await?;
            let program = application.program.clone();

            let (pinned, active) = futures::try_join!(
                self.store
                    .load_program_version(&program, VersionSelector::Version(application.pinned)),
                self.store
                    .load_program_version(&program, VersionSelector::Active),
            )?;
            let (pinned_questions, active_questions) = futures::try_join!(
                self.store.load_questions_for(&pinned),
                self.store.load_questions_for(&active),
            )?;

            let reconciliation = reconcile(
                &application,
                &pinned,
                &active,
                &pinned_questions,
                &active_questions,
                &ctx,
            )?;

            let Some((from, to)) = reconciliation.report.as_ref().map(|r| (r.from, r.to)) else {
                return Ok(Loaded {
                    reconciliation,
                    version: pinned,
                    questions: pinned_questions,
                });
            };

            let current = self
                .store
                .load_program_version(&program, VersionSelector::Active)
                .await?;
            if current.version != active.version {
                log::warn!(
                    "Program {} moved from v{} to v{} while reconciling {} (attempt {}/{})",
                    program,
                    active.version,
                    current.version,
                    id,
                    attempt,
                    attempts
                );
                race = Some(IntakeError::StaleVersionRace {
                    program,
                    computed_against: active.version,
                    active: current.version,
                });
                continue;
            }

            self.store
                .save_application(&reconciliation.application)
                .await?;
            log::info!("Fast-forwarded application {} from v{} to v{}", id, from, to);
            return Ok(Loaded {
                reconciliation,
                version: active,
                questions: active_questions,
            });
        }

        Err(race.unwrap_or_else(|| IntakeError::other("reconciliation was not attempted")))
    }
}

/// Select answers must name the question's options
fn check_options(question: &QuestionRevision, value: &ScalarValue) -> Result<(), String> {
    if !question.question_type.has_options() || question.options.is_empty() {
        return Ok(());
    }
    let chosen: Vec<&String> = match value {
        ScalarValue::String(s) => vec![s],
        ScalarValue::ListOfStrings(items) => items.iter().collect(),
        _ => Vec::new(),
    };
    match chosen.into_iter().find(|c| !question.options.contains(*c)) {
        Some(unknown) => Err(format!("'{}' is not one of the choices", unknown)),
        None => Ok(()),
    }
}
