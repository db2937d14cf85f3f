// SPDX-License-Identifier: MIT

//! Version resolution and fast-forward reconciliation
//!
//! Everything here is pure: callers load versions and questions, and
//! decide whether to persist the reconciled application.

use serde::Serialize;
use std::collections::BTreeSet;

use super::Application;
use crate::engine::answers::{AnswerKey, AnswerStore};
use crate::engine::error::{ConfigurationError, IntakeError, VersionError};
use crate::engine::predicate::{evaluate, evaluate_visibility, Condition, EvalContext, PredicateValue};
use crate::engine::question::{ConceptId, ProgramQuestions, Scalar};
use crate::intake::program::{Block, ProgramVersion, VersionKey};

/// Program-level eligibility of one application
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EligibilityStatus {
    pub eligible: bool,
    /// Every failing leaf across visible eligibility blocks
    pub failing_conditions: Vec<Condition>,
    /// Answered questions referenced by failing leaves
    pub ineligible_questions: Vec<ConceptId>,
}

impl EligibilityStatus {
    /// Ineligible because of an answer given, not one still missing
    pub fn is_definitively_ineligible(&self) -> bool {
        !self.ineligible_questions.is_empty()
    }
}

/// Eligibility as shown to an applicant: sections and question text, never concept ids
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EligibilitySummary {
    pub eligible: bool,
    pub definitively_ineligible: bool,
    pub failing: Vec<FailingRequirement>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailingRequirement {
    /// Name of the first block asking the question
    pub section: String,
    pub question: String,
    /// Operator and literal, e.g. `<= 4`
    pub requirement: String,
    pub answered: bool,
}

impl EligibilitySummary {
    pub fn new(status: &EligibilityStatus, version: &ProgramVersion, questions: &ProgramQuestions) -> Self {
        let failing = status
            .failing_conditions
            .iter()
            .map(|condition| {
                let section = version
                    .first_block_asking(&condition.question)
                    .map(|block| block.name.clone())
                    .filter(|name| !name.is_empty())
                    .unwrap_or_else(|| "Another section".to_string());
                let question = questions
                    .get(&condition.question)
                    .map(|q| q.text.clone())
                    .filter(|text| !text.is_empty())
                    .unwrap_or_else(|| "A question in this section".to_string());
                FailingRequirement {
                    section,
                    question,
                    requirement: requirement(condition),
                    answered: status.ineligible_questions.contains(&condition.question),
                }
            })
            .collect();
        Self {
            eligible: status.eligible,
            definitively_ineligible: status.is_definitively_ineligible(),
            failing,
        }
    }
}

fn requirement(condition: &Condition) -> String {
    match (condition.scalar, &condition.value) {
        (Scalar::CurrencyCents, PredicateValue::Long(cents)) => {
            format!("{} {}", condition.operator.token(), dollars(*cents))
        }
        (Scalar::CurrencyCents, PredicateValue::PairOfLongs(lo, hi)) => {
            format!("{} [{}, {}]", condition.operator.token(), dollars(*lo), dollars(*hi))
        }
        _ => format!("{} {}", condition.operator.token(), condition.value),
    }
}

fn dollars(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();
    format!("{}${}.{:02}", sign, cents / 100, cents % 100)
}

/// What the applicant sees under the version an application resolves to
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciledView {
    pub version: VersionKey,
    /// All blocks, in the version's order
    pub blocks: Vec<ConceptId>,
    pub visible: Vec<ConceptId>,
    pub eligibility: EligibilityStatus,
}

/// How a fast-forward changed an application
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FastForwardReport {
    pub from: u32,
    pub to: u32,
    /// Present in both versions asking the same questions
    pub carried: Vec<ConceptId>,
    /// Present in both versions with questions added or removed
    pub changed: Vec<ConceptId>,
    pub added: Vec<ConceptId>,
    pub removed: Vec<ConceptId>,
    /// Answers whose scalar type no longer matches the new revision
    pub dropped_answers: Vec<AnswerKey>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub application: Application,
    pub view: ReconciledView,
    /// Set when the application moved to a newer version
    pub report: Option<FastForwardReport>,
}

/// Blocks shown to the applicant, in order
pub fn visible_blocks<'a>(
    version: &'a ProgramVersion,
    answers: &AnswerStore,
    questions: &ProgramQuestions,
    ctx: &EvalContext,
) -> Result<Vec<&'a Block>, ConfigurationError> {
    let mut visible = Vec::new();
    for block in &version.blocks {
        let shown = match &block.visibility {
            Some(definition) => evaluate_visibility(definition, answers, questions, ctx)?,
            None => true,
        };
        if shown {
            visible.push(block);
        }
    }
    Ok(visible)
}

/// AND over the eligibility predicates of visible blocks. Vacuously
/// eligible when no visible block has one.
pub fn eligibility_status(
    version: &ProgramVersion,
    answers: &AnswerStore,
    questions: &ProgramQuestions,
    ctx: &EvalContext,
) -> Result<EligibilityStatus, ConfigurationError> {
    let mut eligible = true;
    let mut failing_conditions: Vec<Condition> = Vec::new();

    for block in visible_blocks(version, answers, questions, ctx)? {
        let Some(predicate) = &block.eligibility else {
            continue;
        };
        let result = evaluate(predicate, answers, questions, ctx)?;
        if !result.satisfied {
            eligible = false;
            for leaf in result.unsatisfied_leaves {
                if !failing_conditions.contains(&leaf) {
                    failing_conditions.push(leaf);
                }
            }
        }
    }

    let mut ineligible_questions: Vec<ConceptId> = Vec::new();
    for leaf in &failing_conditions {
        let answered = answers.value(&leaf.question, leaf.scalar).is_some();
        if answered && !ineligible_questions.contains(&leaf.question) {
            ineligible_questions.push(leaf.question.clone());
        }
    }

    Ok(EligibilityStatus {
        eligible,
        failing_conditions,
        ineligible_questions,
    })
}

/// Visible blocks and eligibility of `answers` under one version
pub(crate) fn view_of(
    version: &ProgramVersion,
    answers: &AnswerStore,
    questions: &ProgramQuestions,
    ctx: &EvalContext,
) -> Result<ReconciledView, ConfigurationError> {
    let visible = visible_blocks(version, answers, questions, ctx)?
        .into_iter()
        .map(|b| b.id.clone())
        .collect();
    Ok(ReconciledView {
        version: version.key(),
        blocks: version.blocks.iter().map(|b| b.id.clone()).collect(),
        visible,
        eligibility: eligibility_status(version, answers, questions, ctx)?,
    })
}

/// Resolve an application against the program's active version.
///
/// Submitted applications and applications already on the active version
/// are returned unchanged. Otherwise the application is fast-forwarded:
/// its pin moves to the active version and answers the new question
/// revisions can no longer hold are dropped. Answers to questions the new
/// version no longer asks are kept.
pub fn reconcile(
    application: &Application,
    pinned: &ProgramVersion,
    active: &ProgramVersion,
    pinned_questions: &ProgramQuestions,
    active_questions: &ProgramQuestions,
    ctx: &EvalContext,
) -> Result<Reconciliation, IntakeError> {
    if pinned.key() != application.version_key() || active.program != application.program {
        return Err(VersionError::UnknownVersion {
            program: application.program.clone(),
            version: application.pinned,
        }
        .into());
    }

    if application.is_submitted() || active.version == application.pinned {
        return Ok(Reconciliation {
            application: application.clone(),
            view: view_of(pinned, &application.answers, pinned_questions, ctx)?,
            report: None,
        });
    }

    let mut report = diff_blocks(pinned, active);

    let mut updated = application.clone();
    let keys: Vec<AnswerKey> = updated.answers.keys().collect();
    for key in keys {
        let Some(question) = active_questions.get(&key.question) else {
            continue;
        };
        let Some(stored) = updated.answers.value(&key.question, key.scalar) else {
            continue;
        };
        if question.scalar_type(key.scalar) != Some(stored.scalar_type()) {
            log::warn!(
                "Dropping answer {} on application {}: type changed in {} v{}",
                key,
                application.id,
                active.program,
                active.version
            );
            updated.answers.remove(&key);
            report.dropped_answers.push(key);
        }
    }
    updated.pinned = active.version;

    log::debug!(
        "Fast-forward of {}: carried {:?}, changed {:?}, added {:?}, removed {:?}",
        application.id,
        report.carried,
        report.changed,
        report.added,
        report.removed
    );

    let view = view_of(active, &updated.answers, active_questions, ctx)?;
    Ok(Reconciliation {
        application: updated,
        view,
        report: Some(report),
    })
}

fn diff_blocks(pinned: &ProgramVersion, active: &ProgramVersion) -> FastForwardReport {
    let mut report = FastForwardReport {
        from: pinned.version,
        to: active.version,
        ..Default::default()
    };

    for block in &active.blocks {
        match pinned.block(&block.id) {
            Some(old) if concepts(old) == concepts(block) => report.carried.push(block.id.clone()),
            Some(_) => report.changed.push(block.id.clone()),
            None => report.added.push(block.id.clone()),
        }
    }
    for block in &pinned.blocks {
        if active.block(&block.id).is_none() {
            report.removed.push(block.id.clone());
        }
    }
    report
}

/// A block is unchanged when it asks the same questions, in any order and at any revision
fn concepts(block: &Block) -> BTreeSet<&ConceptId> {
    block.questions.iter().map(|pin| &pin.concept).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::answers::{Answer, ScalarValue};
    use crate::engine::predicate::{parse, PredicateDefinition};
    use crate::engine::question::{QuestionRevision, QuestionType, RevisionKey, Scalar};
    use crate::intake::program::VersionStatus;
    use chrono::NaiveDate;

    fn ctx() -> EvalContext {
        EvalContext::at(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
    }

    fn question(concept: &str, revision: u32, question_type: QuestionType) -> QuestionRevision {
        QuestionRevision {
            concept: ConceptId::from(concept),
            revision,
            question_type,
            text: String::new(),
            options: vec![],
        }
    }

    fn version(n: u32, blocks: Vec<Block>) -> ProgramVersion {
        ProgramVersion {
            program: ConceptId::from("snap"),
            version: n,
            status: VersionStatus::Active,
            blocks,
            eligibility_is_gating: false,
            published_at: None,
        }
    }

    fn questions(n: u32, revisions: Vec<QuestionRevision>) -> ProgramQuestions {
        ProgramQuestions::new(ConceptId::from("snap"), n, revisions)
    }

    fn answer(app: &mut Application, question: &str, scalar: Scalar, value: ScalarValue) {
        app.answers
            .update(AnswerKey::new(question, scalar), Answer::new(value, "block", app.pinned));
    }

    fn ids(items: &[ConceptId]) -> Vec<&str> {
        items.iter().map(ConceptId::as_str).collect()
    }

    /// v1 [A(q1), B(q2, eligibility q2 == 5)] and v2 [A(q1), C(q3)]
    fn two_versions() -> (ProgramVersion, ProgramQuestions, ProgramVersion, ProgramQuestions) {
        let v1 = version(
            1,
            vec![
                Block::new("A", "A").with_question(RevisionKey::new("q1", 1)),
                Block::new("B", "B")
                    .with_question(RevisionKey::new("q2", 1))
                    .with_eligibility(parse("q2.number == 5").unwrap()),
            ],
        );
        let q1 = questions(
            1,
            vec![
                question("q1", 1, QuestionType::Text),
                question("q2", 1, QuestionType::Number),
            ],
        );
        let v2 = version(
            2,
            vec![
                Block::new("A", "A").with_question(RevisionKey::new("q1", 1)),
                Block::new("C", "C").with_question(RevisionKey::new("q3", 1)),
            ],
        );
        let q2 = questions(
            2,
            vec![
                question("q1", 1, QuestionType::Text),
                question("q3", 1, QuestionType::Text),
            ],
        );
        (v1, q1, v2, q2)
    }

    #[test]
    fn test_removed_block_fast_forward() {
        let (v1, q1, v2, q2) = two_versions();
        let mut app = Application::new("snap", 1);
        answer(&mut app, "q1", Scalar::Text, ScalarValue::string("Ada"));
        answer(&mut app, "q2", Scalar::Number, ScalarValue::Long(5));

        let result = reconcile(&app, &v1, &v2, &q1, &q2, &ctx()).unwrap();

        assert_eq!(result.application.pinned, 2);
        assert_eq!(ids(&result.view.blocks), vec!["A", "C"]);
        assert_eq!(ids(&result.view.visible), vec!["A", "C"]);
        assert!(result.view.eligibility.eligible);
        assert!(result.view.eligibility.failing_conditions.is_empty());

        let answers = &result.application.answers;
        assert_eq!(
            answers.value(&ConceptId::from("q1"), Scalar::Text),
            Some(&ScalarValue::string("Ada"))
        );
        // Retained but unused
        assert_eq!(
            answers.value(&ConceptId::from("q2"), Scalar::Number),
            Some(&ScalarValue::Long(5))
        );

        let report = result.report.unwrap();
        assert_eq!((report.from, report.to), (1, 2));
        assert_eq!(ids(&report.carried), vec!["A"]);
        assert_eq!(ids(&report.added), vec!["C"]);
        assert_eq!(ids(&report.removed), vec!["B"]);
        assert!(report.dropped_answers.is_empty());
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let (v1, q1, v2, q2) = two_versions();
        let mut app = Application::new("snap", 1);
        answer(&mut app, "q1", Scalar::Text, ScalarValue::string("Ada"));

        let first = reconcile(&app, &v1, &v2, &q1, &q2, &ctx()).unwrap();
        let second = reconcile(&first.application, &v2, &v2, &q2, &q2, &ctx()).unwrap();

        assert!(second.report.is_none());
        assert_eq!(second.application, first.application);
        assert_eq!(second.view, first.view);
    }

    #[test]
    fn test_type_change_drops_answer() {
        let v1 = version(1, vec![Block::new("A", "A").with_question(RevisionKey::new("q1", 1))]);
        let q1 = questions(1, vec![question("q1", 1, QuestionType::Text)]);
        let v2 = version(2, vec![Block::new("A", "A").with_question(RevisionKey::new("q1", 2))]);
        let q2 = questions(2, vec![question("q1", 2, QuestionType::Number)]);

        let mut app = Application::new("snap", 1);
        answer(&mut app, "q1", Scalar::Text, ScalarValue::string("five"));

        let result = reconcile(&app, &v1, &v2, &q1, &q2, &ctx()).unwrap();
        assert!(!result.application.answers.is_answered(&ConceptId::from("q1")));

        // Same concepts, so the block is carried even though its answer was dropped
        let report = result.report.unwrap();
        assert_eq!(ids(&report.carried), vec!["A"]);
        assert!(report.changed.is_empty());
        assert_eq!(report.dropped_answers, vec![AnswerKey::new("q1", Scalar::Text)]);
    }

    #[test]
    fn test_same_type_new_revision_keeps_answer() {
        let v1 = version(1, vec![Block::new("A", "A").with_question(RevisionKey::new("q1", 1))]);
        let q1 = questions(1, vec![question("q1", 1, QuestionType::Number)]);
        let v2 = version(2, vec![Block::new("A", "A").with_question(RevisionKey::new("q1", 2))]);
        let q2 = questions(2, vec![question("q1", 2, QuestionType::Currency)]);

        let mut app = Application::new("snap", 1);
        answer(&mut app, "q1", Scalar::Number, ScalarValue::Long(4));

        // Currency exposes currency_cents, not number, so the old scalar goes
        let result = reconcile(&app, &v1, &v2, &q1, &q2, &ctx()).unwrap();
        assert_eq!(result.report.unwrap().dropped_answers.len(), 1);

        let q2 = questions(2, vec![question("q1", 2, QuestionType::Number)]);
        let result = reconcile(&app, &v1, &v2, &q1, &q2, &ctx()).unwrap();
        assert!(result.report.unwrap().dropped_answers.is_empty());
        assert!(result.application.answers.is_answered(&ConceptId::from("q1")));
    }

    #[test]
    fn test_submitted_is_never_fast_forwarded() {
        let (v1, q1, v2, q2) = two_versions();
        let mut app = Application::new("snap", 1);
        answer(&mut app, "q2", Scalar::Number, ScalarValue::Long(4));
        app.submit();

        let result = reconcile(&app, &v1, &v2, &q1, &q2, &ctx()).unwrap();
        assert!(result.report.is_none());
        assert_eq!(result.application, app);
        assert_eq!(result.view.version, VersionKey::new("snap", 1));
        assert_eq!(ids(&result.view.blocks), vec!["A", "B"]);
        assert!(!result.view.eligibility.eligible);
    }

    #[test]
    fn test_new_version_order_wins() {
        let v1 = version(
            1,
            vec![Block::new("A", "A"), Block::new("B", "B")],
        );
        let v2 = version(
            2,
            vec![Block::new("B", "B"), Block::new("N", "N"), Block::new("A", "A")],
        );
        let q = questions(1, vec![]);
        let app = Application::new("snap", 1);

        let result = reconcile(&app, &v1, &v2, &q, &q, &ctx()).unwrap();
        assert_eq!(ids(&result.view.blocks), vec!["B", "N", "A"]);
        assert_eq!(ids(&result.report.unwrap().carried), vec!["B", "A"]);
    }

    #[test]
    fn test_reordered_questions_are_carried() {
        let v1 = version(
            1,
            vec![Block::new("A", "A")
                .with_question(RevisionKey::new("q1", 1))
                .with_question(RevisionKey::new("q2", 1))],
        );
        let v2 = version(
            2,
            vec![
                Block::new("A", "A")
                    .with_question(RevisionKey::new("q2", 1))
                    .with_question(RevisionKey::new("q1", 1)),
                Block::new("B", "B").with_question(RevisionKey::new("q3", 1)),
            ],
        );
        let q = questions(
            1,
            vec![
                question("q1", 1, QuestionType::Text),
                question("q2", 1, QuestionType::Number),
                question("q3", 1, QuestionType::Date),
            ],
        );
        let app = Application::new("snap", 1);

        let report = reconcile(&app, &v1, &v2, &q, &q, &ctx()).unwrap().report.unwrap();
        assert_eq!(ids(&report.carried), vec!["A"]);
        assert!(report.changed.is_empty());
        assert_eq!(ids(&report.added), vec!["B"]);
    }

    #[test]
    fn test_adding_a_question_changes_the_block() {
        let v1 = version(1, vec![Block::new("A", "A").with_question(RevisionKey::new("q1", 1))]);
        let v2 = version(
            2,
            vec![Block::new("A", "A")
                .with_question(RevisionKey::new("q1", 1))
                .with_question(RevisionKey::new("q2", 1))],
        );
        let q = questions(
            1,
            vec![question("q1", 1, QuestionType::Text), question("q2", 1, QuestionType::Number)],
        );
        let app = Application::new("snap", 1);

        let report = reconcile(&app, &v1, &v2, &q, &q, &ctx()).unwrap().report.unwrap();
        assert_eq!(ids(&report.changed), vec!["A"]);
        assert!(report.carried.is_empty());
    }

    #[test]
    fn test_eligibility_summary_hides_concept_ids() {
        let v = version(
            1,
            vec![Block::new("household", "Household")
                .with_question(RevisionKey::new("q2", 1))
                .with_question(RevisionKey::new("inc", 1))
                .with_eligibility(
                    parse("q2.number == 5 and inc.currency_cents <= 250000").unwrap(),
                )],
        );
        let mut size = question("q2", 1, QuestionType::Number);
        size.text = "How many people live with you?".to_string();
        let q = questions(1, vec![size, question("inc", 1, QuestionType::Currency)]);

        let mut app = Application::new("snap", 1);
        answer(&mut app, "q2", Scalar::Number, ScalarValue::Long(4));
        let status = eligibility_status(&v, &app.answers, &q, &ctx()).unwrap();
        let summary = EligibilitySummary::new(&status, &v, &q);

        assert!(!summary.eligible);
        assert!(summary.definitively_ineligible);
        assert_eq!(
            summary.failing,
            vec![
                FailingRequirement {
                    section: "Household".to_string(),
                    question: "How many people live with you?".to_string(),
                    requirement: "== 5".to_string(),
                    answered: true,
                },
                FailingRequirement {
                    section: "Household".to_string(),
                    question: "A question in this section".to_string(),
                    requirement: "<= $2500.00".to_string(),
                    answered: false,
                },
            ]
        );
        let json = serde_json::to_string(&summary).unwrap();
        assert!(!json.contains("q2"));
        assert!(!json.contains("inc"));
    }

    #[test]
    fn test_pinned_version_mismatch_is_error() {
        let (v1, q1, v2, q2) = two_versions();
        let app = Application::new("snap", 7);
        assert!(reconcile(&app, &v1, &v2, &q1, &q2, &ctx()).is_err());
    }

    #[test]
    fn test_hidden_block_does_not_gate_eligibility() {
        let v = version(
            1,
            vec![
                Block::new("A", "A").with_question(RevisionKey::new("q1", 1)),
                Block::new("B", "B")
                    .with_question(RevisionKey::new("q2", 1))
                    .with_visibility(PredicateDefinition::show_when(
                        parse("q1.text == 'yes'").unwrap(),
                    ))
                    .with_eligibility(parse("q2.number == 5").unwrap()),
            ],
        );
        let q = questions(
            1,
            vec![
                question("q1", 1, QuestionType::Text),
                question("q2", 1, QuestionType::Number),
            ],
        );

        let mut answers = AnswerStore::empty();
        answers.update(
            AnswerKey::new("q1", Scalar::Text),
            Answer::new(ScalarValue::string("no"), "A", 1),
        );
        let status = eligibility_status(&v, &answers, &q, &ctx()).unwrap();
        assert!(status.eligible);

        answers.update(
            AnswerKey::new("q1", Scalar::Text),
            Answer::new(ScalarValue::string("yes"), "A", 1),
        );
        let status = eligibility_status(&v, &answers, &q, &ctx()).unwrap();
        assert!(!status.eligible);
        assert!(!status.is_definitively_ineligible());

        answers.update(
            AnswerKey::new("q2", Scalar::Number),
            Answer::new(ScalarValue::Long(4), "B", 1),
        );
        let status = eligibility_status(&v, &answers, &q, &ctx()).unwrap();
        assert!(status.is_definitively_ineligible());
        assert_eq!(ids(&status.ineligible_questions), vec!["q2"]);
    }
}
