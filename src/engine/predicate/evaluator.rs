// SPDX-License-Identifier: MIT

//! Predicate expression evaluator

use chrono::{Months, NaiveDate, Utc};
use serde::Serialize;

use super::ast::{Condition, Operator, PredicateAction, PredicateDefinition, PredicateExpr, PredicateValue};
use super::validate::check_condition;
use crate::engine::answers::{AnswerStore, ScalarValue};
use crate::engine::error::ConfigurationError;
use crate::engine::question::ProgramQuestions;

/// Inputs to evaluation that do not come from the answer store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalContext {
    /// Date that age operators are measured against
    pub today: NaiveDate,
}

impl EvalContext {
    pub fn at(today: NaiveDate) -> Self {
        Self { today }
    }

    /// Context for the current UTC calendar date
    pub fn now() -> Self {
        Self {
            today: Utc::now().date_naive(),
        }
    }
}

/// Outcome of evaluating a predicate tree
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvalResult {
    pub satisfied: bool,
    /// Every failing leaf that contributed to an unsatisfied result
    pub unsatisfied_leaves: Vec<Condition>,
}

impl EvalResult {
    fn satisfied() -> Self {
        Self {
            satisfied: true,
            unsatisfied_leaves: Vec::new(),
        }
    }

    fn failed(leaves: Vec<Condition>) -> Self {
        Self {
            satisfied: false,
            unsatisfied_leaves: leaves,
        }
    }
}

/// Evaluate a predicate expression against an application's answers.
///
/// Every child is evaluated so the failure report is complete. An
/// unanswered leaf is unsatisfied; a leaf that references something the
/// program does not define is an error.
pub fn evaluate(
    expr: &PredicateExpr,
    answers: &AnswerStore,
    questions: &ProgramQuestions,
    ctx: &EvalContext,
) -> Result<EvalResult, ConfigurationError> {
    match expr {
        PredicateExpr::Leaf(condition) => {
            if evaluate_condition(condition, answers, questions, ctx)? {
                Ok(EvalResult::satisfied())
            } else {
                Ok(EvalResult::failed(vec![condition.clone()]))
            }
        }
        PredicateExpr::And(children) => {
            let results = evaluate_children("AND", children, answers, questions, ctx)?;
            if results.iter().all(|r| r.satisfied) {
                Ok(EvalResult::satisfied())
            } else {
                Ok(EvalResult::failed(union_leaves(results)))
            }
        }
        PredicateExpr::Or(children) => {
            let results = evaluate_children("OR", children, answers, questions, ctx)?;
            if results.iter().any(|r| r.satisfied) {
                Ok(EvalResult::satisfied())
            } else {
                Ok(EvalResult::failed(union_leaves(results)))
            }
        }
    }
}

/// Whether a block with this visibility predicate is shown
pub fn evaluate_visibility(
    definition: &PredicateDefinition,
    answers: &AnswerStore,
    questions: &ProgramQuestions,
    ctx: &EvalContext,
) -> Result<bool, ConfigurationError> {
    let result = evaluate(&definition.root, answers, questions, ctx)?;
    Ok(match definition.action {
        PredicateAction::ShowBlock => result.satisfied,
        PredicateAction::HideBlock => !result.satisfied,
    })
}

fn evaluate_children(
    combinator: &str,
    children: &[PredicateExpr],
    answers: &AnswerStore,
    questions: &ProgramQuestions,
    ctx: &EvalContext,
) -> Result<Vec<EvalResult>, ConfigurationError> {
    if children.is_empty() {
        return Err(ConfigurationError::EmptyCombinator {
            combinator: combinator.to_string(),
        });
    }
    children
        .iter()
        .map(|child| evaluate(child, answers, questions, ctx))
        .collect()
}

fn union_leaves(results: Vec<EvalResult>) -> Vec<Condition> {
    let mut out: Vec<Condition> = Vec::new();
    for leaf in results.into_iter().flat_map(|r| r.unsatisfied_leaves) {
        if !out.contains(&leaf) {
            out.push(leaf);
        }
    }
    out
}

fn evaluate_condition(
    condition: &Condition,
    answers: &AnswerStore,
    questions: &ProgramQuestions,
    ctx: &EvalContext,
) -> Result<bool, ConfigurationError> {
    let scalar_type = check_condition(condition, questions)?;

    let Some(value) = answers.value(&condition.question, condition.scalar) else {
        return Ok(false);
    };

    if value.scalar_type() != scalar_type {
        return Err(ConfigurationError::AnswerTypeMismatch {
            question: condition.question.clone(),
            scalar: condition.scalar.to_string(),
            expected: scalar_type.to_string(),
            found: value.scalar_type().to_string(),
        });
    }

    compare(condition, value, ctx)
}

fn compare(
    condition: &Condition,
    value: &ScalarValue,
    ctx: &EvalContext,
) -> Result<bool, ConfigurationError> {
    use Operator::*;
    use PredicateValue as L;
    use ScalarValue as V;

    let result = match (condition.operator, value, &condition.value) {
        (EqualTo, V::String(a), L::String(b)) => a == b,
        (EqualTo, V::Long(a), L::Long(b)) => a == b,
        (EqualTo, V::Date(a), L::Date(b)) => a == b,
        (NotEqualTo, V::String(a), L::String(b)) => a != b,
        (NotEqualTo, V::Long(a), L::Long(b)) => a != b,
        (NotEqualTo, V::Date(a), L::Date(b)) => a != b,

        (In, V::String(a), L::ListOfStrings(set)) => set.contains(a),
        (In, V::Long(a), L::ListOfLongs(set)) => set.contains(a),
        (NotIn, V::String(a), L::ListOfStrings(set)) => !set.contains(a),
        (NotIn, V::Long(a), L::ListOfLongs(set)) => !set.contains(a),

        (AnyOf, V::ListOfStrings(answer), L::ListOfStrings(set)) => {
            set.iter().any(|item| answer.contains(item))
        }
        (AnyOf, V::ListOfLongs(answer), L::ListOfLongs(set)) => {
            set.iter().any(|item| answer.contains(item))
        }
        (AllOf, V::ListOfStrings(answer), L::ListOfStrings(set)) => {
            set.iter().all(|item| answer.contains(item))
        }
        (AllOf, V::ListOfLongs(answer), L::ListOfLongs(set)) => {
            set.iter().all(|item| answer.contains(item))
        }
        (NoneOf, V::ListOfStrings(answer), L::ListOfStrings(set)) => {
            !set.iter().any(|item| answer.contains(item))
        }
        (NoneOf, V::ListOfLongs(answer), L::ListOfLongs(set)) => {
            !set.iter().any(|item| answer.contains(item))
        }
        (SubsetOf, V::ListOfStrings(answer), L::ListOfStrings(set)) => {
            answer.iter().all(|item| set.contains(item))
        }
        (SubsetOf, V::ListOfLongs(answer), L::ListOfLongs(set)) => {
            answer.iter().all(|item| set.contains(item))
        }

        (LessThan, V::Long(a), L::Long(b)) => a < b,
        (GreaterThan, V::Long(a), L::Long(b)) => a > b,
        (LessThanOrEqualTo, V::Long(a), L::Long(b)) => a <= b,
        (GreaterThanOrEqualTo, V::Long(a), L::Long(b)) => a >= b,

        (Before, V::Date(a), L::Date(b)) => a < b,
        (After, V::Date(a), L::Date(b)) => a > b,

        (Between, V::Long(a), L::PairOfLongs(lo, hi)) => lo <= a && a <= hi,
        (Between, V::Date(a), L::PairOfDates(lo, hi)) => lo <= a && a <= hi,

        (AgeOlderThan, V::Date(birth), L::Long(years)) => {
            *birth < years_before(condition, ctx.today, *years)?
        }
        (AgeYoungerThan, V::Date(birth), L::Long(years)) => {
            *birth > years_before(condition, ctx.today, *years)?
        }
        (AgeBetween, V::Date(birth), L::PairOfLongs(min, max)) => {
            let youngest = years_before(condition, ctx.today, *min)?;
            let oldest = years_before(condition, ctx.today, *max)?;
            oldest <= *birth && *birth <= youngest
        }

        (operator, _, literal) => {
            return Err(ConfigurationError::LiteralMismatch {
                question: condition.question.clone(),
                scalar: condition.scalar.to_string(),
                operator: operator.name().to_string(),
                expected: value.scalar_type().to_string(),
                found: literal.type_name().to_string(),
            })
        }
    };
    Ok(result)
}

/// The calendar date `years` whole years before `today`
fn years_before(
    condition: &Condition,
    today: NaiveDate,
    years: i64,
) -> Result<NaiveDate, ConfigurationError> {
    u32::try_from(years)
        .ok()
        .and_then(|y| y.checked_mul(12))
        .and_then(|months| today.checked_sub_months(Months::new(months)))
        .ok_or_else(|| ConfigurationError::InvalidLiteral {
            question: condition.question.clone(),
            scalar: condition.scalar.to_string(),
            reason: format!("{} is not a usable age in years", years),
        })
}
