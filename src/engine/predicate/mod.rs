// SPDX-License-Identifier: MIT

//! Predicate evaluation for block visibility and eligibility
//!
//! Predicates are trees of typed conditions over applicant answers:
//! - `household.number == 5`
//! - `pets.selections any_of ['cat', 'dog']`
//! - `dob.date age_older_than 18 and income.currency_cents < 200000`

mod ast;
mod evaluator;
mod parser;
mod validate;

pub use ast::{Condition, Operator, PredicateAction, PredicateDefinition, PredicateExpr, PredicateValue};
pub use evaluator::{evaluate, evaluate_visibility, EvalContext, EvalResult};
pub use parser::parse;
pub use validate::{validate_predicate, validate_program, BlockPredicates, ValidationResult};
