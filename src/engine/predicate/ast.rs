// SPDX-License-Identifier: MIT

//! Abstract Syntax Tree for predicate expressions

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::engine::answers::DATE_FORMAT;
use crate::engine::question::{ConceptId, Scalar};

/// A predicate expression tree
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PredicateExpr {
    /// Satisfied iff every child is satisfied
    And(Vec<PredicateExpr>),
    /// Satisfied iff at least one child is satisfied
    Or(Vec<PredicateExpr>),
    /// A single typed comparison against one answer
    Leaf(Condition),
}

/// Leaf comparison: `question.scalar operator value`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Condition {
    pub question: ConceptId,
    pub scalar: Scalar,
    pub operator: Operator,
    pub value: PredicateValue,
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    /// ==
    EqualTo,
    /// !=
    NotEqualTo,
    /// is one of
    In,
    /// is not one of
    NotIn,
    /// answer set intersects the literal set
    AnyOf,
    /// answer set is a superset of the literal set
    AllOf,
    /// answer set shares nothing with the literal set
    NoneOf,
    /// answer set is contained in the literal set
    SubsetOf,
    /// <
    LessThan,
    /// >
    GreaterThan,
    /// <=
    LessThanOrEqualTo,
    /// >=
    GreaterThanOrEqualTo,
    /// strictly earlier date
    Before,
    /// strictly later date
    After,
    /// inclusive range
    Between,
    AgeOlderThan,
    AgeYoungerThan,
    AgeBetween,
}

/// Literal on the right-hand side of a condition
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PredicateValue {
    Long(i64),
    String(String),
    Date(NaiveDate),
    ListOfLongs(Vec<i64>),
    ListOfStrings(Vec<String>),
    PairOfLongs(i64, i64),
    PairOfDates(NaiveDate, NaiveDate),
}

/// What a visibility predicate does to its block when satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PredicateAction {
    /// Shown only while the predicate is satisfied (default)
    #[default]
    ShowBlock,
    /// Hidden while the predicate is satisfied
    HideBlock,
}

/// Visibility predicate attached to a block
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PredicateDefinition {
    #[serde(default)]
    pub action: PredicateAction,
    #[serde(with = "serde_yaml::with::singleton_map_recursive")]
    pub root: PredicateExpr,
}

impl PredicateDefinition {
    pub fn show_when(root: PredicateExpr) -> Self {
        Self {
            action: PredicateAction::ShowBlock,
            root,
        }
    }

    pub fn hide_when(root: PredicateExpr) -> Self {
        Self {
            action: PredicateAction::HideBlock,
            root,
        }
    }
}

impl Condition {
    pub fn new(
        question: impl Into<ConceptId>,
        scalar: Scalar,
        operator: Operator,
        value: PredicateValue,
    ) -> Self {
        Self {
            question: question.into(),
            scalar,
            operator,
            value,
        }
    }
}

impl PredicateExpr {
    pub fn leaf(
        question: impl Into<ConceptId>,
        scalar: Scalar,
        operator: Operator,
        value: PredicateValue,
    ) -> Self {
        PredicateExpr::Leaf(Condition::new(question, scalar, operator, value))
    }

    /// Every leaf condition, left to right
    pub fn leaves(&self) -> Vec<&Condition> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a Condition>) {
        match self {
            PredicateExpr::Leaf(c) => out.push(c),
            PredicateExpr::And(children) | PredicateExpr::Or(children) => {
                for child in children {
                    child.collect_leaves(out);
                }
            }
        }
    }

    /// Questions this predicate references, in first-mention order
    pub fn questions(&self) -> Vec<ConceptId> {
        let mut seen = Vec::new();
        for leaf in self.leaves() {
            if !seen.contains(&leaf.question) {
                seen.push(leaf.question.clone());
            }
        }
        seen
    }

    pub fn references(&self, question: &ConceptId) -> bool {
        self.leaves().iter().any(|c| &c.question == question)
    }
}

impl Operator {
    /// Token used by the text syntax
    pub fn token(&self) -> &'static str {
        match self {
            Operator::EqualTo => "==",
            Operator::NotEqualTo => "!=",
            Operator::In => "in",
            Operator::NotIn => "not_in",
            Operator::AnyOf => "any_of",
            Operator::AllOf => "all_of",
            Operator::NoneOf => "none_of",
            Operator::SubsetOf => "subset_of",
            Operator::LessThan => "<",
            Operator::GreaterThan => ">",
            Operator::LessThanOrEqualTo => "<=",
            Operator::GreaterThanOrEqualTo => ">=",
            Operator::Before => "before",
            Operator::After => "after",
            Operator::Between => "between",
            Operator::AgeOlderThan => "age_older_than",
            Operator::AgeYoungerThan => "age_younger_than",
            Operator::AgeBetween => "age_between",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operator::EqualTo => "EQUAL_TO",
            Operator::NotEqualTo => "NOT_EQUAL_TO",
            Operator::In => "IN",
            Operator::NotIn => "NOT_IN",
            Operator::AnyOf => "ANY_OF",
            Operator::AllOf => "ALL_OF",
            Operator::NoneOf => "NONE_OF",
            Operator::SubsetOf => "SUBSET_OF",
            Operator::LessThan => "LESS_THAN",
            Operator::GreaterThan => "GREATER_THAN",
            Operator::LessThanOrEqualTo => "LESS_THAN_OR_EQUAL_TO",
            Operator::GreaterThanOrEqualTo => "GREATER_THAN_OR_EQUAL_TO",
            Operator::Before => "BEFORE",
            Operator::After => "AFTER",
            Operator::Between => "BETWEEN",
            Operator::AgeOlderThan => "AGE_OLDER_THAN",
            Operator::AgeYoungerThan => "AGE_YOUNGER_THAN",
            Operator::AgeBetween => "AGE_BETWEEN",
        }
    }
}

impl PredicateValue {
    /// Name of the literal's type, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            PredicateValue::Long(_) => "LONG",
            PredicateValue::String(_) => "STRING",
            PredicateValue::Date(_) => "DATE",
            PredicateValue::ListOfLongs(_) => "LIST_OF_LONGS",
            PredicateValue::ListOfStrings(_) => "LIST_OF_STRINGS",
            PredicateValue::PairOfLongs(_, _) => "PAIR_OF_LONGS",
            PredicateValue::PairOfDates(_, _) => "PAIR_OF_DATES",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn quote(s: &str) -> String {
    if s.contains('\'') {
        format!("\"{}\"", s)
    } else {
        format!("'{}'", s)
    }
}

fn join<T, F: Fn(&T) -> String>(items: &[T], f: F) -> String {
    items.iter().map(f).collect::<Vec<_>>().join(", ")
}

impl fmt::Display for PredicateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PredicateValue::Long(n) => write!(f, "{}", n),
            PredicateValue::String(s) => write!(f, "{}", quote(s)),
            PredicateValue::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
            PredicateValue::ListOfLongs(items) => {
                write!(f, "[{}]", join(items, |n| n.to_string()))
            }
            PredicateValue::ListOfStrings(items) => write!(f, "[{}]", join(items, |s| quote(s))),
            PredicateValue::PairOfLongs(a, b) => write!(f, "[{}, {}]", a, b),
            PredicateValue::PairOfDates(a, b) => write!(
                f,
                "[{}, {}]",
                a.format(DATE_FORMAT),
                b.format(DATE_FORMAT)
            ),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} {} {}",
            self.question,
            self.scalar,
            self.operator.token(),
            self.value
        )
    }
}

impl fmt::Display for PredicateExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PredicateExpr::Leaf(c) => write!(f, "{}", c),
            PredicateExpr::And(children) => write_group(f, children, " and ", true),
            PredicateExpr::Or(children) => write_group(f, children, " or ", false),
        }
    }
}

// `and` binds tighter than `or`, so only an `or` nested in an `and` needs parentheses
fn write_group(
    f: &mut fmt::Formatter<'_>,
    children: &[PredicateExpr],
    sep: &str,
    is_and: bool,
) -> fmt::Result {
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        if is_and && matches!(child, PredicateExpr::Or(_)) {
            write!(f, "({})", child)?;
        } else {
            write!(f, "{}", child)?;
        }
    }
    Ok(())
}
