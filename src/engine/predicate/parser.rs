// SPDX-License-Identifier: MIT

//! Predicate expression parser
//!
//! Parses expressions like:
//! - `household.number == 5`
//! - `pets.selections any_of ['cat', 'dog']`
//! - `dob.date age_older_than 18 and (income.currency_cents < 200000 or status.selection in ['veteran'])`
//!
//! `or` binds loosest, then `and`. Both are n-ary and flatten into a
//! single node. The literal form depends on the operator.

use chrono::NaiveDate;

use super::ast::{Condition, Operator, PredicateExpr, PredicateValue};
use crate::engine::answers::DATE_FORMAT;
use crate::engine::error::ParseError;
use crate::engine::question::{ConceptId, Scalar};

/// Parse a predicate expression string into an AST
pub fn parse(input: &str) -> Result<PredicateExpr, ParseError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ParseError::new(input, "empty expression"));
    }

    if let Some(inner) = strip_outer_parens(input) {
        return parse(inner);
    }

    let parts = split_top_level(input, "or")?;
    if parts.len() > 1 {
        return Ok(PredicateExpr::Or(flatten(parts, true)?));
    }

    let parts = split_top_level(input, "and")?;
    if parts.len() > 1 {
        return Ok(PredicateExpr::And(flatten(parts, false)?));
    }

    parse_condition(input).map(PredicateExpr::Leaf)
}

fn flatten(parts: Vec<&str>, is_or: bool) -> Result<Vec<PredicateExpr>, ParseError> {
    let mut children = Vec::with_capacity(parts.len());
    for part in parts {
        match parse(part)? {
            PredicateExpr::Or(nested) if is_or => children.extend(nested),
            PredicateExpr::And(nested) if !is_or => children.extend(nested),
            other => children.push(other),
        }
    }
    Ok(children)
}

/// `(...)` wrapping the whole input, without the parentheses
fn strip_outer_parens(input: &str) -> Option<&str> {
    if !input.starts_with('(') || !input.ends_with(')') {
        return None;
    }
    let mut depth = 0;
    let mut quote: Option<u8> = None;
    for (i, &b) in input.as_bytes().iter().enumerate() {
        match (quote, b) {
            (Some(q), _) if b == q => quote = None,
            (Some(_), _) => {}
            (None, b'\'' | b'"') => quote = Some(b),
            (None, b'(') => depth += 1,
            (None, b')') => {
                depth -= 1;
                if depth == 0 {
                    return (i == input.len() - 1).then(|| &input[1..i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split on a keyword surrounded by whitespace, outside quotes and brackets
fn split_top_level<'a>(input: &'a str, keyword: &str) -> Result<Vec<&'a str>, ParseError> {
    let bytes = input.as_bytes();
    let kw = keyword.as_bytes();
    let mut parts = Vec::new();
    let mut start = 0;
    let mut depth: i32 = 0;
    let mut quote: Option<u8> = None;

    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'\'' | b'"' => quote = Some(b),
                b'(' | b'[' => depth += 1,
                b')' | b']' => {
                    depth -= 1;
                    if depth < 0 {
                        return Err(ParseError::new(input, "unbalanced brackets"));
                    }
                }
                _ if depth == 0
                    && b.is_ascii_whitespace()
                    && bytes[i + 1..].starts_with(kw)
                    && bytes
                        .get(i + 1 + kw.len())
                        .is_some_and(u8::is_ascii_whitespace) =>
                {
                    parts.push(input[start..i].trim());
                    i += 1 + kw.len();
                    start = i;
                    continue;
                }
                _ => {}
            },
        }
        i += 1;
    }

    if quote.is_some() {
        return Err(ParseError::new(input, "unterminated string"));
    }
    if depth != 0 {
        return Err(ParseError::new(input, "unbalanced brackets"));
    }
    parts.push(input[start..].trim());
    if parts.iter().any(|p| p.is_empty()) {
        return Err(ParseError::new(input, format!("'{}' is missing an operand", keyword)));
    }
    Ok(parts)
}

fn parse_condition(input: &str) -> Result<Condition, ParseError> {
    let path_end = input
        .find(|c: char| c.is_whitespace() || "=!<>".contains(c))
        .ok_or_else(|| ParseError::new(input, "expected 'question.scalar operator value'"))?;
    let (question, scalar) = parse_path(input, &input[..path_end])?;

    let rest = input[path_end..].trim_start();
    let (operator, literal) = parse_operator(input, rest)?;
    let value = parse_value(input, operator, literal.trim())?;

    Ok(Condition {
        question,
        scalar,
        operator,
        value,
    })
}

fn parse_path(input: &str, path: &str) -> Result<(ConceptId, Scalar), ParseError> {
    let (question, scalar) = path
        .rsplit_once('.')
        .ok_or_else(|| ParseError::new(input, format!("'{}' is not a question.scalar path", path)))?;
    if question.is_empty() {
        return Err(ParseError::new(input, "missing question id"));
    }
    let scalar = Scalar::parse(scalar)
        .ok_or_else(|| ParseError::new(input, format!("unknown scalar '{}'", scalar)))?;
    Ok((ConceptId::from(question), scalar))
}

fn parse_operator<'a>(input: &str, rest: &'a str) -> Result<(Operator, &'a str), ParseError> {
    // Longest symbols first
    let symbols = [
        ("==", Operator::EqualTo),
        ("!=", Operator::NotEqualTo),
        ("<=", Operator::LessThanOrEqualTo),
        (">=", Operator::GreaterThanOrEqualTo),
        ("<", Operator::LessThan),
        (">", Operator::GreaterThan),
    ];
    for (symbol, op) in symbols {
        if let Some(literal) = rest.strip_prefix(symbol) {
            return Ok((op, literal));
        }
    }

    let words = [
        Operator::In,
        Operator::NotIn,
        Operator::AnyOf,
        Operator::AllOf,
        Operator::NoneOf,
        Operator::SubsetOf,
        Operator::Before,
        Operator::After,
        Operator::Between,
        Operator::AgeOlderThan,
        Operator::AgeYoungerThan,
        Operator::AgeBetween,
    ];
    let word_end = rest.find(char::is_whitespace).unwrap_or(rest.len());
    let word = &rest[..word_end];
    words
        .into_iter()
        .find(|op| op.token() == word)
        .map(|op| (op, &rest[word_end..]))
        .ok_or_else(|| ParseError::new(input, format!("unknown operator '{}'", word)))
}

fn parse_value(input: &str, operator: Operator, literal: &str) -> Result<PredicateValue, ParseError> {
    if literal.is_empty() {
        return Err(ParseError::new(input, format!("{} needs a value", operator.token())));
    }
    let value = match operator {
        Operator::EqualTo | Operator::NotEqualTo => parse_scalar(input, literal)?,
        Operator::LessThan
        | Operator::GreaterThan
        | Operator::LessThanOrEqualTo
        | Operator::GreaterThanOrEqualTo
        | Operator::AgeOlderThan
        | Operator::AgeYoungerThan => PredicateValue::Long(parse_long(input, literal)?),
        Operator::Before | Operator::After => PredicateValue::Date(parse_date(input, literal)?),
        Operator::In
        | Operator::NotIn
        | Operator::AnyOf
        | Operator::AllOf
        | Operator::NoneOf
        | Operator::SubsetOf => parse_list(input, literal)?,
        Operator::Between | Operator::AgeBetween => {
            let items = list_items(input, literal)?;
            let [lo, hi] = items.as_slice() else {
                return Err(ParseError::new(
                    input,
                    format!("{} needs exactly two values", operator.token()),
                ));
            };
            match (parse_scalar(input, lo)?, parse_scalar(input, hi)?) {
                (PredicateValue::Long(a), PredicateValue::Long(b)) => PredicateValue::PairOfLongs(a, b),
                (PredicateValue::Date(a), PredicateValue::Date(b))
                    if operator == Operator::Between =>
                {
                    PredicateValue::PairOfDates(a, b)
                }
                _ => {
                    return Err(ParseError::new(
                        input,
                        format!("{} needs two numbers or two dates", operator.token()),
                    ))
                }
            }
        }
    };
    Ok(value)
}

fn parse_scalar(input: &str, literal: &str) -> Result<PredicateValue, ParseError> {
    if let Some(s) = unquote(literal) {
        return Ok(PredicateValue::String(s.to_string()));
    }
    if let Ok(n) = literal.parse::<i64>() {
        return Ok(PredicateValue::Long(n));
    }
    if let Ok(d) = NaiveDate::parse_from_str(literal, DATE_FORMAT) {
        return Ok(PredicateValue::Date(d));
    }
    Err(ParseError::new(input, format!("could not parse literal {}", literal)))
}

fn parse_long(input: &str, literal: &str) -> Result<i64, ParseError> {
    literal
        .parse()
        .map_err(|_| ParseError::new(input, format!("'{}' is not a whole number", literal)))
}

fn parse_date(input: &str, literal: &str) -> Result<NaiveDate, ParseError> {
    NaiveDate::parse_from_str(literal, DATE_FORMAT)
        .map_err(|_| ParseError::new(input, format!("'{}' is not a valid date", literal)))
}

fn parse_list(input: &str, literal: &str) -> Result<PredicateValue, ParseError> {
    let items = list_items(input, literal)?;
    if items.iter().all(|item| unquote(item).is_some()) {
        return Ok(PredicateValue::ListOfStrings(
            items
                .iter()
                .filter_map(|item| unquote(item))
                .map(str::to_string)
                .collect(),
        ));
    }
    let longs = items
        .iter()
        .map(|item| parse_long(input, item))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| ParseError::new(input, "list items must be all strings or all numbers"))?;
    Ok(PredicateValue::ListOfLongs(longs))
}

/// Items of a `[a, b, ...]` literal
fn list_items<'a>(input: &str, literal: &'a str) -> Result<Vec<&'a str>, ParseError> {
    let inner = literal
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| ParseError::new(input, format!("expected a [..] list, got {}", literal)))?;
    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut items = Vec::new();
    let mut quote: Option<u8> = None;
    let mut start = 0;
    for (i, &b) in inner.as_bytes().iter().enumerate() {
        match (quote, b) {
            (Some(q), _) if b == q => quote = None,
            (Some(_), _) => {}
            (None, b'\'' | b'"') => quote = Some(b),
            (None, b',') => {
                items.push(inner[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    items.push(inner[start..].trim());
    if items.iter().any(|item| item.is_empty()) {
        return Err(ParseError::new(input, "empty list item"));
    }
    Ok(items)
}

fn unquote(literal: &str) -> Option<&str> {
    ['\'', '"'].into_iter().find_map(|q| {
        literal
            .strip_prefix(q)
            .and_then(|s| s.strip_suffix(q))
            .filter(|s| !s.contains(q))
    })
}
