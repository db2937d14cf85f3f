// SPDX-License-Identifier: MIT

//! Admin-time predicate validation

use std::collections::HashMap;

use super::ast::{Condition, Operator, PredicateDefinition, PredicateExpr, PredicateValue};
use crate::engine::error::ConfigurationError;
use crate::engine::question::{ConceptId, ProgramQuestions, QuestionRevision, ScalarType};

/// Every problem found, in discovery order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationResult {
    pub errors: Vec<ConfigurationError>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Admin-facing messages for each error
    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }

    /// The first error, if any
    pub fn into_result(self) -> Result<(), ConfigurationError> {
        match self.errors.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn extend(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
    }
}

/// One block's questions and predicates, as seen by ordering validation
#[derive(Debug, Clone)]
pub struct BlockPredicates<'a> {
    pub block: &'a ConceptId,
    pub questions: Vec<&'a ConceptId>,
    pub visibility: Option<&'a PredicateDefinition>,
    pub eligibility: Option<&'a PredicateExpr>,
}

/// Check that a predicate can be evaluated against the program's questions
pub fn validate_predicate(expr: &PredicateExpr, questions: &ProgramQuestions) -> ValidationResult {
    let mut result = ValidationResult::default();
    walk(expr, questions, &mut result.errors);
    result
}

/// Validate every predicate in a program, including the order in which
/// questions are asked relative to the predicates that read them
pub fn validate_program(blocks: &[BlockPredicates<'_>], questions: &ProgramQuestions) -> ValidationResult {
    let mut result = ValidationResult::default();

    let mut first_asked: HashMap<&ConceptId, usize> = HashMap::new();
    for (position, block) in blocks.iter().enumerate() {
        for question in &block.questions {
            first_asked.entry(*question).or_insert(position);
        }
    }

    for (position, block) in blocks.iter().enumerate() {
        if let Some(visibility) = block.visibility {
            result.extend(validate_predicate(&visibility.root, questions));
            check_order(
                block,
                "visibility",
                &visibility.root,
                questions,
                &first_asked,
                |asked| asked < position,
                &mut result.errors,
            );
        }
        if let Some(eligibility) = block.eligibility {
            result.extend(validate_predicate(eligibility, questions));
            check_order(
                block,
                "eligibility",
                eligibility,
                questions,
                &first_asked,
                |asked| asked <= position,
                &mut result.errors,
            );
        }
    }
    result
}

fn check_order(
    block: &BlockPredicates<'_>,
    kind: &str,
    expr: &PredicateExpr,
    questions: &ProgramQuestions,
    first_asked: &HashMap<&ConceptId, usize>,
    allowed: impl Fn(usize) -> bool,
    errors: &mut Vec<ConfigurationError>,
) {
    for question in expr.questions() {
        // Unknown questions are reported by validate_predicate
        if questions.get(&question).is_none() {
            continue;
        }
        if !first_asked.get(&question).is_some_and(|asked| allowed(*asked)) {
            errors.push(ConfigurationError::PredicateOrdering {
                block: block.block.clone(),
                kind: kind.to_string(),
                question,
            });
        }
    }
}

fn walk(expr: &PredicateExpr, questions: &ProgramQuestions, errors: &mut Vec<ConfigurationError>) {
    match expr {
        PredicateExpr::Leaf(condition) => match check_condition(condition, questions) {
            Ok(_) => {
                if let Ok(question) = questions.require(&condition.question) {
                    check_literal(condition, question, errors);
                }
            }
            Err(err) => errors.push(err),
        },
        PredicateExpr::And(children) | PredicateExpr::Or(children) => {
            if children.is_empty() {
                let combinator = if matches!(expr, PredicateExpr::And(_)) { "AND" } else { "OR" };
                errors.push(ConfigurationError::EmptyCombinator {
                    combinator: combinator.to_string(),
                });
            }
            for child in children {
                walk(child, questions, errors);
            }
        }
    }
}

/// Literal type a given operator expects for a scalar type, if the pair is allowed
fn expected_literal(operator: Operator, scalar_type: ScalarType) -> Option<&'static str> {
    use Operator::*;
    use ScalarType as T;

    let expected = match (operator, scalar_type) {
        (EqualTo | NotEqualTo, T::String) => "STRING",
        (EqualTo | NotEqualTo, T::Long) => "LONG",
        (EqualTo | NotEqualTo, T::Date) => "DATE",
        (In | NotIn, T::String) => "LIST_OF_STRINGS",
        (In | NotIn, T::Long) => "LIST_OF_LONGS",
        (AnyOf | AllOf | NoneOf | SubsetOf, T::ListOfStrings) => "LIST_OF_STRINGS",
        (AnyOf | AllOf | NoneOf | SubsetOf, T::ListOfLongs) => "LIST_OF_LONGS",
        (LessThan | GreaterThan | LessThanOrEqualTo | GreaterThanOrEqualTo, T::Long) => "LONG",
        (Before | After, T::Date) => "DATE",
        (Between, T::Long) => "PAIR_OF_LONGS",
        (Between, T::Date) => "PAIR_OF_DATES",
        (AgeOlderThan | AgeYoungerThan, T::Date) => "LONG",
        (AgeBetween, T::Date) => "PAIR_OF_LONGS",
        _ => return None,
    };
    Some(expected)
}

/// Resolve a leaf's question and check operator and literal types.
/// Returns the scalar's declared type.
pub(crate) fn check_condition(
    condition: &Condition,
    questions: &ProgramQuestions,
) -> Result<ScalarType, ConfigurationError> {
    let question = questions.require(&condition.question)?;

    let scalar_type = question
        .scalar_type(condition.scalar)
        .ok_or_else(|| ConfigurationError::UnknownScalar {
            question: condition.question.clone(),
            question_type: question.question_type.to_string(),
            scalar: condition.scalar.to_string(),
        })?;

    let expected = expected_literal(condition.operator, scalar_type).ok_or_else(|| {
        ConfigurationError::OperatorMismatch {
            question: condition.question.clone(),
            scalar: condition.scalar.to_string(),
            operator: condition.operator.name().to_string(),
            scalar_type: scalar_type.to_string(),
        }
    })?;

    if condition.value.type_name() != expected {
        return Err(ConfigurationError::LiteralMismatch {
            question: condition.question.clone(),
            scalar: condition.scalar.to_string(),
            operator: condition.operator.name().to_string(),
            expected: expected.to_string(),
            found: condition.value.type_name().to_string(),
        });
    }

    Ok(scalar_type)
}

fn check_literal(condition: &Condition, question: &QuestionRevision, errors: &mut Vec<ConfigurationError>) {
    let mut invalid = |reason: String| {
        errors.push(ConfigurationError::InvalidLiteral {
            question: condition.question.clone(),
            scalar: condition.scalar.to_string(),
            reason,
        })
    };

    match &condition.value {
        PredicateValue::ListOfLongs(items) if items.is_empty() => invalid("list is empty".to_string()),
        PredicateValue::ListOfStrings(items) if items.is_empty() => invalid("list is empty".to_string()),
        PredicateValue::PairOfLongs(lo, hi) if lo > hi => {
            invalid(format!("range start {} is after its end {}", lo, hi))
        }
        PredicateValue::PairOfDates(lo, hi) if lo > hi => {
            invalid(format!("range start {} is after its end {}", lo, hi))
        }
        _ => {}
    }

    let strings: Vec<&String> = match &condition.value {
        PredicateValue::String(s) => vec![s],
        PredicateValue::ListOfStrings(items) => items.iter().collect(),
        _ => Vec::new(),
    };
    for literal in &strings {
        if literal.contains('\'') && literal.contains('"') {
            invalid(format!("'{}' cannot contain both quote characters", literal));
        }
    }

    let is_age = matches!(
        condition.operator,
        Operator::AgeOlderThan | Operator::AgeYoungerThan | Operator::AgeBetween
    );
    if is_age {
        let negative = match condition.value {
            PredicateValue::Long(n) => n < 0,
            PredicateValue::PairOfLongs(lo, hi) => lo < 0 || hi < 0,
            _ => false,
        };
        if negative {
            invalid("ages cannot be negative".to_string());
        }
    }

    if question.question_type.has_options() && !question.options.is_empty() {
        for literal in strings {
            if !question.options.contains(literal) {
                invalid(format!("'{}' is not an option of this question", literal));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::predicate::parser::parse;
    use crate::engine::question::{QuestionType, Scalar};

    fn questions() -> ProgramQuestions {
        let q = |concept: &str, question_type: QuestionType, options: &[&str]| QuestionRevision {
            concept: ConceptId::from(concept),
            revision: 1,
            question_type,
            text: String::new(),
            options: options.iter().map(|s| s.to_string()).collect(),
        };
        ProgramQuestions::new(
            ConceptId::from("benefits"),
            2,
            vec![
                q("q1", QuestionType::Text, &[]),
                q("q2", QuestionType::Number, &[]),
                q("dob", QuestionType::Date, &[]),
                q("pets", QuestionType::Checkbox, &["a", "b", "c"]),
                q("home", QuestionType::Address, &[]),
            ],
        )
    }

    fn validate(text: &str) -> ValidationResult {
        validate_predicate(&parse(text).unwrap(), &questions())
    }

    #[test]
    fn test_valid_predicates() {
        for text in [
            "q2.number == 5",
            "q1.text in ['a', 'b']",
            "pets.selections any_of ['a', 'c']",
            "pets.selections none_of ['a']",
            "pets.selections subset_of ['a', 'b']",
            "dob.date before 2021-04-30 and dob.date age_between [18, 65]",
            "q2.number between [1, 10] or q2.number not_in [3]",
        ] {
            assert!(validate(text).is_valid(), "{} should be valid", text);
        }
    }

    #[test]
    fn test_unknown_question() {
        let result = validate("missing.number == 5");
        assert!(matches!(
            &result.errors[..],
            [ConfigurationError::UnknownQuestion { question, version: 2, .. }] if question.as_str() == "missing"
        ));
    }

    #[test]
    fn test_unknown_scalar() {
        let result = validate("q2.text == 'x'");
        assert!(matches!(&result.errors[..], [ConfigurationError::UnknownScalar { .. }]));

        let result = validate("home.text == 'x'");
        assert!(matches!(&result.errors[..], [ConfigurationError::UnknownScalar { .. }]));
    }

    #[test]
    fn test_operator_type_mismatch() {
        let result = validate("q1.text > 5");
        assert!(matches!(&result.errors[..], [ConfigurationError::OperatorMismatch { .. }]));

        let result = validate("pets.selections == 'a'");
        assert!(matches!(&result.errors[..], [ConfigurationError::OperatorMismatch { .. }]));
    }

    #[test]
    fn test_literal_mismatch() {
        let result = validate("q2.number == 'five'");
        assert!(matches!(&result.errors[..], [ConfigurationError::LiteralMismatch { .. }]));
    }

    #[test]
    fn test_literal_shape() {
        assert!(!validate("q2.number in []").is_valid());
        assert!(!validate("q2.number between [10, 1]").is_valid());
        assert!(!validate("dob.date age_older_than -1").is_valid());
        assert!(!validate("pets.selections any_of ['a', 'z']").is_valid());
    }

    #[test]
    fn test_string_literal_with_both_quotes() {
        let condition = Condition {
            question: ConceptId::from("q1"),
            scalar: Scalar::Text,
            operator: Operator::EqualTo,
            value: PredicateValue::String("it's \"odd\"".to_string()),
        };
        let expr = PredicateExpr::Leaf(condition);
        let result = validate_predicate(&expr, &questions());
        assert!(matches!(
            &result.errors[..],
            [ConfigurationError::InvalidLiteral { reason, .. }] if reason.contains("both quote")
        ));

        // One kind of quote still prints in a form the parser reads back
        let expr = PredicateExpr::Leaf(Condition {
            value: PredicateValue::String("it's".to_string()),
            ..match expr {
                PredicateExpr::Leaf(c) => c,
                _ => unreachable!(),
            }
        });
        assert!(validate_predicate(&expr, &questions()).is_valid());
        assert_eq!(parse(&expr.to_string()).unwrap(), expr);
    }

    #[test]
    fn test_collects_every_error() {
        let result = validate("missing.number == 5 and q1.text > 1 or q2.number in []");
        assert_eq!(result.errors.len(), 3);
        assert!(result.clone().into_result().is_err());
        assert_eq!(result.messages().len(), 3);
    }

    #[test]
    fn test_empty_combinator() {
        let result = validate_predicate(&PredicateExpr::Or(vec![]), &questions());
        assert_eq!(
            result.errors,
            vec![ConfigurationError::EmptyCombinator {
                combinator: "OR".to_string()
            }]
        );
    }

    #[test]
    fn test_program_ordering() {
        let a = ConceptId::from("a");
        let b = ConceptId::from("b");
        let q1 = ConceptId::from("q1");
        let q2 = ConceptId::from("q2");

        let visible_on_own_question = PredicateDefinition::show_when(parse("q2.number == 5").unwrap());
        let eligible_on_own_question = parse("q2.number == 5").unwrap();
        let visible_on_earlier = PredicateDefinition::show_when(parse("q1.text == 'yes'").unwrap());

        let ok = vec![
            BlockPredicates {
                block: &a,
                questions: vec![&q1],
                visibility: None,
                eligibility: None,
            },
            BlockPredicates {
                block: &b,
                questions: vec![&q2],
                visibility: Some(&visible_on_earlier),
                eligibility: Some(&eligible_on_own_question),
            },
        ];
        assert!(validate_program(&ok, &questions()).is_valid());

        let bad = vec![
            BlockPredicates {
                block: &a,
                questions: vec![&q1],
                visibility: None,
                eligibility: None,
            },
            BlockPredicates {
                block: &b,
                questions: vec![&q2],
                visibility: Some(&visible_on_own_question),
                eligibility: None,
            },
        ];
        let result = validate_program(&bad, &questions());
        assert_eq!(
            result.errors,
            vec![ConfigurationError::PredicateOrdering {
                block: b.clone(),
                kind: "visibility".to_string(),
                question: q2.clone(),
            }]
        );
    }
}
