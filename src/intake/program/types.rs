// SPDX-License-Identifier: MIT

//! Program version data types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::engine::predicate::{BlockPredicates, PredicateDefinition, PredicateExpr};
use crate::engine::question::{ConceptId, RevisionKey};

/// One screen of an application
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Block {
    /// Stable identity, independent of position
    pub id: ConceptId,
    #[serde(default)]
    pub name: String,
    /// Questions asked on this block, pinned to revisions
    #[serde(default)]
    pub questions: Vec<RevisionKey>,
    /// Always visible when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<PredicateDefinition>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "serde_yaml::with::singleton_map_recursive"
    )]
    pub eligibility: Option<PredicateExpr>,
}

impl Block {
    pub fn new(id: impl Into<ConceptId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            questions: Vec::new(),
            visibility: None,
            eligibility: None,
        }
    }

    /// Builder-style pin
    pub fn with_question(mut self, pin: RevisionKey) -> Self {
        self.questions.push(pin);
        self
    }

    pub fn with_visibility(mut self, visibility: PredicateDefinition) -> Self {
        self.visibility = Some(visibility);
        self
    }

    pub fn with_eligibility(mut self, eligibility: PredicateExpr) -> Self {
        self.eligibility = Some(eligibility);
        self
    }

    pub fn asks(&self, question: &ConceptId) -> bool {
        self.questions.iter().any(|pin| &pin.concept == question)
    }

    pub fn question_ids(&self) -> impl Iterator<Item = &ConceptId> {
        self.questions.iter().map(|pin| &pin.concept)
    }
}

/// Lifecycle of a program version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VersionStatus {
    Draft,
    Active,
    Obsolete,
}

/// An immutable snapshot of a program's blocks
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ProgramVersion {
    pub program: ConceptId,
    pub version: u32,
    pub status: VersionStatus,
    pub blocks: Vec<Block>,
    /// Whether a definitively ineligible application may still be submitted
    #[serde(default)]
    pub eligibility_is_gating: bool,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
}

impl ProgramVersion {
    pub fn key(&self) -> VersionKey {
        VersionKey::new(self.program.clone(), self.version)
    }

    pub fn block(&self, id: &ConceptId) -> Option<&Block> {
        self.blocks.iter().find(|b| &b.id == id)
    }

    pub fn position(&self, id: &ConceptId) -> Option<usize> {
        self.blocks.iter().position(|b| &b.id == id)
    }

    /// Every question pin in block order
    pub fn pins(&self) -> impl Iterator<Item = &RevisionKey> {
        self.blocks.iter().flat_map(|b| b.questions.iter())
    }

    pub fn asks(&self, question: &ConceptId) -> bool {
        self.blocks.iter().any(|b| b.asks(question))
    }

    /// Earliest block asking the question
    pub fn first_block_asking(&self, question: &ConceptId) -> Option<&Block> {
        self.blocks.iter().find(|b| b.asks(question))
    }

    pub fn has_eligibility(&self) -> bool {
        self.blocks.iter().any(|b| b.eligibility.is_some())
    }

    /// Predicate view used for ordering validation
    pub fn block_predicates(&self) -> Vec<BlockPredicates<'_>> {
        self.blocks
            .iter()
            .map(|b| BlockPredicates {
                block: &b.id,
                questions: b.question_ids().collect(),
                visibility: b.visibility.as_ref(),
                eligibility: b.eligibility.as_ref(),
            })
            .collect()
    }
}

/// Identity of one program version
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct VersionKey {
    pub program: ConceptId,
    pub version: u32,
}

impl VersionKey {
    pub fn new(program: impl Into<ConceptId>, version: u32) -> Self {
        Self {
            program: program.into(),
            version,
        }
    }
}

impl fmt::Display for VersionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} v{}", self.program, self.version)
    }
}

/// Which version of a program to look up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionSelector {
    Draft,
    #[default]
    Active,
    Version(u32),
}

impl fmt::Display for VersionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionSelector::Draft => f.write_str("draft"),
            VersionSelector::Active => f.write_str("active"),
            VersionSelector::Version(n) => write!(f, "v{}", n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::predicate::parse;

    fn version() -> ProgramVersion {
        ProgramVersion {
            program: ConceptId::from("snap"),
            version: 2,
            status: VersionStatus::Active,
            blocks: vec![
                Block::new("a", "About you").with_question(RevisionKey::new("q1", 1)),
                Block::new("b", "Household")
                    .with_question(RevisionKey::new("q2", 3))
                    .with_eligibility(parse("q2.number == 5").unwrap()),
            ],
            eligibility_is_gating: false,
            published_at: None,
        }
    }

    #[test]
    fn test_lookup_by_identity() {
        let v = version();
        assert_eq!(v.position(&ConceptId::from("b")), Some(1));
        assert!(v.block(&ConceptId::from("c")).is_none());
        assert!(v.asks(&ConceptId::from("q2")));
        assert!(!v.asks(&ConceptId::from("q3")));
        assert!(v.has_eligibility());
        assert_eq!(v.key().to_string(), "snap v2");
    }

    #[test]
    fn test_pins_in_block_order() {
        let pins: Vec<String> = version().pins().map(|p| p.to_string()).collect();
        assert_eq!(pins, vec!["q1@1", "q2@3"]);
    }

    #[test]
    fn test_block_yaml() {
        let yaml = r#"
            id: b
            questions:
              - { concept: q2, revision: 1 }
        "#;
        let block: Block = serde_yaml::from_str(yaml).unwrap();
        assert!(block.visibility.is_none());
        assert!(block.asks(&ConceptId::from("q2")));
    }

    #[test]
    fn test_block_with_predicates_yaml_round_trip() {
        let block = Block::new("b", "Household")
            .with_question(RevisionKey::new("q2", 1))
            .with_visibility(PredicateDefinition::show_when(
                parse("q2.number > 1 and (q1.text == 'x' or q2.number in [3, 4])").unwrap(),
            ))
            .with_eligibility(parse("q2.number == 5").unwrap());

        let yaml = serde_yaml::to_string(&block).unwrap();
        assert!(!yaml.contains('!'), "tagged enum leaked into yaml: {}", yaml);
        let back: Block = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, block);

        let json = serde_json::to_string(&block).unwrap();
        let back: Block = serde_json::from_str(&json).unwrap();
        assert_eq!(back, block);
    }

    #[test]
    fn test_block_eligibility_hand_written_yaml() {
        let yaml = r#"
            id: b
            questions:
              - { concept: q2, revision: 1 }
            eligibility:
              and:
                - leaf:
                    question: q2
                    scalar: number
                    operator: LESS_THAN_OR_EQUAL_TO
                    value: { type: LONG, value: 4 }
        "#;
        let block: Block = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            block.eligibility.map(|e| e.to_string()),
            Some("q2.number <= 4".to_string())
        );
    }

    #[test]
    fn test_selector_serde() {
        let s: VersionSelector = serde_json::from_str(r#"{"version": 3}"#).unwrap();
        assert_eq!(s, VersionSelector::Version(3));
        let s: VersionSelector = serde_json::from_str(r#""draft""#).unwrap();
        assert_eq!(s, VersionSelector::Draft);
    }
}
