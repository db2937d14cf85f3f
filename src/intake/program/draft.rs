// SPDX-License-Identifier: MIT

//! Mutable working copy of a program's next version

use chrono::{DateTime, Utc};

use super::types::{Block, ProgramVersion, VersionStatus};
use crate::engine::error::VersionError;
use crate::engine::predicate::{PredicateDefinition, PredicateExpr};
use crate::engine::question::{ConceptId, RevisionKey};

/// The single editable draft of a program
#[derive(Debug, Clone, PartialEq)]
pub struct DraftVersion {
    program: ConceptId,
    version: u32,
    blocks: Vec<Block>,
    eligibility_is_gating: bool,
}

impl DraftVersion {
    /// Start a draft numbered `version`, copying the blocks of `base` if given
    pub fn new(program: ConceptId, version: u32, base: Option<&ProgramVersion>) -> Self {
        Self {
            program,
            version,
            blocks: base.map(|b| b.blocks.clone()).unwrap_or_default(),
            eligibility_is_gating: base.is_some_and(|b| b.eligibility_is_gating),
        }
    }

    pub fn program(&self) -> &ConceptId {
        &self.program
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn block(&self, id: &ConceptId) -> Option<&Block> {
        self.blocks.iter().find(|b| &b.id == id)
    }

    pub fn eligibility_is_gating(&self) -> bool {
        self.eligibility_is_gating
    }

    /// Append a block. Block ids must be unique within a program.
    pub fn add_block(&mut self, block: Block) -> Result<(), VersionError> {
        if self.block(&block.id).is_some() {
            return Err(VersionError::DuplicateBlock {
                program: self.program.clone(),
                block: block.id,
            });
        }
        self.blocks.push(block);
        Ok(())
    }

    pub fn remove_block(&mut self, id: &ConceptId) -> Result<Block, VersionError> {
        let position = self.position(id)?;
        Ok(self.blocks.remove(position))
    }

    /// Move a block to `to`, clamped to the last position
    pub fn move_block(&mut self, id: &ConceptId, to: usize) -> Result<(), VersionError> {
        let from = self.position(id)?;
        let block = self.blocks.remove(from);
        let to = to.min(self.blocks.len());
        self.blocks.insert(to, block);
        Ok(())
    }

    pub fn set_visibility(
        &mut self,
        id: &ConceptId,
        visibility: Option<PredicateDefinition>,
    ) -> Result<(), VersionError> {
        self.block_mut(id)?.visibility = visibility;
        Ok(())
    }

    pub fn set_eligibility(
        &mut self,
        id: &ConceptId,
        eligibility: Option<PredicateExpr>,
    ) -> Result<(), VersionError> {
        self.block_mut(id)?.eligibility = eligibility;
        Ok(())
    }

    /// Pin a question on a block. Re-adding a concept replaces its pin.
    pub fn add_question(&mut self, id: &ConceptId, pin: RevisionKey) -> Result<(), VersionError> {
        let block = self.block_mut(id)?;
        match block.questions.iter_mut().find(|p| p.concept == pin.concept) {
            Some(existing) => *existing = pin,
            None => block.questions.push(pin),
        }
        Ok(())
    }

    pub fn remove_question(&mut self, id: &ConceptId, question: &ConceptId) -> Result<(), VersionError> {
        let block = self.block_mut(id)?;
        let before = block.questions.len();
        block.questions.retain(|p| &p.concept != question);
        if block.questions.len() == before {
            return Err(VersionError::UnknownQuestion(question.clone()));
        }
        Ok(())
    }

    pub fn set_eligibility_gating(&mut self, gating: bool) {
        self.eligibility_is_gating = gating;
    }

    /// Every pin in block order, mutable (used when refreshing pins)
    pub(crate) fn pins_mut(&mut self) -> impl Iterator<Item = &mut RevisionKey> {
        self.blocks.iter_mut().flat_map(|b| b.questions.iter_mut())
    }

    /// Materialize an immutable snapshot of the draft
    pub fn snapshot(&self, status: VersionStatus, published_at: Option<DateTime<Utc>>) -> ProgramVersion {
        ProgramVersion {
            program: self.program.clone(),
            version: self.version,
            status,
            blocks: self.blocks.clone(),
            eligibility_is_gating: self.eligibility_is_gating,
            published_at,
        }
    }

    fn position(&self, id: &ConceptId) -> Result<usize, VersionError> {
        self.blocks
            .iter()
            .position(|b| &b.id == id)
            .ok_or_else(|| self.block_not_found(id))
    }

    fn block_mut(&mut self, id: &ConceptId) -> Result<&mut Block, VersionError> {
        let position = self.position(id)?;
        Ok(&mut self.blocks[position])
    }

    fn block_not_found(&self, id: &ConceptId) -> VersionError {
        VersionError::BlockNotFound {
            program: self.program.clone(),
            block: id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::predicate::parse;

    fn draft() -> DraftVersion {
        let mut d = DraftVersion::new(ConceptId::from("snap"), 1, None);
        d.add_block(Block::new("a", "A")).unwrap();
        d.add_block(Block::new("b", "B")).unwrap();
        d.add_block(Block::new("c", "C")).unwrap();
        d
    }

    fn order(d: &DraftVersion) -> Vec<&str> {
        d.blocks().iter().map(|b| b.id.as_str()).collect()
    }

    #[test]
    fn test_duplicate_block_rejected() {
        let mut d = draft();
        let err = d.add_block(Block::new("b", "again")).unwrap_err();
        assert!(matches!(err, VersionError::DuplicateBlock { .. }));
        assert_eq!(d.blocks().len(), 3);
    }

    #[test]
    fn test_move_and_remove() {
        let mut d = draft();
        d.move_block(&ConceptId::from("c"), 0).unwrap();
        assert_eq!(order(&d), vec!["c", "a", "b"]);

        d.move_block(&ConceptId::from("c"), 99).unwrap();
        assert_eq!(order(&d), vec!["a", "b", "c"]);

        let removed = d.remove_block(&ConceptId::from("b")).unwrap();
        assert_eq!(removed.name, "B");
        assert_eq!(order(&d), vec!["a", "c"]);

        assert!(d.remove_block(&ConceptId::from("b")).is_err());
    }

    #[test]
    fn test_question_pins() {
        let mut d = draft();
        let a = ConceptId::from("a");
        d.add_question(&a, RevisionKey::new("q1", 1)).unwrap();
        d.add_question(&a, RevisionKey::new("q1", 2)).unwrap();
        assert_eq!(d.block(&a).unwrap().questions, vec![RevisionKey::new("q1", 2)]);

        d.remove_question(&a, &ConceptId::from("q1")).unwrap();
        assert!(d.block(&a).unwrap().questions.is_empty());
        assert!(d.remove_question(&a, &ConceptId::from("q1")).is_err());
    }

    #[test]
    fn test_predicates_and_snapshot() {
        let mut d = draft();
        let b = ConceptId::from("b");
        d.set_visibility(&b, Some(PredicateDefinition::show_when(parse("q1.text == 'y'").unwrap())))
            .unwrap();
        d.set_eligibility(&b, Some(parse("q1.text == 'y'").unwrap())).unwrap();
        d.set_eligibility_gating(true);

        let snapshot = d.snapshot(VersionStatus::Draft, None);
        assert_eq!(snapshot.version, 1);
        assert!(snapshot.eligibility_is_gating);
        assert!(snapshot.block(&b).unwrap().visibility.is_some());

        let missing = ConceptId::from("zz");
        assert!(matches!(
            d.set_eligibility(&missing, None),
            Err(VersionError::BlockNotFound { .. })
        ));
    }

    #[test]
    fn test_new_draft_copies_base() {
        let base = draft().snapshot(VersionStatus::Active, None);
        let next = DraftVersion::new(ConceptId::from("snap"), 2, Some(&base));
        assert_eq!(next.version(), 2);
        assert_eq!(order(&next), vec!["a", "b", "c"]);
    }
}
