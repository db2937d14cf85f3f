// SPDX-License-Identifier: MIT

//! Question catalog
//!
//! This module provides:
//! - `ConceptId` / `RevisionKey` - two-level question identity
//! - `QuestionRevision` - one immutable revision of a question
//! - `QuestionCatalog` - revision history with draft/active tracking
//! - `ProgramQuestions` - the revisions pinned by one program version

mod catalog;
mod types;

pub use catalog::{ProgramQuestions, QuestionCatalog, RevisionStatus};
pub use types::{
    ConceptId, QuestionRevision, QuestionType, Revision, RevisionKey, Scalar, ScalarType,
};
