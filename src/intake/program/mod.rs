// SPDX-License-Identifier: MIT

//! Program versions: immutable published snapshots, one editable draft
//! per program, and the pointer to the active version

mod active;
mod draft;
mod graph;
mod types;

pub use active::ActivePointer;
pub use draft::DraftVersion;
pub use graph::VersionGraph;
pub use types::{Block, ProgramVersion, VersionKey, VersionSelector, VersionStatus};
