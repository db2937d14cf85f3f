// SPDX-License-Identifier: MIT

//! Core engine: questions, answers, and predicate evaluation.
//! Nothing in here performs I/O.

pub mod answers;
pub mod error;
pub mod predicate;
pub mod question;

pub use error::{ApplicationError, ConfigurationError, IntakeError, ParseError, VersionError};
