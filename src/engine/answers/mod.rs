// SPDX-License-Identifier: MIT

//! Answer storage for applications
//!
//! This module provides:
//! - `ScalarValue` - typed values stored under a scalar path
//! - `AnswerStore` - per-application (question, scalar) -> answer map

mod store;
mod value;

pub use store::{Answer, AnswerKey, AnswerStore};
pub use value::{ScalarValue, DATE_FORMAT};
