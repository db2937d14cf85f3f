// SPDX-License-Identifier: MIT

//! Program versioning, applications, and the surfaces around them

pub mod application;
pub mod config;
pub mod loader;
pub mod program;
pub mod server;
pub mod store;
