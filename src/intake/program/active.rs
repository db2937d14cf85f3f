// SPDX-License-Identifier: MIT

//! Atomically swapped pointer to a program's active version

use std::sync::Arc;
use tokio::sync::RwLock;

use super::types::ProgramVersion;

/// Shared cell holding the currently active version of one program.
///
/// Readers get a whole `Arc` snapshot; they never observe a partially
/// published version.
#[derive(Clone, Default)]
pub struct ActivePointer {
    current: Arc<RwLock<Option<Arc<ProgramVersion>>>>,
}

impl ActivePointer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn load(&self) -> Option<Arc<ProgramVersion>> {
        let current = self.current.read().await;
        current.clone()
    }

    /// Install a new active version, returning the previous one
    pub async fn swap(&self, next: Arc<ProgramVersion>) -> Option<Arc<ProgramVersion>> {
        let mut current = self.current.write().await;
        current.replace(next)
    }
}
