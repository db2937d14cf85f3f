// SPDX-License-Identifier: MIT

//! Applications: answers pinned to a program version, reconciled forward
//! when the program is republished

mod reconcile;
mod service;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::answers::AnswerStore;
use crate::engine::question::ConceptId;
use crate::intake::program::VersionKey;

pub use reconcile::{
    eligibility_status, reconcile, visible_blocks, EligibilityStatus, EligibilitySummary,
    FailingRequirement, FastForwardReport, ReconciledView, Reconciliation,
};
pub use service::{ApplicantService, RawAnswer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationStatus {
    InProgress,
    /// Frozen: never fast-forwarded or edited again
    Submitted,
}

/// One applicant's application to one program
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Application {
    pub id: Uuid,
    pub program: ConceptId,
    /// Program version the answers were last reconciled against
    pub pinned: u32,
    pub status: ApplicationStatus,
    #[serde(default)]
    pub answers: AnswerStore,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
}

impl Application {
    pub fn new(program: impl Into<ConceptId>, pinned: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            program: program.into(),
            pinned,
            status: ApplicationStatus::InProgress,
            answers: AnswerStore::empty(),
            created_at: Utc::now(),
            submitted_at: None,
        }
    }

    pub fn is_submitted(&self) -> bool {
        self.status == ApplicationStatus::Submitted
    }

    pub fn version_key(&self) -> VersionKey {
        VersionKey::new(self.program.clone(), self.pinned)
    }

    /// Freeze the application
    pub fn submit(&mut self) {
        self.status = ApplicationStatus::Submitted;
        self.submitted_at = Some(Utc::now());
    }
}
