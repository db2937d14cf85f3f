// SPDX-License-Identifier: MIT

//! Program version graph: every version of every program plus the
//! question catalog their pins resolve against

use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::active::ActivePointer;
use super::draft::DraftVersion;
use super::types::{ProgramVersion, VersionSelector, VersionStatus};
use crate::engine::error::{ConfigurationError, IntakeError, VersionError};
use crate::engine::predicate::validate_program;
use crate::engine::question::{
    ConceptId, ProgramQuestions, QuestionCatalog, QuestionRevision, QuestionType, Revision,
    RevisionKey, RevisionStatus,
};

#[derive(Default)]
struct ProgramHistory {
    versions: BTreeMap<u32, Arc<ProgramVersion>>,
    draft: Option<DraftVersion>,
    active: ActivePointer,
}

impl ProgramHistory {
    fn next_version(&self) -> u32 {
        self.versions.keys().next_back().map_or(1, |v| v + 1)
    }
}

#[derive(Default)]
struct GraphState {
    catalog: QuestionCatalog,
    programs: HashMap<ConceptId, ProgramHistory>,
}

/// Shared handle to all program and question versions
#[derive(Clone, Default)]
pub struct VersionGraph {
    state: Arc<RwLock<GraphState>>,
}

impl VersionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or overwrite the draft revision of a question
    pub async fn create_question(
        &self,
        concept: impl Into<ConceptId>,
        question_type: QuestionType,
        text: impl Into<String>,
        options: Vec<String>,
    ) -> QuestionRevision {
        let mut state = self.state.write().await;
        state.catalog.create_revision(concept, question_type, text, options)
    }

    pub async fn publish_question(&self, concept: &ConceptId) -> Result<Option<Revision>, IntakeError> {
        let mut state = self.state.write().await;
        Ok(state.catalog.publish(concept)?)
    }

    pub async fn question_revision(&self, key: &RevisionKey) -> Result<QuestionRevision, ConfigurationError> {
        let state = self.state.read().await;
        state.catalog.resolve(key).cloned()
    }

    pub async fn latest_question(&self, concept: &ConceptId) -> Option<QuestionRevision> {
        let state = self.state.read().await;
        state.catalog.latest(concept).cloned()
    }

    /// Start the next version of a program from its active version.
    /// A program may have at most one draft.
    pub async fn create_draft(&self, program: impl Into<ConceptId>) -> Result<DraftVersion, IntakeError> {
        let program = program.into();
        let mut state = self.state.write().await;
        let history = state.programs.entry(program.clone()).or_default();

        if history.draft.is_some() {
            return Err(IntakeError::DraftConflict { program });
        }

        let base = history.active.load().await;
        let draft = DraftVersion::new(program.clone(), history.next_version(), base.as_deref());
        log::debug!(
            "Created draft v{} of program {} (based on {:?})",
            draft.version(),
            program,
            base.map(|b| b.version)
        );
        history.draft = Some(draft.clone());
        Ok(draft)
    }

    /// Apply an edit to the draft. A failed edit leaves the draft unchanged.
    pub async fn edit_draft<F, R>(&self, program: &ConceptId, edit: F) -> Result<R, IntakeError>
    where
        F: FnOnce(&mut DraftVersion) -> Result<R, VersionError>,
    {
        let mut state = self.state.write().await;
        let slot = Self::draft_slot(&mut state.programs, program)?;
        let mut working = slot.clone();
        let result = edit(&mut working)?;
        *slot = working;
        Ok(result)
    }

    pub async fn draft(&self, program: &ConceptId) -> Result<DraftVersion, IntakeError> {
        let mut state = self.state.write().await;
        Ok(Self::draft_slot(&mut state.programs, program)?.clone())
    }

    pub async fn discard_draft(&self, program: &ConceptId) -> Result<(), IntakeError> {
        let mut state = self.state.write().await;
        let history = state
            .programs
            .get_mut(program)
            .ok_or_else(|| VersionError::UnknownProgram(program.clone()))?;
        history
            .draft
            .take()
            .ok_or_else(|| VersionError::NoDraft(program.clone()))?;
        log::info!("Discarded draft of program {}", program);
        Ok(())
    }

    /// Re-point every pin of the draft at the latest revision of its
    /// question. Returns how many pins moved.
    pub async fn refresh_question_pins(&self, program: &ConceptId) -> Result<usize, IntakeError> {
        let mut state = self.state.write().await;
        let GraphState { catalog, programs } = &mut *state;
        let draft = Self::draft_slot(programs, program)?;

        let mut moved = 0;
        for pin in draft.pins_mut() {
            let latest = catalog
                .latest(&pin.concept)
                .ok_or_else(|| VersionError::UnknownQuestion(pin.concept.clone()))?;
            if latest.revision != pin.revision {
                log::debug!("Re-pinning {} to revision {}", pin, latest.revision);
                pin.revision = latest.revision;
                moved += 1;
            }
        }
        Ok(moved)
    }

    /// Publish the program's draft as its new active version.
    ///
    /// Runs entirely under the graph's write lock: pins and predicates are
    /// validated, draft question revisions the version pins are published,
    /// the previous active version is marked obsolete, and the active
    /// pointer is swapped last.
    pub async fn publish(&self, program: &ConceptId) -> Result<Arc<ProgramVersion>, IntakeError> {
        let mut state = self.state.write().await;
        let GraphState { catalog, programs } = &mut *state;
        let history = programs
            .get_mut(program)
            .ok_or_else(|| VersionError::UnknownProgram(program.clone()))?;
        let draft = history
            .draft
            .as_ref()
            .ok_or_else(|| VersionError::NoDraft(program.clone()))?;

        let snapshot = draft.snapshot(VersionStatus::Active, Some(Utc::now()));

        for pin in snapshot.pins() {
            catalog.resolve(pin)?;
            let is_current_draft = catalog.status(pin) == Some(RevisionStatus::Draft);
            if !catalog.is_published(pin) && !is_current_draft {
                return Err(ConfigurationError::UnpublishedRevision {
                    question: pin.concept.clone(),
                    revision: pin.revision,
                }
                .into());
            }
        }

        let questions = catalog.resolve_pins(program, snapshot.version, snapshot.pins())?;
        let validation = validate_program(&snapshot.block_predicates(), &questions);
        if !validation.is_valid() {
            for message in validation.messages() {
                log::error!("Cannot publish program {}: {}", program, message);
            }
            validation.into_result()?;
        }

        for pin in snapshot.pins() {
            if catalog.status(pin) == Some(RevisionStatus::Draft) {
                catalog.publish(&pin.concept)?;
            }
        }

        let snapshot = Arc::new(snapshot);
        history.versions.insert(snapshot.version, snapshot.clone());
        history.draft = None;

        if let Some(previous) = history.active.load().await {
            let mut obsolete = (*previous).clone();
            obsolete.status = VersionStatus::Obsolete;
            history.versions.insert(obsolete.version, Arc::new(obsolete));
        }
        history.active.swap(snapshot.clone()).await;

        log::info!(
            "Published program {} v{} ({} blocks)",
            program,
            snapshot.version,
            snapshot.blocks.len()
        );
        Ok(snapshot)
    }

    pub async fn get_version(
        &self,
        program: &ConceptId,
        selector: VersionSelector,
    ) -> Result<Arc<ProgramVersion>, IntakeError> {
        let state = self.state.read().await;
        let history = state
            .programs
            .get(program)
            .ok_or_else(|| VersionError::UnknownProgram(program.clone()))?;

        let version = match selector {
            VersionSelector::Draft => history
                .draft
                .as_ref()
                .map(|d| Arc::new(d.snapshot(VersionStatus::Draft, None)))
                .ok_or_else(|| VersionError::NoDraft(program.clone()))?,
            VersionSelector::Active => history
                .active
                .load()
                .await
                .ok_or_else(|| VersionError::NoActiveVersion(program.clone()))?,
            VersionSelector::Version(n) => history
                .versions
                .get(&n)
                .cloned()
                .ok_or_else(|| VersionError::UnknownVersion {
                    program: program.clone(),
                    version: n,
                })?,
        };
        Ok(version)
    }

    pub async fn active(&self, program: &ConceptId) -> Result<Arc<ProgramVersion>, IntakeError> {
        self.get_version(program, VersionSelector::Active).await
    }

    pub async fn active_pointer(&self, program: &ConceptId) -> Result<ActivePointer, IntakeError> {
        let state = self.state.read().await;
        state
            .programs
            .get(program)
            .map(|h| h.active.clone())
            .ok_or_else(|| VersionError::UnknownProgram(program.clone()).into())
    }

    /// Every published version, oldest first
    pub async fn history(&self, program: &ConceptId) -> Result<Vec<Arc<ProgramVersion>>, IntakeError> {
        let state = self.state.read().await;
        let history = state
            .programs
            .get(program)
            .ok_or_else(|| VersionError::UnknownProgram(program.clone()))?;
        Ok(history.versions.values().cloned().collect())
    }

    /// Resolve the question revisions a version pins
    pub async fn questions_for(&self, version: &ProgramVersion) -> Result<ProgramQuestions, ConfigurationError> {
        let state = self.state.read().await;
        state
            .catalog
            .resolve_pins(&version.program, version.version, version.pins())
    }

    fn draft_slot<'a>(
        programs: &'a mut HashMap<ConceptId, ProgramHistory>,
        program: &ConceptId,
    ) -> Result<&'a mut DraftVersion, VersionError> {
        programs
            .get_mut(program)
            .ok_or_else(|| VersionError::UnknownProgram(program.clone()))?
            .draft
            .as_mut()
            .ok_or_else(|| VersionError::NoDraft(program.clone()))
    }
}
