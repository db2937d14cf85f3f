// SPDX-License-Identifier: MIT

//! Persistence boundary and its in-memory implementation

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::engine::answers::AnswerStore;
use crate::engine::error::{ApplicationError, IntakeError};
use crate::engine::question::{ConceptId, ProgramQuestions, QuestionRevision, RevisionKey};
use crate::intake::application::Application;
use crate::intake::program::{ProgramVersion, VersionGraph, VersionSelector};

/// Everything the applicant flow reads and writes
#[async_trait]
pub trait Persistence: Send + Sync {
    async fn load_program_version(
        &self,
        program: &ConceptId,
        selector: VersionSelector,
    ) -> Result<Arc<ProgramVersion>, IntakeError>;

    async fn load_question_revision(&self, key: &RevisionKey) -> Result<QuestionRevision, IntakeError>;

    /// The question revisions a version pins
    async fn load_questions_for(&self, version: &ProgramVersion) -> Result<ProgramQuestions, IntakeError>;

    async fn load_answers(&self, application: Uuid) -> Result<AnswerStore, IntakeError>;

    async fn save_answers(&self, application: Uuid, answers: AnswerStore) -> Result<(), IntakeError>;

    /// Publish the program's draft and make it the active version
    async fn swap_active_version(&self, program: &ConceptId) -> Result<Arc<ProgramVersion>, IntakeError>;

    async fn load_application(&self, id: Uuid) -> Result<Application, IntakeError>;

    /// Insert or replace an application. Submitted applications are frozen.
    async fn save_application(&self, application: &Application) -> Result<(), IntakeError>;
}

/// Process-local store backed by a [`VersionGraph`]
#[derive(Clone, Default)]
pub struct MemoryStore {
    graph: VersionGraph,
    applications: Arc<RwLock<HashMap<Uuid, Application>>>,
}

impl MemoryStore {
    pub fn new(graph: VersionGraph) -> Self {
        Self {
            graph,
            applications: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn graph(&self) -> &VersionGraph {
        &self.graph
    }

    pub async fn application_count(&self) -> usize {
        self.applications.read().await.len()
    }
}

#[async_trait]
impl Persistence for MemoryStore {
    async fn load_program_version(
        &self,
        program: &ConceptId,
        selector: VersionSelector,
    ) -> Result<Arc<ProgramVersion>, IntakeError> {
        self.graph.get_version(program, selector).await
    }

    async fn load_question_revision(&self, key: &RevisionKey) -> Result<QuestionRevision, IntakeError> {
        Ok(self.graph.question_revision(key).await?)
    }

    async fn load_questions_for(&self, version: &ProgramVersion) -> Result<ProgramQuestions, IntakeError> {
        Ok(self.graph.questions_for(version).await?)
    }

    async fn load_answers(&self, application: Uuid) -> Result<AnswerStore, IntakeError> {
        let applications = self.applications.read().await;
        applications
            .get(&application)
            .map(|app| app.answers.clone())
            .ok_or_else(|| IntakeError::not_found(application))
    }

    async fn save_answers(&self, application: Uuid, answers: AnswerStore) -> Result<(), IntakeError> {
        let mut applications = self.applications.write().await;
        let app = applications
            .get_mut(&application)
            .ok_or_else(|| IntakeError::not_found(application))?;
        if app.is_submitted() {
            return Err(ApplicationError::AlreadySubmitted(application).into());
        }
        app.answers = answers;
        Ok(())
    }

    async fn swap_active_version(&self, program: &ConceptId) -> Result<Arc<ProgramVersion>, IntakeError> {
        self.graph.publish(program).await
    }

    async fn load_application(&self, id: Uuid) -> Result<Application, IntakeError> {
        let applications = self.applications.read().await;
        applications
            .get(&id)
            .cloned()
            .ok_or_else(|| IntakeError::not_found(id))
    }

    async fn save_application(&self, application: &Application) -> Result<(), IntakeError> {
        let mut applications = self.applications.write().await;
        if applications.get(&application.id).is_some_and(Application::is_submitted) {
            log::warn!("Refusing to overwrite submitted application {}", application.id);
            return Err(ApplicationError::AlreadySubmitted(application.id).into());
        }
        applications.insert(application.id, application.clone());
        Ok(())
    }
}
