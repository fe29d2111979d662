//! Project persistence and lifecycle.
//!
//! A project is created by introspecting its database, encrypting the
//! connection string and storing both. The plaintext URL only exists on the
//! stack of the request that needs it.

use crate::crypto::SecretBox;
use crate::db::{ConnectionStrategy, Introspector};
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseTarget, NewProject, Project, ProjectSummary};
use chrono::Utc;
use std::collections::HashMap;
use std::future::Future;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Storage for projects.
pub trait ProjectStore: Send + Sync {
    fn get(&self, id: &str) -> impl Future<Output = DbResult<Option<Project>>> + Send;

    fn insert(&self, project: Project) -> impl Future<Output = DbResult<()>> + Send;

    /// Replace the stored summary; returns the updated project.
    fn update_summary(
        &self,
        id: &str,
        summary: ProjectSummary,
    ) -> impl Future<Output = DbResult<Project>> + Send;

    fn list(&self) -> impl Future<Output = DbResult<Vec<Project>>> + Send;
}

/// Process-local project store.
#[derive(Debug, Default)]
pub struct InMemoryProjectStore {
    projects: RwLock<HashMap<String, Project>>,
}

impl InMemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProjectStore for InMemoryProjectStore {
    async fn get(&self, id: &str) -> DbResult<Option<Project>> {
        Ok(self.projects.read().await.get(id).cloned())
    }

    async fn insert(&self, project: Project) -> DbResult<()> {
        let mut projects = self.projects.write().await;
        if projects.contains_key(&project.id) {
            return Err(DbError::internal(format!(
                "Project {} already exists",
                project.id
            )));
        }
        projects.insert(project.id.clone(), project);
        Ok(())
    }

    async fn update_summary(&self, id: &str, summary: ProjectSummary) -> DbResult<Project> {
        let mut projects = self.projects.write().await;
        let project = projects
            .get_mut(id)
            .ok_or_else(|| DbError::project_not_found(id))?;
        project.summary = Some(summary);
        project.updated_at = Utc::now();
        Ok(project.clone())
    }

    async fn list(&self) -> DbResult<Vec<Project>> {
        Ok(self.projects.read().await.values().cloned().collect())
    }
}

/// Project lifecycle on top of a store.
pub struct ProjectService<S> {
    store: S,
    secrets: SecretBox,
    strategy: ConnectionStrategy,
}

impl<S: ProjectStore> ProjectService<S> {
    pub fn new(store: S, secrets: SecretBox, strategy: ConnectionStrategy) -> Self {
        Self {
            store,
            secrets,
            strategy,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Validate, introspect, encrypt and store a new project.
    ///
    /// Nothing is stored when introspection fails.
    pub async fn create(&self, request: NewProject, cancel: &CancellationToken) -> DbResult<Project> {
        let request = request.validate()?;
        let target = DatabaseTarget::new(request.db_url, request.db_type);

        let summary = Introspector::introspect(&self.strategy, &target, cancel)
            .await
            .inspect_err(|e| {
                warn!(db_type = %request.db_type, error = %e, "Introspection failed during project creation")
            })?;

        let now = Utc::now();
        let project = Project {
            id: uuid::Uuid::new_v4().to_string(),
            name: request.name,
            description: request.description,
            db_type: request.db_type,
            encrypted_db_url: self.secrets.encrypt(target.connection_string())?,
            summary: Some(ProjectSummary::new(summary, request.db_type)),
            created_at: now,
            updated_at: now,
        };
        self.store.insert(project.clone()).await?;

        info!(
            project_id = %project.id,
            db_type = %project.db_type,
            "Project created"
        );
        Ok(project)
    }

    pub async fn get(&self, id: &str) -> DbResult<Project> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| DbError::project_not_found(id))
    }

    /// All projects, newest first.
    pub async fn list(&self) -> DbResult<Vec<Project>> {
        let mut projects = self.store.list().await?;
        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(projects)
    }

    /// Decrypt a project's connection string into a request-scoped target.
    pub async fn target_for(&self, id: &str) -> DbResult<(Project, DatabaseTarget)> {
        let project = self.get(id).await?;
        let url = self.secrets.decrypt(&project.encrypted_db_url)?;
        let target = DatabaseTarget::new(url, project.db_type);
        Ok((project, target))
    }

    /// Re-introspect a project and store the new summary.
    pub async fn refresh_summary(&self, id: &str, cancel: &CancellationToken) -> DbResult<Project> {
        let (project, target) = self.target_for(id).await?;
        let summary = Introspector::introspect(&self.strategy, &target, cancel).await?;
        let project = self
            .store
            .update_summary(&project.id, ProjectSummary::new(summary, project.db_type))
            .await?;
        info!(project_id = %project.id, "Project summary refreshed");
        Ok(project)
    }
}
