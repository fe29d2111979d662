//! Project models.
//!
//! A project binds a name to one external database. The connection string is
//! only ever held encrypted here.

use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, ProjectSummary};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored project.
#[derive(Debug, Clone)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub db_type: DatabaseType,
    /// `SecretBox` ciphertext
    pub encrypted_db_url: String,
    pub summary: Option<ProjectSummary>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Public representation (no secret).
    pub fn view(&self) -> ProjectView {
        ProjectView {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            db_type: self.db_type,
            db_summary: self.summary.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectView {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub db_type: DatabaseType,
    pub db_summary: Option<ProjectSummary>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request body for creating a project.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProject {
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "db_url")]
    pub db_url: String,
    #[serde(default)]
    pub db_type: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// A `NewProject` after trimming and type normalization.
#[derive(Debug, Clone)]
pub struct ValidatedProject {
    pub name: String,
    pub db_url: String,
    pub db_type: DatabaseType,
    pub description: Option<String>,
}

impl NewProject {
    pub fn validate(self) -> DbResult<ValidatedProject> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(DbError::invalid_input("Project name is required"));
        }

        let db_url = self.db_url.trim();
        if db_url.is_empty() {
            return Err(DbError::invalid_input("Database URL is required"));
        }

        let db_type = DatabaseType::parse(&self.db_type)?;

        let description = self
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());

        Ok(ValidatedProject {
            name: name.to_string(),
            db_url: db_url.to_string(),
            db_type,
            description,
        })
    }
}
