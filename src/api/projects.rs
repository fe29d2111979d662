use crate::api::{ApiError, AppState};
use crate::models::{DatabaseType, NewProject, ProjectSummary, ProjectView};
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectListItem {
    pub id: String,
    pub name: String,
    pub db_type: DatabaseType,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub success: bool,
    pub summary: Option<ProjectSummary>,
}

pub async fn create_project(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<(StatusCode, Json<ProjectView>), ApiError> {
    let request: NewProject = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("Invalid request body: {}", e)))?;

    let (cancel, _guard) = state.request_token();
    let project = state
        .projects
        .create(request, &cancel)
        .await
        .map_err(ApiError::introspection)?;
    Ok((StatusCode::CREATED, Json(project.view())))
}

pub async fn list_projects(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ProjectListItem>>, ApiError> {
    let projects = state.projects.list().await?;
    Ok(Json(
        projects
            .into_iter()
            .map(|p| ProjectListItem {
                id: p.id,
                name: p.name,
                db_type: p.db_type,
                created_at: p.created_at,
            })
            .collect(),
    ))
}

pub async fn get_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ProjectView>, ApiError> {
    let project = state.projects.get(&id).await?;
    Ok(Json(project.view()))
}

pub async fn refresh_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<RefreshResponse>, ApiError> {
    let (cancel, _guard) = state.request_token();
    let project = state
        .projects
        .refresh_summary(&id, &cancel)
        .await
        .map_err(ApiError::introspection)?;
    Ok(Json(RefreshResponse {
        success: true,
        summary: project.summary,
    }))
}
