use crate::api::{ApiError, AppState};
use crate::tools::prompt::{summary_text, system_prompt};
use crate::tools::signal::ConfirmationReply;
use crate::tools::{ExportRequest, ExportResult, ToolDefinition, ToolInvocation, ToolRegistry};
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsResponse {
    pub system_prompt: String,
    pub tools: Vec<ToolDefinition>,
}

async fn registry_for(state: &AppState, id: &str) -> Result<(ToolRegistry, String), ApiError> {
    let (project, target) = state.projects.target_for(id).await?;
    let registry = ToolRegistry::new(
        target,
        state.executor.clone(),
        state.pagination,
        state.strict_sql,
    );
    Ok((registry, summary_text(project.summary.as_ref())))
}

pub async fn list_tools(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ToolsResponse>, ApiError> {
    let (registry, summary) = registry_for(&state, &id).await?;
    Ok(Json(ToolsResponse {
        system_prompt: system_prompt(&summary, registry.kind(), registry.pagination()),
        tools: registry.definitions(),
    }))
}

pub async fn call_tool(
    State(state): State<Arc<AppState>>,
    Path((id, name)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<JsonValue>, ApiError> {
    let arguments = if body.iter().all(u8::is_ascii_whitespace) {
        JsonValue::Null
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::bad_request(format!("Invalid tool arguments: {}", e)))?
    };

    let (registry, _) = registry_for(&state, &id).await?;
    let (cancel, _guard) = state.request_token();
    let output = registry.dispatch(&name, arguments, &cancel).await?;
    Ok(Json(output))
}

/// The client reports the human's answer to `askForConfirmation`.
pub async fn resolve_confirmation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<ToolInvocation>, ApiError> {
    let reply: ConfirmationReply = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("Invalid confirmation: {}", e)))?;
    let (registry, _) = registry_for(&state, &id).await?;
    Ok(Json(registry.confirm(reply)?))
}

pub async fn execute_export(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<ExportResult>, ApiError> {
    let request: ExportRequest = serde_json::from_slice(&body).unwrap_or_default();
    let Some((project_id, query)) = request.parts() else {
        return Err(ApiError::bad_request("Missing projectId or query"));
    };

    let (_, target) = state.projects.target_for(project_id).await?;
    let (cancel, _guard) = state.request_token();
    let result = state.export.export(&target, query, &cancel).await?;

    info!(project_id = %project_id, row_count = result.row_count, "Export served");
    Ok(Json(result))
}
