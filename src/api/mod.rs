//! REST API.
//!
//! Project management, per-project tool discovery and dispatch, and the
//! export endpoint. Every handler gets a request-scoped cancellation token
//! that fires when the handler future is dropped.

pub mod error;
mod projects;
mod tools;

pub use error::ApiError;

use crate::crypto::SecretBox;
use crate::db::QueryExecutor;
use crate::models::PaginationConfig;
use crate::store::{InMemoryProjectStore, ProjectService};
use crate::tools::ExportService;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::{CancellationToken, DropGuard};

/// Shared state for all handlers.
pub struct AppState {
    pub projects: ProjectService<InMemoryProjectStore>,
    pub executor: QueryExecutor,
    pub export: ExportService,
    pub pagination: PaginationConfig,
    pub strict_sql: bool,
    /// Parent of every request token; cancelled on shutdown
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        secrets: SecretBox,
        executor: QueryExecutor,
        pagination: PaginationConfig,
        export_ceiling: u32,
        strict_sql: bool,
    ) -> Self {
        let projects = ProjectService::new(
            InMemoryProjectStore::new(),
            secrets,
            executor.strategy().clone(),
        );
        Self {
            projects,
            export: ExportService::new(executor.clone(), export_ceiling).with_strict_sql(strict_sql),
            executor,
            pagination,
            strict_sql,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token for one request, cancelled when the returned guard drops.
    pub(crate) fn request_token(&self) -> (CancellationToken, DropGuard) {
        let token = self.shutdown.child_token();
        let guard = token.clone().drop_guard();
        (token, guard)
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/api/projects",
            get(projects::list_projects).post(projects::create_project),
        )
        .route("/api/projects/{id}", get(projects::get_project))
        .route("/api/projects/{id}/refresh", post(projects::refresh_project))
        .route("/api/projects/{id}/tools", get(tools::list_tools))
        .route("/api/projects/{id}/tools/{name}", post(tools::call_tool))
        .route(
            "/api/projects/{id}/tools/askForConfirmation/resolve",
            post(tools::resolve_confirmation),
        )
        .route("/api/chat/execute-export", post(tools::execute_export))
        .with_state(state)
}
