//! HTTP tests for the REST API, driven through the router with `oneshot`.
//!
//! Projects are seeded straight into the store so no database is needed;
//! the seeded URLs point at a closed port.

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use chrono::Utc;
use queryiq::api::{AppState, create_router};
use queryiq::config::Config;
use queryiq::crypto::SecretBox;
use queryiq::db::QueryExecutor;
use queryiq::models::{DatabaseType, DbSummary, PaginationConfig, Project, ProjectSummary};
use queryiq::store::ProjectStore;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

const SECRET: &str = "api-test-secret";

fn state() -> Arc<AppState> {
    Arc::new(AppState::new(
        SecretBox::new(SECRET).unwrap(),
        QueryExecutor::from_config(&Config {
            connect_timeout: 1,
            ..Config::default()
        }),
        PaginationConfig::default(),
        50_000,
        false,
    ))
}

async fn seed(state: &AppState, id: &str, db_type: DatabaseType, url: &str) {
    let now = Utc::now();
    let project = Project {
        id: id.to_string(),
        name: format!("Project {}", id),
        description: None,
        db_type,
        encrypted_db_url: SecretBox::new(SECRET).unwrap().encrypt(url).unwrap(),
        summary: Some(ProjectSummary::new(DbSummary::Tables(vec![]), db_type)),
        created_at: now,
        updated_at: now,
    };
    state.projects.store().insert(project).await.unwrap();
}

async fn app() -> Router {
    let state = state();
    seed(&state, "pg", DatabaseType::PostgreSQL, "postgres://u:p@127.0.0.1:1/app").await;
    seed(&state, "mongo", DatabaseType::MongoDB, "mongodb://127.0.0.1:1/app").await;
    create_router(state)
}

async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    let request = match body {
        Some(body) => request.body(Body::from(body.to_string())).unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn test_health() {
    let (status, body) = send(app().await, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_get_project_hides_secret() {
    let (status, body) = send(app().await, "GET", "/api/projects/pg", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "pg");
    assert_eq!(body["dbType"], "postgresql");
    assert!(body.get("encryptedDbUrl").is_none());
    assert!(!body.to_string().contains("127.0.0.1"));
}

#[tokio::test]
async fn test_unknown_project_is_404() {
    let (status, body) = send(app().await, "GET", "/api/projects/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Project not found");
}

#[tokio::test]
async fn test_list_projects() {
    let (status, body) = send(app().await, "GET", "/api/projects", None).await;
    assert_eq!(status, StatusCode::OK);
    let projects = body.as_array().unwrap();
    assert_eq!(projects.len(), 2);
    for project in projects {
        assert!(project["createdAt"].is_string());
        assert!(project.get("dbSummary").is_none());
    }
}

#[tokio::test]
async fn test_create_project_validation() {
    let (status, body) = send(
        app().await,
        "POST",
        "/api/projects",
        Some(json!({"name": "  ", "dbUrl": "postgres://localhost/x", "dbType": "postgres"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Project name is required"));

    let (status, body) = send(
        app().await,
        "POST",
        "/api/projects",
        Some(json!({"name": "x", "dbUrl": "oracle://localhost/x", "dbType": "oracle"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Supported types"));
}

#[tokio::test]
async fn test_create_project_unreachable_database() {
    let (status, body) = send(
        app().await,
        "POST",
        "/api/projects",
        Some(json!({"name": "x", "dbUrl": "postgres://u:p@127.0.0.1:1/x", "dbType": "postgres"})),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body["error"],
        "Failed to connect to database. Check your connection string and credentials."
    );
}

#[tokio::test]
async fn test_tools_listing_per_kind() {
    let (status, body) = send(app().await, "GET", "/api/projects/pg/tools", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["systemPrompt"].as_str().unwrap().contains("SQL-SPECIFIC RULES"));
    let names: Vec<&str> = body["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"getRowCount"));
    assert!(!names.contains(&"findDocuments"));

    let (_, body) = send(app().await, "GET", "/api/projects/mongo/tools", None).await;
    assert!(body["systemPrompt"].as_str().unwrap().contains("MONGODB-SPECIFIC RULES"));
    assert!(body["tools"][0]["inputSchema"].is_object());
}

#[tokio::test]
async fn test_tool_call_validation_error_is_200() {
    let (status, body) = send(
        app().await,
        "POST",
        "/api/projects/pg/tools/executeQuery",
        Some(json!({"query": "DELETE FROM users", "explanation": "cleanup"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"error": "Only SELECT queries are allowed", "results": null}));
}

#[tokio::test]
async fn test_tool_call_connection_failure_is_folded() {
    let (status, body) = send(
        app().await,
        "POST",
        "/api/projects/pg/tools/getRowCount",
        Some(json!({"countQuery": "SELECT COUNT(*) FROM users", "explanation": "size"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["error"].as_str().unwrap().contains("Failed to connect"));
    assert_eq!(body["count"], Value::Null);
}

#[tokio::test]
async fn test_tool_call_rejections() {
    let (status, _) = send(
        app().await,
        "POST",
        "/api/projects/pg/tools/findDocuments",
        Some(json!({"collection": "users", "explanation": "x"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        app().await,
        "POST",
        "/api/projects/pg/tools/executeQuery",
        Some(json!({"explanation": "missing query"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Invalid arguments"));

    let (status, _) = send(
        app().await,
        "POST",
        "/api/projects/nope/tools/getSchema",
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_signal_tool_left_for_client() {
    let (status, body) = send(
        app().await,
        "POST",
        "/api/projects/mongo/tools/generateExcel",
        Some(json!({
            "query": "db.orders.find()",
            "filename": "orders.xlsx",
            "message": "Exporting all orders"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "input-available");
    assert_eq!(body["toolName"], "generateExcel");
    assert_eq!(body["input"]["filename"], "orders.xlsx");
}

#[tokio::test]
async fn test_export_missing_fields() {
    let (status, body) = send(
        app().await,
        "POST",
        "/api/chat/execute-export",
        Some(json!({"projectId": "pg"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing projectId or query");

    let (status, _) = send(app().await, "POST", "/api/chat/execute-export", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_export_rejections() {
    let (status, body) = send(
        app().await,
        "POST",
        "/api/chat/execute-export",
        Some(json!({"projectId": "nope", "query": "SELECT 1"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Project not found");

    let (status, body) = send(
        app().await,
        "POST",
        "/api/chat/execute-export",
        Some(json!({"projectId": "pg", "query": "DROP TABLE users"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Only SELECT queries are allowed");

    let (status, _) = send(
        app().await,
        "POST",
        "/api/chat/execute-export",
        Some(json!({"projectId": "mongo", "query": "SELECT * FROM orders"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_export_connection_failure_is_500() {
    let (status, body) = send(
        app().await,
        "POST",
        "/api/chat/execute-export",
        Some(json!({"projectId": "pg", "query": "SELECT * FROM users"})),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_confirmation_resolved_by_client() {
    let input = json!({
        "message": "This returns 12,000 rows. Continue?",
        "queryPreview": "SELECT * FROM events",
        "estimatedRows": 12000
    });
    let (status, pending) = send(
        app().await,
        "POST",
        "/api/projects/pg/tools/askForConfirmation",
        Some(input.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pending["state"], "input-available");

    let (status, body) = send(
        app().await,
        "POST",
        "/api/projects/pg/tools/askForConfirmation/resolve",
        Some(json!({
            "toolCallId": pending["toolCallId"],
            "input": input,
            "confirmed": false
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "output-available");
    assert_eq!(body["toolCallId"], pending["toolCallId"]);
    assert_eq!(body["output"], json!({"confirmed": false}));
}

#[tokio::test]
async fn test_confirmation_resolve_rejections() {
    let (status, body) = send(
        app().await,
        "POST",
        "/api/projects/mongo/tools/askForConfirmation/resolve",
        Some(json!({"input": {"message": "Continue?"}, "confirmed": true})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, _) = send(
        app().await,
        "POST",
        "/api/projects/pg/tools/askForConfirmation/resolve",
        Some(json!({"confirmed": true})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        app().await,
        "POST",
        "/api/projects/nope/tools/askForConfirmation/resolve",
        Some(json!({"input": {}, "confirmed": true})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
