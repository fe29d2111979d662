//! Large-limit export path.
//!
//! Backs the client side of `generateExcel`: re-validates the query, caps its
//! LIMIT at the export ceiling and runs it with the export timeout.

use crate::db::QueryExecutor;
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseTarget, DatabaseType, Record};
use crate::tools::sql_validator;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Body of an export request. Both fields are checked by the caller.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub query: Option<String>,
}

impl ExportRequest {
    /// Both fields, when present and non-empty.
    pub fn parts(&self) -> Option<(&str, &str)> {
        let project_id = self.project_id.as_deref().filter(|s| !s.is_empty())?;
        let query = self.query.as_deref().filter(|s| !s.trim().is_empty())?;
        Some((project_id, query))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportResult {
    pub data: Vec<Record>,
    pub row_count: usize,
    /// True when the ceiling was hit and more rows may exist
    pub capped: bool,
}

#[derive(Debug, Clone)]
pub struct ExportService {
    executor: QueryExecutor,
    ceiling: u32,
    strict_sql: bool,
}

impl ExportService {
    pub fn new(executor: QueryExecutor, ceiling: u32) -> Self {
        Self {
            executor,
            ceiling,
            strict_sql: false,
        }
    }

    /// Also require a single parsed SELECT statement.
    pub fn with_strict_sql(mut self, strict_sql: bool) -> Self {
        self.strict_sql = strict_sql;
        self
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    /// Validate and rewrite a query for export.
    pub fn prepare(&self, sql: &str, kind: DatabaseType) -> DbResult<String> {
        sql_validator::validate_export_query(sql)?;
        if !kind.is_relational() {
            return Err(DbError::unsupported_operation("export"));
        }
        if self.strict_sql {
            sql_validator::validate_single_select(sql, kind)?;
        }
        Ok(sql_validator::cap_export_limit(sql, self.ceiling))
    }

    pub async fn export(
        &self,
        target: &DatabaseTarget,
        sql: &str,
        cancel: &CancellationToken,
    ) -> DbResult<ExportResult> {
        let sql = self.prepare(sql, target.kind())?;

        let start = Instant::now();
        let data = self
            .executor
            .execute_export(target, &sql, self.ceiling, cancel)
            .await?;
        let row_count = data.len();
        let capped = row_count == self.ceiling as usize;

        info!(
            db_type = %target.kind(),
            row_count = row_count,
            capped = capped,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Export executed"
        );

        Ok(ExportResult {
            data,
            row_count,
            capped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::DatabaseType;

    fn service() -> ExportService {
        ExportService::new(
            QueryExecutor::from_config(&Config::default()),
            sql_validator::EXPORT_ROW_CEILING,
        )
    }

    #[test]
    fn test_request_parts() {
        let request: ExportRequest =
            serde_json::from_str(r#"{"projectId": "p1", "query": "SELECT 1"}"#).unwrap();
        assert_eq!(request.parts(), Some(("p1", "SELECT 1")));

        let request: ExportRequest = serde_json::from_str(r#"{"projectId": "p1"}"#).unwrap();
        assert_eq!(request.parts(), None);

        let request: ExportRequest =
            serde_json::from_str(r#"{"projectId": "", "query": "SELECT 1"}"#).unwrap();
        assert_eq!(request.parts(), None);
    }

    #[test]
    fn test_prepare_caps_and_validates() {
        let service = service();
        let pg = DatabaseType::PostgreSQL;
        assert_eq!(
            service.prepare("SELECT * FROM t", pg).unwrap(),
            "SELECT * FROM t LIMIT 50000"
        );
        assert_eq!(
            service.prepare("SELECT * FROM t LIMIT 10", pg).unwrap(),
            "SELECT * FROM t LIMIT 10"
        );
        assert_eq!(
            service.prepare("SELECT * FROM t LIMIT ALL", pg).unwrap(),
            "SELECT * FROM t LIMIT 50000"
        );
        let err = service.prepare("DROP TABLE t", pg).unwrap_err();
        assert_eq!(err.to_string(), "Only SELECT queries are allowed");
    }

    #[test]
    fn test_strict_export_rejects_stacked_statements() {
        let sql = "SELECT * FROM t LIMIT 5; DROP TABLE t";
        assert!(service().prepare(sql, DatabaseType::MySQL).is_ok());

        let strict = service().with_strict_sql(true);
        let err = strict.prepare(sql, DatabaseType::MySQL).unwrap_err();
        assert!(matches!(err, DbError::Validation { .. }));
        assert!(strict.prepare("SELECT * FROM t", DatabaseType::PostgreSQL).is_ok());
    }

    #[tokio::test]
    async fn test_export_rejects_document_targets() {
        let target = DatabaseTarget::new("mongodb://localhost:1/db", DatabaseType::MongoDB);
        let err = service()
            .export(&target, "SELECT * FROM t", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UnsupportedOperation { .. }));
    }
}
