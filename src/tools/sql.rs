//! Relational tools: `getRowCount`, `executeQuery`, `executeAggregation`.
//!
//! Every query passes the shallow validator first; with strict SQL enabled it
//! must also parse as a single SELECT statement.

use crate::db::document::coerce_count;
use crate::error::DbResult;
use crate::models::{QuerySpec, Record};
use crate::tools::governor::{CountVerdict, PageInfo};
use crate::tools::{ToolContext, sql_validator};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Input for the getRowCount tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GetRowCountInput {
    /// SQL COUNT query (e.g., SELECT COUNT(*) FROM table WHERE conditions)
    pub count_query: String,
    /// Why you're checking the count
    pub explanation: String,
}

/// Input for the executeQuery tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteQueryInput {
    /// The SQL SELECT query with LIMIT clause
    pub query: String,
    /// What this query does
    pub explanation: String,
    /// Page number (for offset pagination)
    #[serde(default)]
    pub page: Option<u32>,
    /// Estimated total rows from getRowCount
    #[serde(default)]
    pub estimated_row_count: Option<u64>,
}

/// Input for the relational executeAggregation tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SqlAggregationInput {
    /// SQL aggregation query
    pub query: String,
    /// What insights this provides
    pub explanation: String,
}

/// Output of both count tools.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountOutput {
    pub explanation: String,
    #[serde(flatten)]
    pub verdict: CountVerdict,
}

/// Output from the executeQuery tool.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteQueryOutput {
    pub explanation: String,
    pub results: Vec<Record>,
    pub row_count: usize,
    pub estimated_tokens: u64,
    pub truncated: bool,
    pub warning: Option<&'static str>,
    pub pagination: PageInfo,
}

/// Output from the relational executeAggregation tool.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SqlAggregationOutput {
    pub explanation: String,
    pub results: Vec<Record>,
    pub row_count: usize,
    #[serde(rename = "type")]
    pub kind: &'static str,
}

/// Pull the count out of the first row: `count`, then `COUNT(*)` in any case.
pub fn extract_count(rows: &[Record]) -> u64 {
    let Some(row) = rows.first() else {
        return 0;
    };
    let value = row.get("count").filter(|v| is_truthy(v)).or_else(|| {
        row.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("count(*)"))
            .map(|(_, v)| v)
    });
    value.map(coerce_count).unwrap_or(0)
}

fn is_truthy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => false,
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        JsonValue::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// Handler for the relational tools.
pub struct SqlToolHandler<'a> {
    ctx: &'a ToolContext,
}

impl<'a> SqlToolHandler<'a> {
    pub fn new(ctx: &'a ToolContext) -> Self {
        Self { ctx }
    }

    fn strict_check(&self, sql: &str) -> DbResult<()> {
        if self.ctx.strict_sql {
            sql_validator::validate_single_select(sql, self.ctx.target.kind())?;
        }
        Ok(())
    }

    async fn fetch(&self, sql: &str, cancel: &CancellationToken) -> DbResult<Vec<Record>> {
        let output = self
            .ctx
            .executor
            .execute_query(&self.ctx.target, &QuerySpec::sql(sql), cancel)
            .await?;
        Ok(output.into_rows())
    }

    /// Run a COUNT query and classify the result.
    pub async fn get_row_count(
        &self,
        input: GetRowCountInput,
        cancel: &CancellationToken,
    ) -> DbResult<CountOutput> {
        sql_validator::validate_count_query(&input.count_query)?;
        self.strict_check(&input.count_query)?;

        let rows = self.fetch(&input.count_query, cancel).await?;
        let count = extract_count(&rows);
        info!(db_type = %self.ctx.target.kind(), count = count, "Row count checked");

        Ok(CountOutput {
            explanation: input.explanation,
            verdict: self.ctx.governor.govern_count(count),
        })
    }

    /// Run one page of a SELECT and govern the result.
    pub async fn execute_query(
        &self,
        input: ExecuteQueryInput,
        cancel: &CancellationToken,
    ) -> DbResult<ExecuteQueryOutput> {
        let max_rows = self.ctx.governor.config().max_rows_per_page;
        sql_validator::validate_sql_query(&input.query, max_rows)?;
        self.strict_check(&input.query)?;

        let start = Instant::now();
        let rows = self.fetch(&input.query, cancel).await?;
        let governed = self.ctx.governor.govern_rows(
            rows,
            input.page.unwrap_or(1),
            input.estimated_row_count,
        );

        info!(
            db_type = %self.ctx.target.kind(),
            row_count = governed.row_count,
            estimated_tokens = governed.estimated_tokens,
            truncated = governed.truncated,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Query executed"
        );

        Ok(ExecuteQueryOutput {
            explanation: input.explanation,
            results: governed.results,
            row_count: governed.row_count,
            estimated_tokens: governed.estimated_tokens,
            truncated: governed.truncated,
            warning: governed.warning,
            pagination: governed.pagination,
        })
    }

    /// Run an aggregation query; results are returned whole.
    pub async fn execute_aggregation(
        &self,
        input: SqlAggregationInput,
        cancel: &CancellationToken,
    ) -> DbResult<SqlAggregationOutput> {
        sql_validator::validate_aggregation_query(&input.query)?;
        self.strict_check(&input.query)?;

        let results = self.fetch(&input.query, cancel).await?;
        info!(db_type = %self.ctx.target.kind(), row_count = results.len(), "Aggregation executed");

        Ok(SqlAggregationOutput {
            explanation: input.explanation,
            row_count: results.len(),
            results,
            kind: "aggregation",
        })
    }
}
