//! Tool implementations exposed to the model.
//!
//! This module contains the query-mediation layer:
//! - `sql_validator`: shallow SELECT/LIMIT gate, strict parser gate, export LIMIT capping
//! - `governor`: count verdicts, token-budget truncation, pagination metadata
//! - `registry`: per-backend tool set, definitions and dispatch
//! - `schema`, `sql`, `document`: tool inputs, outputs and handlers
//! - `signal`: client-handled tools with no server-side execution
//! - `export`: the large-limit export path
//! - `prompt`: per-backend system prompt

pub mod document;
pub mod export;
pub mod governor;
pub mod prompt;
pub mod registry;
pub mod schema;
pub mod signal;
pub mod sql;
pub mod sql_validator;

pub use export::{ExportRequest, ExportResult, ExportService};
pub use governor::{CountVerdict, GovernedRows, PageInfo, ResultGovernor};
pub use registry::{InvocationState, ToolDefinition, ToolInvocation, ToolName, ToolRegistry};

use crate::db::QueryExecutor;
use crate::models::DatabaseTarget;

/// Everything a tool call needs for one target.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub executor: QueryExecutor,
    pub target: DatabaseTarget,
    pub governor: ResultGovernor,
    /// Also require a single parsed SELECT statement
    pub strict_sql: bool,
}
