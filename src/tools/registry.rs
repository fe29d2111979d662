//! Tool registry.
//!
//! Builds the closed tool set for one backend kind and dispatches calls to
//! the handlers. Each call is tracked as a [`ToolInvocation`]:
//!
//! ```text
//! input-streaming -> input-available -> output-available | output-error
//! ```
//!
//! Backend failures never escape a call: they come back as output shaped
//! `{error, <field>: null}` so the model can explain or retry. Only arguments
//! that do not match the tool's input shape end in `output-error`. Signal
//! tools stop at `input-available` and are completed by the client.

use crate::db::QueryExecutor;
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseTarget, DatabaseType, PaginationConfig};
use crate::tools::document::{
    DocumentToolHandler, FindDocumentsInput, GetDocumentCountInput, MongoAggregationInput,
};
use crate::tools::schema::{GetSchemaInput, SchemaToolHandler};
use crate::tools::signal::{
    AskForConfirmationInput, ConfirmationOutcome, ConfirmationReply, GenerateExcelInput,
};
use crate::tools::sql::{ExecuteQueryInput, GetRowCountInput, SqlAggregationInput, SqlToolHandler};
use crate::tools::{ResultGovernor, ToolContext};
use schemars::{JsonSchema, schema_for};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::str::FromStr;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub type JsonObject = Map<String, JsonValue>;

/// Every tool the registry knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ToolName {
    GetSchema,
    AskForConfirmation,
    GenerateExcel,
    GetRowCount,
    ExecuteQuery,
    ExecuteAggregation,
    GetDocumentCount,
    FindDocuments,
}

const SQL_TOOLS: &[ToolName] = &[
    ToolName::GetSchema,
    ToolName::AskForConfirmation,
    ToolName::GenerateExcel,
    ToolName::GetRowCount,
    ToolName::ExecuteQuery,
    ToolName::ExecuteAggregation,
];

const DOCUMENT_TOOLS: &[ToolName] = &[
    ToolName::GetSchema,
    ToolName::AskForConfirmation,
    ToolName::GenerateExcel,
    ToolName::GetDocumentCount,
    ToolName::FindDocuments,
    ToolName::ExecuteAggregation,
];

impl ToolName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GetSchema => "getSchema",
            Self::AskForConfirmation => "askForConfirmation",
            Self::GenerateExcel => "generateExcel",
            Self::GetRowCount => "getRowCount",
            Self::ExecuteQuery => "executeQuery",
            Self::ExecuteAggregation => "executeAggregation",
            Self::GetDocumentCount => "getDocumentCount",
            Self::FindDocuments => "findDocuments",
        }
    }

    /// The tool set offered for a backend kind.
    pub fn for_kind(kind: DatabaseType) -> &'static [ToolName] {
        match kind {
            DatabaseType::PostgreSQL | DatabaseType::MySQL => SQL_TOOLS,
            DatabaseType::MongoDB => DOCUMENT_TOOLS,
        }
    }

    /// False for signal tools, which have no server-side execution.
    pub fn is_executable(&self) -> bool {
        !matches!(self, Self::AskForConfirmation | Self::GenerateExcel)
    }

    /// Key set to null next to `error` when the call fails.
    fn error_field(&self) -> Option<&'static str> {
        match self {
            Self::GetSchema => None,
            Self::GetRowCount | Self::GetDocumentCount => Some("count"),
            _ => Some("results"),
        }
    }

    fn fallback_error(&self) -> &'static str {
        match self {
            Self::GetSchema => "Failed to retrieve schema",
            Self::GetRowCount | Self::GetDocumentCount => "Count query failed",
            Self::ExecuteAggregation => "Aggregation failed",
            _ => "Query execution failed",
        }
    }
}

impl FromStr for ToolName {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "getSchema" => Ok(Self::GetSchema),
            "askForConfirmation" => Ok(Self::AskForConfirmation),
            "generateExcel" => Ok(Self::GenerateExcel),
            "getRowCount" => Ok(Self::GetRowCount),
            "executeQuery" => Ok(Self::ExecuteQuery),
            "executeAggregation" => Ok(Self::ExecuteAggregation),
            "getDocumentCount" => Ok(Self::GetDocumentCount),
            "findDocuments" => Ok(Self::FindDocuments),
            other => Err(DbError::invalid_input(format!("Unknown tool: {}", other))),
        }
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tool as handed to the model: name, description and input shape.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: String,
    pub input_schema: JsonObject,
    pub executable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InvocationState {
    InputStreaming,
    InputAvailable,
    OutputAvailable,
    OutputError,
}

/// One tool call and where it is in its lifecycle.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocation {
    pub tool_call_id: String,
    pub tool_name: ToolName,
    pub state: InvocationState,
    pub input: JsonValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_text: Option<String>,
}

impl ToolInvocation {
    pub fn new(tool_name: ToolName) -> Self {
        Self {
            tool_call_id: uuid::Uuid::new_v4().to_string(),
            tool_name,
            state: InvocationState::InputStreaming,
            input: JsonValue::Null,
            output: None,
            error_text: None,
        }
    }

    fn transition(&mut self, from: InvocationState, to: InvocationState) -> DbResult<()> {
        if self.state != from {
            return Err(DbError::internal(format!(
                "Tool call {} cannot move from {:?} to {:?}",
                self.tool_call_id, self.state, to
            )));
        }
        self.state = to;
        Ok(())
    }

    /// The model finished streaming its arguments.
    pub fn receive_input(&mut self, input: JsonValue) -> DbResult<()> {
        self.transition(InvocationState::InputStreaming, InvocationState::InputAvailable)?;
        self.input = input;
        Ok(())
    }

    pub fn complete(&mut self, output: JsonValue) -> DbResult<()> {
        self.transition(InvocationState::InputAvailable, InvocationState::OutputAvailable)?;
        self.output = Some(output);
        Ok(())
    }

    pub fn fail(&mut self, error_text: impl Into<String>) -> DbResult<()> {
        self.transition(InvocationState::InputAvailable, InvocationState::OutputError)?;
        self.error_text = Some(error_text.into());
        Ok(())
    }

    /// Record the human's answer to `askForConfirmation`.
    pub fn resolve_confirmation(&mut self, confirmed: bool) -> DbResult<()> {
        if self.tool_name != ToolName::AskForConfirmation {
            return Err(DbError::invalid_input(format!(
                "{} does not take a confirmation",
                self.tool_name
            )));
        }
        let outcome = serde_json::to_value(ConfirmationOutcome { confirmed })
            .map_err(|e| DbError::internal(e.to_string()))?;
        self.complete(outcome)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            InvocationState::OutputAvailable | InvocationState::OutputError
        )
    }

    /// What a caller gets back: the output, the pending invocation for signal
    /// tools, or an error for rejected arguments.
    pub fn into_response(self) -> DbResult<JsonValue> {
        match self.state {
            InvocationState::OutputAvailable => Ok(self.output.unwrap_or(JsonValue::Null)),
            InvocationState::OutputError => Err(DbError::invalid_input(
                self.error_text.unwrap_or_default(),
            )),
            InvocationState::InputStreaming | InvocationState::InputAvailable => {
                serde_json::to_value(&self).map_err(|e| DbError::internal(e.to_string()))
            }
        }
    }
}

/// The tool set for one target.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    ctx: ToolContext,
}

impl ToolRegistry {
    pub fn new(
        target: DatabaseTarget,
        executor: QueryExecutor,
        pagination: PaginationConfig,
        strict_sql: bool,
    ) -> Self {
        Self {
            ctx: ToolContext {
                executor,
                target,
                governor: ResultGovernor::new(pagination),
                strict_sql,
            },
        }
    }

    pub fn context(&self) -> &ToolContext {
        &self.ctx
    }

    pub fn kind(&self) -> DatabaseType {
        self.ctx.target.kind()
    }

    pub fn pagination(&self) -> &PaginationConfig {
        self.ctx.governor.config()
    }

    pub fn tools(&self) -> &'static [ToolName] {
        ToolName::for_kind(self.kind())
    }

    /// Resolve a tool name offered for this backend.
    pub fn resolve(&self, name: &str) -> DbResult<ToolName> {
        let tool: ToolName = name.parse()?;
        if !self.tools().contains(&tool) {
            return Err(DbError::invalid_input(format!(
                "Tool {} is not available for {} databases",
                tool,
                self.kind()
            )));
        }
        Ok(tool)
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let kind = self.kind();
        let config = self.pagination();
        self.tools()
            .iter()
            .map(|&tool| ToolDefinition {
                name: tool.as_str(),
                description: description(tool, kind, config),
                input_schema: input_schema(tool, kind, config),
                executable: tool.is_executable(),
            })
            .collect()
    }

    /// Run one tool call through its lifecycle.
    ///
    /// Unknown tools are an `Err`; everything else is reported through the
    /// returned invocation.
    pub async fn invoke(
        &self,
        name: &str,
        arguments: JsonValue,
        cancel: &CancellationToken,
    ) -> DbResult<ToolInvocation> {
        let tool = self.resolve(name)?;
        let arguments = match arguments {
            JsonValue::Null => JsonValue::Object(JsonObject::new()),
            other => other,
        };

        let mut invocation = ToolInvocation::new(tool);
        invocation.receive_input(arguments.clone())?;
        debug!(tool = %tool, tool_call_id = %invocation.tool_call_id, "Tool input available");

        if !tool.is_executable() {
            match check_signal_input(tool, arguments) {
                Ok(()) => return Ok(invocation),
                Err(message) => {
                    invocation.fail(message)?;
                    return Ok(invocation);
                }
            }
        }

        let start = Instant::now();
        match self.execute(tool, arguments, cancel).await {
            Ok(output) => {
                info!(
                    tool = %tool,
                    tool_call_id = %invocation.tool_call_id,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Tool call completed"
                );
                invocation.complete(output)?;
            }
            Err(message) => {
                warn!(tool = %tool, error = %message, "Tool arguments rejected");
                invocation.fail(message)?;
            }
        }
        Ok(invocation)
    }

    /// Complete an `askForConfirmation` call with the human's answer.
    ///
    /// The pending call is rebuilt from the reply, its input re-checked, and
    /// the finished invocation returned for the client's history.
    pub fn confirm(&self, reply: ConfirmationReply) -> DbResult<ToolInvocation> {
        let tool = self.resolve(ToolName::AskForConfirmation.as_str())?;
        check_signal_input(tool, reply.input.clone())
            .map_err(|message| DbError::invalid_input(message))?;

        let mut invocation = ToolInvocation::new(tool);
        if let Some(id) = reply.tool_call_id.filter(|id| !id.trim().is_empty()) {
            invocation.tool_call_id = id;
        }
        invocation.receive_input(reply.input)?;
        invocation.resolve_confirmation(reply.confirmed)?;
        info!(
            tool_call_id = %invocation.tool_call_id,
            confirmed = reply.confirmed,
            "Confirmation resolved"
        );
        Ok(invocation)
    }

    /// Invoke and unwrap into the caller-facing JSON.
    pub async fn dispatch(
        &self,
        name: &str,
        arguments: JsonValue,
        cancel: &CancellationToken,
    ) -> DbResult<JsonValue> {
        self.invoke(name, arguments, cancel).await?.into_response()
    }

    /// `Err` only for arguments that do not parse; backend failures are folded.
    async fn execute(
        &self,
        tool: ToolName,
        arguments: JsonValue,
        cancel: &CancellationToken,
    ) -> Result<JsonValue, String> {
        let ctx = &self.ctx;
        let relational = self.kind().is_relational();

        let result = match (tool, relational) {
            (ToolName::GetSchema, _) => {
                let input: GetSchemaInput = parse_input(tool, arguments)?;
                to_json(SchemaToolHandler::new(ctx).get_schema(input, cancel).await)
            }
            (ToolName::GetRowCount, true) => {
                let input: GetRowCountInput = parse_input(tool, arguments)?;
                to_json(SqlToolHandler::new(ctx).get_row_count(input, cancel).await)
            }
            (ToolName::ExecuteQuery, true) => {
                let input: ExecuteQueryInput = parse_input(tool, arguments)?;
                to_json(SqlToolHandler::new(ctx).execute_query(input, cancel).await)
            }
            (ToolName::ExecuteAggregation, true) => {
                let input: SqlAggregationInput = parse_input(tool, arguments)?;
                to_json(SqlToolHandler::new(ctx).execute_aggregation(input, cancel).await)
            }
            (ToolName::GetDocumentCount, false) => {
                let input: GetDocumentCountInput = parse_input(tool, arguments)?;
                to_json(DocumentToolHandler::new(ctx).get_document_count(input, cancel).await)
            }
            (ToolName::FindDocuments, false) => {
                let input: FindDocumentsInput = parse_input(tool, arguments)?;
                to_json(DocumentToolHandler::new(ctx).find_documents(input, cancel).await)
            }
            (ToolName::ExecuteAggregation, false) => {
                let input: MongoAggregationInput = parse_input(tool, arguments)?;
                to_json(DocumentToolHandler::new(ctx).execute_aggregation(input, cancel).await)
            }
            _ => Err(DbError::invalid_input(format!(
                "Tool {} is not available for {} databases",
                tool,
                self.kind()
            ))),
        };

        Ok(fold_failure(tool, result))
    }
}

fn parse_input<T: DeserializeOwned>(tool: ToolName, arguments: JsonValue) -> Result<T, String> {
    serde_json::from_value(arguments).map_err(|e| format!("Invalid arguments for {}: {}", tool, e))
}

fn check_signal_input(tool: ToolName, arguments: JsonValue) -> Result<(), String> {
    match tool {
        ToolName::AskForConfirmation => parse_input::<AskForConfirmationInput>(tool, arguments).map(|_| ()),
        ToolName::GenerateExcel => parse_input::<GenerateExcelInput>(tool, arguments).map(|_| ()),
        _ => Ok(()),
    }
}

fn to_json<T: Serialize>(result: DbResult<T>) -> DbResult<JsonValue> {
    result.and_then(|value| {
        serde_json::to_value(value)
            .map_err(|e| DbError::internal(format!("Failed to serialize tool output: {}", e)))
    })
}

/// Turn a failure into `{error, <field>: null}`.
pub fn fold_failure(tool: ToolName, result: DbResult<JsonValue>) -> JsonValue {
    match result {
        Ok(value) => value,
        Err(err) => {
            let message = match err.to_string() {
                m if m.trim().is_empty() => tool.fallback_error().to_string(),
                m => m,
            };
            warn!(tool = %tool, error = %message, "Tool call failed");

            let mut body = JsonObject::new();
            body.insert("error".to_string(), JsonValue::String(message));
            if let Some(field) = tool.error_field() {
                body.insert(field.to_string(), JsonValue::Null);
            }
            JsonValue::Object(body)
        }
    }
}

fn schema_object<T: JsonSchema>() -> JsonObject {
    match serde_json::to_value(schema_for!(T)) {
        Ok(JsonValue::Object(map)) => map,
        _ => JsonObject::new(),
    }
}

/// Set `minimum`/`maximum` on an integer property of a generated schema.
fn bound_integer(schema: &mut JsonObject, field: &str, min: u64, max: u64) {
    let property = schema
        .get_mut("properties")
        .and_then(|properties| properties.get_mut(field))
        .and_then(JsonValue::as_object_mut);
    if let Some(property) = property {
        property.insert("minimum".to_string(), min.into());
        property.insert("maximum".to_string(), max.into());
    }
}

fn input_schema(tool: ToolName, kind: DatabaseType, config: &PaginationConfig) -> JsonObject {
    match (tool, kind.is_relational()) {
        (ToolName::GetSchema, _) => schema_object::<GetSchemaInput>(),
        (ToolName::AskForConfirmation, _) => schema_object::<AskForConfirmationInput>(),
        (ToolName::GenerateExcel, _) => schema_object::<GenerateExcelInput>(),
        (ToolName::GetRowCount, _) => schema_object::<GetRowCountInput>(),
        (ToolName::ExecuteQuery, _) => schema_object::<ExecuteQueryInput>(),
        (ToolName::ExecuteAggregation, true) => schema_object::<SqlAggregationInput>(),
        (ToolName::ExecuteAggregation, false) => schema_object::<MongoAggregationInput>(),
        (ToolName::GetDocumentCount, _) => schema_object::<GetDocumentCountInput>(),
        (ToolName::FindDocuments, _) => {
            let mut schema = schema_object::<FindDocumentsInput>();
            let page = u64::from(config.max_rows_per_page.max(1));
            bound_integer(&mut schema, "limit", 1, page);
            schema
        }
    }
}

fn description(tool: ToolName, kind: DatabaseType, config: &PaginationConfig) -> String {
    let page = config.max_rows_per_page;
    match (tool, kind.is_relational()) {
        (ToolName::GetSchema, _) => "Get database schema information. Use this to understand table/collection structure before writing queries.".to_string(),
        (ToolName::AskForConfirmation, _) => format!(
            "Ask user for confirmation before executing queries that will return many rows or might be slow. Use when estimated row count > {}.",
            config.max_rows_before_export
        ),
        (ToolName::GenerateExcel, _) => format!(
            "Generate Excel file from query results. Use this when:\n- Row count > {}\n- User explicitly asks to download/export data\n- Results are too large to display in chat",
            config.max_rows_before_export
        ),
        (ToolName::GetRowCount, _) => "Get the count of rows that would be returned by a query. Use this BEFORE executing any query to check dataset size.".to_string(),
        (ToolName::ExecuteQuery, _) => format!(
            "Execute a SQL SELECT query with pagination. Always check row count first using getRowCount.\nMaximum {} rows per query. Use LIMIT and OFFSET for pagination.",
            page
        ),
        (ToolName::ExecuteAggregation, true) => "Execute aggregation queries (COUNT, AVG, SUM, MIN, MAX, GROUP BY) for statistical summaries. Use this instead of fetching all rows.".to_string(),
        (ToolName::ExecuteAggregation, false) => "Execute MongoDB aggregation pipeline for statistical summaries, grouping, and complex queries. Use this instead of fetching all documents.".to_string(),
        (ToolName::GetDocumentCount, _) => "Get the count of documents that would be returned by a query. Use this BEFORE executing any query to check dataset size.".to_string(),
        (ToolName::FindDocuments, _) => format!(
            "Find documents in a MongoDB collection with pagination. Always check document count first using getDocumentCount.\nMaximum {} documents per query.",
            page
        ),
    }
}
