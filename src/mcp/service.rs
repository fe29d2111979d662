//! MCP service implementation using rmcp.
//!
//! The tool set depends on the backend kind and its descriptions carry the
//! configured thresholds, so `list_tools` and `call_tool` are implemented by
//! hand on top of the [`ToolRegistry`] instead of the router macros.

use crate::models::ProjectSummary;
use crate::tools::ToolRegistry;
use crate::tools::prompt::{summary_text, system_prompt};
use rmcp::{
    ErrorData as McpError, RoleServer, ServerHandler,
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult,
        PaginatedRequestParam, ProtocolVersion, ServerCapabilities, ServerInfo, Tool,
    },
    service::RequestContext,
};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct QueryIqService {
    registry: Arc<ToolRegistry>,
    /// Introspection result used in the instructions, if one was taken
    summary: Option<Arc<ProjectSummary>>,
}

impl QueryIqService {
    pub fn new(registry: Arc<ToolRegistry>, summary: Option<ProjectSummary>) -> Self {
        Self {
            registry,
            summary: summary.map(Arc::new),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Registry definitions as MCP tools.
    pub fn tools(&self) -> Vec<Tool> {
        self.registry
            .definitions()
            .into_iter()
            .map(|def| Tool::new(def.name, def.description, Arc::new(def.input_schema)))
            .collect()
    }

    pub fn instructions(&self) -> String {
        let summary = summary_text(self.summary.as_deref());
        system_prompt(&summary, self.registry.kind(), self.registry.pagination())
    }
}

impl ServerHandler for QueryIqService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "queryiq".to_owned(),
                title: Some("QueryIQ".to_owned()),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                icons: None,
                website_url: None,
            },
            instructions: Some(self.instructions()),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult::with_all_items(self.tools()))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        debug!(tool = %request.name, "MCP tool call");
        let arguments = request
            .arguments
            .map(JsonValue::Object)
            .unwrap_or(JsonValue::Null);
        let output = self
            .registry
            .dispatch(&request.name, arguments, &context.ct)
            .await?;
        Ok(CallToolResult::structured(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::QueryExecutor;
    use crate::models::{DatabaseTarget, DatabaseType, DbSummary, PaginationConfig};

    fn create_test_service(kind: DatabaseType, url: &str) -> QueryIqService {
        let registry = ToolRegistry::new(
            DatabaseTarget::new(url, kind),
            QueryExecutor::from_config(&Config::default()),
            PaginationConfig::default(),
            false,
        );
        QueryIqService::new(Arc::new(registry), None)
    }

    #[test]
    fn test_server_info() {
        let service = create_test_service(DatabaseType::PostgreSQL, "postgres://localhost/app");
        let info = service.get_info();
        assert_eq!(info.server_info.name, "queryiq");
        assert!(info.capabilities.tools.is_some());
        let instructions = info.instructions.unwrap();
        assert!(instructions.contains("POSTGRESQL database"));
        assert!(instructions.contains("SQL-SPECIFIC RULES"));
    }

    #[test]
    fn test_tools_follow_backend_kind() {
        let service = create_test_service(DatabaseType::MongoDB, "mongodb://localhost/app");
        let names: Vec<String> = service.tools().iter().map(|t| t.name.to_string()).collect();
        assert!(names.contains(&"findDocuments".to_string()));
        assert!(!names.contains(&"executeQuery".to_string()));
        assert_eq!(names.len(), 6);
    }

    #[test]
    fn test_instructions_embed_summary() {
        let registry = ToolRegistry::new(
            DatabaseTarget::new("mysql://localhost/app", DatabaseType::MySQL),
            QueryExecutor::from_config(&Config::default()),
            PaginationConfig::default(),
            false,
        );
        let summary = ProjectSummary::new(DbSummary::Tables(vec![]), DatabaseType::MySQL);
        let service = QueryIqService::new(Arc::new(registry), Some(summary));
        assert!(service.instructions().contains("\"dbType\":\"mysql\""));
    }
}
