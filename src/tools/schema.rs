//! Schema lookup tool.
//!
//! This module implements the `getSchema` tool, shared by every backend.

use crate::error::DbResult;
use crate::models::SchemaSummary;
use crate::tools::ToolContext;
use schemars::JsonSchema;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Input for the getSchema tool.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GetSchemaInput {
    /// Specific table/collection name, or empty for all tables/collections
    #[serde(default, alias = "collectionName")]
    pub table_name: Option<String>,
}

/// Handler for the schema tool.
pub struct SchemaToolHandler<'a> {
    ctx: &'a ToolContext,
}

impl<'a> SchemaToolHandler<'a> {
    pub fn new(ctx: &'a ToolContext) -> Self {
        Self { ctx }
    }

    /// Describe one table or collection, or list everything.
    pub async fn get_schema(
        &self,
        input: GetSchemaInput,
        cancel: &CancellationToken,
    ) -> DbResult<SchemaSummary> {
        let summary = self
            .ctx
            .executor
            .get_schema(&self.ctx.target, input.table_name.as_deref(), cancel)
            .await?;

        info!(
            db_type = %self.ctx.target.kind(),
            entity = input.table_name.as_deref().unwrap_or("*"),
            "Schema retrieved"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_defaults_to_all_tables() {
        let input: GetSchemaInput = serde_json::from_str("{}").unwrap();
        assert!(input.table_name.is_none());
    }

    #[test]
    fn test_input_accepts_collection_alias() {
        let input: GetSchemaInput =
            serde_json::from_str(r#"{"collectionName": "orders"}"#).unwrap();
        assert_eq!(input.table_name.as_deref(), Some("orders"));

        let input: GetSchemaInput = serde_json::from_str(r#"{"tableName": "users"}"#).unwrap();
        assert_eq!(input.table_name.as_deref(), Some("users"));
    }
}
