//! Document tools: `getDocumentCount`, `findDocuments`, `executeAggregation`.
//!
//! MongoDB queries are structured values, so validation is structural: the
//! operation is fixed per tool, collection names are checked, and pipelines
//! may not contain write stages.

use crate::db::QueryOutput;
use crate::error::{DbError, DbResult};
use crate::models::{FindOptions, MongoQuerySpec, QuerySpec, Record};
use crate::tools::ToolContext;
use crate::tools::governor::PageInfo;
use crate::tools::sql::CountOutput;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Input for the getDocumentCount tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GetDocumentCountInput {
    /// Collection name
    pub collection: String,
    /// MongoDB filter object (e.g., { status: 'active' })
    #[serde(default)]
    pub filter: Option<Map<String, JsonValue>>,
    /// Why you're checking the count
    pub explanation: String,
}

/// Input for the findDocuments tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FindDocumentsInput {
    /// Collection name
    pub collection: String,
    /// MongoDB filter object
    #[serde(default)]
    pub filter: Option<Map<String, JsonValue>>,
    /// Sort specification (e.g., { createdAt: -1 })
    #[serde(default)]
    pub sort: Option<Map<String, JsonValue>>,
    /// Maximum documents per page (capped at the page size)
    #[serde(default)]
    pub limit: Option<u32>,
    /// Number of documents to skip
    #[serde(default)]
    pub skip: Option<u64>,
    /// What this query does
    pub explanation: String,
    /// Estimated total documents from getDocumentCount
    #[serde(default)]
    pub estimated_count: Option<u64>,
}

/// Input for the document executeAggregation tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MongoAggregationInput {
    /// Collection name
    pub collection: String,
    /// MongoDB aggregation pipeline (e.g., [{ $match: {...} }, { $group: {...} }])
    pub pipeline: Vec<JsonValue>,
    /// What insights this provides
    pub explanation: String,
}

/// Output from the findDocuments tool.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FindDocumentsOutput {
    pub explanation: String,
    pub results: Vec<Record>,
    pub document_count: usize,
    pub estimated_tokens: u64,
    pub truncated: bool,
    pub warning: Option<&'static str>,
    pub pagination: PageInfo,
}

/// Output from the document executeAggregation tool.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MongoAggregationOutput {
    pub explanation: String,
    pub results: Vec<Record>,
    pub document_count: usize,
    #[serde(rename = "type")]
    pub kind: &'static str,
}

/// Sort values must be numeric directions.
fn check_sort(sort: &Map<String, JsonValue>) -> DbResult<()> {
    match sort.iter().find(|(_, v)| !v.is_number()) {
        Some((key, _)) => Err(DbError::validation(format!(
            "Sort direction for '{}' must be a number (1 or -1)",
            key
        ))),
        None => Ok(()),
    }
}

/// Handler for the document tools.
pub struct DocumentToolHandler<'a> {
    ctx: &'a ToolContext,
}

impl<'a> DocumentToolHandler<'a> {
    pub fn new(ctx: &'a ToolContext) -> Self {
        Self { ctx }
    }

    async fn run(&self, spec: MongoQuerySpec, cancel: &CancellationToken) -> DbResult<QueryOutput> {
        self.ctx
            .executor
            .execute_query(&self.ctx.target, &QuerySpec::Mongo(spec), cancel)
            .await
    }

    /// Count matching documents and classify the result.
    pub async fn get_document_count(
        &self,
        input: GetDocumentCountInput,
        cancel: &CancellationToken,
    ) -> DbResult<CountOutput> {
        let spec = MongoQuerySpec::count(&input.collection, input.filter.map(JsonValue::Object));
        let count = match self.run(spec, cancel).await? {
            QueryOutput::Count(count) => count,
            QueryOutput::Rows(_) => 0,
        };
        info!(collection = %input.collection, count = count, "Document count checked");

        Ok(CountOutput {
            explanation: input.explanation,
            verdict: self.ctx.governor.govern_count(count),
        })
    }

    /// Fetch one page of documents and govern the result.
    ///
    /// `limit` defaults to the page size and is clamped to `1..=maxRowsPerPage`.
    pub async fn find_documents(
        &self,
        input: FindDocumentsInput,
        cancel: &CancellationToken,
    ) -> DbResult<FindDocumentsOutput> {
        let page_size = self.ctx.governor.config().max_rows_per_page;
        let limit = input.limit.unwrap_or(page_size).clamp(1, page_size.max(1));
        let skip = input.skip.unwrap_or(0);
        if let Some(sort) = &input.sort {
            check_sort(sort)?;
        }

        let options = FindOptions {
            limit: Some(limit),
            skip: Some(skip),
            sort: input.sort.map(JsonValue::Object),
        };
        let filter = Some(JsonValue::Object(input.filter.unwrap_or_default()));
        let spec = MongoQuerySpec::find(&input.collection, filter, options);

        let docs = self.run(spec, cancel).await?.into_rows();
        let governed = self
            .ctx
            .governor
            .govern_documents(docs, limit, skip, input.estimated_count);

        info!(
            collection = %input.collection,
            document_count = governed.row_count,
            truncated = governed.truncated,
            "Documents fetched"
        );

        Ok(FindDocumentsOutput {
            explanation: input.explanation,
            results: governed.results,
            document_count: governed.row_count,
            estimated_tokens: governed.estimated_tokens,
            truncated: governed.truncated,
            warning: governed.warning,
            pagination: governed.pagination,
        })
    }

    /// Run an aggregation pipeline; results are returned whole.
    pub async fn execute_aggregation(
        &self,
        input: MongoAggregationInput,
        cancel: &CancellationToken,
    ) -> DbResult<MongoAggregationOutput> {
        let spec = MongoQuerySpec::aggregate(&input.collection, input.pipeline);
        let results = self.run(spec, cancel).await?.into_rows();
        info!(collection = %input.collection, document_count = results.len(), "Aggregation executed");

        Ok(MongoAggregationOutput {
            explanation: input.explanation,
            document_count: results.len(),
            results,
            kind: "aggregation",
        })
    }
}
