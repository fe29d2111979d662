//! Query-related data models.
//!
//! This module defines the backend-specific query representations and the
//! result-governance thresholds.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A relational row or a document, as handed back to the model.
pub type Record = serde_json::Map<String, JsonValue>;

/// Result-governance thresholds.
///
/// Built once from [`crate::config::Config::pagination`] and passed by value
/// into the governor and the tool registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationConfig {
    pub max_rows_per_page: u32,
    pub max_rows_before_export: u32,
    pub max_tokens_for_results: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            max_rows_per_page: 50,
            max_rows_before_export: 100,
            max_tokens_for_results: 4000,
        }
    }
}

/// Read operations accepted for the document backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MongoOperation {
    #[serde(rename = "countDocuments")]
    Count,
    #[serde(rename = "find")]
    Find,
    #[serde(rename = "aggregate")]
    Aggregate,
}

impl MongoOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Count => "countDocuments",
            Self::Find => "find",
            Self::Aggregate => "aggregate",
        }
    }
}

impl std::fmt::Display for MongoOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options applied to a `find`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FindOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<JsonValue>,
}

/// A structured document-database query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MongoQuerySpec {
    pub collection: String,
    pub operation: MongoOperation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<JsonValue>,
    #[serde(default)]
    pub options: FindOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<Vec<JsonValue>>,
}

impl MongoQuerySpec {
    pub fn with_operation(collection: impl Into<String>, operation: MongoOperation) -> Self {
        Self {
            collection: collection.into(),
            operation,
            filter: None,
            options: FindOptions::default(),
            pipeline: None,
        }
    }

    pub fn count(collection: impl Into<String>, filter: Option<JsonValue>) -> Self {
        Self::with_operation(collection, MongoOperation::Count).with_filter(filter)
    }

    pub fn find(collection: impl Into<String>, filter: Option<JsonValue>, options: FindOptions) -> Self {
        let mut spec = Self::with_operation(collection, MongoOperation::Find).with_filter(filter);
        spec.options = options;
        spec
    }

    pub fn aggregate(collection: impl Into<String>, pipeline: Vec<JsonValue>) -> Self {
        let mut spec = Self::with_operation(collection, MongoOperation::Aggregate);
        spec.pipeline = Some(pipeline);
        spec
    }

    pub fn with_filter(mut self, filter: Option<JsonValue>) -> Self {
        self.filter = filter;
        self
    }
}

/// A query in the representation of one backend family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum QuerySpec {
    Sql { text: String },
    Mongo(MongoQuerySpec),
}

impl QuerySpec {
    pub fn sql(text: impl Into<String>) -> Self {
        Self::Sql { text: text.into() }
    }

    pub fn is_sql(&self) -> bool {
        matches!(self, Self::Sql { .. })
    }
}

impl From<MongoQuerySpec> for QuerySpec {
    fn from(spec: MongoQuerySpec) -> Self {
        Self::Mongo(spec)
    }
}
