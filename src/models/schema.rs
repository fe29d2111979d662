//! Schema-related data models.
//!
//! Two families live here: the lightweight shapes returned by the `getSchema`
//! tool and the heavier per-project summary produced by introspection.

use crate::models::DatabaseType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Value reported for an empty collection instead of a field summary.
pub const EMPTY_COLLECTION: &str = "Empty collection";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
}

/// Columns grouped per table, tables in catalog order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationalSchema {
    pub tables: Vec<String>,
    pub columns: BTreeMap<String, Vec<ColumnInfo>>,
    pub table_count: usize,
}

impl RelationalSchema {
    /// Group flat `(table, column)` rows, keeping first-seen table order.
    pub fn from_rows(rows: impl IntoIterator<Item = (String, ColumnInfo)>) -> Self {
        let mut schema = Self::default();
        for (table, column) in rows {
            if !schema.columns.contains_key(&table) {
                schema.tables.push(table.clone());
            }
            schema.columns.entry(table).or_default().push(column);
        }
        schema.table_count = schema.tables.len();
        schema
    }
}

/// Observed JS-level type tags and one example value for a document key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSummary {
    pub types: Vec<String>,
    pub example: JsonValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSchema {
    pub collection: String,
    pub document_count: u64,
    pub sample_size: usize,
    pub fields: BTreeMap<String, FieldSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmptyCollectionSchema {
    pub schema: String,
    pub document_count: u64,
}

impl Default for EmptyCollectionSchema {
    fn default() -> Self {
        Self {
            schema: EMPTY_COLLECTION.to_string(),
            document_count: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionCount {
    pub name: String,
    pub document_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionListing {
    pub collections: Vec<CollectionCount>,
    pub collection_count: usize,
}

/// Output of the `getSchema` tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SchemaSummary {
    Relational(RelationalSchema),
    Collection(CollectionSchema),
    EmptyCollection(EmptyCollectionSchema),
    Collections(CollectionListing),
}

/// Introspection: one table and its declared column types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSummary {
    pub table: String,
    pub columns: Vec<TableColumn>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
}

/// Introspection: one collection with its size statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSummary {
    pub collection: String,
    pub document_count: u64,
    pub storage_size: u64,
}

/// Structural summary used to seed the system prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DbSummary {
    Tables(Vec<TableSummary>),
    Collections(Vec<CollectionSummary>),
}

impl DbSummary {
    pub fn len(&self) -> usize {
        match self {
            Self::Tables(tables) => tables.len(),
            Self::Collections(collections) => collections.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pretty JSON, as embedded in the system prompt.
    pub fn to_prompt_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "[]".to_string())
    }
}

/// Summary persisted alongside a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSummary {
    pub summary: DbSummary,
    pub introspected_at: DateTime<Utc>,
    pub db_type: DatabaseType,
}

impl ProjectSummary {
    pub fn new(summary: DbSummary, db_type: DatabaseType) -> Self {
        Self {
            summary,
            introspected_at: Utc::now(),
            db_type,
        }
    }
}
