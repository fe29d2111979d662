//! Data models for QueryIQ.
//!
//! This module re-exports all model types used throughout the application.

pub mod connection;
pub mod project;
pub mod query;
pub mod schema;

// Re-export commonly used types
pub use connection::{DatabaseTarget, DatabaseType};
pub use project::{NewProject, Project, ProjectView, ValidatedProject};
pub use query::{
    FindOptions, MongoOperation, MongoQuerySpec, PaginationConfig, QuerySpec, Record,
};
pub use schema::{
    CollectionCount, CollectionListing, CollectionSchema, CollectionSummary, ColumnInfo,
    DbSummary, EMPTY_COLLECTION, EmptyCollectionSchema, FieldSummary, ProjectSummary,
    RelationalSchema, SchemaSummary, TableColumn, TableSummary,
};
