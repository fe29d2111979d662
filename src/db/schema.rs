//! Lightweight schema lookup used mid-conversation.
//!
//! This module backs the `getSchema` tool for PostgreSQL, MySQL and MongoDB.
//!
//! # Architecture
//!
//! SQL queries are organized in the `queries` submodule with constants for each
//! database type. Database-specific implementations are in their respective
//! submodules (postgres, mysql, mongo), each providing the same interface.

use crate::db::document;
use crate::db::executor::with_timeout;
use crate::db::pool::DbPool;
use crate::error::{DbError, DbResult};
use crate::models::{ColumnInfo, RelationalSchema, SchemaSummary};
use std::time::Duration;
use tracing::debug;

/// Documents sampled when inferring a collection's fields.
pub const SAMPLE_SIZE: i64 = 5;

/// Column rows returned when no table is named.
pub const ALL_TABLES_ROW_CAP: u32 = 100;

/// Schema inspector for the `getSchema` capability.
pub struct SchemaInspector;

impl SchemaInspector {
    /// Describe one table or collection, or everything when `name` is absent.
    ///
    /// A blank name is treated as absent.
    pub async fn get_schema(
        pool: &DbPool,
        name: Option<&str>,
        query_timeout: Duration,
    ) -> DbResult<SchemaSummary> {
        let name = name.map(str::trim).filter(|n| !n.is_empty());
        debug!(db_type = %pool.db_type(), entity = ?name, "Looking up schema");

        match pool {
            DbPool::Postgres(p) => postgres::columns(p, name, query_timeout)
                .await
                .map(SchemaSummary::Relational),
            DbPool::MySql(p) => mysql::columns(p, name, query_timeout)
                .await
                .map(SchemaSummary::Relational),
            DbPool::Mongo { database, .. } => match name {
                Some(collection) => mongo::sample_collection(database, collection, query_timeout).await,
                None => mongo::list_collections(database, query_timeout).await,
            },
        }
    }
}

// =============================================================================
// SQL Query Templates
// =============================================================================
//
// Both relational backends read the standard information_schema view. Each
// database has its own submodule with queries adapted to its catalog quirks.

mod queries {
    pub mod postgres {
        pub const TABLE_COLUMNS: &str = r#"
            SELECT
                table_name::text AS table_name,
                column_name::text AS column_name,
                data_type::text AS data_type,
                is_nullable::text AS is_nullable,
                column_default::text AS column_default
            FROM information_schema.columns
            WHERE table_schema = 'public' AND table_name = $1
            ORDER BY table_name, ordinal_position
            "#;

        pub const ALL_COLUMNS: &str = r#"
            SELECT
                table_name::text AS table_name,
                column_name::text AS column_name,
                data_type::text AS data_type,
                is_nullable::text AS is_nullable,
                column_default::text AS column_default
            FROM information_schema.columns
            WHERE table_schema = 'public'
            ORDER BY table_name, ordinal_position
            LIMIT 100
            "#;
    }

    pub mod mysql {
        pub const TABLE_COLUMNS: &str = r#"
            SELECT
                CONVERT(TABLE_NAME USING utf8) AS table_name,
                CONVERT(COLUMN_NAME USING utf8) AS column_name,
                CONVERT(DATA_TYPE USING utf8) AS data_type,
                CONVERT(IS_NULLABLE USING utf8) AS is_nullable,
                CONVERT(COLUMN_DEFAULT USING utf8) AS column_default
            FROM information_schema.COLUMNS
            WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
            ORDER BY TABLE_NAME, ORDINAL_POSITION
            "#;

        pub const ALL_COLUMNS: &str = r#"
            SELECT
                CONVERT(TABLE_NAME USING utf8) AS table_name,
                CONVERT(COLUMN_NAME USING utf8) AS column_name,
                CONVERT(DATA_TYPE USING utf8) AS data_type,
                CONVERT(IS_NULLABLE USING utf8) AS is_nullable,
                CONVERT(COLUMN_DEFAULT USING utf8) AS column_default
            FROM information_schema.COLUMNS
            WHERE TABLE_SCHEMA = DATABASE()
            ORDER BY TABLE_NAME, ORDINAL_POSITION
            LIMIT 100
            "#;
    }
}

fn column_row(
    table: String,
    name: String,
    data_type: String,
    is_nullable: Option<String>,
    default: Option<String>,
) -> (String, ColumnInfo) {
    let nullable = is_nullable
        .map(|v| v.eq_ignore_ascii_case("YES"))
        .unwrap_or(false);
    (
        table,
        ColumnInfo {
            name,
            data_type,
            nullable,
            default,
        },
    )
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================

mod postgres {
    use super::*;
    use sqlx::{PgPool, Row};

    pub async fn columns(
        pool: &PgPool,
        table: Option<&str>,
        query_timeout: Duration,
    ) -> DbResult<RelationalSchema> {
        let rows = with_timeout(query_timeout, async {
            let query = match table {
                Some(table) => sqlx::query(queries::postgres::TABLE_COLUMNS).bind(table),
                None => sqlx::query(queries::postgres::ALL_COLUMNS),
            };
            query.fetch_all(pool).await.map_err(DbError::from)
        })
        .await?;

        let mut flat = Vec::with_capacity(rows.len());
        for row in rows {
            flat.push(column_row(
                row.try_get("table_name")?,
                row.try_get("column_name")?,
                row.try_get("data_type")?,
                row.try_get("is_nullable").ok().flatten(),
                row.try_get("column_default").ok().flatten(),
            ));
        }
        Ok(RelationalSchema::from_rows(flat))
    }
}

mod mysql {
    use super::*;
    use sqlx::{MySqlPool, Row};

    pub async fn columns(
        pool: &MySqlPool,
        table: Option<&str>,
        query_timeout: Duration,
    ) -> DbResult<RelationalSchema> {
        let rows = with_timeout(query_timeout, async {
            let query = match table {
                Some(table) => sqlx::query(queries::mysql::TABLE_COLUMNS).bind(table),
                None => sqlx::query(queries::mysql::ALL_COLUMNS),
            };
            query.fetch_all(pool).await.map_err(DbError::from)
        })
        .await?;

        let mut flat = Vec::with_capacity(rows.len());
        for row in rows {
            flat.push(column_row(
                row.try_get("table_name")?,
                row.try_get("column_name")?,
                row.try_get("data_type")?,
                row.try_get("is_nullable").ok().flatten(),
                row.try_get("column_default").ok().flatten(),
            ));
        }
        Ok(RelationalSchema::from_rows(flat))
    }
}

mod mongo {
    use super::*;
    use crate::models::{CollectionCount, CollectionListing, CollectionSchema, EmptyCollectionSchema};
    use futures_util::TryStreamExt;
    use mongodb::Database;
    use mongodb::bson::{Document, doc};

    pub async fn sample_collection(
        database: &Database,
        name: &str,
        query_timeout: Duration,
    ) -> DbResult<SchemaSummary> {
        document::validate_collection_name(name)?;
        let collection = database.collection::<Document>(name);

        let document_count = with_timeout(query_timeout, async {
            collection
                .count_documents(doc! {})
                .max_time(query_timeout)
                .await
                .map_err(DbError::from)
        })
        .await?;

        if document_count == 0 {
            return Ok(SchemaSummary::EmptyCollection(EmptyCollectionSchema::default()));
        }

        let samples: Vec<Document> = with_timeout(query_timeout, async {
            let cursor = collection
                .find(doc! {})
                .limit(SAMPLE_SIZE)
                .max_time(query_timeout)
                .await?;
            cursor.try_collect::<Vec<Document>>().await.map_err(DbError::from)
        })
        .await?;

        Ok(SchemaSummary::Collection(CollectionSchema {
            collection: name.to_string(),
            document_count,
            sample_size: samples.len(),
            fields: document::infer_fields(&samples),
        }))
    }

    pub async fn list_collections(database: &Database, query_timeout: Duration) -> DbResult<SchemaSummary> {
        let mut names = with_timeout(query_timeout, async {
            database.list_collection_names().await.map_err(DbError::from)
        })
        .await?;
        names.retain(|n| !n.starts_with("system."));
        names.sort();

        // One count per collection; discovery only
        let mut collections = Vec::with_capacity(names.len());
        for name in names {
            let document_count = with_timeout(query_timeout, async {
                database
                    .collection::<Document>(&name)
                    .count_documents(doc! {})
                    .max_time(query_timeout)
                    .await
                    .map_err(DbError::from)
            })
            .await?;
            collections.push(CollectionCount { name, document_count });
        }

        Ok(SchemaSummary::Collections(CollectionListing {
            collection_count: collections.len(),
            collections,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_columns_queries_are_capped() {
        let cap = format!("LIMIT {}", ALL_TABLES_ROW_CAP);
        assert!(queries::postgres::ALL_COLUMNS.contains(&cap));
        assert!(queries::mysql::ALL_COLUMNS.contains(&cap));
        assert!(!queries::postgres::TABLE_COLUMNS.contains("LIMIT"));
    }

    #[test]
    fn test_default_schemas() {
        assert!(queries::postgres::TABLE_COLUMNS.contains("table_schema = 'public'"));
        assert!(queries::mysql::TABLE_COLUMNS.contains("TABLE_SCHEMA = DATABASE()"));
    }

    #[test]
    fn test_column_row_nullable() {
        let (table, column) = column_row(
            "users".to_string(),
            "email".to_string(),
            "text".to_string(),
            Some("YES".to_string()),
            None,
        );
        assert_eq!(table, "users");
        assert!(column.nullable);

        let (_, column) = column_row(
            "users".to_string(),
            "id".to_string(),
            "integer".to_string(),
            Some("NO".to_string()),
            Some("nextval('users_id_seq'::regclass)".to_string()),
        );
        assert!(!column.nullable);
        assert!(column.default.is_some());
    }
}
