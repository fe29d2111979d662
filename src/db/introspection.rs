//! One-shot structural introspection.
//!
//! Runs when a project is created or refreshed: connects with a single-use
//! session, lists every table (or collection) and records its columns (or size
//! statistics). The result seeds the system prompt.
//!
//! Every catalog statement runs under [`INTROSPECTION_TIMEOUT`]. Catalog
//! failures after a successful connect, timeouts included, are reported as
//! [`DbError::Introspection`]; connection failures keep their own variant.

use crate::db::document;
use crate::db::executor::{with_timeout, within_session};
use crate::db::pool::DbPool;
use crate::db::session::ConnectionStrategy;
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseTarget, DatabaseType, DbSummary};
use std::future::IntoFuture;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Limit on each catalog statement.
pub const INTROSPECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Produces a [`DbSummary`] for a whole database.
pub struct Introspector;

impl Introspector {
    /// Introspect a target.
    ///
    /// Always uses a fresh connection, even when `strategy` is pooled.
    pub async fn introspect(
        strategy: &ConnectionStrategy,
        target: &DatabaseTarget,
        cancel: &CancellationToken,
    ) -> DbResult<DbSummary> {
        let start = Instant::now();
        let db_type = target.kind();

        let summary = within_session(&strategy.one_shot(), target, "introspection", cancel, |pool| async move {
            let limit = INTROSPECTION_TIMEOUT;
            let result = match &pool {
                DbPool::Postgres(p) => postgres::introspect(p, limit).await,
                DbPool::MySql(p) => mysql::introspect(p, limit).await,
                DbPool::Mongo { database, .. } => mongo::introspect(database, limit).await,
            };
            result.map_err(|e| catalog_error(db_type, e))
        })
        .await?;

        info!(
            db_type = %db_type,
            entities = summary.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Database introspected"
        );
        Ok(summary)
    }

    /// Introspect a connection string with a user-supplied type name.
    ///
    /// The type name is normalized before any connection is attempted.
    pub async fn introspect_url(
        strategy: &ConnectionStrategy,
        db_url: &str,
        db_type: &str,
        cancel: &CancellationToken,
    ) -> DbResult<DbSummary> {
        let kind = DatabaseType::parse(db_type)?;
        Self::introspect(strategy, &DatabaseTarget::new(db_url, kind), cancel).await
    }
}

/// Wrap catalog failures; connection and cancellation errors pass through.
fn catalog_error(db_type: DatabaseType, err: DbError) -> DbError {
    match err {
        DbError::Connection { .. }
        | DbError::Cancelled { .. }
        | DbError::Timeout { .. }
        | DbError::Introspection { .. } => err,
        other => DbError::introspection(db_type.display_name(), catalog_message(&other)),
    }
}

fn catalog_message(err: &DbError) -> String {
    match err {
        DbError::QueryExecution { message, .. } => message.clone(),
        DbError::Internal { message } => message.clone(),
        other => other.to_string(),
    }
}

/// Run one catalog statement under `limit`.
async fn catalog_call<T, E, Fut>(limit: Duration, fut: Fut) -> DbResult<T>
where
    Fut: IntoFuture<Output = Result<T, E>>,
    E: Into<DbError>,
{
    with_timeout(limit, async move { fut.await.map_err(Into::into) }).await
}

/// Quote a MySQL identifier, doubling embedded backticks.
pub fn quote_mysql_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

// =============================================================================
// SQL Query Templates
// =============================================================================

mod queries {
    pub mod postgres {
        pub const LIST_TABLES: &str = r#"
            SELECT table_name::text AS table_name
            FROM information_schema.tables
            WHERE table_schema = 'public'
            ORDER BY table_name
            "#;

        pub const TABLE_COLUMNS: &str = r#"
            SELECT column_name::text AS column_name, data_type::text AS data_type
            FROM information_schema.columns
            WHERE table_schema = 'public' AND table_name = $1
            ORDER BY ordinal_position
            "#;
    }

    pub mod mysql {
        pub const LIST_TABLES: &str = r#"SHOW TABLES"#;
    }
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================

mod postgres {
    use super::*;
    use crate::models::{TableColumn, TableSummary};
    use sqlx::{PgPool, Row};

    pub async fn introspect(pool: &PgPool, limit: Duration) -> DbResult<DbSummary> {
        let rows = catalog_call(limit, sqlx::query(queries::postgres::LIST_TABLES).fetch_all(pool)).await?;

        let mut tables = Vec::with_capacity(rows.len());
        for row in rows {
            let table: String = row.try_get("table_name")?;
            let query = sqlx::query(queries::postgres::TABLE_COLUMNS).bind(&table);
            let columns = catalog_call(limit, query.fetch_all(pool))
                .await?
                .iter()
                .map(|row| {
                    Ok(TableColumn {
                        name: row.try_get("column_name")?,
                        data_type: row.try_get("data_type")?,
                    })
                })
                .collect::<Result<Vec<_>, sqlx::Error>>()?;
            tables.push(TableSummary { table, columns });
        }
        Ok(DbSummary::Tables(tables))
    }
}

mod mysql {
    use super::*;
    use crate::models::{TableColumn, TableSummary};
    use sqlx::mysql::MySqlRow;
    use sqlx::{MySqlPool, Row};

    /// SHOW output may come back as VARBINARY depending on server collation.
    fn get_string<I>(row: &MySqlRow, index: I) -> Option<String>
    where
        I: sqlx::ColumnIndex<MySqlRow> + Copy,
    {
        row.try_get::<String, _>(index).ok().or_else(|| {
            row.try_get::<Vec<u8>, _>(index)
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok())
        })
    }

    pub async fn introspect(pool: &MySqlPool, limit: Duration) -> DbResult<DbSummary> {
        let rows = catalog_call(limit, sqlx::query(queries::mysql::LIST_TABLES).fetch_all(pool)).await?;

        // SHOW TABLES returns a single column "Tables_in_<db>"
        let mut names: Vec<String> = rows.iter().filter_map(|row| get_string(row, 0)).collect();
        names.sort();

        let mut tables = Vec::with_capacity(names.len());
        for table in names {
            let sql = format!("SHOW COLUMNS FROM {}", quote_mysql_identifier(&table));
            let columns = catalog_call(limit, sqlx::query(&sql).fetch_all(pool))
                .await?
                .iter()
                .filter_map(|row| {
                    Some(TableColumn {
                        name: get_string(row, "Field")?,
                        data_type: get_string(row, "Type")?,
                    })
                })
                .collect();
            tables.push(TableSummary { table, columns });
        }
        Ok(DbSummary::Tables(tables))
    }
}

mod mongo {
    use super::*;
    use crate::models::CollectionSummary;
    use mongodb::Database;
    use mongodb::bson::doc;

    pub async fn introspect(database: &Database, limit: Duration) -> DbResult<DbSummary> {
        let mut names = catalog_call(limit, database.list_collection_names()).await?;
        names.retain(|n| !n.starts_with("system."));
        names.sort();

        let mut collections = Vec::with_capacity(names.len());
        for collection in names {
            let command = database.run_command(doc! { "collStats": collection.as_str() });
            let stats = catalog_call(limit, command).await?;
            let storage_size = match document::bson_number(stats.get("size")) {
                0 => document::bson_number(stats.get("storageSize")),
                size => size,
            };
            collections.push(CollectionSummary {
                document_count: document::bson_number(stats.get("count")),
                storage_size,
                collection,
            });
        }
        Ok(DbSummary::Collections(collections))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionStrategyKind;

    #[test]
    fn test_quote_mysql_identifier() {
        assert_eq!(quote_mysql_identifier("users"), "`users`");
        assert_eq!(quote_mysql_identifier("we`ird"), "`we``ird`");
    }

    #[test]
    fn test_catalog_error_wraps_query_failures() {
        let err = catalog_error(
            DatabaseType::PostgreSQL,
            DbError::query_execution("permission denied for table users", None, "x"),
        );
        assert!(matches!(err, DbError::Introspection { .. }));
        assert_eq!(
            err.to_string(),
            "Failed to introspect PostgreSQL database: permission denied for table users"
        );
    }

    #[test]
    fn test_catalog_error_keeps_connection_failures() {
        let err = catalog_error(
            DatabaseType::MySQL,
            DbError::connection("Failed to connect to MySQL database: refused", "x"),
        );
        assert!(matches!(err, DbError::Connection { .. }));
    }

    #[tokio::test]
    async fn test_hung_catalog_call_times_out() {
        let hung = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, sqlx::Error>(Vec::<String>::new())
        };
        let err = catalog_call(Duration::from_millis(10), hung).await.unwrap_err();
        let err = catalog_error(DatabaseType::MySQL, err);
        assert!(matches!(err, DbError::Introspection { .. }));
        assert!(err.to_string().starts_with("Failed to introspect MySQL database: Query timed out"));
    }

    #[tokio::test]
    async fn test_catalog_call_passes_driver_errors() {
        let failing = async { Err::<(), _>(sqlx::Error::RowNotFound) };
        let err = catalog_call(INTROSPECTION_TIMEOUT, failing).await.unwrap_err();
        assert!(!err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_introspect_url_rejects_unknown_type() {
        let strategy = ConnectionStrategy::new(ConnectionStrategyKind::Fresh, Duration::from_secs(1));
        let err = Introspector::introspect_url(
            &strategy,
            "oracle://localhost/db",
            "oracle",
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DbError::UnsupportedDatabase { .. }));
        assert!(err.to_string().contains("postgres, postgresql, mysql, mongodb"));
    }
}
