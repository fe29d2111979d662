//! Query execution engine.
//!
//! This module runs one validated query per session with support for:
//! - Statement timeouts (client-side and, where supported, server-side)
//! - Cooperative cancellation via `CancellationToken`
//! - Row caps (enforced via streaming, only the needed rows are fetched)
//! - Guaranteed session release on every exit path
//!
//! # Architecture
//!
//! The executor uses database-specific implementations organized in submodules:
//! - `mysql`: MySQL-specific query execution
//! - `postgres`: PostgreSQL-specific query execution
//! - `mongo`: MongoDB count, find and aggregate
//!
//! Each submodule provides identical functionality adapted to the database's type system.

use crate::config::Config;
use crate::db::decode::RowToJson;
use crate::db::document;
use crate::db::pool::DbPool;
use crate::db::schema::SchemaInspector;
use crate::db::session::ConnectionStrategy;
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseTarget, QuerySpec, Record, SchemaSummary};
use futures_util::{Stream, StreamExt, TryStreamExt};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Raw result of one round trip.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutput {
    Rows(Vec<Record>),
    Count(u64),
}

impl QueryOutput {
    pub fn len(&self) -> usize {
        match self {
            Self::Rows(rows) => rows.len(),
            Self::Count(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Rows(rows) if rows.is_empty())
    }

    /// Rows, with a count presented as a single `{count}` row.
    pub fn into_rows(self) -> Vec<Record> {
        match self {
            Self::Rows(rows) => rows,
            Self::Count(count) => {
                let mut row = Record::new();
                row.insert("count".to_string(), count.into());
                vec![row]
            }
        }
    }
}

/// Query executor that handles database query execution.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    strategy: ConnectionStrategy,
    query_timeout: Duration,
    export_timeout: Duration,
}

impl QueryExecutor {
    pub fn new(strategy: ConnectionStrategy, query_timeout: Duration, export_timeout: Duration) -> Self {
        Self {
            strategy,
            query_timeout,
            export_timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            ConnectionStrategy::from_config(config),
            config.query_timeout_duration(),
            config.export_timeout_duration(),
        )
    }

    pub fn strategy(&self) -> &ConnectionStrategy {
        &self.strategy
    }

    pub fn query_timeout(&self) -> Duration {
        self.query_timeout
    }

    pub fn export_timeout(&self) -> Duration {
        self.export_timeout
    }

    /// Execute one interactive query against the target.
    pub async fn execute_query(
        &self,
        target: &DatabaseTarget,
        spec: &QuerySpec,
        cancel: &CancellationToken,
    ) -> DbResult<QueryOutput> {
        self.execute_with_timeout(target, spec, self.query_timeout, None, cancel)
            .await
    }

    /// Execute an export query with the longer export timeout.
    ///
    /// At most `max_rows` rows are read, whatever LIMIT the text carries.
    pub async fn execute_export(
        &self,
        target: &DatabaseTarget,
        sql: &str,
        max_rows: u32,
        cancel: &CancellationToken,
    ) -> DbResult<Vec<Record>> {
        let spec = QuerySpec::sql(sql);
        let row_cap = Some(max_rows as usize);
        self.execute_with_timeout(target, &spec, self.export_timeout, row_cap, cancel)
            .await
            .map(QueryOutput::into_rows)
    }

    /// Describe a table or collection, or list them all.
    pub async fn get_schema(
        &self,
        target: &DatabaseTarget,
        name: Option<&str>,
        cancel: &CancellationToken,
    ) -> DbResult<SchemaSummary> {
        let query_timeout = self.query_timeout;
        within_session(&self.strategy, target, "schema lookup", cancel, |pool| async move {
            SchemaInspector::get_schema(&pool, name, query_timeout).await
        })
        .await
    }

    async fn execute_with_timeout(
        &self,
        target: &DatabaseTarget,
        spec: &QuerySpec,
        query_timeout: Duration,
        row_cap: Option<usize>,
        cancel: &CancellationToken,
    ) -> DbResult<QueryOutput> {
        check_spec_matches(target, spec)?;
        let start = Instant::now();

        debug!(
            db_type = %target.kind(),
            timeout_secs = query_timeout.as_secs(),
            "Executing query"
        );

        let output = within_session(&self.strategy, target, "query execution", cancel, |pool| async move {
            match (&pool, spec) {
                (DbPool::MySql(p), QuerySpec::Sql { text }) => {
                    mysql::fetch_rows(p, text, query_timeout, row_cap).await.map(QueryOutput::Rows)
                }
                (DbPool::Postgres(p), QuerySpec::Sql { text }) => {
                    postgres::fetch_rows(p, text, query_timeout, row_cap).await.map(QueryOutput::Rows)
                }
                (DbPool::Mongo { database, .. }, QuerySpec::Mongo(mongo_spec)) => {
                    mongo::run(database, mongo_spec, query_timeout).await
                }
                _ => Err(DbError::internal("query representation does not match the connection")),
            }
        })
        .await?;

        info!(
            db_type = %target.kind(),
            rows = output.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Query executed"
        );
        Ok(output)
    }

    /// Release pooled connections.
    pub async fn shutdown(&self) {
        self.strategy.shutdown().await;
    }
}

/// Reject SQL against a document target and structured queries against SQL targets.
fn check_spec_matches(target: &DatabaseTarget, spec: &QuerySpec) -> DbResult<()> {
    match (target.kind().is_relational(), spec) {
        (true, QuerySpec::Sql { .. }) | (false, QuerySpec::Mongo(_)) => Ok(()),
        (true, QuerySpec::Mongo(_)) => Err(DbError::invalid_input(format!(
            "MongoDB queries cannot run against a {} database",
            target.kind()
        ))),
        (false, QuerySpec::Sql { .. }) => Err(DbError::invalid_input(
            "SQL queries cannot run against a MongoDB database",
        )),
    }
}

/// Open a session, run `op` raced against cancellation, and close the session.
///
/// The session is closed whether `op` succeeds, fails or is cancelled.
pub async fn within_session<T, F, Fut>(
    strategy: &ConnectionStrategy,
    target: &DatabaseTarget,
    operation: &str,
    cancel: &CancellationToken,
    op: F,
) -> DbResult<T>
where
    F: FnOnce(DbPool) -> Fut,
    Fut: Future<Output = DbResult<T>>,
{
    let session = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(DbError::cancelled(operation)),
        session = strategy.open(target) => session?,
    };

    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(DbError::cancelled(operation)),
        result = op(session.pool().clone()) => result,
    };

    session.close().await;
    result
}

/// Apply the client-side statement timeout.
pub(crate) async fn with_timeout<T, Fut>(query_timeout: Duration, fut: Fut) -> DbResult<T>
where
    Fut: Future<Output = DbResult<T>>,
{
    match tokio::time::timeout(query_timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(timeout_error(query_timeout)),
    }
}

/// Drain a row stream, stopping after `row_cap` rows when one is given.
async fn collect_rows<R, S>(stream: S, row_cap: Option<usize>) -> DbResult<Vec<R>>
where
    S: Stream<Item = Result<R, sqlx::Error>>,
{
    let rows: Vec<R> = match row_cap {
        Some(cap) => stream.take(cap).try_collect().await?,
        None => stream.try_collect().await?,
    };
    Ok(rows)
}

fn timeout_error(query_timeout: Duration) -> DbError {
    DbError::query_execution(
        format!("Query timed out after {}s", query_timeout.as_secs()),
        None,
        "Narrow the query with filters or a smaller LIMIT, or use an aggregation",
    )
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================
//
// Each module below provides the same interface adapted to its database type.
// The code structure is intentionally parallel to make differences obvious.

mod mysql {
    use super::*;
    use sqlx::{Executor, MySqlPool};

    pub async fn fetch_rows(
        pool: &MySqlPool,
        sql: &str,
        query_timeout: Duration,
        row_cap: Option<usize>,
    ) -> DbResult<Vec<Record>> {
        let acquire_timeout = pool.options().get_acquire_timeout();
        let mut conn = pool
            .acquire()
            .await
            .map_err(|e| DbError::from_pool(e, acquire_timeout))?;

        // MariaDB has no max_execution_time
        let set_timeout = format!(
            "SET SESSION max_execution_time = {}",
            query_timeout.as_millis()
        );
        if let Err(e) = (&mut *conn).execute(set_timeout.as_str()).await {
            debug!(error = %e, "Server-side statement timeout not applied");
        }

        let rows = with_timeout(query_timeout, collect_rows((&mut *conn).fetch(sql), row_cap)).await?;

        Ok(rows.iter().map(RowToJson::to_record).collect())
    }
}

mod postgres {
    use super::*;
    use sqlx::{Executor, PgPool};

    pub async fn fetch_rows(
        pool: &PgPool,
        sql: &str,
        query_timeout: Duration,
        row_cap: Option<usize>,
    ) -> DbResult<Vec<Record>> {
        let acquire_timeout = pool.options().get_acquire_timeout();
        let mut conn = pool
            .acquire()
            .await
            .map_err(|e| DbError::from_pool(e, acquire_timeout))?;

        let set_timeout = format!("SET statement_timeout = {}", query_timeout.as_millis());
        (&mut *conn).execute(set_timeout.as_str()).await?;

        let rows = with_timeout(query_timeout, collect_rows((&mut *conn).fetch(sql), row_cap)).await?;

        Ok(rows.iter().map(RowToJson::to_record).collect())
    }
}

mod mongo {
    use super::*;
    use crate::models::{MongoOperation, MongoQuerySpec};
    use mongodb::Database;
    use mongodb::bson::Document;

    pub async fn run(database: &Database, spec: &MongoQuerySpec, query_timeout: Duration) -> DbResult<QueryOutput> {
        document::validate_collection_name(&spec.collection)?;
        let collection = database.collection::<Document>(&spec.collection);

        match spec.operation {
            MongoOperation::Count => {
                let filter = document::json_to_document(spec.filter.as_ref(), "filter")?;
                let count = with_timeout(query_timeout, async {
                    collection
                        .count_documents(filter)
                        .max_time(query_timeout)
                        .await
                        .map_err(DbError::from)
                })
                .await?;
                Ok(QueryOutput::Count(count))
            }
            MongoOperation::Find => {
                let filter = document::json_to_document(spec.filter.as_ref(), "filter")?;
                let sort = match &spec.options.sort {
                    Some(sort) => Some(document::json_to_document(Some(sort), "sort")?),
                    None => None,
                };

                let docs: Vec<Document> = with_timeout(query_timeout, async {
                    let mut find = collection.find(filter).max_time(query_timeout);
                    if let Some(limit) = spec.options.limit {
                        find = find.limit(i64::from(limit));
                    }
                    if let Some(skip) = spec.options.skip {
                        find = find.skip(skip);
                    }
                    if let Some(sort) = sort {
                        find = find.sort(sort);
                    }
                    let cursor = find.await?;
                    cursor.try_collect::<Vec<Document>>().await.map_err(DbError::from)
                })
                .await?;

                Ok(QueryOutput::Rows(
                    docs.into_iter().map(document::document_to_record).collect(),
                ))
            }
            MongoOperation::Aggregate => {
                let stages = spec.pipeline.as_deref().unwrap_or_default();
                let pipeline = document::pipeline_to_documents(stages)?;

                let docs: Vec<Document> = with_timeout(query_timeout, async {
                    let cursor = collection
                        .aggregate(pipeline)
                        .max_time(query_timeout)
                        .await?;
                    cursor.try_collect::<Vec<Document>>().await.map_err(DbError::from)
                })
                .await?;

                Ok(QueryOutput::Rows(
                    docs.into_iter().map(document::document_to_record).collect(),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionStrategyKind;
    use crate::models::{DatabaseType, FindOptions, MongoQuerySpec};

    fn executor() -> QueryExecutor {
        QueryExecutor::new(
            ConnectionStrategy::new(ConnectionStrategyKind::Fresh, Duration::from_secs(1)),
            Duration::from_secs(30),
            Duration::from_secs(60),
        )
    }

    #[test]
    fn test_executor_from_config() {
        let executor = QueryExecutor::from_config(&Config::default());
        assert_eq!(executor.query_timeout(), Duration::from_secs(30));
        assert_eq!(executor.export_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_count_output_as_rows() {
        let rows = QueryOutput::Count(7).into_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["count"], 7);
    }

    #[test]
    fn test_spec_must_match_backend() {
        let pg = DatabaseTarget::new("postgres://localhost/db", DatabaseType::PostgreSQL);
        let mongo = DatabaseTarget::new("mongodb://localhost/db", DatabaseType::MongoDB);
        let sql = QuerySpec::sql("SELECT 1 LIMIT 1");
        let find: QuerySpec = MongoQuerySpec::find("users", None, FindOptions::default()).into();

        assert!(check_spec_matches(&pg, &sql).is_ok());
        assert!(check_spec_matches(&mongo, &find).is_ok());
        assert!(check_spec_matches(&pg, &find).is_err());
        assert!(check_spec_matches(&mongo, &sql).is_err());
    }

    #[tokio::test]
    async fn test_cancelled_before_connect() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let target = DatabaseTarget::new("postgres://localhost:1/db", DatabaseType::PostgreSQL);
        let err = executor()
            .execute_query(&target, &QuerySpec::sql("SELECT 1 LIMIT 1"), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Cancelled { .. }));
    }

    #[tokio::test]
    async fn test_row_cap_stops_the_stream() {
        let rows = futures_util::stream::iter((0..10).map(Ok::<_, sqlx::Error>));
        let capped: Vec<i32> = collect_rows(rows, Some(3)).await.unwrap();
        assert_eq!(capped, vec![0, 1, 2]);

        let rows = futures_util::stream::iter((0..10).map(Ok::<_, sqlx::Error>));
        let all: Vec<i32> = collect_rows(rows, None).await.unwrap();
        assert_eq!(all.len(), 10);
    }

    #[tokio::test]
    async fn test_row_cap_surfaces_driver_errors() {
        let rows = futures_util::stream::iter(vec![Ok(1), Err(sqlx::Error::RowNotFound), Ok(3)]);
        let result: DbResult<Vec<i32>> = collect_rows(rows, Some(5)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_client_timeout_maps_to_query_execution() {
        let result: DbResult<()> = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        let err = result.unwrap_err();
        assert!(matches!(err, DbError::QueryExecution { .. }));
        assert!(err.to_string().contains("timed out"));
    }
}
