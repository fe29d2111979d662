//! SQL query validation for the read-only tools.
//!
//! Two layers live here:
//!
//! - A shallow textual gate applied to every SQL tool call: the trimmed,
//!   lower-cased text must start with `select` and, for paginated execution,
//!   contain `limit`. This is defense in depth, not a parser. A statement such
//!   as `select 1 limit 1; drop table t` passes it, so the authoritative
//!   boundary is a database role with read-only grants.
//! - An optional strict gate built on [sqlparser](https://docs.rs/sqlparser/)
//!   that additionally requires exactly one parsed `Query` statement.
//!
//! The export path reuses the SELECT check and rewrites the LIMIT clause to the
//! export ceiling.

use crate::error::{DbError, DbResult};
use crate::models::DatabaseType;
use regex::Regex;
use sqlparser::ast::Statement;
use sqlparser::dialect::{Dialect, MySqlDialect, PostgreSqlDialect};
use sqlparser::parser::Parser;
use std::sync::LazyLock;

/// Hard ceiling on rows returned by the export path.
pub const EXPORT_ROW_CEILING: u32 = 50_000;

/// Error messages returned to the model.
pub mod error_messages {
    pub const ONLY_SELECT: &str = "Only SELECT queries are allowed";
    pub const ONLY_SELECT_AGGREGATION: &str = "Only SELECT queries allowed";
    pub const COUNT_REQUIRED: &str = "Query must be a COUNT query";
    pub const MULTIPLE_STATEMENTS: &str =
        "Multiple statements are not allowed. Send a single SELECT query.";
    pub const EMPTY: &str = "Empty SQL statement";
    pub const PARSE_ERROR: &str = "Failed to parse SQL statement.";

    pub fn limit_required(max_rows_per_page: u32) -> String {
        format!("Query must include LIMIT clause (max {})", max_rows_per_page)
    }
}

static LIMIT_CLAUSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\blimit\s+(?:(?P<offset>\d+)\s*,\s*)?(?P<count>\d+|all)\b")
        .expect("valid LIMIT pattern")
});

fn normalize(sql: &str) -> String {
    sql.trim().to_lowercase()
}

fn starts_with_select(normalized: &str) -> bool {
    normalized.starts_with("select")
}

/// Validate a query for the paginated `executeQuery` tool.
///
/// # Examples
///
/// ```
/// use queryiq::tools::sql_validator::validate_sql_query;
///
/// assert!(validate_sql_query("  SELECT * FROM t LIMIT 5", 50).is_ok());
/// assert!(validate_sql_query("DELETE FROM t", 50).is_err());
/// assert!(validate_sql_query("select * from users", 50).is_err());
/// ```
pub fn validate_sql_query(sql: &str, max_rows_per_page: u32) -> DbResult<()> {
    let normalized = normalize(sql);
    if !starts_with_select(&normalized) {
        return Err(DbError::validation(error_messages::ONLY_SELECT));
    }
    if !normalized.contains("limit") {
        return Err(DbError::validation(error_messages::limit_required(
            max_rows_per_page,
        )));
    }
    Ok(())
}

/// Validate a query for the count tool: a SELECT containing `count(`.
pub fn validate_count_query(sql: &str) -> DbResult<()> {
    let normalized = normalize(sql);
    if !normalized.contains("count(") {
        return Err(DbError::validation(error_messages::COUNT_REQUIRED));
    }
    if !starts_with_select(&normalized) {
        return Err(DbError::validation(error_messages::ONLY_SELECT));
    }
    Ok(())
}

/// Validate an aggregation query: only the SELECT prefix is checked.
pub fn validate_aggregation_query(sql: &str) -> DbResult<()> {
    if !starts_with_select(&normalize(sql)) {
        return Err(DbError::validation(error_messages::ONLY_SELECT_AGGREGATION));
    }
    Ok(())
}

/// Validate an export query: only the SELECT prefix is checked.
pub fn validate_export_query(sql: &str) -> DbResult<()> {
    if !starts_with_select(&normalize(sql)) {
        return Err(DbError::validation(error_messages::ONLY_SELECT));
    }
    Ok(())
}

/// Rewrite the LIMIT of an export query so it never exceeds `ceiling`.
///
/// The first LIMIT clause is rewritten when its row count is above the
/// ceiling: `LIMIT n`, MySQL's `LIMIT offset, n` and `LIMIT ALL` are all
/// recognized. Without a LIMIT clause, ` LIMIT {ceiling}` is appended (after
/// dropping a trailing semicolon). Smaller limits are kept.
///
/// This only bounds the text; the executor stops reading at the ceiling too.
pub fn cap_export_limit(sql: &str, ceiling: u32) -> String {
    let Some(captures) = LIMIT_CLAUSE.captures(sql) else {
        let base = sql.trim_end().trim_end_matches(';').trim_end();
        return format!("{} LIMIT {}", base, ceiling);
    };

    let count = &captures["count"];
    // Anything that overflows u64 is certainly above the ceiling
    let requested = if count.eq_ignore_ascii_case("all") {
        u64::MAX
    } else {
        count.parse::<u64>().unwrap_or(u64::MAX)
    };
    if requested <= u64::from(ceiling) {
        return sql.to_string();
    }

    let clause = match captures.name("offset") {
        Some(offset) => format!("LIMIT {}, {}", offset.as_str(), ceiling),
        None => format!("LIMIT {}", ceiling),
    };
    let span = captures.get(0).map(|m| m.range()).unwrap_or_default();
    format!("{}{}{}", &sql[..span.start], clause, &sql[span.end..])
}

/// Get the appropriate SQL dialect for the given database type.
fn get_dialect(db_type: DatabaseType) -> DbResult<Box<dyn Dialect>> {
    match db_type {
        DatabaseType::PostgreSQL => Ok(Box::new(PostgreSqlDialect {})),
        DatabaseType::MySQL => Ok(Box::new(MySqlDialect {})),
        DatabaseType::MongoDB => Err(DbError::invalid_input(
            "MongoDB queries are structured documents, not SQL",
        )),
    }
}

/// Strict gate: the text must parse as exactly one `Query` statement.
///
/// Applied on top of the shallow checks when strict SQL mode is enabled.
pub fn validate_single_select(sql: &str, db_type: DatabaseType) -> DbResult<()> {
    let dialect = get_dialect(db_type)?;

    let statements = Parser::parse_sql(dialect.as_ref(), sql).map_err(|e| {
        DbError::validation(format!("{} Error: {}", error_messages::PARSE_ERROR, e))
    })?;

    match statements.as_slice() {
        [] => Err(DbError::validation(error_messages::EMPTY)),
        [Statement::Query(_)] => Ok(()),
        [other] => Err(DbError::validation(format!(
            "{} statements are not allowed. Only read-only SELECT queries can run.",
            statement_name(other)
        ))),
        _ => Err(DbError::validation(error_messages::MULTIPLE_STATEMENTS)),
    }
}

/// Name of a rejected statement, for the error message.
fn statement_name(stmt: &Statement) -> &'static str {
    match stmt {
        Statement::Insert(_) => "INSERT",
        Statement::Update { .. } => "UPDATE",
        Statement::Delete(_) => "DELETE",
        Statement::Merge { .. } => "MERGE",
        Statement::Copy { .. } => "COPY",
        Statement::CreateTable { .. } => "CREATE TABLE",
        Statement::CreateView { .. } => "CREATE VIEW",
        Statement::CreateIndex(_) => "CREATE INDEX",
        Statement::AlterTable { .. } => "ALTER TABLE",
        Statement::Drop { .. } => "DROP",
        Statement::Truncate { .. } => "TRUNCATE",
        Statement::StartTransaction { .. } => "BEGIN",
        Statement::Commit { .. } => "COMMIT",
        Statement::Rollback { .. } => "ROLLBACK",
        Statement::Call { .. } => "CALL",
        Statement::Execute { .. } => "EXECUTE",
        Statement::Grant { .. } => "GRANT",
        Statement::Revoke { .. } => "REVOKE",
        Statement::Set(_) => "SET",
        Statement::Explain { .. } => "EXPLAIN",
        _ => "Non-SELECT",
    }
}
