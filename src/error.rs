//! Error types for QueryIQ.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Tool failures are rendered back to the model as data, so every message here is
//! written to be read by a language model deciding what to try next.

use axum::http::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Supported database type names, in the order they are reported to users.
pub const SUPPORTED_DATABASE_TYPES: &str = "postgres, postgresql, mysql, mongodb";

#[derive(Error, Debug)]
pub enum DbError {
    #[error("{message}")]
    Connection { message: String, suggestion: String },

    #[error("{message}")]
    QueryExecution {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        suggestion: String,
    },

    /// Rejected by the query validator before reaching a connection.
    #[error("{message}")]
    Validation { message: String },

    #[error(
        "Unsupported database type: {db_type}. Supported types: postgres, postgresql, mysql, mongodb"
    )]
    UnsupportedDatabase { db_type: String },

    #[error("Unsupported MongoDB operation: {operation}")]
    UnsupportedOperation { operation: String },

    /// Connected, but a catalog or stats query failed.
    #[error("Failed to introspect {db_type} database: {message}")]
    Introspection { db_type: String, message: String },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u32,
    },

    #[error("Cancelled: {operation}")]
    Cancelled { operation: String },

    #[error("Encryption error: {message}")]
    Encryption { message: String },

    #[error("Project not found")]
    ProjectNotFound { project_id: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a query execution error with optional SQL state.
    pub fn query_execution(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::QueryExecution {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn unsupported_database(db_type: impl Into<String>) -> Self {
        Self::UnsupportedDatabase {
            db_type: db_type.into(),
        }
    }

    pub fn unsupported_operation(operation: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            operation: operation.into(),
        }
    }

    pub fn introspection(db_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Introspection {
            db_type: db_type.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_secs: u32) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    /// Map a pool failure, reporting the pool's own acquire timeout.
    pub fn from_pool(err: sqlx::Error, acquire_timeout: Duration) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => Self::timeout(
                "connection pool acquire",
                u32::try_from(acquire_timeout.as_secs()).unwrap_or(u32::MAX),
            ),
            other => other.into(),
        }
    }

    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    pub fn encryption(message: impl Into<String>) -> Self {
        Self::Encryption {
            message: message.into(),
        }
    }

    pub fn project_not_found(project_id: impl Into<String>) -> Self {
        Self::ProjectNotFound {
            project_id: project_id.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::QueryExecution { suggestion, .. } => Some(suggestion),
            Self::Validation { .. } => {
                Some("Rewrite the query as a single SELECT statement with a LIMIT clause")
            }
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }

    /// HTTP status used by the REST surface.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation { .. }
            | Self::InvalidInput { .. }
            | Self::UnsupportedDatabase { .. }
            | Self::UnsupportedOperation { .. } => StatusCode::BAD_REQUEST,
            Self::ProjectNotFound { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown when project creation or refresh fails during introspection.
    pub fn user_message(&self) -> String {
        match self {
            Self::Connection { .. } | Self::Timeout { .. } => {
                "Failed to connect to database. Check your connection string and credentials."
                    .to_string()
            }
            Self::Introspection { .. } => {
                "Failed to read database schema. Ensure proper permissions.".to_string()
            }
            Self::UnsupportedDatabase { .. }
            | Self::InvalidInput { .. }
            | Self::ProjectNotFound { .. } => self.to_string(),
            _ => "Unexpected error while analyzing the database.".to_string(),
        }
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::query_execution(
                    db_err.message(),
                    code,
                    "Check the SQL syntax and referenced objects",
                )
            }
            sqlx::Error::RowNotFound => DbError::query_execution(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            sqlx::Error::PoolTimedOut => DbError::connection(
                "Timed out waiting for a database connection",
                "The database may be overloaded or unreachable; retry shortly",
            ),
            sqlx::Error::PoolClosed => {
                DbError::connection("Connection pool is closed", "Reconnect to the database")
            }
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::TypeNotFound { type_name } => DbError::query_execution(
                format!("Type not found: {}", type_name),
                None,
                "Check the types referenced by the query",
            ),
            sqlx::Error::ColumnNotFound(col) => DbError::query_execution(
                format!("Column not found: {}", col),
                None,
                "Call getSchema to check the available columns",
            ),
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => DbError::internal(format!(
                "Column index {} out of bounds (len: {})",
                index, len
            )),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::AnyDriverError(err) => DbError::connection(
                format!("Driver error: {}", err),
                "Check database driver configuration",
            ),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Convert MongoDB driver errors to DbError.
impl From<mongodb::error::Error> for DbError {
    fn from(err: mongodb::error::Error) -> Self {
        use mongodb::error::ErrorKind;

        match err.kind.as_ref() {
            ErrorKind::Authentication { message, .. } => DbError::connection(
                format!("Authentication failed: {}", message),
                "Verify the username and password in the connection string",
            ),
            ErrorKind::ServerSelection { message, .. } => DbError::connection(
                message.clone(),
                "Check that the MongoDB server is running and reachable",
            ),
            ErrorKind::DnsResolve { message, .. } => DbError::connection(
                format!("DNS resolution failed: {}", message),
                "Check the host name in the connection string",
            ),
            ErrorKind::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            ErrorKind::InvalidArgument { message, .. } => DbError::query_execution(
                message.clone(),
                None,
                "Check the filter, sort and pipeline documents",
            ),
            ErrorKind::Command(command) => DbError::query_execution(
                command.message.clone(),
                Some(command.code.to_string()),
                "Check the collection name and query operators",
            ),
            _ => DbError::query_execution(
                err.to_string(),
                None,
                "Check the collection name and query operators",
            ),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// Build suggestion data as JSON value.
fn suggestion_data(suggestion: Option<&str>) -> Option<serde_json::Value> {
    suggestion.map(|s| serde_json::json!({ "suggestion": s }))
}

/// Convert DbError to MCP ErrorData for semantic error categorization.
/// Includes the suggestion field in the `data` object when available.
impl From<DbError> for rmcp::ErrorData {
    fn from(err: DbError) -> Self {
        match &err {
            DbError::Validation { .. }
            | DbError::InvalidInput { .. }
            | DbError::UnsupportedDatabase { .. }
            | DbError::UnsupportedOperation { .. } => {
                rmcp::ErrorData::invalid_params(err.to_string(), suggestion_data(err.suggestion()))
            }

            DbError::ProjectNotFound { .. } => rmcp::ErrorData::resource_not_found(
                err.to_string(),
                suggestion_data(Some("Check the project identifier")),
            ),

            DbError::Timeout { .. } => rmcp::ErrorData::internal_error(
                err.to_string(),
                suggestion_data(Some(
                    "Narrow the query with filters or aggregations, or export instead",
                )),
            ),

            DbError::QueryExecution {
                message,
                sql_state,
                suggestion,
            } => {
                let msg = match sql_state {
                    Some(code) => format!("{} (SQLSTATE: {})", message, code),
                    None => message.clone(),
                };
                rmcp::ErrorData::invalid_params(msg, suggestion_data(Some(suggestion)))
            }

            DbError::Connection { .. }
            | DbError::Introspection { .. }
            | DbError::Cancelled { .. }
            | DbError::Encryption { .. }
            | DbError::Internal { .. } => {
                rmcp::ErrorData::internal_error(err.to_string(), suggestion_data(err.suggestion()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_timeout_reports_configured_wait() {
        let err = DbError::from_pool(sqlx::Error::PoolTimedOut, Duration::from_secs(7));
        assert!(matches!(err, DbError::Timeout { elapsed_secs: 7, .. }));
        assert_eq!(err.to_string(), "Timeout: connection pool acquire exceeded 7s");

        let err = DbError::from_pool(sqlx::Error::PoolClosed, Duration::from_secs(7));
        assert!(matches!(err, DbError::Connection { .. }));

        let err: DbError = sqlx::Error::PoolTimedOut.into();
        assert!(!err.to_string().contains("30"));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = DbError::connection("Failed to connect", "Check credentials");
        assert_eq!(err.to_string(), "Failed to connect");
    }

    #[test]
    fn test_validation_message_is_verbatim() {
        let err = DbError::validation("Only SELECT queries are allowed");
        assert_eq!(err.to_string(), "Only SELECT queries are allowed");
    }

    #[test]
    fn test_unsupported_database_names_supported_set() {
        let err = DbError::unsupported_database("oracle");
        assert_eq!(
            err.to_string(),
            "Unsupported database type: oracle. Supported types: postgres, postgresql, mysql, mongodb"
        );
    }

    #[test]
    fn test_unsupported_operation_message() {
        let err = DbError::unsupported_operation("deleteMany");
        assert_eq!(err.to_string(), "Unsupported MongoDB operation: deleteMany");
    }

    #[test]
    fn test_error_suggestion() {
        let err = DbError::query_execution(
            "Syntax error",
            Some("42601".to_string()),
            "Check SQL syntax",
        );
        assert_eq!(err.suggestion(), Some("Check SQL syntax"));
    }

    #[test]
    fn test_error_retryable() {
        assert!(DbError::timeout("connect", 10).is_retryable());
        assert!(DbError::connection("err", "sugg").is_retryable());
        assert!(!DbError::validation("bad").is_retryable());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            DbError::validation("x").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            DbError::project_not_found("p1").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            DbError::connection("x", "y").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_user_message_by_failure_class() {
        assert!(
            DbError::connection("refused", "")
                .user_message()
                .starts_with("Failed to connect to database")
        );
        assert!(
            DbError::introspection("PostgreSQL", "denied")
                .user_message()
                .starts_with("Failed to read database schema")
        );
        assert!(
            DbError::unsupported_database("oracle")
                .user_message()
                .contains("oracle")
        );
    }

    #[test]
    fn test_validation_maps_to_invalid_params() {
        let mcp_err: rmcp::ErrorData = DbError::validation("bad").into();
        assert_eq!(mcp_err.code.0, -32602);
    }

    #[test]
    fn test_project_not_found_maps_to_resource_not_found() {
        let mcp_err: rmcp::ErrorData = DbError::project_not_found("p1").into();
        assert_eq!(mcp_err.code.0, -32002);
    }

    #[test]
    fn test_connection_maps_to_internal_error() {
        let mcp_err: rmcp::ErrorData = DbError::connection("failed", "try again").into();
        assert_eq!(mcp_err.code.0, -32603);
        let data = mcp_err.data.unwrap();
        assert_eq!(data["suggestion"], "try again");
    }

    #[test]
    fn test_query_execution_includes_sql_state() {
        let err = DbError::query_execution("syntax error", Some("42601".to_string()), "check");
        let mcp_err: rmcp::ErrorData = err.into();
        assert!(mcp_err.message.contains("42601"));
    }
}
