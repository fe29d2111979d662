//! Configuration handling for QueryIQ.
//!
//! This module provides configuration management via CLI arguments and environment variables.

use crate::models::{DatabaseTarget, DatabaseType, PaginationConfig};
use clap::{Parser, ValueEnum};
use std::time::Duration;
use url::Url;

pub const DEFAULT_HTTP_HOST: &str = "127.0.0.1";
pub const DEFAULT_HTTP_PORT: u16 = 8080;
pub const DEFAULT_MCP_ENDPOINT: &str = "/mcp";
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_EXPORT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

// Result governance defaults
pub const DEFAULT_MAX_ROWS_PER_PAGE: u32 = 50;
pub const DEFAULT_MAX_ROWS_BEFORE_EXPORT: u32 = 100;
pub const DEFAULT_MAX_TOKENS_FOR_RESULTS: u32 = 4000;
pub const DEFAULT_MAX_EXPORT_ROWS: u32 = 50_000;

/// Transport mode for the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum TransportMode {
    /// MCP over standard input/output (one configured database)
    #[default]
    Stdio,
    /// REST API plus MCP over streamable HTTP
    Http,
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdio => write!(f, "stdio"),
            Self::Http => write!(f, "http"),
        }
    }
}

/// How tool invocations obtain database connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ConnectionStrategyKind {
    /// Open a connection per invocation and close it afterwards
    #[default]
    Fresh,
    /// Reuse per-target pools for the lifetime of the process
    Pooled,
}

impl std::fmt::Display for ConnectionStrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fresh => write!(f, "fresh"),
            Self::Pooled => write!(f, "pooled"),
        }
    }
}

/// Configuration for QueryIQ.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "queryiq",
    about = "Query-mediation layer exposing governed, read-only database tools to language models",
    version,
    author
)]
pub struct Config {
    /// Transport mode (stdio or http)
    #[arg(
        short,
        long,
        value_enum,
        default_value = "stdio",
        env = "QUERYIQ_TRANSPORT"
    )]
    pub transport: TransportMode,

    /// HTTP host to bind to (only used with http transport)
    #[arg(
        long,
        default_value = DEFAULT_HTTP_HOST,
        env = "QUERYIQ_HTTP_HOST"
    )]
    pub http_host: String,

    /// HTTP port to bind to (only used with http transport)
    #[arg(
        long,
        default_value_t = DEFAULT_HTTP_PORT,
        env = "QUERYIQ_HTTP_PORT"
    )]
    pub http_port: u16,

    /// MCP endpoint path (only used with http transport)
    #[arg(
        long,
        default_value = DEFAULT_MCP_ENDPOINT,
        env = "QUERYIQ_MCP_ENDPOINT"
    )]
    pub mcp_endpoint: String,

    /// Database served over MCP. Required for stdio, optional for http.
    #[arg(short = 'd', long, value_name = "URL", env = "QUERYIQ_DATABASE_URL")]
    pub database_url: Option<String>,

    /// Database type (postgres, postgresql, mysql, mongodb). Inferred from the URL when omitted.
    #[arg(long, env = "QUERYIQ_DB_TYPE")]
    pub db_type: Option<String>,

    /// Secret used to encrypt stored connection strings. Required for http transport.
    #[arg(long, env = "QUERYIQ_ENCRYPTION_SECRET", hide_env_values = true)]
    pub encryption_secret: Option<String>,

    /// Statement timeout for interactive queries in seconds
    #[arg(
        long,
        default_value_t = DEFAULT_QUERY_TIMEOUT_SECS,
        env = "QUERYIQ_QUERY_TIMEOUT"
    )]
    pub query_timeout: u64,

    /// Statement timeout for exports in seconds
    #[arg(
        long,
        default_value_t = DEFAULT_EXPORT_TIMEOUT_SECS,
        env = "QUERYIQ_EXPORT_TIMEOUT"
    )]
    pub export_timeout: u64,

    /// Connection timeout in seconds
    #[arg(
        long,
        default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS,
        env = "QUERYIQ_CONNECT_TIMEOUT"
    )]
    pub connect_timeout: u64,

    /// Rows per page; also the LIMIT ceiling quoted to the model
    #[arg(
        long,
        default_value_t = DEFAULT_MAX_ROWS_PER_PAGE,
        env = "QUERYIQ_MAX_ROWS_PER_PAGE"
    )]
    pub max_rows_per_page: u32,

    /// Row count above which an export is recommended
    #[arg(
        long,
        default_value_t = DEFAULT_MAX_ROWS_BEFORE_EXPORT,
        env = "QUERYIQ_MAX_ROWS_BEFORE_EXPORT"
    )]
    pub max_rows_before_export: u32,

    /// Estimated token budget for inline results
    #[arg(
        long,
        default_value_t = DEFAULT_MAX_TOKENS_FOR_RESULTS,
        env = "QUERYIQ_MAX_TOKENS_FOR_RESULTS"
    )]
    pub max_tokens_for_results: u32,

    /// Hard ceiling on exported rows
    #[arg(
        long,
        default_value_t = DEFAULT_MAX_EXPORT_ROWS,
        env = "QUERYIQ_MAX_EXPORT_ROWS"
    )]
    pub max_export_rows: u32,

    /// Connection strategy (fresh or pooled)
    #[arg(
        long,
        value_enum,
        default_value = "fresh",
        env = "QUERYIQ_CONNECTION_STRATEGY"
    )]
    pub connection_strategy: ConnectionStrategyKind,

    /// Also require SQL to parse as exactly one SELECT statement
    #[arg(long, env = "QUERYIQ_STRICT_SQL")]
    pub strict_sql: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "QUERYIQ_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "QUERYIQ_JSON_LOGS")]
    pub json_logs: bool,

    /// Enable logging output (disabled by default to avoid interfering with stdio transport)
    #[arg(long, env = "QUERYIQ_ENABLE_LOGS")]
    pub enable_logs: bool,
}

impl Config {
    /// Parse configuration from command line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Create a default configuration (useful for testing).
    pub fn default_config() -> Self {
        Self {
            transport: TransportMode::Stdio,
            http_host: DEFAULT_HTTP_HOST.to_string(),
            http_port: DEFAULT_HTTP_PORT,
            mcp_endpoint: DEFAULT_MCP_ENDPOINT.to_string(),
            database_url: None,
            db_type: None,
            encryption_secret: None,
            query_timeout: DEFAULT_QUERY_TIMEOUT_SECS,
            export_timeout: DEFAULT_EXPORT_TIMEOUT_SECS,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT_SECS,
            max_rows_per_page: DEFAULT_MAX_ROWS_PER_PAGE,
            max_rows_before_export: DEFAULT_MAX_ROWS_BEFORE_EXPORT,
            max_tokens_for_results: DEFAULT_MAX_TOKENS_FOR_RESULTS,
            max_export_rows: DEFAULT_MAX_EXPORT_ROWS,
            connection_strategy: ConnectionStrategyKind::Fresh,
            strict_sql: false,
            log_level: "info".to_string(),
            json_logs: false,
            enable_logs: false,
        }
    }

    /// Check cross-field constraints clap cannot express.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_rows_per_page == 0 {
            return Err("max_rows_per_page must be greater than 0".to_string());
        }
        if self.max_tokens_for_results == 0 {
            return Err("max_tokens_for_results must be greater than 0".to_string());
        }
        if self.max_export_rows == 0 {
            return Err("max_export_rows must be greater than 0".to_string());
        }
        if self.max_rows_before_export < self.max_rows_per_page {
            return Err(format!(
                "max_rows_before_export ({}) cannot be below max_rows_per_page ({})",
                self.max_rows_before_export, self.max_rows_per_page
            ));
        }
        if self.transport == TransportMode::Stdio && self.database_url.is_none() {
            return Err("--database-url is required for the stdio transport".to_string());
        }
        if self.transport == TransportMode::Http && self.encryption_secret.is_none() {
            return Err("--encryption-secret is required for the http transport".to_string());
        }
        Ok(())
    }

    /// Result governance thresholds as an explicit value.
    pub fn pagination(&self) -> PaginationConfig {
        PaginationConfig {
            max_rows_per_page: self.max_rows_per_page,
            max_rows_before_export: self.max_rows_before_export,
            max_tokens_for_results: self.max_tokens_for_results,
        }
    }

    /// Resolve the MCP target from `--database-url` and `--db-type`.
    pub fn database_target(&self) -> Result<Option<DatabaseTarget>, String> {
        let Some(url) = self.database_url.as_deref() else {
            return Ok(None);
        };
        Url::parse(url).map_err(|e| format!("Invalid database URL: {e}"))?;

        let kind = match self.db_type.as_deref() {
            Some(name) => DatabaseType::parse(name).map_err(|e| e.to_string())?,
            None => DatabaseType::from_connection_string(url).ok_or_else(|| {
                "Cannot infer the database type from the URL; pass --db-type".to_string()
            })?,
        };

        Ok(Some(DatabaseTarget::new(url, kind)))
    }

    /// Get the HTTP bind address.
    pub fn http_bind_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }

    /// Get the query timeout as a Duration.
    pub fn query_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.query_timeout)
    }

    /// Get the export timeout as a Duration.
    pub fn export_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.export_timeout)
    }

    /// Get the connection timeout as a Duration.
    pub fn connect_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}
