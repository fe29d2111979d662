//! Connection-related data models.
//!
//! This module defines the closed set of backend kinds and the request-scoped
//! database target.

use crate::error::{DbError, DbResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Supported database types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    PostgreSQL,
    /// Includes MariaDB
    MySQL,
    MongoDB,
}

impl DatabaseType {
    /// Parse a user-supplied type name (trimmed, case-insensitive).
    ///
    /// Accepts `postgres`, `postgresql`, `mysql` and `mongodb`.
    pub fn parse(name: &str) -> DbResult<Self> {
        match name.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::PostgreSQL),
            "mysql" => Ok(Self::MySQL),
            "mongodb" => Ok(Self::MongoDB),
            _ => Err(DbError::unsupported_database(name.trim())),
        }
    }

    /// Parse database type from a connection string.
    pub fn from_connection_string(connection_string: &str) -> Option<Self> {
        let lower = connection_string.trim().to_lowercase();
        if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
            Some(Self::PostgreSQL)
        } else if lower.starts_with("mysql://") || lower.starts_with("mariadb://") {
            Some(Self::MySQL)
        } else if lower.starts_with("mongodb://") || lower.starts_with("mongodb+srv://") {
            Some(Self::MongoDB)
        } else {
            None
        }
    }

    /// Get the display name for this database type.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "PostgreSQL",
            Self::MySQL => "MySQL",
            Self::MongoDB => "MongoDB",
        }
    }

    /// Canonical lowercase identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "postgresql",
            Self::MySQL => "mysql",
            Self::MongoDB => "mongodb",
        }
    }

    /// True for the SQL backends.
    pub fn is_relational(&self) -> bool {
        matches!(self, Self::PostgreSQL | Self::MySQL)
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// A decrypted connection string plus its backend kind.
///
/// Lives for one request only. `Debug` never prints the connection string.
#[derive(Clone)]
pub struct DatabaseTarget {
    connection_string: String,
    kind: DatabaseType,
}

impl DatabaseTarget {
    pub fn new(connection_string: impl Into<String>, kind: DatabaseType) -> Self {
        Self {
            connection_string: connection_string.into(),
            kind,
        }
    }

    /// Build a target whose kind is inferred from the URL scheme.
    pub fn from_connection_string(connection_string: impl Into<String>) -> DbResult<Self> {
        let connection_string = connection_string.into();
        let kind = DatabaseType::from_connection_string(&connection_string).ok_or_else(|| {
            DbError::invalid_input("Cannot infer the database type from the connection string")
        })?;
        Ok(Self::new(connection_string, kind))
    }

    /// Contains sensitive data - never log
    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    pub fn kind(&self) -> DatabaseType {
        self.kind
    }

    /// Get a display-safe version of the connection string (credentials masked).
    pub fn masked(&self) -> String {
        if let Some(at_pos) = self.connection_string.rfind('@') {
            if let Some(scheme_end) = self.connection_string.find("://") {
                let credentials = &self.connection_string[scheme_end + 3..at_pos];
                if let Some(colon_pos) = credentials.find(':') {
                    let prefix = &self.connection_string[..scheme_end + 3 + colon_pos + 1];
                    let suffix = &self.connection_string[at_pos..];
                    return format!("{}****{}", prefix, suffix);
                }
            }
        }
        self.connection_string.clone()
    }
}

impl std::fmt::Debug for DatabaseTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseTarget")
            .field("connection_string", &self.masked())
            .field("kind", &self.kind)
            .finish()
    }
}
