//! QueryIQ library.
//!
//! A query-mediation layer between a language model and PostgreSQL, MySQL or
//! MongoDB databases: read-only tools with validation, result governance and
//! pagination, served over REST and MCP.

pub mod api;
pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod mcp;
pub mod models;
pub mod store;
pub mod tools;
pub mod transport;

pub use config::Config;
pub use error::{DbError, DbResult};
pub use mcp::QueryIqService;
pub use tools::ToolRegistry;
