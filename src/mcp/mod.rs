//! MCP server integration module.
//!
//! Exposes one target's tool registry over the MCP protocol using rmcp.

pub mod service;

pub use service::QueryIqService;
