//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - Per-invocation sessions with a swappable connection strategy
//! - Connection pool management for the pooled strategy
//! - Query execution with timeouts and cancellation
//! - Lightweight schema lookup and one-shot introspection
//! - Row and document conversion to JSON

pub mod decode;
pub mod document;
pub mod executor;
pub mod introspection;
pub mod pool;
pub mod schema;
pub mod session;

pub use executor::{QueryExecutor, QueryOutput, within_session};
pub use introspection::Introspector;
pub use pool::{DbPool, PoolSettings, PooledConnections};
pub use schema::SchemaInspector;
pub use session::{ConnectionStrategy, DbSession};
