//! Per-invocation database sessions.
//!
//! A session is acquired at the start of one tool call and released on every
//! exit path. The strategy decides whether release tears the connection down
//! (`Fresh`) or leaves a shared pool running (`Pooled`).

use crate::config::{Config, ConnectionStrategyKind};
use crate::db::pool::{DbPool, PoolSettings, PooledConnections};
use crate::error::DbResult;
use crate::models::{DatabaseTarget, DatabaseType};
use std::time::Duration;
use tracing::{debug, warn};

/// How sessions obtain their connection.
#[derive(Debug, Clone)]
pub enum ConnectionStrategy {
    /// Connect for each invocation, close afterwards.
    Fresh { connect_timeout: Duration },
    /// Reuse a per-target pool.
    Pooled(PooledConnections),
}

impl ConnectionStrategy {
    pub fn new(kind: ConnectionStrategyKind, connect_timeout: Duration) -> Self {
        match kind {
            ConnectionStrategyKind::Fresh => Self::Fresh { connect_timeout },
            ConnectionStrategyKind::Pooled => Self::Pooled(PooledConnections::new(connect_timeout)),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.connection_strategy, config.connect_timeout_duration())
    }

    pub fn kind(&self) -> ConnectionStrategyKind {
        match self {
            Self::Fresh { .. } => ConnectionStrategyKind::Fresh,
            Self::Pooled(_) => ConnectionStrategyKind::Pooled,
        }
    }

    /// Always a single-use connection, regardless of strategy.
    ///
    /// Introspection uses this: it runs once per project lifecycle event and
    /// should not leave a pool behind.
    pub fn one_shot(&self) -> Self {
        match self {
            Self::Fresh { connect_timeout } => Self::Fresh {
                connect_timeout: *connect_timeout,
            },
            Self::Pooled(pools) => Self::Fresh {
                connect_timeout: pools.settings().connect_timeout,
            },
        }
    }

    /// Acquire a session for the target.
    pub async fn open(&self, target: &DatabaseTarget) -> DbResult<DbSession> {
        match self {
            Self::Fresh { connect_timeout } => {
                let pool = DbPool::connect(target, PoolSettings::single(*connect_timeout)).await?;
                Ok(DbSession { pool, owned: true })
            }
            Self::Pooled(pools) => {
                let pool = pools.get_or_connect(target).await?;
                Ok(DbSession { pool, owned: false })
            }
        }
    }

    /// Release everything the strategy holds.
    pub async fn shutdown(&self) {
        if let Self::Pooled(pools) = self {
            pools.close_all().await;
        }
    }
}

/// A live connection for the duration of one invocation.
#[derive(Debug)]
pub struct DbSession {
    pool: DbPool,
    owned: bool,
}

impl DbSession {
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn db_type(&self) -> DatabaseType {
        self.pool.db_type()
    }

    /// Release the session. Owned connections are closed here.
    pub async fn close(self) {
        if !self.owned {
            return;
        }
        let db_type = self.pool.db_type();
        let close = self.pool.close();
        if tokio::time::timeout(Duration::from_secs(5), close).await.is_err() {
            warn!(db_type = %db_type, "Timed out closing database connection");
        } else {
            debug!(db_type = %db_type, "Closed database connection");
        }
    }
}
