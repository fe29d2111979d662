//! HTTP transport.
//!
//! Serves the REST API and, when a database is configured, nests the MCP
//! streamable HTTP service at the configured endpoint.

use crate::api::{AppState, create_router};
use crate::error::{DbError, DbResult};
use crate::mcp::QueryIqService;
use crate::transport::{Transport, wait_for_signal};
use axum::Router;
use rmcp::transport::streamable_http_server::{
    StreamableHttpService, session::local::LocalSessionManager,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// SSE connections may keep the server alive; exit this long after a signal.
const GRACEFUL_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpTransport {
    state: Arc<AppState>,
    mcp: Option<QueryIqService>,
    host: String,
    port: u16,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(
        state: Arc<AppState>,
        mcp: Option<QueryIqService>,
        host: impl Into<String>,
        port: u16,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            state,
            mcp,
            host: host.into(),
            port,
            endpoint: endpoint.into(),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// REST routes plus the MCP service, if any.
    pub fn router(&self) -> Router {
        let app = create_router(self.state.clone());
        let Some(mcp) = self.mcp.clone() else {
            return app;
        };

        let service = StreamableHttpService::new(
            move || Ok(mcp.clone()),
            LocalSessionManager::default().into(),
            Default::default(),
        );

        // nest_service does not accept "/"
        if self.endpoint == "/" {
            app.fallback_service(service)
        } else {
            app.nest_service(&self.endpoint, service)
        }
    }
}

impl Transport for HttpTransport {
    async fn run(&self) -> DbResult<()> {
        let bind_addr = self.bind_addr();
        info!("Starting HTTP server on {}", bind_addr);

        let app = self.router();

        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            DbError::connection(
                format!("Failed to bind to {}: {}", bind_addr, e),
                "Check that the port is available",
            )
        })?;

        if self.mcp.is_some() {
            info!(endpoint = %self.endpoint, "MCP endpoint ready");
        }
        info!("REST API ready");

        let shutdown_notify = Arc::new(tokio::sync::Notify::new());
        let shutdown_notify_clone = shutdown_notify.clone();
        let shutdown_token = self.state.shutdown.clone();

        let shutdown_signal = async move {
            wait_for_signal().await;
            shutdown_token.cancel();
            shutdown_notify_clone.notify_one();
        };

        let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal);

        // Server finishing normally vs forced exit after the shutdown signal
        tokio::select! {
            result = server => {
                match result {
                    Ok(()) => info!("HTTP server stopped"),
                    Err(e) => {
                        error!(error = %e, "HTTP server error");
                        return Err(DbError::internal(format!("HTTP server error: {}", e)));
                    }
                }
            }
            _ = async {
                shutdown_notify.notified().await;
                info!(
                    timeout_secs = GRACEFUL_TIMEOUT.as_secs(),
                    "Waiting for connections to close (send signal again to force exit)..."
                );

                tokio::select! {
                    _ = tokio::time::sleep(GRACEFUL_TIMEOUT) => {
                        warn!("Graceful shutdown timeout, forcing exit");
                    }
                    _ = wait_for_signal() => {
                        warn!("Received second signal, forcing immediate exit");
                    }
                }
            } => {}
        }

        info!("Closing database connections");
        self.state.executor.shutdown().await;

        Ok(())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
