//! HTTP server with graceful shutdown

use super::api::build_router;
use super::state::AppState;
use crate::config::ServerConfig;
use crate::shutdown::ShutdownCoordinator;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

pub struct NoteServer {
    state: Arc<AppState>,
    config: ServerConfig,
    shutdown: Arc<ShutdownCoordinator>,
}

impl NoteServer {
    pub fn new(state: AppState, config: ServerConfig, shutdown: Arc<ShutdownCoordinator>) -> Self {
        Self {
            state: Arc::new(state),
            config,
            shutdown,
        }
    }

    /// Bind the configured address and serve until shutdown
    pub async fn run(self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_address)
            .await
            .with_context(|| format!("Failed to bind {}", self.config.bind_address))?;
        self.run_with_listener(listener).await
    }

    /// Serve on an already bound listener until shutdown.
    ///
    /// Once shutdown is triggered, in-flight requests get the coordinator's
    /// drain timeout to finish; connections still open after that are dropped.
    pub async fn run_with_listener(self, listener: TcpListener) -> Result<()> {
        let addr = listener.local_addr()?;
        let router = build_router(self.state, self.config.request_timeout);

        let graceful = {
            let shutdown = self.shutdown.clone();
            async move { shutdown.wait().await }
        };
        let mut server = tokio::spawn(async move {
            axum::serve(listener, router).with_graceful_shutdown(graceful).await
        });
        info!("Note server listening on {}", addr);

        tokio::select! {
            result = &mut server => {
                result.context("Server task panicked")??;
                return Ok(());
            }
            _ = self.shutdown.wait() => {}
        }

        let drain = self.shutdown.drain_timeout();
        match tokio::time::timeout(drain, &mut server).await {
            Ok(result) => {
                result.context("Server task panicked")??;
                info!("Note server stopped");
            }
            Err(_) => {
                warn!(?drain, "Drain timeout elapsed, dropping open connections");
                server.abort();
            }
        }
        Ok(())
    }
}
