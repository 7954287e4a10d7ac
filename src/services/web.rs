use crate::services::Service;
use crate::state::{AppState, ServiceStatus};
use crate::web::create_router;
use anyhow::Context;
use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{info, trace};

/// HTTP server exposing the snapshot reader API and operational endpoints.
pub struct WebService {
    port: u16,
    app_state: AppState,
}

impl WebService {
    pub fn new(port: u16, app_state: AppState) -> Self {
        Self { port, app_state }
    }
}

#[async_trait]
impl Service for WebService {
    fn name(&self) -> &'static str {
        "web"
    }

    async fn run(&mut self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<(), anyhow::Error> {
        let statuses = self.app_state.service_statuses.clone();
        statuses.set(self.name(), ServiceStatus::Starting);

        let app = create_router(self.app_state.clone());
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                statuses.set(self.name(), ServiceStatus::Error);
                return Err(e).with_context(|| format!("Failed to bind web server to {addr}"));
            }
        };

        statuses.set(self.name(), ServiceStatus::Active);
        info!(
            service = "web",
            address = %addr,
            link = format!("http://localhost:{}", self.port),
            "web server listening"
        );

        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                trace!(service = "web", "received shutdown signal, draining connections");
            })
            .await;

        if served.is_err() {
            statuses.set(self.name(), ServiceStatus::Error);
        } else {
            statuses.set(self.name(), ServiceStatus::Disabled);
        }
        served.context("Web server exited with an error")?;

        trace!(service = "web", "graceful shutdown completed");
        Ok(())
    }
}
