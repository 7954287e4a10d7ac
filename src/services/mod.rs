//! Long-running services hosted by the application.

use async_trait::async_trait;
use tokio::sync::broadcast;

pub mod manager;
pub mod scheduler;
pub mod signals;
pub mod web;

/// How a service's `run` ended.
#[derive(Debug)]
pub enum ServiceResult {
    /// Stopped after shutdown was requested.
    GracefulShutdown,
    /// Returned on its own without being asked to stop.
    NormalCompletion,
    Error(anyhow::Error),
}

/// A unit of work the [`manager::ServiceManager`] spawns and stops.
#[async_trait]
pub trait Service: Send {
    fn name(&self) -> &'static str;

    /// Runs until the service finishes or `shutdown_rx` fires, finishing any
    /// in-flight work before returning.
    async fn run(&mut self, shutdown_rx: broadcast::Receiver<()>) -> Result<(), anyhow::Error>;
}

/// Drive a service to completion, turning its result into a [`ServiceResult`].
///
/// `stop_rx` is a second subscription to the same shutdown channel, used to
/// tell a requested stop apart from the service returning on its own.
pub async fn run_service(
    mut service: Box<dyn Service>,
    shutdown_rx: broadcast::Receiver<()>,
    mut stop_rx: broadcast::Receiver<()>,
) -> ServiceResult {
    let name = service.name();
    tracing::info!(service = name, "service started");

    let result = match service.run(shutdown_rx).await {
        Ok(()) if stop_rx.try_recv().is_ok() => ServiceResult::GracefulShutdown,
        Ok(()) => ServiceResult::NormalCompletion,
        Err(e) => ServiceResult::Error(e),
    };

    tracing::info!(service = name, ?result, "service exited");
    result
}
