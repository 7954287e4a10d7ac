use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::services::{Service, ServiceResult, run_service};

/// Spawns registered services and coordinates their shutdown.
pub struct ServiceManager {
    registered_services: HashMap<String, Box<dyn Service>>,
    running_services: HashMap<String, JoinHandle<ServiceResult>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Default for ServiceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceManager {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            registered_services: HashMap::new(),
            running_services: HashMap::new(),
            shutdown_tx,
        }
    }

    /// Register a service to be started by [`Self::spawn_all`].
    pub fn register_service(&mut self, name: &str, service: Box<dyn Service>) {
        trace!(service = name, "registering service");
        self.registered_services.insert(name.to_string(), service);
    }

    pub fn has_services(&self) -> bool {
        !self.registered_services.is_empty()
    }

    /// Spawn every registered service onto its own task.
    pub fn spawn_all(&mut self) {
        let service_count = self.registered_services.len();
        let service_names: Vec<_> = self.registered_services.keys().cloned().collect();

        for (name, service) in self.registered_services.drain() {
            let shutdown_rx = self.shutdown_tx.subscribe();
            let stop_rx = self.shutdown_tx.subscribe();
            let handle = tokio::spawn(run_service(service, shutdown_rx, stop_rx));
            self.running_services.insert(name, handle);
        }

        info!(
            service_count,
            services = ?service_names,
            "spawned {} services",
            service_count
        );
    }

    /// Wait for the first service to exit on its own.
    ///
    /// Returns the name of that service and how it ended. Any service exiting
    /// is treated as fatal for the process.
    pub async fn run(&mut self) -> (String, ServiceResult) {
        if self.running_services.is_empty() {
            return (
                "none".to_string(),
                ServiceResult::Error(anyhow::anyhow!("No services to run")),
            );
        }

        let (completed, result) = {
            let futures = self.running_services.iter_mut().map(|(name, handle)| {
                let name = name.clone();
                Box::pin(async move {
                    let result = handle.await;
                    (name, result)
                })
            });
            let ((name, result), _, _) = futures::future::select_all(futures).await;
            (name, result)
        };

        self.running_services.remove(&completed);
        let result = result.unwrap_or_else(|e| {
            ServiceResult::Error(anyhow::anyhow!("service task panicked: {e}"))
        });
        (completed, result)
    }

    /// Signal every running service to stop and wait up to `timeout` in total.
    ///
    /// Returns the elapsed time on success, or the names of the services that
    /// did not stop in time.
    pub async fn shutdown(&mut self, timeout: Duration) -> Result<Duration, Vec<String>> {
        let service_count = self.running_services.len();
        info!(service_count, "shutting down services");

        let start = std::time::Instant::now();
        let _ = self.shutdown_tx.send(());

        let mut pending = Vec::new();
        for (name, handle) in self.running_services.drain() {
            let remaining = timeout.saturating_sub(start.elapsed());
            match tokio::time::timeout(remaining, handle).await {
                Ok(Ok(result)) => debug!(service = %name, ?result, "service stopped"),
                Ok(Err(e)) => warn!(service = %name, error = ?e, "service task failed during shutdown"),
                Err(_) => {
                    warn!(service = %name, "service did not stop within timeout");
                    pending.push(name);
                }
            }
        }

        if pending.is_empty() {
            Ok(start.elapsed())
        } else {
            Err(pending)
        }
    }
}
