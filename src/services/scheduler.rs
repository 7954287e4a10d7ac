use crate::refresh::RefreshScheduler;
use crate::services::Service;
use crate::state::{ServiceStatus, ServiceStatusRegistry};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Hosts the periodic snapshot refresh loop.
pub struct SchedulerService {
    scheduler: Arc<RefreshScheduler>,
    service_statuses: ServiceStatusRegistry,
}

impl SchedulerService {
    pub fn new(scheduler: Arc<RefreshScheduler>, service_statuses: ServiceStatusRegistry) -> Self {
        Self {
            scheduler,
            service_statuses,
        }
    }
}

#[async_trait]
impl Service for SchedulerService {
    fn name(&self) -> &'static str {
        "scheduler"
    }

    async fn run(&mut self, shutdown_rx: broadcast::Receiver<()>) -> Result<(), anyhow::Error> {
        self.service_statuses.set(self.name(), ServiceStatus::Active);
        self.scheduler.run(shutdown_rx).await;
        self.service_statuses.set(self.name(), ServiceStatus::Disabled);
        Ok(())
    }
}
