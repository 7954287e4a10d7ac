//! Application state shared across components (web, scheduler).

use crate::refresh::RefreshPipeline;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use ts_rs::TS;

/// Health status of a service.
#[derive(Debug, Clone, Serialize, PartialEq, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum ServiceStatus {
    Starting,
    Active,
    Disabled,
    Error,
}

/// A timestamped status entry for a service.
#[derive(Debug, Clone)]
pub struct StatusEntry {
    pub status: ServiceStatus,
    pub updated_at: Instant,
}

/// Thread-safe registry for services to self-report their health status.
#[derive(Debug, Clone, Default)]
pub struct ServiceStatusRegistry {
    inner: Arc<DashMap<String, StatusEntry>>,
}

impl ServiceStatusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or updates the status for a named service.
    pub fn set(&self, name: &str, status: ServiceStatus) {
        self.inner.insert(
            name.to_owned(),
            StatusEntry {
                status,
                updated_at: Instant::now(),
            },
        );
    }

    /// Returns all statuses with how long each has been in its current state.
    pub fn all(&self) -> Vec<(String, ServiceStatus, Duration)> {
        self.inner
            .iter()
            .map(|entry| {
                (
                    entry.key().clone(),
                    entry.value().status.clone(),
                    entry.value().updated_at.elapsed(),
                )
            })
            .collect()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<RefreshPipeline>,
    pub service_statuses: ServiceStatusRegistry,
    /// Wakes the scheduler for an immediate refresh.
    pub refresh_trigger: Arc<Notify>,
    pub app_env: Arc<str>,
    pub health_window: Duration,
    pub admin_token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(pipeline: Arc<RefreshPipeline>, app_env: &str, health_window: Duration) -> Self {
        Self {
            pipeline,
            service_statuses: ServiceStatusRegistry::new(),
            refresh_trigger: Arc::new(Notify::new()),
            app_env: Arc::from(app_env),
            health_window,
            admin_token: None,
        }
    }

    pub fn with_admin_token(mut self, token: Option<String>) -> Self {
        self.admin_token = token.filter(|t| !t.is_empty()).map(Arc::from);
        self
    }
}
