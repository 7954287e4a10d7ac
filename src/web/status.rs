//! Health and status handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::trace;
use ts_rs::TS;

use crate::refresh::RefreshPhase;
use crate::state::{AppState, ServiceStatus};
use crate::web::routes::{cache, with_cache_control};

#[derive(Serialize, TS)]
#[ts(export)]
pub struct HealthResponse {
    status: &'static str,
    env: String,
    version: String,
    commit: String,
    timestamp: String,
}

#[derive(Serialize, TS)]
#[ts(export)]
pub struct ServiceInfo {
    name: String,
    status: ServiceStatus,
}

#[derive(Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RefreshInfo {
    phase: RefreshPhase,
    last_success: Option<DateTime<Utc>>,
    last_attempt: Option<DateTime<Utc>>,
    consecutive_failures: u32,
    /// True if the last successful refresh is within the health window.
    fresh: bool,
    health_window_secs: u64,
}

#[derive(Serialize, TS)]
#[ts(export)]
pub struct StatusResponse {
    status: ServiceStatus,
    version: String,
    commit: String,
    services: BTreeMap<String, ServiceInfo>,
    refresh: RefreshInfo,
}

/// Liveness probe. Always 200 while the process can serve requests.
pub(super) async fn health(State(state): State<AppState>) -> Response {
    trace!("health check requested");
    with_cache_control(
        HealthResponse {
            status: "healthy",
            env: state.app_env.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            commit: env!("GIT_COMMIT_SHORT").to_string(),
            timestamp: Utc::now().to_rfc3339(),
        },
        cache::NO_STORE,
    )
}

/// Readiness: per-service status plus refresh freshness. 503 when unhealthy.
pub(super) async fn status(State(state): State<AppState>) -> Response {
    let mut services = BTreeMap::new();

    for (name, svc_status, _) in state.service_statuses.all() {
        services.insert(
            name.clone(),
            ServiceInfo {
                name,
                status: svc_status,
            },
        );
    }

    let health = state.pipeline.health();
    let fresh = health.is_healthy(state.health_window, Utc::now());

    let any_error = services
        .values()
        .any(|s| matches!(s.status, ServiceStatus::Error));
    let overall_status = if any_error || !fresh {
        ServiceStatus::Error
    } else if services.is_empty() {
        ServiceStatus::Disabled
    } else if services
        .values()
        .all(|s| matches!(s.status, ServiceStatus::Active))
    {
        ServiceStatus::Active
    } else {
        ServiceStatus::Starting
    };

    let code = if overall_status == ServiceStatus::Error {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    let body = StatusResponse {
        status: overall_status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        commit: env!("GIT_COMMIT_HASH").to_string(),
        services,
        refresh: RefreshInfo {
            phase: state.pipeline.phase(),
            last_success: health.last_success,
            last_attempt: health.last_attempt,
            consecutive_failures: health.consecutive_failures,
            fresh,
            health_window_secs: state.health_window.as_secs(),
        },
    };

    (code, with_cache_control(body, cache::NO_STORE)).into_response()
}
