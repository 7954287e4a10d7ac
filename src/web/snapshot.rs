//! Reader endpoint for the current dashboard snapshot.

use axum::extract::State;
use axum::response::Response;
use tracing::trace;

use crate::state::AppState;
use crate::web::routes::{cache, with_cache_control};

/// `GET /api/snapshot` -- the cached snapshot, exactly as the tiers hold it.
///
/// Only touches the warehouse when both cache tiers are empty.
pub(super) async fn get_snapshot(State(state): State<AppState>) -> Response {
    let snapshot = state.pipeline.get_cached_snapshot().await;
    trace!(last_refreshed = %snapshot.last_refreshed, "serving snapshot");
    with_cache_control(&*snapshot, cache::SNAPSHOT)
}
