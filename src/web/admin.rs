//! Admin endpoint for triggering an out-of-band snapshot refresh.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use serde_json::json;
use tracing::{info, instrument, warn};
use ts_rs::TS;

use crate::state::AppState;

/// Response for `POST /api/admin/refresh`.
#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RefreshTriggerResponse {
    pub message: String,
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

/// Compare without short-circuiting on the first differing byte.
fn tokens_match(given: &str, expected: &str) -> bool {
    given.len() == expected.len()
        && given
            .bytes()
            .zip(expected.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

/// `POST /api/admin/refresh` -- wake the scheduler for an immediate refresh.
///
/// 404 when no admin token is configured, 401 on a missing or wrong token.
#[instrument(skip_all)]
pub(super) async fn trigger_refresh(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(expected) = state.admin_token.as_deref() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match bearer_token(&headers) {
        Some(given) if tokens_match(given, expected) => {}
        _ => {
            warn!("Rejected admin refresh request");
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "invalid or missing bearer token" })),
            )
                .into_response();
        }
    }

    info!("Admin triggered snapshot refresh");
    state.refresh_trigger.notify_one();
    (
        StatusCode::ACCEPTED,
        Json(RefreshTriggerResponse {
            message: "Snapshot refresh triggered".to_string(),
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer s3cret"));
        assert_eq!(bearer_token(&headers), Some("s3cret"));
    }

    #[test]
    fn token_comparison() {
        assert!(tokens_match("s3cret", "s3cret"));
        assert!(!tokens_match("s3cret", "s3creT"));
        assert!(!tokens_match("s3cre", "s3cret"));
    }
}
