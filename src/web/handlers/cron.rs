// Scheduler trigger handlers.
//
// GET|POST /api/cron/feature-posts: run the engagement ranker
// GET|POST /api/cron/reputation:    recompute every user's reputation
//
// Both run inline and answer when the job is done. Only one ranking run is
// allowed at a time per process; a second trigger gets 409 Conflict.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tracing::error;

use crate::pipeline::{featured, reputation};
use crate::web::{api_error, AppState};

/// Default in-flight count aggregations for the batch recompute.
const DEFAULT_CONCURRENCY: usize = 8;

/// GET|POST /api/cron/feature-posts: mark the top posts as featured.
pub async fn feature_posts(State(state): State<AppState>) -> Response {
    let Ok(_guard) = state.feature_lock.try_lock() else {
        return api_error(StatusCode::CONFLICT, "A feature run is already in progress");
    };

    match featured::run(
        state.db.as_ref(),
        state.config.featured_count,
        state.config.view_counting,
    )
    .await
    {
        Ok(outcome) => Json(serde_json::json!({
            "success": true,
            "message": format!("Updated {} featured posts", outcome.updated_count),
            "posts": outcome.posts,
        }))
        .into_response(),
        Err(e) => {
            error!(error = %e, "Feature run failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to update featured posts")
        }
    }
}

#[derive(Deserialize, Default)]
pub struct BatchRequest {
    /// Count aggregations in flight (default 8)
    pub concurrency: Option<usize>,
}

/// GET|POST /api/cron/reputation: recompute all users.
///
/// The body is optional; `{"concurrency": N}` overrides the default. An
/// empty body runs with defaults whatever its content type.
pub async fn recompute_all(State(state): State<AppState>, body: Bytes) -> Response {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        BatchRequest::default()
    } else {
        match serde_json::from_slice::<BatchRequest>(&body) {
            Ok(request) => request,
            Err(e) => {
                return api_error(StatusCode::BAD_REQUEST, &format!("Invalid request body: {e}"))
            }
        }
    };
    let concurrency = request
        .concurrency
        .unwrap_or(DEFAULT_CONCURRENCY)
        .clamp(1, 64);
    let settings = reputation::ReputationSettings::from(state.config.as_ref());

    match reputation::recompute_all(state.db.as_ref(), &settings, concurrency).await {
        Ok(outcome) => Json(serde_json::json!({
            "success": true,
            "message": format!(
                "Recomputed {} users ({} changed, {} failed)",
                outcome.users, outcome.updated, outcome.failed
            ),
            "users": outcome.users,
            "updated": outcome.updated,
            "failed": outcome.failed,
        }))
        .into_response(),
        Err(e) => {
            error!(error = %e, "Reputation batch failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to recompute reputation")
        }
    }
}
