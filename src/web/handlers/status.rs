// GET /api/status: when each job last ran, and whether a ranking run is
// in progress right now.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::status::JobStatus;
use crate::web::{api_error, AppState};

pub async fn get_status(State(state): State<AppState>) -> Response {
    let feature_running = state.feature_lock.try_lock().is_err();

    match JobStatus::load(state.db.as_ref(), state.config.view_counting).await {
        Ok(status) => Json(serde_json::json!({
            "feature_running": feature_running,
            "last_feature_run_at": status.last_feature_run_at,
            "last_feature_count": status.last_feature_count,
            "last_reputation_run_at": status.last_reputation_run_at,
            "published_posts": status.published_posts,
            "featured_posts": status.featured_posts,
        }))
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "DB error loading job status");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "Database error")
        }
    }
}
