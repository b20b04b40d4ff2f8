// GET /api/posts/featured: the current featured set, ranked.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::web::{api_error, AppState};

pub async fn featured(State(state): State<AppState>) -> Response {
    match state.db.get_featured_posts(state.config.view_counting).await {
        Ok(posts) => Json(serde_json::json!({ "posts": posts })).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "DB error fetching featured posts");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "Database error")
        }
    }
}
