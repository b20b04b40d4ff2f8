// User reputation handlers.
//
// POST /api/users/{id}/reputation: recompute one user (cron secret)
// GET  /api/users/leaderboard:     users by reputation, ?limit= (default 20, max 100)

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::pipeline::reputation::{self, ReputationSettings, UserNotFound};
use crate::web::{api_error, AppState};

const DEFAULT_LEADERBOARD_LIMIT: u32 = 20;
const MAX_LEADERBOARD_LIMIT: u32 = 100;

/// POST /api/users/{id}/reputation: recompute and store one user's reputation.
pub async fn recompute_user(State(state): State<AppState>, Path(user_id): Path<i64>) -> Response {
    let settings = ReputationSettings::from(state.config.as_ref());
    match reputation::recompute_user(state.db.as_ref(), user_id, &settings).await {
        Ok(value) => Json(serde_json::json!({
            "success": true,
            "message": format!("Reputation updated to {value}"),
            "user_id": user_id,
            "reputation": value,
        }))
        .into_response(),
        Err(e) if e.downcast_ref::<UserNotFound>().is_some() => {
            api_error(StatusCode::NOT_FOUND, "User not found")
        }
        Err(e) => {
            tracing::error!(error = %e, user_id, "Reputation recompute failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to update reputation")
        }
    }
}

#[derive(Deserialize, Default)]
pub struct LeaderboardQuery {
    pub limit: Option<u32>,
}

/// GET /api/users/leaderboard: top users by reputation.
pub async fn leaderboard(
    State(state): State<AppState>,
    Query(params): Query<LeaderboardQuery>,
) -> Response {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_LEADERBOARD_LIMIT)
        .clamp(1, MAX_LEADERBOARD_LIMIT);

    match state.db.get_leaderboard(limit).await {
        Ok(users) => Json(serde_json::json!({ "users": users })).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "DB error fetching leaderboard");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "Database error")
        }
    }
}
