// Auth middleware: shared-secret check for the trigger routes.
//
// The scheduler sends CRON_SECRET either as `Authorization: Bearer <secret>`
// or in the `x-cron-secret` header. The comparison is constant-time, and an
// empty server-side secret rejects every request.
//
// A rejected request never reaches a handler, so it has no side effects.

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use tracing::warn;

use super::AppState;

/// Alternate header carrying the cron secret.
pub const CRON_SECRET_HEADER: &str = "x-cron-secret";

/// Axum middleware: reject requests without the cron secret with 401.
pub async fn require_cron_secret(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if !is_authorized(request.headers(), &state.config.cron_secret) {
        warn!(path = %request.uri().path(), "Rejected trigger request");
        return super::api_error(StatusCode::UNAUTHORIZED, "Unauthorized");
    }
    next.run(request).await
}

/// Whether the request headers carry `expected`.
pub fn is_authorized(headers: &HeaderMap, expected: &str) -> bool {
    if expected.is_empty() {
        return false;
    }
    match provided_secret(headers) {
        Some(provided) => constant_time_eq(provided, expected),
        None => false,
    }
}

// --- Private helpers ---

/// Pull the caller's secret from the bearer token, else the custom header.
fn provided_secret(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);
    if bearer.is_some() {
        return bearer;
    }

    headers
        .get(CRON_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}
