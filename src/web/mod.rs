// Web server: Axum-based trigger and read API for the ranking jobs.
//
// An external scheduler calls the /api/cron/* routes with the shared cron
// secret. Read routes (featured posts, leaderboard, status) are public.
// All routes serve JSON.

use std::sync::Arc;

use anyhow::Result;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::db::Database;

pub mod auth;
pub mod handlers;

/// Shared application state threaded through all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn Database>,
    pub config: Arc<Config>,
    /// Held for the duration of a ranking run; a second trigger gets 409.
    pub feature_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(config: Config, db: Arc<dyn Database>) -> Self {
        Self {
            db,
            config: Arc::new(config),
            feature_lock: Arc::new(Mutex::new(())),
        }
    }
}

/// Start the Axum web server and block until it exits.
pub async fn run_server(
    config: Config,
    db: Arc<dyn Database>,
    port: u16,
    bind: &str,
) -> Result<()> {
    let app = build_router(AppState::new(config, db));

    let addr = format!("{bind}:{port}");
    info!("Spotlight listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    // Trigger routes (require the cron secret)
    let triggers = Router::new()
        .route(
            "/api/cron/feature-posts",
            get(handlers::cron::feature_posts).post(handlers::cron::feature_posts),
        )
        .route(
            "/api/cron/reputation",
            get(handlers::cron::recompute_all).post(handlers::cron::recompute_all),
        )
        .route(
            "/api/users/{id}/reputation",
            post(handlers::users::recompute_user),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::require_cron_secret,
        ));

    // Public routes (no auth)
    let public_api = Router::new()
        .route("/health", get(health))
        .route("/api/posts/featured", get(handlers::posts::featured))
        .route("/api/users/leaderboard", get(handlers::users::leaderboard))
        .route("/api/status", get(handlers::status::get_status));

    Router::new()
        .merge(triggers)
        .merge(public_api)
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers([
                    header::CONTENT_TYPE,
                    header::AUTHORIZATION,
                    header::HeaderName::from_static(auth::CRON_SECRET_HEADER),
                ]),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check: always returns 200 OK.
async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        axum::Json(serde_json::json!({ "status": "ok" })),
    )
}

/// Typed JSON error response helper.
pub fn api_error(status: StatusCode, message: &str) -> Response {
    (
        status,
        axum::Json(serde_json::json!({ "success": false, "error": message })),
    )
        .into_response()
}
