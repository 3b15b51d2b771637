//! API route handlers.

pub mod auth;

use crate::auth::middleware::AppState;
use crate::middleware::security_headers;
use axum::{routing::get, routing::post, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the API router with all endpoints.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/nonce", get(auth::issue_nonce))
        .route("/api/auth/verify", post(auth::verify))
        .route("/api/auth/session", get(auth::session))
        .route("/api/auth/logout", post(auth::logout))
}

/// Build the full application: routes plus body limit, CORS, tracing and
/// security headers.
pub fn app(state: AppState) -> Router {
    let max_body_bytes = state.config.max_body_bytes;

    // Explicit CORS: deny all cross-origin requests (single-origin deployment).
    // CorsLayer::new() with no allowed origins rejects all CORS preflight requests.
    let cors = CorsLayer::new();

    api_router()
        .layer(axum::extract::DefaultBodyLimit::max(max_body_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(security_headers))
        .with_state(state)
}
