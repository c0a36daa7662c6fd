use axum::routing::{get, post};
use axum::Router;

use super::{handlers, AppState};

/// Builds the full router. No versioning prefix: this is a small,
/// operator-facing surface rather than a public API.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/ready", get(handlers::ready))
        .route("/metrics", get(handlers::metrics))
        .route("/trigger", post(handlers::trigger))
        .route("/state", get(handlers::state))
        .route("/shows", get(handlers::list_shows))
        .route("/refilter", post(handlers::refilter))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}
