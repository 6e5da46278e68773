//! API Routes
//!
//! Configures the Axum router: two local endpoints and a proxy fallback.

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use super::handlers::{health_handler, proxy_handler, stats_handler, AppState};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `GET /health` - Health check endpoint
/// - `GET /cache/stats` - Cache directory size and file count
/// - anything else - Proxied upstream, served from cache when eligible,
///   including other methods on the two paths above
///
/// # Middleware
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler).fallback(proxy_handler))
        .route("/cache/stats", get(stats_handler).fallback(proxy_handler))
        .fallback(proxy_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
