mod health;
pub mod sessions;

use axum::routing::{get, patch, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .nest("/api", api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/version", get(health::version))
        // Sessions
        .route(
            "/session/create",
            get(sessions::create_session).post(sessions::create_session_with_options),
        )
        .route("/session/{session_id}", get(sessions::get_session))
        .route("/session/{session_id}/code", patch(sessions::update_code))
        .route(
            "/session/{session_id}/language",
            patch(sessions::update_language),
        )
        .route("/session/{session_id}/execute", post(sessions::execute))
        .route(
            "/session/{session_id}/executions",
            get(sessions::list_executions).delete(sessions::clear_executions),
        )
        // Realtime
        .route("/session/{session_id}/ws", get(crate::gateway::ws_upgrade))
}
