use axum::extract::State;
use axum::Json;

use crate::state::AppState;

pub async fn health() -> &'static str {
    "ok"
}

pub async fn version(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "git_sha": env!("GIT_SHA"),
        "sessions": state.store().len(),
    }))
}
