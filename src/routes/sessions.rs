use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};

use crate::error::AppError;
use crate::gateway::hub::SERVER_USER_ID;
use crate::models::{ExecutionResult, Language, Session, SessionSummary};
use crate::state::AppState;

fn require_string<'a>(body: &'a Value, field: &'static str) -> Result<&'a str, AppError> {
    body.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::validation(field, format!("{field} must be a string")))
}

fn require_language(body: &Value) -> Result<Language, AppError> {
    body.get("language")
        .and_then(Value::as_str)
        .and_then(Language::parse)
        .ok_or_else(|| {
            AppError::validation("language", "language must be 'javascript' or 'python'")
        })
}

pub async fn create_session(State(state): State<AppState>) -> Json<SessionSummary> {
    let session = state.store().create(None, None);
    Json(SessionSummary::from(&session))
}

/// POST variant of create. Accepts an optional `{language}` body.
pub async fn create_session_with_options(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<SessionSummary>, AppError> {
    let language = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        let body: Value = serde_json::from_slice(&body)
            .map_err(|e| AppError::BadRequest(format!("invalid JSON body: {e}")))?;
        match body.get("language") {
            None | Some(Value::Null) => None,
            Some(_) => Some(require_language(&body)?),
        }
    };
    let session = state.store().create(language, None);
    Ok(Json(SessionSummary::from(&session)))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Session>, AppError> {
    Ok(Json(state.store().get(&session_id)?))
}

pub async fn update_code(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(body) = payload?;
    let code = require_string(&body, "code")?.to_string();
    let user_id = body
        .get("userId")
        .and_then(Value::as_str)
        .unwrap_or(SERVER_USER_ID);

    let session = state.hub.update_code(&session_id, code, user_id).await?;
    Ok(Json(json!({ "success": true, "code": session.code })))
}

pub async fn update_language(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(body) = payload?;
    let language = require_language(&body)?;

    let session = state.hub.update_language(&session_id, language).await?;
    Ok(Json(json!({ "code": session.code })))
}

/// Reachability and input check for a run. The actual execution happens in
/// the configured runner, which by default leaves it to the browser.
pub async fn execute(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<ExecutionResult>, AppError> {
    let Json(body) = payload?;
    let code = require_string(&body, "code")?;
    let language = require_language(&body)?;
    if !state.store().contains(&session_id) {
        return Err(AppError::NotFound("session not found".to_string()));
    }

    let result = state.runner.run(code, language).await;
    Ok(Json(result))
}

pub async fn list_executions(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Vec<ExecutionResult>>, AppError> {
    Ok(Json(state.store().executions(&session_id)?))
}

pub async fn clear_executions(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let cleared = state.store().clear_executions(&session_id)?;
    tracing::debug!("cleared {cleared} execution result(s) from session {session_id}");
    Ok(Json(json!({ "cleared": cleared })))
}
