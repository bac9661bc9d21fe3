use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::errors::AppError;
use crate::models::Settings;
use crate::state::AppState;

/// GET `/health`
pub async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

/// GET `/api/history` lists every completed turn, newest first.
pub async fn list_history_handler(State(state): State<AppState>) -> Response {
    match state.history.find_all().await {
        Ok(records) => Json(records).into_response(),
        Err(e) => error_response(&e),
    }
}

/// GET `/api/history/grouped` returns records grouped by page for the options page.
pub async fn grouped_history_handler(State(state): State<AppState>) -> Response {
    match state.history.grouped_by_page_url().await {
        Ok(groups) => Json(groups).into_response(),
        Err(e) => error_response(&e),
    }
}

/// DELETE `/api/history` backs the popup's "delete all chat history".
pub async fn clear_history_handler(State(state): State<AppState>) -> Response {
    match state.history.clear_all().await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(&e),
    }
}

/// GET `/api/settings` returns stored settings, defaults when never saved.
pub async fn get_settings_handler(State(state): State<AppState>) -> Response {
    match state.settings.load().await {
        Ok(settings) => Json(settings).into_response(),
        Err(e) => error_response(&e),
    }
}

/// PUT `/api/settings` replaces the whole settings document.
pub async fn update_settings_handler(
    State(state): State<AppState>,
    Json(settings): Json<Settings>,
) -> Response {
    match state.settings.save(&settings).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(&e),
    }
}

fn error_response(err: &AppError) -> Response {
    let status = if err.is_validation() {
        StatusCode::BAD_REQUEST
    } else if err.is_busy() {
        StatusCode::CONFLICT
    } else if err.is_service_unavailable() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}
