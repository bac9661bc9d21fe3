pub mod api_routes;
pub mod ws_routes;

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(api_routes::health_handler))
        // Streaming chat relay
        .route("/ws/chat", get(ws_routes::ws_chat_handler))
        // Options/popup surfaces
        .route(
            "/api/history",
            get(api_routes::list_history_handler).delete(api_routes::clear_history_handler),
        )
        .route("/api/history/grouped", get(api_routes::grouped_history_handler))
        .route(
            "/api/settings",
            get(api_routes::get_settings_handler).put(api_routes::update_settings_handler),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
