use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::models::{ClientEvent, RelayEvent, Settings};
use crate::session::{ConversationView, TurnOutcome};
use crate::state::AppState;

const REPLY_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    /// Address of the page hosting the widget; recorded on history entries.
    #[serde(default, rename = "pageUrl")]
    pub page_url: String,
}

/// GET `/ws/chat?pageUrl=...` upgrades to a WebSocket for streaming chat.
pub async fn ws_chat_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, params.page_url))
}

/// Hosts one conversation view for the lifetime of the connection.
///
/// Protocol:
/// - Client sends `{ "type": "CHAT_MESSAGE", "text": "..." }`
/// - Server pushes `{ "type": "CHAT_RESPONSE_CHUNK", "turnId", "content", "isComplete" }`
///   zero or more times, then once more with `isComplete: true` and `fullResponse`,
///   or `{ "type": "CHAT_ERROR", "error": "..." }` on failure.
async fn handle_socket(mut socket: WebSocket, state: AppState, page_url: String) {
    info!("Chat client connected for {page_url}");
    let mut view = ConversationView::new(page_url);

    while let Some(msg) = socket.recv().await {
        let msg = match msg {
            Ok(m) => m,
            Err(e) => {
                warn!("WebSocket receive error: {e}");
                break;
            }
        };

        let text = match &msg {
            Message::Text(t) => t.to_string(),
            Message::Close(_) => break,
            _ => continue,
        };

        let submission = match serde_json::from_str::<ClientEvent>(&text) {
            Ok(ClientEvent::ChatMessage(req)) => req,
            Err(e) => {
                send_event(&mut socket, &RelayEvent::error(None, format!("Invalid request: {e}")))
                    .await;
                continue;
            }
        };

        // The view is authoritative for history; the submitted text is all
        // that is taken from the frame.
        let request = match view.on_submit(&submission.text) {
            Ok(Some(request)) => request,
            Ok(None) => continue,
            Err(e) => {
                send_event(&mut socket, &RelayEvent::error(None, e.to_string())).await;
                continue;
            }
        };

        // Settings are read fresh for every turn and injected into the
        // coordinator; a storage failure falls back to defaults.
        let settings = match state.settings.load().await {
            Ok(settings) => settings,
            Err(e) => {
                error!("Failed to load settings, using defaults: {e}");
                Settings::default()
            }
        };

        let (reply_tx, mut reply_rx) = mpsc::channel::<RelayEvent>(REPLY_CHANNEL_CAPACITY);
        state.coordinator.submit(request, settings, reply_tx);

        while let Some(event) = reply_rx.recv().await {
            let outcome = view.on_event(event.clone());
            if !matches!(outcome, TurnOutcome::Ignored) {
                send_event(&mut socket, &event).await;
            }
            match outcome {
                TurnOutcome::Completed(record) => {
                    // Persistence failures never fail the visible turn.
                    if let Err(e) = state.history.append(&record).await {
                        error!("Failed to persist history record: {e}");
                    }
                    break;
                }
                TurnOutcome::Errored => break,
                TurnOutcome::Progress | TurnOutcome::Ignored => {}
            }
        }
    }

    info!("Chat client disconnected");
}

/// Helper: serialize a `RelayEvent` and send it over the socket.
async fn send_event(socket: &mut WebSocket, event: &RelayEvent) {
    if let Ok(json) = serde_json::to_string(event) {
        let _ = socket.send(Message::Text(json.into())).await;
    }
}
