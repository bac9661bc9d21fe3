use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::agent::CompletionBackend;
use crate::models::{RelayEvent, RelayRequest, ResponseTone, Settings};

/// Fixed system prompt for every turn; the settings tone suffix is appended.
pub const SYSTEM_PROMPT: &str =
    "You are a helpful assistant embedded in the user's current web page. \
     Each user message may include the page content converted to Markdown; \
     ground your answers in that content. Be concise and accurate. \
     If the page does not contain the answer, say so.";

const TOKEN_CHANNEL_CAPACITY: usize = 64;

pub fn compose_preamble(tone: ResponseTone) -> String {
    format!("{SYSTEM_PROMPT} {}", tone.preamble_suffix())
}

/// Forwards chat turns to the completion backend and streams the reply back.
///
/// Each submission spawns independent asynchronous work, so the host keeps
/// accepting requests while a stream is in flight. Every emitted event carries
/// the request's turn id; a turn always ends with exactly one terminal chunk
/// (carrying the full concatenation) or one error event. There is no retry.
#[derive(Clone)]
pub struct RelayCoordinator {
    backend: Arc<dyn CompletionBackend>,
}

impl RelayCoordinator {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self { backend }
    }

    pub fn submit(
        &self,
        request: RelayRequest,
        settings: Settings,
        reply: mpsc::Sender<RelayEvent>,
    ) {
        let backend = Arc::clone(&self.backend);
        tokio::spawn(async move {
            run_turn(backend, request, settings, reply).await;
        });
    }
}

async fn run_turn(
    backend: Arc<dyn CompletionBackend>,
    request: RelayRequest,
    settings: Settings,
    reply: mpsc::Sender<RelayEvent>,
) {
    let turn_id = request.turn_id.clone();
    let preamble = compose_preamble(settings.response_tone);

    let (token_tx, mut token_rx) = mpsc::channel::<String>(TOKEN_CHANNEL_CAPACITY);
    let stream_handle = tokio::spawn(async move {
        backend
            .stream_chat(
                &preamble,
                &request.message_history,
                &request.text,
                &settings.api_key,
                token_tx,
            )
            .await
    });

    // Relay each token as soon as it arrives; no coalescing.
    let mut full_response = String::new();
    let mut receiver_gone = false;
    while let Some(token) = token_rx.recv().await {
        full_response.push_str(&token);
        if !receiver_gone && reply.send(RelayEvent::chunk(turn_id.as_str(), token)).await.is_err() {
            debug!("reply channel closed for turn {turn_id}; dropping remaining chunks");
            receiver_gone = true;
        }
    }

    match stream_handle.await {
        Ok(Ok(())) => {
            let _ = reply.send(RelayEvent::complete(turn_id.as_str(), full_response)).await;
        }
        Ok(Err(e)) => {
            error!("Completion streaming failed for turn {turn_id}: {e}");
            let _ = reply.send(RelayEvent::error(Some(turn_id), e.to_string())).await;
        }
        Err(e) => {
            error!("Completion task panicked for turn {turn_id}: {e}");
            let _ = reply
                .send(RelayEvent::error(Some(turn_id), "Internal error during streaming"))
                .await;
        }
    }
}
