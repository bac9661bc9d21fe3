use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::errors::AppError;
use crate::models::TurnMessage;

pub const DEFAULT_MODEL: &str = "llama3.2";

/// Boundary to the hosted completion service: one streaming chat call,
/// tokens delivered through `chunks` in production order. Implementations
/// must stop quietly if the receiving side goes away.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn stream_chat(
        &self,
        preamble: &str,
        history: &[TurnMessage],
        user_message: &str,
        api_key: &str,
        chunks: mpsc::Sender<String>,
    ) -> Result<(), AppError>;
}

#[derive(Serialize)]
struct ChatTurn<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    stream: bool,
    messages: Vec<ChatTurn<'a>>,
}

/// One newline-delimited JSON line of the Ollama chat stream.
#[derive(Deserialize)]
struct StreamLine {
    #[serde(default)]
    message: Option<StreamMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct StreamMessage {
    #[serde(default)]
    content: String,
}

/// Streaming chat client for an Ollama-protocol completion endpoint.
/// The preamble is sent as the system message and `history` is replayed
/// as-is before the current user message.
#[derive(Clone)]
pub struct OllamaBackend {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaBackend {
    pub fn new(base_url: &str) -> Self {
        Self::with_model(base_url, DEFAULT_MODEL)
    }

    pub fn with_model(base_url: &str, model: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    fn build_messages<'a>(
        &self,
        preamble: &'a str,
        history: &'a [TurnMessage],
        user_message: &'a str,
    ) -> Vec<ChatTurn<'a>> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatTurn { role: "system", content: preamble });
        for turn in history {
            messages.push(ChatTurn { role: turn.role.as_str(), content: &turn.content });
        }
        messages.push(ChatTurn { role: "user", content: user_message });
        messages
    }

    /// Maps a non-success response body to an error. Ollama reports problems
    /// as `{"error": "..."}`; a missing model says "not found" there.
    fn classify_failure(&self, status: reqwest::StatusCode, detail: &str) -> AppError {
        match serde_json::from_str::<StreamLine>(detail).ok().and_then(|line| line.error) {
            Some(message) if message.contains("not found") => {
                AppError::ModelNotFound { model_name: self.model.clone() }
            }
            Some(message) => AppError::stream(message),
            None => AppError::stream(format!("{status}: {detail}")),
        }
    }
}

enum StreamProgress {
    Open,
    Done,
    ReceiverGone,
}

/// Consumes every complete line in `buffer`, forwarding message content.
async fn drain_lines(
    buffer: &mut Vec<u8>,
    chunks: &mpsc::Sender<String>,
) -> Result<StreamProgress, AppError> {
    while let Some(newline) = buffer.iter().position(|b| *b == b'\n') {
        let line: Vec<u8> = buffer.drain(..=newline).collect();
        let line = String::from_utf8(line)
            .map_err(|e| AppError::stream(format!("invalid UTF-8 in stream: {e}")))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let parsed: StreamLine = serde_json::from_str(line)
            .map_err(|e| AppError::stream(format!("malformed stream line: {e}")))?;

        if let Some(message) = parsed.error {
            return Err(AppError::stream(message));
        }
        if let Some(message) = parsed.message {
            if !message.content.is_empty() && chunks.send(message.content).await.is_err() {
                debug!("chunk receiver dropped; abandoning completion stream");
                return Ok(StreamProgress::ReceiverGone);
            }
        }
        if parsed.done {
            return Ok(StreamProgress::Done);
        }
    }
    Ok(StreamProgress::Open)
}

#[async_trait]
impl CompletionBackend for OllamaBackend {
    async fn stream_chat(
        &self,
        preamble: &str,
        history: &[TurnMessage],
        user_message: &str,
        api_key: &str,
        chunks: mpsc::Sender<String>,
    ) -> Result<(), AppError> {
        let body = ChatBody {
            model: &self.model,
            stream: true,
            messages: self.build_messages(preamble, history, user_message),
        };

        let mut request = self.http.post(format!("{}/api/chat", self.base_url)).json(&body);
        if !api_key.is_empty() {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(|e| {
            error!("Completion request failed: {e}");
            if e.is_connect() {
                AppError::CompletionUnavailable { host: self.base_url.clone() }
            } else {
                AppError::stream(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            error!("Completion service returned {status}: {detail}");
            return Err(self.classify_failure(status, &detail));
        }

        // NDJSON: one JSON object per line, `done: true` on the last one.
        // Bytes are buffered until a full line is available so multi-byte
        // characters split across network reads are never cut.
        let mut stream = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();

        while let Some(piece) = stream.next().await {
            let bytes = piece.map_err(|e| {
                error!("Completion stream aborted: {e}");
                AppError::stream(format!("stream aborted mid-flight: {e}"))
            })?;
            buffer.extend_from_slice(&bytes);

            match drain_lines(&mut buffer, &chunks).await? {
                StreamProgress::Open => {}
                StreamProgress::Done | StreamProgress::ReceiverGone => return Ok(()),
            }
        }

        // The last line may arrive without a trailing newline.
        if !buffer.is_empty() {
            buffer.push(b'\n');
            match drain_lines(&mut buffer, &chunks).await? {
                StreamProgress::Open => {}
                StreamProgress::Done | StreamProgress::ReceiverGone => return Ok(()),
            }
        }

        Err(AppError::stream("stream ended before completion".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_lines_parse_content_and_done() {
        let line: StreamLine = serde_json::from_str(
            r#"{"model":"llama3.2","message":{"role":"assistant","content":"Hi"},"done":false}"#,
        )
        .unwrap();
        assert_eq!(line.message.unwrap().content, "Hi");
        assert!(!line.done);

        let last: StreamLine = serde_json::from_str(
            r#"{"model":"llama3.2","message":{"role":"assistant","content":""},"done":true,"total_duration":12}"#,
        )
        .unwrap();
        assert!(last.done);

        let failed: StreamLine =
            serde_json::from_str(r#"{"error":"model 'nope' not found"}"#).unwrap();
        assert_eq!(failed.error.as_deref(), Some("model 'nope' not found"));
    }

    #[test]
    fn failure_bodies_classify_by_their_error_field() {
        let backend = OllamaBackend::new("http://localhost:11434");
        let not_found = reqwest::StatusCode::NOT_FOUND;
        let server_error = reqwest::StatusCode::INTERNAL_SERVER_ERROR;

        let err = backend
            .classify_failure(not_found, r#"{"error":"model 'nope' not found, try pulling it"}"#);
        assert!(matches!(err, AppError::ModelNotFound { .. }));

        // A body that merely mentions "model" is not a missing model.
        let err =
            backend.classify_failure(server_error, r#"{"error":"loading model: out of memory"}"#);
        assert!(matches!(err, AppError::StreamFailed { .. }));
        assert!(err.to_string().contains("out of memory"));

        let err = backend.classify_failure(server_error, "upstream melted");
        assert!(matches!(err, AppError::StreamFailed { .. }));
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn final_line_without_trailing_newline_still_completes() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut buffer = br#"{"message":{"content":"Hi"},"done":false}"#.to_vec();
        buffer.push(b'\n');
        buffer.extend_from_slice(br#"{"message":{"content":"!"},"done":true}"#);

        // Only the newline-terminated line is consumed on the first pass.
        assert!(matches!(drain_lines(&mut buffer, &tx).await.unwrap(), StreamProgress::Open));
        assert_eq!(rx.recv().await.unwrap(), "Hi");
        assert!(!buffer.is_empty());

        // Flushing the remainder surfaces the final done line.
        buffer.push(b'\n');
        assert!(matches!(drain_lines(&mut buffer, &tx).await.unwrap(), StreamProgress::Done));
        assert_eq!(rx.recv().await.unwrap(), "!");
        assert!(buffer.is_empty());
    }

    #[test]
    fn messages_start_with_preamble_and_end_with_user_text() {
        let backend = OllamaBackend::new("http://localhost:11434");
        let history = vec![TurnMessage::user("hi"), TurnMessage::assistant("hello")];
        let messages = backend.build_messages("be helpful", &history, "what now?");

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[0].content, "be helpful");
        assert_eq!(messages[1].role, "user");
        assert_eq!(messages[2].role, "assistant");
        assert_eq!(messages[3].role, "user");
        assert_eq!(messages[3].content, "what now?");
    }
}
