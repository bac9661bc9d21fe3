use serde::{Deserialize, Serialize};

/// Author of a transcript message or history entry ("user"/"assistant" on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One bubble in the widget transcript. Ids are assigned monotonically within
/// a session. `text` is appended to only while `is_streaming` is true; the
/// message is frozen once streaming ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: u64,
    pub text: String,
    pub sender: Role,
    pub is_streaming: bool,
}

/// A role/content pair replayed to the completion service as turn context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnMessage {
    pub role: Role,
    pub content: String,
}

impl TurnMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// One chat turn sent from the conversation view to the relay coordinator.
/// Consumed exactly once; `turn_id` ties the reply stream back to the turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayRequest {
    pub text: String,
    #[serde(default)]
    pub message_history: Vec<TurnMessage>,
    #[serde(default)]
    pub is_first_message: bool,
    #[serde(default)]
    pub turn_id: String,
}

/// Frame received from a chat client over the messaging channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "CHAT_MESSAGE")]
    ChatMessage(RelayRequest),
}

/// Frame pushed from the relay coordinator back to the conversation view.
///
/// A turn produces zero or more non-terminal chunks followed by exactly one
/// terminal chunk (`is_complete` with `full_response` set), or a single error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RelayEvent {
    #[serde(rename = "CHAT_RESPONSE_CHUNK", rename_all = "camelCase")]
    Chunk {
        turn_id: String,
        content: String,
        is_complete: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        full_response: Option<String>,
    },
    #[serde(rename = "CHAT_ERROR", rename_all = "camelCase")]
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        turn_id: Option<String>,
        error: String,
    },
}

impl RelayEvent {
    pub fn chunk(turn_id: impl Into<String>, content: impl Into<String>) -> Self {
        RelayEvent::Chunk {
            turn_id: turn_id.into(),
            content: content.into(),
            is_complete: false,
            full_response: None,
        }
    }

    pub fn complete(turn_id: impl Into<String>, full_response: impl Into<String>) -> Self {
        RelayEvent::Chunk {
            turn_id: turn_id.into(),
            content: String::new(),
            is_complete: true,
            full_response: Some(full_response.into()),
        }
    }

    pub fn error(turn_id: Option<String>, error: impl Into<String>) -> Self {
        RelayEvent::Error { turn_id, error: error.into() }
    }
}

/// A persisted, immutable record of one completed turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub id: String,
    pub page_url: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub user_message: String,
    pub ai_response: String,
    pub is_first_message: bool,
}

impl HistoryRecord {
    pub fn new(
        page_url: impl Into<String>,
        user_message: impl Into<String>,
        ai_response: impl Into<String>,
        is_first_message: bool,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            page_url: page_url.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            user_message: user_message.into(),
            ai_response: ai_response.into(),
            is_first_message,
        }
    }
}

/// History records for one page, newest first, as the options page renders them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryGroup {
    pub page_url: String,
    pub latest_timestamp: i64,
    pub records: Vec<HistoryRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseTone {
    Formal,
    Friendly,
    Simplified,
}

impl ResponseTone {
    /// Suffix appended to the fixed system prompt.
    pub fn preamble_suffix(&self) -> &'static str {
        match self {
            ResponseTone::Formal => "Respond in a formal, professional tone.",
            ResponseTone::Friendly => "Respond in a warm, friendly tone.",
            ResponseTone::Simplified => "Use plain language and short sentences.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ApiService {
    ClearBureau,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiType {
    Llama,
    OpenAi,
}

/// User-configurable settings, persisted whole under a single storage key and
/// injected into the relay coordinator at request time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub response_tone: ResponseTone,
    pub api_key: String,
    pub api_service: ApiService,
    pub api_type: ApiType,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            response_tone: ResponseTone::Friendly,
            api_key: String::new(),
            api_service: ApiService::ClearBureau,
            api_type: ApiType::OpenAi,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_message_frame_parses_with_and_without_history() {
        let bare = r#"{"type":"CHAT_MESSAGE","text":"hi"}"#;
        let ClientEvent::ChatMessage(req) = serde_json::from_str(bare).unwrap();
        assert_eq!(req.text, "hi");
        assert!(req.message_history.is_empty());
        assert!(!req.is_first_message);

        let full = r#"{
            "type": "CHAT_MESSAGE",
            "text": "and now?",
            "isFirstMessage": true,
            "messageHistory": [
                {"role": "user", "content": "hi"},
                {"role": "assistant", "content": "hello"}
            ]
        }"#;
        let ClientEvent::ChatMessage(req) = serde_json::from_str(full).unwrap();
        assert!(req.is_first_message);
        assert_eq!(req.message_history.len(), 2);
        assert_eq!(req.message_history[0].role, Role::User);
        assert_eq!(req.message_history[1].content, "hello");
    }

    #[test]
    fn chunk_frames_use_the_extension_wire_names() {
        let chunk = RelayEvent::chunk("t-1", "You ");
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&chunk).unwrap()).unwrap();
        assert_eq!(json["type"], "CHAT_RESPONSE_CHUNK");
        assert_eq!(json["turnId"], "t-1");
        assert_eq!(json["content"], "You ");
        assert_eq!(json["isComplete"], false);
        assert!(json.get("fullResponse").is_none());

        let terminal = RelayEvent::complete("t-1", "You need form A.");
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&terminal).unwrap()).unwrap();
        assert_eq!(json["isComplete"], true);
        assert_eq!(json["fullResponse"], "You need form A.");

        let err = RelayEvent::error(None, "nope");
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&err).unwrap()).unwrap();
        assert_eq!(json["type"], "CHAT_ERROR");
        assert_eq!(json["error"], "nope");
        assert!(json.get("turnId").is_none());
    }

    #[test]
    fn settings_round_trip_keeps_extension_field_names() {
        let settings = Settings {
            response_tone: ResponseTone::Simplified,
            api_key: "sk-test".into(),
            api_service: ApiService::Custom,
            api_type: ApiType::Llama,
        };
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&settings).unwrap()).unwrap();
        assert_eq!(json["responseTone"], "simplified");
        assert_eq!(json["apiService"], "custom");
        assert_eq!(json["apiType"], "llama");
        assert_eq!(json["apiKey"], "sk-test");

        let back: Settings = serde_json::from_value(json).unwrap();
        assert_eq!(back, settings);
    }

    #[test]
    fn settings_default_when_fields_missing() {
        let settings: Settings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.response_tone, ResponseTone::Friendly);
        assert_eq!(settings.api_service, ApiService::ClearBureau);
        assert_eq!(settings.api_type, ApiType::OpenAi);
        assert!(settings.api_key.is_empty());
    }

    #[test]
    fn history_record_serializes_camel_case() {
        let record = HistoryRecord::new("https://example.gov/renew", "q", "a", true);
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&record).unwrap()).unwrap();
        assert_eq!(json["pageUrl"], "https://example.gov/renew");
        assert_eq!(json["userMessage"], "q");
        assert_eq!(json["aiResponse"], "a");
        assert_eq!(json["isFirstMessage"], true);
        assert!(json["timestamp"].is_i64());
    }
}
