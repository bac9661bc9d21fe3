use tracing::warn;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{ChatMessage, HistoryRecord, RelayEvent, RelayRequest, Role, TurnMessage};

const GREETING: &str = "Hello! How can I help you today?";
const ERROR_BUBBLE: &str = "Sorry, something went wrong. Please try again.";
pub const MAX_MESSAGE_LENGTH: usize = 8000;

/// Per-turn state: a turn starts on submit, opens a streaming assistant
/// message on the first chunk, and ends complete or errored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    AwaitingFirstChunk,
    Streaming,
    Complete,
    Errored,
}

/// What a relay event did to the view, and what the caller must do next.
/// `Completed` carries the history record to persist.
#[derive(Debug, PartialEq)]
pub enum TurnOutcome {
    /// Event did not belong to the active turn; nothing changed.
    Ignored,
    /// A chunk was appended to the open streaming message.
    Progress,
    Completed(HistoryRecord),
    Errored,
}

#[derive(Debug)]
struct ActiveTurn {
    id: String,
    user_text: String,
    first: bool,
    /// Index into `messages` of the open streaming assistant message.
    assistant_ix: Option<usize>,
}

/// Receive-side of the relay: owns the visible transcript and the per-turn
/// state machine. The view is the single-turn gatekeeper: a new submission
/// is rejected until the previous turn reached a terminal phase. Chunks
/// tagged with a stale turn id are dropped.
pub struct ConversationView {
    page_url: String,
    messages: Vec<ChatMessage>,
    next_message_id: u64,
    phase: TurnPhase,
    active: Option<ActiveTurn>,
    completed_turns: u32,
}

impl ConversationView {
    pub fn new(page_url: impl Into<String>) -> Self {
        let mut view = Self {
            page_url: page_url.into(),
            messages: Vec::new(),
            next_message_id: 1,
            phase: TurnPhase::Idle,
            active: None,
            completed_turns: 0,
        };
        view.push_message(Role::Assistant, GREETING.to_string(), false);
        view
    }

    pub fn page_url(&self) -> &str {
        &self.page_url
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    /// Starts a new turn for `text`.
    ///
    /// Blank input is dropped without a message or request (`Ok(None)`).
    /// Over-long input and submissions while a turn is in flight are rejected.
    /// Otherwise the user message joins the transcript and exactly one
    /// `RelayRequest` is returned, carrying the full prior history.
    pub fn on_submit(&mut self, text: &str) -> Result<Option<RelayRequest>, AppError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        if trimmed.len() > MAX_MESSAGE_LENGTH {
            return Err(AppError::FieldTooLong {
                field_name: "text".to_string(),
                max_length: MAX_MESSAGE_LENGTH,
                actual_length: trimmed.len(),
            });
        }
        if matches!(self.phase, TurnPhase::AwaitingFirstChunk | TurnPhase::Streaming) {
            return Err(AppError::TurnInProgress);
        }

        // History is everything said before this submission, greeting included.
        let message_history = self.turn_history();
        let is_first_message = self.completed_turns == 0;
        let turn_id = Uuid::new_v4().to_string();

        self.push_message(Role::User, trimmed.to_string(), false);
        self.active = Some(ActiveTurn {
            id: turn_id.clone(),
            user_text: trimmed.to_string(),
            first: is_first_message,
            assistant_ix: None,
        });
        self.phase = TurnPhase::AwaitingFirstChunk;

        Ok(Some(RelayRequest {
            text: trimmed.to_string(),
            message_history,
            is_first_message,
            turn_id,
        }))
    }

    /// Applies one relay event to the transcript.
    pub fn on_event(&mut self, event: RelayEvent) -> TurnOutcome {
        match event {
            RelayEvent::Chunk { turn_id, content, is_complete, full_response } => {
                if !self.belongs_to_active_turn(Some(turn_id.as_str())) {
                    warn!("Dropping chunk for inactive turn {turn_id}");
                    return TurnOutcome::Ignored;
                }
                if is_complete {
                    self.finish_turn(full_response)
                } else {
                    self.append_chunk(content);
                    TurnOutcome::Progress
                }
            }
            RelayEvent::Error { turn_id, error } => {
                if !self.belongs_to_active_turn(turn_id.as_deref()) {
                    warn!("Dropping error for inactive turn {turn_id:?}");
                    return TurnOutcome::Ignored;
                }
                // The detail stays in the log; the transcript gets a fixed sentence.
                warn!("Turn failed: {error}");
                self.fail_turn();
                TurnOutcome::Errored
            }
        }
    }

    fn turn_history(&self) -> Vec<TurnMessage> {
        self.messages
            .iter()
            .filter(|m| !m.is_streaming)
            .map(|m| TurnMessage { role: m.sender, content: m.text.clone() })
            .collect()
    }

    fn push_message(&mut self, sender: Role, text: String, is_streaming: bool) -> usize {
        let id = self.next_message_id;
        self.next_message_id += 1;
        self.messages.push(ChatMessage { id, text, sender, is_streaming });
        self.messages.len() - 1
    }

    /// An event belongs to the active turn while the turn is still open.
    /// An error without a turn id applies to whatever turn is active.
    fn belongs_to_active_turn(&self, turn_id: Option<&str>) -> bool {
        if !matches!(self.phase, TurnPhase::AwaitingFirstChunk | TurnPhase::Streaming) {
            return false;
        }
        match (turn_id, self.active.as_ref()) {
            (Some(id), Some(active)) => id == active.id,
            (None, Some(_)) => true,
            _ => false,
        }
    }

    fn append_chunk(&mut self, content: String) {
        let open = self.active.as_ref().and_then(|a| a.assistant_ix);
        match open {
            Some(ix) => self.messages[ix].text.push_str(&content),
            None => {
                // First chunk of the turn opens the streaming message.
                let ix = self.push_message(Role::Assistant, content, true);
                if let Some(active) = self.active.as_mut() {
                    active.assistant_ix = Some(ix);
                }
            }
        }
        self.phase = TurnPhase::Streaming;
    }

    fn finish_turn(&mut self, full_response: Option<String>) -> TurnOutcome {
        let Some(active) = self.active.take() else {
            return TurnOutcome::Ignored;
        };

        let ai_response = match active.assistant_ix {
            Some(ix) => {
                self.messages[ix].is_streaming = false;
                full_response.unwrap_or_else(|| self.messages[ix].text.clone())
            }
            None => {
                // Terminal chunk without prior partials; materialise directly.
                let text = full_response.unwrap_or_default();
                self.push_message(Role::Assistant, text.clone(), false);
                text
            }
        };

        self.phase = TurnPhase::Complete;
        self.completed_turns += 1;

        TurnOutcome::Completed(HistoryRecord::new(
            self.page_url.clone(),
            active.user_text,
            ai_response,
            active.first,
        ))
    }

    fn fail_turn(&mut self) {
        if let Some(active) = self.active.take() {
            // Freeze whatever partial text already streamed in.
            if let Some(ix) = active.assistant_ix {
                self.messages[ix].is_streaming = false;
            }
        }
        self.push_message(Role::Assistant, ERROR_BUBBLE.to_string(), false);
        self.phase = TurnPhase::Errored;
    }
}
