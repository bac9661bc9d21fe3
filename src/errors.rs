use thiserror::Error;

/// Top-level application error. All variants carry a human-readable message
/// suitable for the error bubble rendered in the chat widget.
#[derive(Debug, Error)]
pub enum AppError {
    // ── Storage errors ───────────────────────────────────────────────────────
    #[error("Database query failed: {message}")]
    DatabaseQueryFailed {
        message: String,
        #[source]
        source: sqlx::Error,
    },

    // ── Completion-service errors ────────────────────────────────────────────
    #[error("Completion service unavailable at {host}")]
    CompletionUnavailable { host: String },

    #[error("Model '{model_name}' not found at the completion service")]
    ModelNotFound { model_name: String },

    #[error("Completion stream failed: {message}")]
    StreamFailed { message: String },

    // ── Validation errors ────────────────────────────────────────────────────
    #[error("Field '{field_name}' exceeds max length of {max_length} (actual: {actual_length})")]
    FieldTooLong { field_name: String, max_length: usize, actual_length: usize },

    #[error("A chat turn is already in progress")]
    TurnInProgress,

    // ── System errors ────────────────────────────────────────────────────────
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn db_query(message: impl Into<String>, source: sqlx::Error) -> Self {
        AppError::DatabaseQueryFailed { message: message.into(), source }
    }

    pub fn stream(message: impl Into<String>) -> Self {
        AppError::StreamFailed { message: message.into() }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, AppError::FieldTooLong { .. })
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, AppError::TurnInProgress)
    }

    pub fn is_service_unavailable(&self) -> bool {
        matches!(self, AppError::CompletionUnavailable { .. })
    }
}
