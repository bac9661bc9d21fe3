#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tokio::sync::mpsc;

use pagechat::agent::CompletionBackend;
use pagechat::db::history_repository::HistoryRepository;
use pagechat::db::settings_repository::SettingsRepository;
use pagechat::errors::AppError;
use pagechat::models::TurnMessage;
use pagechat::relay::RelayCoordinator;
use pagechat::routes;
use pagechat::state::AppState;

/// Completion backend that replays a fixed token script, then optionally
/// fails instead of finishing cleanly.
pub struct ScriptedBackend {
    pub tokens: Vec<&'static str>,
    pub fail_with: Option<&'static str>,
}

impl ScriptedBackend {
    pub fn replying(tokens: Vec<&'static str>) -> Self {
        Self { tokens, fail_with: None }
    }

    pub fn failing(tokens: Vec<&'static str>, message: &'static str) -> Self {
        Self { tokens, fail_with: Some(message) }
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn stream_chat(
        &self,
        _preamble: &str,
        _history: &[TurnMessage],
        _user_message: &str,
        _api_key: &str,
        chunks: mpsc::Sender<String>,
    ) -> Result<(), AppError> {
        for token in &self.tokens {
            if chunks.send((*token).to_string()).await.is_err() {
                return Ok(());
            }
        }
        match self.fail_with {
            Some(message) => Err(AppError::stream(message)),
            None => Ok(()),
        }
    }
}

/// Completion backend that answers every turn with one token, but holds the
/// stream of any turn whose text starts with "slow" open until `gate` is
/// notified.
pub struct GatedBackend {
    pub gate: Arc<tokio::sync::Notify>,
}

#[async_trait]
impl CompletionBackend for GatedBackend {
    async fn stream_chat(
        &self,
        _preamble: &str,
        _history: &[TurnMessage],
        user_message: &str,
        _api_key: &str,
        chunks: mpsc::Sender<String>,
    ) -> Result<(), AppError> {
        if chunks.send(format!("reply to {user_message}")).await.is_err() {
            return Ok(());
        }
        if user_message.starts_with("slow") {
            self.gate.notified().await;
        }
        Ok(())
    }
}

/// Fresh in-memory database with migrations applied. A single connection
/// keeps every query on the same in-memory instance.
pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("failed to open in-memory database");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("failed to run migrations");
    pool
}

pub async fn test_state(backend: ScriptedBackend) -> AppState {
    let pool = memory_pool().await;
    AppState {
        coordinator: RelayCoordinator::new(Arc::new(backend)),
        history: HistoryRepository::new(pool.clone()),
        settings: SettingsRepository::new(pool),
    }
}

pub async fn test_app_with_state() -> (axum::Router, AppState) {
    let state = test_state(ScriptedBackend::replying(vec![])).await;
    (routes::router(state.clone()), state)
}
