use sqlx::SqlitePool;
use tracing::{error, warn};

use crate::errors::AppError;
use crate::models::Settings;

const SETTINGS_KEY: &str = "settings";

/// Stores the settings document whole under a single key, mirroring the
/// widget's key-value settings storage.
#[derive(Clone)]
pub struct SettingsRepository {
    pool: SqlitePool,
}

impl SettingsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Loads the stored settings, falling back to defaults when nothing has
    /// been saved yet or the stored document no longer parses.
    pub async fn load(&self) -> Result<Settings, AppError> {
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM settings WHERE key = $1")
            .bind(SETTINGS_KEY)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to load settings: {e}");
                AppError::db_query("Failed to load settings", e)
            })?;

        match value {
            Some(json) => match serde_json::from_str(&json) {
                Ok(settings) => Ok(settings),
                Err(e) => {
                    warn!("Stored settings are unreadable ({e}); using defaults");
                    Ok(Settings::default())
                }
            },
            None => Ok(Settings::default()),
        }
    }

    pub async fn save(&self, settings: &Settings) -> Result<(), AppError> {
        let json = serde_json::to_string(settings)
            .map_err(|e| AppError::Unexpected(format!("Failed to serialize settings: {e}")))?;

        sqlx::query(
            "INSERT INTO settings (key, value) VALUES ($1, $2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(SETTINGS_KEY)
        .bind(json)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to save settings: {e}");
            AppError::db_query("Failed to save settings", e)
        })?;
        Ok(())
    }
}
