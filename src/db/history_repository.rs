use sqlx::SqlitePool;
use tracing::error;

use crate::errors::AppError;
use crate::models::{HistoryGroup, HistoryRecord};

/// Append-only store of completed turns. Rows are never updated; the only
/// destructive operation is the bulk clear.
#[derive(Clone)]
pub struct HistoryRepository {
    pool: SqlitePool,
}

impl HistoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn append(&self, record: &HistoryRecord) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO chat_history (id, page_url, timestamp, user_message, ai_response, is_first_message)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&record.id)
        .bind(&record.page_url)
        .bind(record.timestamp)
        .bind(&record.user_message)
        .bind(&record.ai_response)
        .bind(record.is_first_message)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to append history record {}: {e}", record.id);
            AppError::db_query("Failed to append history record", e)
        })?;
        Ok(())
    }

    /// All records, newest first.
    pub async fn find_all(&self) -> Result<Vec<HistoryRecord>, AppError> {
        sqlx::query_as::<_, HistoryRecord>(
            "SELECT id, page_url, timestamp, user_message, ai_response, is_first_message
             FROM chat_history ORDER BY timestamp DESC, id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to fetch chat history: {e}");
            AppError::db_query("Failed to fetch chat history", e)
        })
    }

    pub async fn find_by_page_url(&self, page_url: &str) -> Result<Vec<HistoryRecord>, AppError> {
        sqlx::query_as::<_, HistoryRecord>(
            "SELECT id, page_url, timestamp, user_message, ai_response, is_first_message
             FROM chat_history WHERE page_url = $1 ORDER BY timestamp DESC, id",
        )
        .bind(page_url)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to fetch history for {page_url}: {e}");
            AppError::db_query(format!("Failed to fetch history for {page_url}"), e)
        })
    }

    pub async fn count_for_page(&self, page_url: &str) -> Result<i64, AppError> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM chat_history WHERE page_url = $1")
            .bind(page_url)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to count history for {page_url}: {e}");
                AppError::db_query("Failed to count history", e)
            })
    }

    /// Records grouped by page, groups ordered by their latest record.
    /// Backs the options-page listing.
    pub async fn grouped_by_page_url(&self) -> Result<Vec<HistoryGroup>, AppError> {
        let records = self.find_all().await?;

        let mut groups: Vec<HistoryGroup> = Vec::new();
        for record in records {
            match groups.iter_mut().find(|g| g.page_url == record.page_url) {
                Some(group) => {
                    group.latest_timestamp = group.latest_timestamp.max(record.timestamp);
                    group.records.push(record);
                }
                None => groups.push(HistoryGroup {
                    page_url: record.page_url.clone(),
                    latest_timestamp: record.timestamp,
                    records: vec![record],
                }),
            }
        }
        groups.sort_by(|a, b| b.latest_timestamp.cmp(&a.latest_timestamp));
        Ok(groups)
    }

    pub async fn clear_all(&self) -> Result<(), AppError> {
        sqlx::query("DELETE FROM chat_history")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to clear chat history: {e}");
                AppError::db_query("Failed to clear chat history", e)
            })?;
        Ok(())
    }
}
