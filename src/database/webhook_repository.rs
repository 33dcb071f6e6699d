use crate::database::error::{DatabaseError, DbResult};
use crate::database::repository::NotificationLog;
use async_trait::async_trait;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// Webhook event entity
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WebhookEvent {
    pub id: String,
    pub event_type: String,
    pub source: String,
    pub payload: serde_json::Value,
    pub processed: bool,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub processed_at: Option<chrono::DateTime<chrono::Utc>>,
}

const COLUMNS: &str =
    "id, event_type, source, payload, processed, attempts, last_error, created_at, processed_at";

/// Webhook Repository for gateway notification storage and tracking
pub struct WebhookRepository {
    pool: PgPool,
}

impl WebhookRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationLog for WebhookRepository {
    async fn log_event(
        &self,
        event_type: &str,
        source: &str,
        payload: serde_json::Value,
    ) -> DbResult<WebhookEvent> {
        let event_id = Uuid::new_v4().to_string();

        sqlx::query_as::<_, WebhookEvent>(&format!(
            "INSERT INTO webhook_events (id, event_type, source, payload, processed, attempts, created_at)
             VALUES ($1, $2, $3, $4, false, 0, NOW())
             RETURNING {COLUMNS}"
        ))
        .bind(&event_id)
        .bind(event_type)
        .bind(source)
        .bind(payload)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn mark_processed(&self, event_id: &str, note: Option<&str>) -> DbResult<WebhookEvent> {
        sqlx::query_as::<_, WebhookEvent>(&format!(
            "UPDATE webhook_events SET processed = true, processed_at = NOW(), last_error = $2
             WHERE id = $1
             RETURNING {COLUMNS}"
        ))
        .bind(event_id)
        .bind(note)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn record_failure(&self, event_id: &str, error: &str) -> DbResult<WebhookEvent> {
        sqlx::query_as::<_, WebhookEvent>(&format!(
            "UPDATE webhook_events SET attempts = attempts + 1, last_error = $2
             WHERE id = $1
             RETURNING {COLUMNS}"
        ))
        .bind(event_id)
        .bind(error)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}
