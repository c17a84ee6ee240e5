use serde::Serialize;
use serde_json::{json, Value};
use sqlx::PgPool;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::database::models::Notification;
use crate::database::{DatabaseError, Page, PageMeta};
use crate::services::fcm::{PushError, PushGateway, PushMessage};
use crate::services::user_service::UserService;
use crate::types::NotificationStatus;

/// Inbox notification type written for delivered pushes
pub const PUSH_NOTIFICATION_TYPE: &str = "push_notification";

/// Per-user notification inbox
pub struct NotificationService {
    pool: PgPool,
}

impl NotificationService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn not_found() -> DatabaseError {
        DatabaseError::NotFound("Notification".to_string())
    }

    /// Newest first
    pub async fn list(&self, user_id: i64, page: i64, per_page: i64) -> Result<Page<Notification>, DatabaseError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        let items = sqlx::query_as::<_, Notification>(
            "SELECT * FROM notifications WHERE user_id = $1 ORDER BY created_at DESC, id LIMIT $2 OFFSET $3",
        )
        .bind(user_id)
        .bind(per_page)
        .bind((page - 1).saturating_mul(per_page))
        .fetch_all(&self.pool)
        .await?;

        Ok(Page {
            items,
            meta: PageMeta::new(page, per_page, total),
        })
    }

    pub async fn unread_count(&self, user_id: i64) -> Result<i64, DatabaseError> {
        let n = sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND read_at IS NULL")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    pub async fn mark_read(&self, user_id: i64, id: Uuid) -> Result<Notification, DatabaseError> {
        sqlx::query_as::<_, Notification>(
            r#"
            UPDATE notifications SET read_at = COALESCE(read_at, NOW()), updated_at = NOW()
            WHERE id = $1 AND user_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(Self::not_found)
    }

    pub async fn mark_all_read(&self, user_id: i64) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            "UPDATE notifications SET read_at = NOW(), updated_at = NOW() WHERE user_id = $1 AND read_at IS NULL",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete(&self, user_id: i64, id: Uuid) -> Result<(), DatabaseError> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Self::not_found());
        }
        Ok(())
    }

    pub async fn create(&self, user_id: i64, kind: &str, data: Value) -> Result<Notification, DatabaseError> {
        let row = sqlx::query_as::<_, Notification>(
            "INSERT INTO notifications (id, user_id, type, data) VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(kind)
        .bind(data)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenFailure {
    pub token: String,
    pub error: String,
}

/// `{ success_count, failure_count, tokens_with_errors }`
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchOutcome {
    pub success_count: usize,
    pub failure_count: usize,
    pub tokens_with_errors: Vec<TokenFailure>,
}

/// Sends through the push gateway and records every attempt
pub struct PushService {
    pool: PgPool,
    gateway: Arc<dyn PushGateway>,
}

impl PushService {
    pub fn new(pool: PgPool, gateway: Arc<dyn PushGateway>) -> Self {
        Self { pool, gateway }
    }

    pub async fn validate(&self, token: &str) -> Result<bool, PushError> {
        self.gateway.validate(token).await
    }

    /// Deliver one message. The attempt lands in `push_notifications`; when
    /// the token belongs to a user a successful send also lands in their inbox.
    pub async fn send(&self, message: &PushMessage) -> Result<Value, PushError> {
        let owner = UserService::new(self.pool.clone())
            .device_token_owner(&message.token)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("device token lookup failed: {}", e);
                None
            });

        let result = self.gateway.send(message).await;
        let (status, response) = match &result {
            Ok(response) => (NotificationStatus::Sent, response.clone()),
            Err(e) => (NotificationStatus::Failed, json!({ "error": e.to_string() })),
        };

        if let Err(e) = self.log(owner, message, status, &response).await {
            tracing::error!("Failed to record push notification: {}", e);
        }

        if let (Some(user_id), Ok(_)) = (owner, &result) {
            let inbox = NotificationService::new(self.pool.clone());
            let data = json!({
                "title": message.title,
                "body": message.body,
                "data": message.data,
            });
            if let Err(e) = inbox.create(user_id, PUSH_NOTIFICATION_TYPE, data).await {
                tracing::error!(user_id, "Failed to store inbox notification: {}", e);
            }
        }

        result
    }

    async fn log(
        &self,
        user_id: Option<i64>,
        message: &PushMessage,
        status: NotificationStatus,
        response: &Value,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO push_notifications (user_id, device_token, title, body, data, response, status, sent_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, CASE WHEN $7 = 'sent' THEN NOW() END)
            "#,
        )
        .bind(user_id)
        .bind(&message.token)
        .bind(&message.title)
        .bind(&message.body)
        .bind(json!(message.data))
        .bind(response)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Send the same message to each token, collecting per-token failures
    pub async fn send_many(
        &self,
        tokens: &[String],
        title: &str,
        body: &str,
        data: BTreeMap<String, String>,
        image: Option<String>,
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for token in tokens {
            let message = PushMessage::new(token.as_str(), title, body)
                .with_data(data.clone())
                .with_image(image.clone());
            match self.send(&message).await {
                Ok(_) => outcome.success_count += 1,
                Err(e) => {
                    outcome.failure_count += 1;
                    outcome.tokens_with_errors.push(TokenFailure {
                        token: token.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }
        outcome
    }

    /// "New Login" push to every device of a user. Failures are logged only.
    pub async fn notify_login(&self, user_id: i64, tokens: &[String]) {
        if tokens.is_empty() {
            return;
        }
        let data = BTreeMap::from([("type".to_string(), "login_notification".to_string())]);
        let outcome = self
            .send_many(tokens, "New Login", "Your account was just logged into.", data, None)
            .await;
        if outcome.failure_count > 0 {
            tracing::warn!(
                user_id,
                failures = outcome.failure_count,
                errors = ?outcome.tokens_with_errors,
                "login notification failed for some devices"
            );
        }
    }
}
