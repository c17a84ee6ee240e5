// handlers/protected/notifications.rs - the caller's notification inbox

use axum::extract::State;
use axum::Extension;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::api::{resources, Path, Query, Validator};
use crate::error::{ApiError, ErrorAction};
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::NotificationService;
use crate::state::AppState;

const DEFAULT_PER_PAGE: i64 = 15;

#[derive(Debug, Default, Deserialize)]
pub struct InboxQuery {
    pub page: Option<String>,
    pub per_page: Option<String>,
}

fn notification_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::model_not_found("Notification"))
}

/// GET /api/v1/notifications/all
///
/// Expected Output (Success):
/// ```json
/// {
///   "success": true,
///   "message": "Notifications retrieved successfully",
///   "data": { "notifications": [ { "id": "...", "type": "push_notification", "data": {...}, "read_at": null } ], "unread_count": 1 },
///   "meta": { "current_page": 1, "last_page": 1, "per_page": 15, "total": 1 }
/// }
/// ```
pub async fn index(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<InboxQuery>,
) -> ApiResult<Value> {
    let mut v = Validator::new();
    let page = v.integer_between("page", query.page.as_deref(), 1, i64::MAX).unwrap_or(1);
    let per_page = v
        .integer_between("per_page", query.per_page.as_deref(), 1, 100)
        .unwrap_or(DEFAULT_PER_PAGE);
    v.finish()?;

    async {
        let inbox = NotificationService::new(state.pool.clone());
        let (page, unread_count) =
            tokio::try_join!(inbox.list(auth.id(), page, per_page), inbox.unread_count(auth.id()))?;
        let notifications: Vec<Value> = page.items.iter().map(resources::notification).collect();
        Ok::<_, ApiError>(ApiResponse::paginated(
            "Notifications retrieved successfully",
            json!({ "notifications": notifications, "unread_count": unread_count }),
            page.meta,
        ))
    }
    .await
    .during("fetching notifications")
}

/// PATCH /api/v1/notifications/:id/read
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    let id = notification_id(&id)?;
    NotificationService::new(state.pool.clone())
        .mark_read(auth.id(), id)
        .await
        .map_err(ApiError::from)
        .during("marking the notification as read")?;
    Ok(ApiResponse::message("Notification marked as read"))
}

/// POST /api/v1/notifications/mark-all-read
pub async fn mark_all_read(State(state): State<AppState>, Extension(auth): Extension<AuthUser>) -> ApiResult<Value> {
    let updated = NotificationService::new(state.pool.clone())
        .mark_all_read(auth.id())
        .await
        .map_err(ApiError::from)
        .during("marking notifications as read")?;
    tracing::debug!(user_id = auth.id(), updated, "notifications marked read");
    Ok(ApiResponse::message("All notifications marked as read"))
}

/// DELETE /api/v1/notifications/:id
pub async fn destroy(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    let id = notification_id(&id)?;
    NotificationService::new(state.pool.clone())
        .delete(auth.id(), id)
        .await
        .map_err(ApiError::from)
        .during("deleting the notification")?;
    Ok(ApiResponse::message("Notification deleted"))
}

/// GET /api/v1/notifications/unread-count
pub async fn unread_count(State(state): State<AppState>, Extension(auth): Extension<AuthUser>) -> ApiResult<Value> {
    let count = NotificationService::new(state.pool.clone())
        .unread_count(auth.id())
        .await
        .map_err(ApiError::from)
        .during("counting unread notifications")?;
    Ok(ApiResponse::success(
        "Unread notification count retrieved successfully",
        json!({ "unread_count": count }),
    ))
}
