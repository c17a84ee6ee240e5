// handlers/protected/users/trash.rs - restore, force delete and bulk operations

use axum::extract::State;
use serde_json::Value;

use crate::api::{resources, Json, Path};
use crate::error::{ApiError, ErrorAction};
use crate::handlers::protected::utils::BulkRequest;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::UserService;
use crate::state::AppState;

/// POST /api/v1/users/:sqid/restore - Restore a soft-deleted user
pub async fn restore(State(state): State<AppState>, Path(sqid): Path<String>) -> ApiResult<Value> {
    let id = state.decode_id(&sqid, "User")?;
    let user = UserService::new(state.pool.clone())
        .repository()
        .restore(id)
        .await
        .map_err(ApiError::from)
        .during("restoring the user")?;
    Ok(ApiResponse::success(
        "User restored successfully",
        resources::user(&user, &state.sqids),
    ))
}

/// DELETE /api/v1/users/:sqid/force - Remove the row for good
pub async fn force_delete(State(state): State<AppState>, Path(sqid): Path<String>) -> ApiResult<Value> {
    let id = state.decode_id(&sqid, "User")?;
    UserService::new(state.pool.clone())
        .repository()
        .force_delete(id)
        .await
        .map_err(ApiError::from)
        .during("permanently deleting the user")?;
    tracing::info!(user_id = id, "user permanently deleted");
    Ok(ApiResponse::message("User permanently deleted successfully"))
}

/// POST /api/v1/users/bulk-delete
///
/// Expected Input:
/// ```json
/// { "sqids": ["86Rf07xd4z", "Lqv0Pe2Yd1"] }
/// ```
pub async fn bulk_delete(State(state): State<AppState>, Json(payload): Json<BulkRequest>) -> ApiResult<Value> {
    let ids = payload.ids(&state.sqids)?;
    let deleted = UserService::new(state.pool.clone())
        .repository()
        .bulk_soft_delete(&ids)
        .await
        .map_err(ApiError::from)
        .during("bulk deleting users")?;
    tracing::info!(requested = ids.len(), deleted, "bulk user delete");
    Ok(ApiResponse::message("Users deleted successfully"))
}

/// POST /api/v1/users/bulk-restore - Returns the restored users
pub async fn bulk_restore(State(state): State<AppState>, Json(payload): Json<BulkRequest>) -> ApiResult<Vec<Value>> {
    let ids = payload.ids(&state.sqids)?;
    let users = UserService::new(state.pool.clone())
        .repository()
        .bulk_restore(&ids)
        .await
        .map_err(ApiError::from)
        .during("bulk restoring users")?;
    Ok(ApiResponse::success(
        "Users restored successfully",
        users.iter().map(|u| resources::user(u, &state.sqids)).collect(),
    ))
}
