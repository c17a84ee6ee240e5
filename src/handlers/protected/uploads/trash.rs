// handlers/protected/uploads/trash.rs - restore, force delete and bulk operations

use axum::extract::State;
use serde_json::Value;

use crate::api::{resources, Json, Path};
use crate::error::{ApiError, ErrorAction};
use crate::handlers::protected::utils::BulkRequest;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::UploadService;
use crate::state::AppState;
use crate::types::StorageProvider;

/// POST /api/v1/uploads/:sqid/restore
pub async fn restore(State(state): State<AppState>, Path(sqid): Path<String>) -> ApiResult<Value> {
    let id = state.decode_id(&sqid, "Upload")?;
    let upload = UploadService::new(state.pool.clone())
        .repository()
        .restore(id)
        .await
        .map_err(ApiError::from)
        .during("restoring the upload")?;
    Ok(ApiResponse::success(
        "Upload restored successfully",
        resources::upload(&upload, &state.sqids, &state.storage),
    ))
}

/// DELETE /api/v1/uploads/:sqid/force - Drop the row (trashed or not) and the stored file
pub async fn force_delete(State(state): State<AppState>, Path(sqid): Path<String>) -> ApiResult<Value> {
    let id = state.decode_id(&sqid, "Upload")?;
    let repo = UploadService::new(state.pool.clone()).repository();

    let upload = async {
        let upload = repo.select_with_trashed_404(id).await?;
        repo.force_delete(id).await?;
        Ok::<_, ApiError>(upload)
    }
    .await
    .during("permanently deleting the upload")?;

    // The row is gone either way; a missing object only warrants a warning
    match upload.provider.parse::<StorageProvider>() {
        Ok(provider) => {
            if let Err(e) = state.storage.remove(provider, &upload.path).await {
                tracing::warn!(upload_id = id, path = %upload.path, "stored file not removed: {}", e);
            }
        }
        Err(e) => tracing::warn!(upload_id = id, "{}", e),
    }
    Ok(ApiResponse::message("Upload permanently deleted successfully"))
}

/// POST /api/v1/uploads/bulk-delete - `{ "sqids": [...] }`
pub async fn bulk_delete(State(state): State<AppState>, Json(payload): Json<BulkRequest>) -> ApiResult<Value> {
    let ids = payload.ids(&state.sqids)?;
    UploadService::new(state.pool.clone())
        .repository()
        .bulk_soft_delete(&ids)
        .await
        .map_err(ApiError::from)
        .during("bulk deleting uploads")?;
    Ok(ApiResponse::message("Uploads deleted successfully"))
}

/// POST /api/v1/uploads/bulk-restore
pub async fn bulk_restore(State(state): State<AppState>, Json(payload): Json<BulkRequest>) -> ApiResult<Vec<Value>> {
    let ids = payload.ids(&state.sqids)?;
    let uploads = UploadService::new(state.pool.clone())
        .repository()
        .bulk_restore(&ids)
        .await
        .map_err(ApiError::from)
        .during("bulk restoring uploads")?;
    Ok(ApiResponse::success(
        "Uploads restored successfully",
        uploads
            .iter()
            .map(|u| resources::upload(u, &state.sqids, &state.storage))
            .collect(),
    ))
}
