// handlers/protected/uploads/transfer.rs - CSV import and mailed export

use axum::extract::State;
use axum::Extension;
use serde_json::Value;

use crate::api::{resources, FormInput, Query};
use crate::error::{ApiError, ErrorAction};
use crate::handlers::protected::utils::{ExportQuery, ImportFile};
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::transfer::{self, ExportJob};
use crate::services::upload_service::UPLOAD_EXPORT_COLUMNS;
use crate::services::user_service::ImportOutcome;
use crate::services::UploadService;
use crate::state::AppState;

/// POST /api/v1/uploads/import - rows are keyed by `path` for the caller
pub async fn import(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    input: FormInput,
) -> ApiResult<ImportOutcome> {
    let file = ImportFile::from_input(&input, &["path"])?;
    let outcome = UploadService::new(state.pool.clone())
        .import(auth.id(), file.rows, file.update_existing)
        .await
        .map_err(ApiError::from)
        .during("importing Uploads")?;
    Ok(ApiResponse::success("Uploads imported successfully.", outcome))
}

/// GET /api/v1/uploads/export
pub async fn export(State(state): State<AppState>, Query(query): Query<ExportQuery>) -> ApiResult<Value> {
    let params = query.validate("Upload", UPLOAD_EXPORT_COLUMNS)?;

    async {
        let uploads = UploadService::new(state.pool.clone()).export_rows(params.range).await?;
        let resources: Vec<Value> = uploads
            .iter()
            .map(|u| resources::upload(u, &state.sqids, &state.storage))
            .collect();
        ExportJob {
            model: "Upload",
            file_type: params.file_type,
            rows: transfer::to_rows(&resources, &params.columns),
            columns: params.columns,
            recipients: params.recipients,
        }
        .write(&state.export_dir)
        .await?
        .spawn_delivery(state.mailer.clone());
        Ok::<_, ApiError>(ApiResponse::message(
            "Upload export initiated. You will receive an email shortly.",
        ))
    }
    .await
    .during("exporting Uploads")
}
