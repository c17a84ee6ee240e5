// handlers/protected/users/transfer.rs - CSV import and mailed export

use axum::extract::State;
use serde_json::Value;

use crate::api::{resources, FormInput, Query};
use crate::error::{ApiError, ErrorAction};
use crate::handlers::protected::utils::{ExportQuery, ImportFile};
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::transfer::{self, ExportJob};
use crate::services::user_service::{ImportOutcome, USER_EXPORT_COLUMNS};
use crate::services::UserService;
use crate::state::AppState;

/// POST /api/v1/users/import - multipart `file` plus optional `update_existing`
///
/// Expected Output (Success):
/// ```json
/// { "success": true, "message": "Users imported successfully.", "data": { "created": 3, "updated": 0, "skipped": 1 } }
/// ```
pub async fn import(State(state): State<AppState>, input: FormInput) -> ApiResult<ImportOutcome> {
    let file = ImportFile::from_input(&input, &["name", "email"])?;
    let outcome = UserService::new(state.pool.clone())
        .import(file.rows, file.update_existing)
        .await
        .during("importing Users")?;
    Ok(ApiResponse::success("Users imported successfully.", outcome))
}

/// GET /api/v1/users/export
///
/// Query: `emails=a@x.com,b@x.com&start_date=2024-01-01&end_date=2024-01-31&file_type=csv&columns=id,name,email`
pub async fn export(State(state): State<AppState>, Query(query): Query<ExportQuery>) -> ApiResult<Value> {
    let params = query.validate("User", USER_EXPORT_COLUMNS)?;

    async {
        let users = UserService::new(state.pool.clone()).export_rows(params.range).await?;
        let resources: Vec<Value> = users.iter().map(|u| resources::user(u, &state.sqids)).collect();
        let job = ExportJob {
            model: "User",
            file_type: params.file_type,
            rows: transfer::to_rows(&resources, &params.columns),
            columns: params.columns,
            recipients: params.recipients,
        };
        job.write(&state.export_dir).await?.spawn_delivery(state.mailer.clone());
        Ok::<_, ApiError>(ApiResponse::message(
            "User export initiated. You will receive an email shortly.",
        ))
    }
    .await
    .during("exporting Users")
}
