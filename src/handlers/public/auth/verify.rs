// handlers/public/auth/verify.rs - GET /api/v1/auth/email/verify/:sqid/:hash handler

use axum::extract::{OriginalUri, State};
use serde_json::Value;
use url::Url;

use super::session::token_payload;
use crate::api::Path;
use crate::auth::signed_url::{self, email_hash};
use crate::auth::{generate_jwt, Claims};
use crate::config;
use crate::error::{ApiError, ErrorAction};
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::UserService;
use crate::state::AppState;

/// GET /api/v1/auth/email/verify/:sqid/:hash - Confirm an email address
///
/// The link is the signed URL mailed at registration
/// (`?expires=<unix>&signature=<hex>`).
///
/// Expected Output (Success):
/// ```json
/// {
///   "success": true,
///   "message": "Email has been verified and user logged in successfully",
///   "data": { "user": {...}, "access_token": "...", "token_type": "Bearer", "expires_in": 3600 }
/// }
/// ```
pub async fn verify_email(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Path((sqid, hash)): Path<(String, String)>,
) -> ApiResult<Value> {
    let config = config::config();
    let full = format!("{}{}", config.app.url.trim_end_matches('/'), uri);
    let signed = Url::parse(&full).map_err(|_| ApiError::forbidden("Invalid signature."))?;
    signed_url::verify(&signed, &config.security.app_key).map_err(|e| {
        tracing::warn!(?e, "Rejected verification link");
        ApiError::forbidden("Invalid signature.")
    })?;

    let id = state.decode_id(&sqid, "User")?;

    async {
        let users = UserService::new(state.pool.clone());
        let user = users.find(id).await?;

        if hash != email_hash(&user.email) {
            return Err(ApiError::bad_request("Invalid verification link"));
        }
        if user.has_verified_email() {
            return Ok(ApiResponse::message("Email already verified"));
        }

        let user = users.mark_email_verified(user.id).await?;
        tracing::info!(user_id = user.id, "email verified");

        let issued = generate_jwt(Claims::session(user.id))?;
        Ok(ApiResponse::success(
            "Email has been verified and user logged in successfully",
            token_payload(&state, &user, &issued),
        ))
    }
    .await
    .during("verifying email")
}
