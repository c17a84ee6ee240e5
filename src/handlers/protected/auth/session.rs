// handlers/protected/auth/session.rs - logout and token refresh

use axum::{extract::State, Extension};
use serde_json::{json, Value};

use crate::auth::{generate_jwt, Claims};
use crate::error::{ApiError, ErrorAction};
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::AuthService;
use crate::state::AppState;

/// POST /api/v1/auth/logout - Revoke the current token
pub async fn logout(State(state): State<AppState>, Extension(auth): Extension<AuthUser>) -> ApiResult<Value> {
    AuthService::new(state.pool.clone())
        .blacklist(&auth.jti, auth.expires_at)
        .await
        .map_err(ApiError::from)
        .during("logging out")?;
    tracing::info!(user_id = auth.id(), "user logged out");
    Ok(ApiResponse::message("User successfully logged out"))
}

/// POST /api/v1/auth/refresh - Swap the current token for a fresh one
///
/// Expected Output (Success):
/// ```json
/// {
///   "success": true,
///   "message": "Token successfully refreshed",
///   "data": { "access_token": "...", "token_type": "Bearer", "expires_in": 3600 }
/// }
/// ```
pub async fn refresh(State(state): State<AppState>, Extension(auth): Extension<AuthUser>) -> ApiResult<Value> {
    async {
        AuthService::new(state.pool.clone())
            .blacklist(&auth.jti, auth.expires_at)
            .await?;
        let issued = generate_jwt(Claims::session(auth.id()))?;
        Ok::<_, ApiError>(ApiResponse::success(
            "Token successfully refreshed",
            json!({
                "access_token": issued.token,
                "token_type": "Bearer",
                "expires_in": issued.claims.ttl_seconds(),
            }),
        ))
    }
    .await
    .during("refreshing the token")
}
