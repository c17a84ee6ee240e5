// handlers/public/auth/social.rs - social login handlers

use axum::{extract::State, http::HeaderMap};
use serde::Deserialize;
use serde_json::{json, Value};

use super::session::{complete_login, device_info, ensure_ip_allowed};
use crate::api::{ClientIp, Path, Query, Validator};
use crate::auth::{generate_jwt, Claims};
use crate::error::{ApiError, ErrorAction};
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::UserService;
use crate::state::AppState;
use crate::types::SocialProvider;

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub device_token: Option<String>,
    pub device_name: Option<String>,
    pub app_version: Option<String>,
}

fn provider(name: &str) -> Result<SocialProvider, ApiError> {
    name.parse::<SocialProvider>().map_err(ApiError::not_found)
}

/// GET /api/v1/auth/:provider - Authorization URL for a social provider
///
/// Expected Output (Success):
/// ```json
/// {
///   "success": true,
///   "message": "Successfully generated github authentication URL",
///   "data": { "url": "https://github.com/login/oauth/authorize?client_id=..." }
/// }
/// ```
pub async fn redirect(State(state): State<AppState>, Path(name): Path<String>) -> ApiResult<Value> {
    let provider = provider(&name)?;
    let url = state
        .social
        .redirect_url(provider)
        .map_err(ApiError::from)
        .during("redirecting to the provider")?;
    Ok(ApiResponse::success(
        format!("Successfully generated {} authentication URL", provider),
        json!({ "url": url }),
    ))
}

/// GET /api/v1/auth/:provider/callback?code=... - Complete a social login
///
/// Expected Output (Success):
/// ```json
/// {
///   "success": true,
///   "message": "User logged in successfully",
///   "data": { "user": {...}, "access_token": "...", "token_type": "Bearer", "expires_in": 3600 }
/// }
/// ```
pub async fn callback(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    headers: HeaderMap,
    Path(name): Path<String>,
    Query(query): Query<CallbackQuery>,
) -> ApiResult<Value> {
    let provider = provider(&name)?;

    let mut v = Validator::new();
    let code = v.required("code", query.code.as_deref());
    let device = device_info(
        &mut v,
        &headers,
        query.device_token.as_deref(),
        query.device_name.as_deref(),
        query.app_version.as_deref(),
    );
    v.finish()?;
    let code = code.unwrap_or_default();

    async {
        ensure_ip_allowed(&state, &ip).await?;

        let profile = state.social.user_from_code(provider, code).await?;
        let user = UserService::new(state.pool.clone())
            .upsert_social(&profile.email, &profile.name, provider.as_str(), &profile.id)
            .await?;

        let issued = generate_jwt(Claims::session(user.id))?;
        let data = complete_login(&state, &user, &ip, &device, &issued).await?;
        Ok::<_, ApiError>(ApiResponse::success("User logged in successfully", data))
    }
    .await
    .during("authenticating with the provider")
}
