// handlers/public/auth/password.rs - password reset handlers

use axum::extract::State;
use serde::Deserialize;
use serde_json::Value;

use crate::api::{Json, Validator};
use crate::auth::password::hash_password;
use crate::config;
use crate::error::{ApiError, ErrorAction};
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::auth_service::reset_url;
use crate::services::mail::MailMessage;
use crate::services::{AuthService, UserService};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub password_confirmation: Option<String>,
}

/// POST /api/v1/auth/forgot-password - Mail a password reset link
///
/// Expected Input:
/// ```json
/// { "email": "john@example.com" }
/// ```
///
/// Expected Output (Success):
/// ```json
/// { "success": true, "message": "We have emailed your password reset link.", "data": null }
/// ```
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> ApiResult<Value> {
    let mut v = Validator::new();
    let email = v.required("email", payload.email.as_deref());
    v.email("email", email);
    v.finish()?;
    let email = email.unwrap_or_default();

    async {
        let Some(user) = UserService::new(state.pool.clone()).find_by_email(email).await? else {
            return Err(ApiError::bad_request("We can't find a user with that email address."));
        };

        let token = AuthService::new(state.pool.clone()).create_reset_token(&user.email).await?;
        let config = config::config();
        let url = reset_url(&config.app.frontend_url, &token, &user.email)
            .map_err(ApiError::internal)?;
        state
            .mailer
            .send(MailMessage::reset_password(
                &user.email,
                url.as_str(),
                config.security.password_reset_expire_minutes,
            ))
            .await?;

        Ok(ApiResponse::message("We have emailed your password reset link."))
    }
    .await
    .during("sending the password reset link")
}

/// POST /api/v1/auth/reset-password - Reset a password with a mailed token
///
/// Expected Input:
/// ```json
/// {
///   "token": "Qm9n...",
///   "email": "john@example.com",
///   "password": "new-password",
///   "password_confirmation": "new-password"
/// }
/// ```
///
/// Expected Output (Success):
/// ```json
/// { "success": true, "message": "Your password has been reset.", "data": null }
/// ```
pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> ApiResult<Value> {
    let mut v = Validator::new();
    let token = v.required("token", payload.token.as_deref());
    let email = v.required("email", payload.email.as_deref());
    v.email("email", email);
    let password = v.required("password", payload.password.as_deref());
    v.min_len("password", password, 8);
    v.confirmed("password", password, payload.password_confirmation.as_deref());
    v.finish()?;
    let (Some(token), Some(email), Some(password)) = (token, email, password) else {
        return Err(ApiError::bad_request("This password reset token is invalid."));
    };

    async {
        let users = UserService::new(state.pool.clone());
        let Some(user) = users.find_by_email(email).await? else {
            return Err(ApiError::bad_request("We can't find a user with that email address."));
        };

        let auth = AuthService::new(state.pool.clone());
        let expire = config::config().security.password_reset_expire_minutes;
        if !auth.reset_token_is_valid(&user.email, token, expire).await? {
            return Err(ApiError::bad_request("This password reset token is invalid."));
        }

        users.set_password(user.id, &hash_password(password)?).await?;
        auth.delete_reset_token(&user.email).await?;
        tracing::info!(user_id = user.id, "password reset");

        Ok(ApiResponse::message("Your password has been reset."))
    }
    .await
    .during("resetting the password")
}
