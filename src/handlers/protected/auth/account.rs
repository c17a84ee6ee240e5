// handlers/protected/auth/account.rs - current-user account handlers

use axum::{extract::State, Extension};
use serde::Deserialize;
use serde_json::Value;

use crate::api::{resources, Json, Validator};
use crate::auth::password::{hash_password, verify_password};
use crate::error::{ApiError, ErrorAction};
use crate::handlers::public::auth::session::send_verification;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::user_service::{UniqueColumn, UserChanges};
use crate::services::UserService;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UnlockRequest {
    pub pin: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: Option<String>,
    pub new_password: Option<String>,
    pub new_password_confirmation: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub username: Option<String>,
    pub phone: Option<String>,
}

/// POST /api/v1/auth/email/resend - Send a fresh verification link
pub async fn resend_verification(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Value> {
    if auth.user.has_verified_email() {
        return Ok(ApiResponse::message("Email already verified"));
    }
    send_verification(&state, &auth.user)
        .await
        .during("resending verification email")?;
    Ok(ApiResponse::message("Verification link sent"))
}

/// POST /api/v1/auth/unlock - Unlock the screen with the account PIN
///
/// Expected Input:
/// ```json
/// { "pin": "000000" }
/// ```
pub async fn unlock(Extension(auth): Extension<AuthUser>, Json(payload): Json<UnlockRequest>) -> ApiResult<Value> {
    let mut v = Validator::new();
    let pin = v.required("pin", payload.pin.as_deref());
    v.max_len("pin", pin, 6);
    v.finish()?;

    if verify_password(pin.unwrap_or_default(), &auth.user.pin) {
        Ok(ApiResponse::message("Screen unlocked successfully"))
    } else {
        tracing::warn!(user_id = auth.id(), "Invalid PIN");
        Err(ApiError::bad_request("Invalid PIN"))
    }
}

/// PUT /api/v1/auth/change-password - Change the caller's password
///
/// Expected Input:
/// ```json
/// {
///   "current_password": "password",
///   "new_password": "new-password",
///   "new_password_confirmation": "new-password"
/// }
/// ```
pub async fn change_password(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(payload): Json<ChangePasswordRequest>,
) -> ApiResult<Value> {
    let mut v = Validator::new();
    let current = v.required("current_password", payload.current_password.as_deref());
    let new_password = v.required("new_password", payload.new_password.as_deref());
    v.min_len("new_password", new_password, 8);
    v.confirmed("new_password", new_password, payload.new_password_confirmation.as_deref());
    v.finish()?;

    if !verify_password(current.unwrap_or_default(), &auth.user.password) {
        return Err(ApiError::bad_request("Current password is incorrect"));
    }

    async {
        let hashed = hash_password(new_password.unwrap_or_default())?;
        UserService::new(state.pool.clone()).set_password(auth.id(), &hashed).await?;
        tracing::info!(user_id = auth.id(), "password changed");
        Ok::<_, ApiError>(ApiResponse::message("Password changed successfully"))
    }
    .await
    .during("changing the password")
}

/// GET /api/v1/auth/profile - The authenticated user
pub async fn profile(State(state): State<AppState>, Extension(auth): Extension<AuthUser>) -> ApiResult<Value> {
    Ok(ApiResponse::success(
        "User profile retrieved successfully",
        resources::user(&auth.user, &state.sqids),
    ))
}

/// PUT /api/v1/auth/profile - Update name, email, username or phone
///
/// Expected Input (all optional):
/// ```json
/// { "name": "John Doe", "email": "john@example.com", "username": "johndoe", "phone": "+1234567890" }
/// ```
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(payload): Json<UpdateProfileRequest>,
) -> ApiResult<Value> {
    let users = UserService::new(state.pool.clone());
    let me = Some(auth.id());

    let mut v = Validator::new();
    v.max_len("name", payload.name.as_deref(), 255);
    v.email("email", payload.email.as_deref());
    v.max_len("email", payload.email.as_deref(), 255);
    v.max_len("username", payload.username.as_deref(), 255);
    v.max_len("phone", payload.phone.as_deref(), 255);
    if let Some(email) = payload.email.as_deref() {
        v.unique("email", users.is_taken(UniqueColumn::Email, email, me).await.map_err(ApiError::from).during("validating the request")?);
    }
    if let Some(username) = payload.username.as_deref() {
        v.unique("username", users.is_taken(UniqueColumn::Username, username, me).await.map_err(ApiError::from).during("validating the request")?);
    }
    if let Some(phone) = payload.phone.as_deref() {
        v.unique("phone", users.is_taken(UniqueColumn::Phone, phone, me).await.map_err(ApiError::from).during("validating the request")?);
    }
    v.finish()?;

    let changes = UserChanges {
        name: payload.name,
        email: payload.email,
        username: payload.username,
        phone: payload.phone,
        password_hash: None,
    };
    let user = users
        .update(auth.id(), changes)
        .await
        .map_err(ApiError::from)
        .during("updating the user profile")?;

    Ok(ApiResponse::success(
        "User profile updated successfully",
        resources::user(&user, &state.sqids),
    ))
}
