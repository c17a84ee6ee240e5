// handlers/public/auth/login.rs - POST /api/v1/auth/login handler

use axum::{extract::State, http::HeaderMap};
use serde::Deserialize;
use serde_json::Value;

use super::session::{complete_login, device_info, ensure_ip_allowed, send_verification};
use crate::api::{ClientIp, Json, Validator};
use crate::auth::{generate_jwt, password::verify_password, Claims};
use crate::error::{ApiError, ErrorAction};
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::UserService;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub device_token: Option<String>,
    pub device_name: Option<String>,
    pub app_version: Option<String>,
}

/// POST /api/v1/auth/login - Authenticate with email and password
///
/// Expected Input:
/// ```json
/// {
///   "email": "john@example.com",
///   "password": "password",
///   "device_token": "fMIRMc1kF0M:APA91b...",   // optional
///   "device_name": "Pixel 8",                  // optional
///   "app_version": "1.4.0"                     // optional
/// }
/// ```
///
/// Expected Output (Success):
/// ```json
/// {
///   "success": true,
///   "message": "User logged in successfully",
///   "data": {
///     "user": { "id": "86Rf07xd4z", "name": "John Doe", ... },
///     "access_token": "eyJhbGciOiJIUzI1NiI...",
///     "token_type": "Bearer",
///     "expires_in": 3600
///   }
/// }
/// ```
pub async fn login(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<Value> {
    let mut v = Validator::new();
    let email = v.required("email", payload.email.as_deref());
    v.email("email", email);
    let password = v.required("password", payload.password.as_deref());
    let device = device_info(
        &mut v,
        &headers,
        payload.device_token.as_deref(),
        payload.device_name.as_deref(),
        payload.app_version.as_deref(),
    );
    v.finish()?;
    let (Some(email), Some(password)) = (email, password) else {
        return Err(ApiError::bad_request("Invalid login credentials"));
    };

    async {
        ensure_ip_allowed(&state, &ip).await?;

        let users = UserService::new(state.pool.clone());
        let user = match users.find_by_email(email).await? {
            Some(user) if verify_password(password, &user.password) => user,
            _ => {
                tracing::warn!(ip = %ip, "Failed login attempt");
                return Err(ApiError::unauthorized("Invalid login credentials"));
            }
        };

        if !user.has_verified_email() {
            send_verification(&state, &user).await?;
            return Err(ApiError::forbidden(
                "Your email is not verified. A new verification link has been sent to your email address.",
            ));
        }

        let issued = generate_jwt(Claims::session(user.id))?;
        let payload = complete_login(&state, &user, &ip, &device, &issued).await?;
        Ok::<_, ApiError>(ApiResponse::success("User logged in successfully", payload))
    }
    .await
    .during("logging in")
}
