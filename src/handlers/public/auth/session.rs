// handlers/public/auth/session.rs - shared login completion
//
// Every successful sign-in (password, passport, social, verification)
// ends here: login bookkeeping, device registration, login push and the
// token payload.

use axum::http::{header, HeaderMap};
use serde_json::{json, Value};

use crate::api::{resources, Validator};
use crate::auth::IssuedToken;
use crate::database::models::User;
use crate::error::ApiError;
use crate::services::user_service::DeviceInfo;
use crate::services::{BlockedIpService, PushService, UserService};
use crate::state::AppState;

/// `device_token`, `device_name` (≤255) and `app_version` (≤50) from a request body
pub fn device_info(
    v: &mut Validator,
    headers: &HeaderMap,
    token: Option<&str>,
    name: Option<&str>,
    app_version: Option<&str>,
) -> DeviceInfo {
    v.max_len("device_name", name, 255);
    v.max_len("app_version", app_version, 50);
    DeviceInfo {
        token: token.map(str::trim).filter(|t| !t.is_empty()).map(str::to_string),
        device_type: headers
            .get(header::USER_AGENT)
            .and_then(|ua| ua.to_str().ok())
            .map(|ua| ua.chars().take(50).collect()),
        device_name: name.map(str::to_string),
        app_version: app_version.map(str::to_string),
    }
}

/// 403 when the caller's address is on the block list
pub async fn ensure_ip_allowed(state: &AppState, ip: &str) -> Result<(), ApiError> {
    if BlockedIpService::new(state.pool.clone()).is_blocked(ip).await? {
        tracing::warn!(ip, "Request from blocked IP");
        return Err(ApiError::forbidden("Your IP address is blocked."));
    }
    Ok(())
}

/// `{ user, access_token, token_type, expires_in }`
pub fn token_payload(state: &AppState, user: &User, issued: &IssuedToken) -> Value {
    json!({
        "user": resources::user(user, &state.sqids),
        "access_token": issued.token,
        "token_type": "Bearer",
        "expires_in": issued.claims.ttl_seconds(),
    })
}

/// Record the login, register the device, notify the user's devices and
/// build the token payload
pub async fn complete_login(
    state: &AppState,
    user: &User,
    ip: &str,
    device: &DeviceInfo,
    issued: &IssuedToken,
) -> Result<Value, ApiError> {
    let users = UserService::new(state.pool.clone());
    let user = users.record_login(user.id, ip).await?;
    users.upsert_device_token(user.id, device).await?;

    let tokens = users.device_tokens(user.id).await?;
    if !tokens.is_empty() {
        let push = PushService::new(state.pool.clone(), state.push.clone());
        let user_id = user.id;
        tokio::spawn(async move {
            push.notify_login(user_id, &tokens).await;
        });
    }

    tracing::info!(user_id = user.id, ip, "user logged in");
    Ok(token_payload(state, &user, issued))
}

/// Mail a signed verification link to `user`
pub async fn send_verification(state: &AppState, user: &User) -> Result<(), ApiError> {
    let config = crate::config::config();
    let expire = config.security.verification_expire_minutes;
    let url = crate::services::auth_service::verification_url(
        &config.app.url,
        &state.sqids.encode(user.id),
        &user.email,
        chrono::Duration::minutes(expire),
    )
    .map_err(ApiError::internal)?;

    let message = crate::services::mail::MailMessage::verify_email(&user.email, &user.name, url.as_str(), expire);
    state.mailer.send(message).await?;
    Ok(())
}
