// handlers/public/auth/passport.rs - POST /api/v1/auth/issue-passport-token handler

use axum::{extract::State, http::HeaderMap};
use chrono::Duration;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::session::{complete_login, device_info, ensure_ip_allowed};
use crate::api::{ClientIp, Json, Validator};
use crate::auth::{generate_jwt, password::verify_password, Claims};
use crate::config;
use crate::database::models::OAuthClient;
use crate::error::{ApiError, ErrorAction};
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::oauth_service::NewAccessToken;
use crate::services::user_service::DeviceInfo;
use crate::services::{OAuthService, UserService};
use crate::state::AppState;
use crate::types::GrantType;

#[derive(Debug, Deserialize)]
pub struct PassportTokenRequest {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub grant_type: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub client_name: Option<String>,
    pub scopes: Option<Vec<String>>,
    pub device_token: Option<String>,
    pub device_name: Option<String>,
    pub app_version: Option<String>,
}

/// POST /api/v1/auth/issue-passport-token - Issue a token for an OAuth client
///
/// Expected Input (password grant):
/// ```json
/// {
///   "client_id": "9b1deb4d-3b7d-4bad-9bdd-2b0d7b3dcb6d",
///   "client_secret": "40-character-secret",
///   "grant_type": "password",
///   "email": "john@example.com",
///   "password": "password",
///   "scopes": ["*"]
/// }
/// ```
///
/// Expected Output (client_credentials grant):
/// ```json
/// {
///   "success": true,
///   "message": "Client credentials token issued successfully",
///   "data": { "access_token": "...", "token_type": "Bearer", "expires_at": "2024-06-01 12:00:00" }
/// }
/// ```
pub async fn issue_token(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    headers: HeaderMap,
    Json(payload): Json<PassportTokenRequest>,
) -> ApiResult<Value> {
    let mut v = Validator::new();
    let client_id = v.required("client_id", payload.client_id.as_deref());
    let client_secret = v.required("client_secret", payload.client_secret.as_deref());
    let grant = v.required("grant_type", payload.grant_type.as_deref());
    v.one_of("grant_type", grant, &["password", "client_credentials"]);
    let grant = grant.and_then(|g| g.parse::<GrantType>().ok());
    if grant == Some(GrantType::Password) {
        let email = v.required("email", payload.email.as_deref());
        v.email("email", email);
        v.required("password", payload.password.as_deref());
    }
    v.max_len("client_name", payload.client_name.as_deref(), 255);
    let device = device_info(
        &mut v,
        &headers,
        payload.device_token.as_deref(),
        payload.device_name.as_deref(),
        payload.app_version.as_deref(),
    );
    v.finish()?;
    let (Some(client_id), Some(client_secret), Some(grant)) = (client_id, client_secret, grant) else {
        return Err(ApiError::bad_request("Invalid grant type"));
    };

    async {
        ensure_ip_allowed(&state, &ip).await?;

        let oauth = OAuthService::new(state.pool.clone());
        let client = match Uuid::parse_str(client_id) {
            Ok(id) => oauth.verify_client(id, client_secret).await?,
            Err(_) => None,
        };
        let Some(client) = client else {
            tracing::warn!(ip = %ip, "Invalid client credentials");
            return Err(ApiError::unauthorized("Invalid client credentials"));
        };

        match grant {
            GrantType::Password => password_grant(&state, &oauth, &client, &payload, &ip, &device).await,
            GrantType::ClientCredentials => client_credentials_grant(&oauth, &client).await,
        }
    }
    .await
    .during("issuing the token")
}

async fn password_grant(
    state: &AppState,
    oauth: &OAuthService,
    client: &OAuthClient,
    payload: &PassportTokenRequest,
    ip: &str,
    device: &DeviceInfo,
) -> ApiResult<Value> {
    if !client.password_client {
        return Err(ApiError::unauthorized("This client is not authorized for password grant"));
    }

    let email = payload.email.as_deref().unwrap_or_default();
    let password = payload.password.as_deref().unwrap_or_default();
    let user = match UserService::new(state.pool.clone()).find_by_email(email).await? {
        Some(user) if verify_password(password, &user.password) => user,
        _ => return Err(ApiError::unauthorized("Invalid user credentials")),
    };

    let ttl = Duration::minutes(config::config().security.passport_password_ttl_minutes);
    let issued = generate_jwt(Claims::new(user.id, ttl))?;
    oauth
        .record_token(NewAccessToken {
            jti: issued.claims.jti.clone(),
            user_id: Some(user.id),
            client_id: client.id,
            name: payload.client_name.clone().or_else(|| Some(client.name.clone())),
            scopes: Some(json!(payload.scopes.clone().unwrap_or_default())),
            expires_at: issued.claims.expires_at(),
        })
        .await?;

    let data = complete_login(state, &user, ip, device, &issued).await?;
    Ok(ApiResponse::success("User logged in successfully", data))
}

async fn client_credentials_grant(oauth: &OAuthService, client: &OAuthClient) -> ApiResult<Value> {
    if !client.personal_access_client {
        return Err(ApiError::unauthorized(
            "This client is not authorized for client credentials grant",
        ));
    }
    let Some(owner) = client.user_id else {
        return Err(ApiError::unauthorized(
            "This client is not authorized for client credentials grant",
        ));
    };

    let ttl = Duration::days(config::config().security.personal_token_ttl_days);
    let issued = generate_jwt(Claims::new(owner, ttl))?;
    let expires_at = issued.claims.expires_at();
    oauth
        .record_token(NewAccessToken {
            jti: issued.claims.jti.clone(),
            user_id: Some(owner),
            client_id: client.id,
            name: Some("Client Access Token".to_string()),
            scopes: Some(json!([])),
            expires_at,
        })
        .await?;

    Ok(ApiResponse::success(
        "Client credentials token issued successfully",
        json!({
            "access_token": issued.token,
            "token_type": "Bearer",
            "expires_at": expires_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        }),
    ))
}
