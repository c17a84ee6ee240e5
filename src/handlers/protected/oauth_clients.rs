// handlers/protected/oauth_clients.rs - /api/v1/oauth-clients
//
// OAuth clients are addressed by their UUID, tokens by their `jti`.

use axum::extract::State;
use axum::Extension;
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::api::{resources, Json, Path, Query, Validator};
use crate::auth::password::verify_password;
use crate::config;
use crate::database::models::{OAuthAccessToken, OAuthClient};
use crate::database::IndexQuery;
use crate::error::{ApiError, ErrorAction};
use crate::handlers::protected::utils::list_params;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::oauth_service::{ClientInput, CLIENT_LISTING, TOKEN_LISTING};
use crate::services::{AuthService, OAuthService, VendorDirectory};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ClientRequest {
    pub name: Option<String>,
    pub redirect: Option<String>,
    pub vendor_id: Option<Value>,
    pub vendor_name: Option<String>,
    pub client_app: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SecretRequest {
    pub password: Option<String>,
}

fn client_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::model_not_found("OAuth client"))
}

impl ClientRequest {
    async fn validate(&self, state: &AppState) -> Result<ClientInput, ApiError> {
        let mut v = Validator::new();
        let name = v.required("name", self.name.as_deref());
        v.max_len("name", name, 255);
        let redirect = self.redirect.as_deref().filter(|r| !r.is_empty());
        v.url("redirect", redirect);
        v.max_len("vendor_name", self.vendor_name.as_deref(), 255);
        v.max_len("client_app", self.client_app.as_deref(), 255);

        let vendor_id = match &self.vendor_id {
            None | Some(Value::Null) => None,
            Some(raw) => {
                let parsed = match raw {
                    Value::Number(n) => n.as_i64(),
                    Value::String(s) => s.trim().parse::<i64>().ok(),
                    _ => None,
                };
                match parsed {
                    None => v.add("vendor_id", "The vendor id field must be an integer."),
                    Some(id) => {
                        if let Some(pool) = &state.vendors {
                            let exists = VendorDirectory::new(pool.clone()).exists(id).await?;
                            v.check(exists, "vendor_id", "The selected vendor id is invalid.");
                        }
                    }
                }
                parsed
            }
        };
        v.finish()?;

        Ok(ClientInput {
            name: name.unwrap_or_default().to_string(),
            redirect: redirect
                .map(str::to_string)
                .unwrap_or_else(|| config::config().app.url.clone()),
            vendor_id,
            vendor: self.vendor_name.clone(),
            client_app: self.client_app.clone(),
        })
    }
}

/// GET /api/v1/oauth-clients
pub async fn index(State(state): State<AppState>, Query(query): Query<IndexQuery>) -> ApiResult<Vec<Value>> {
    let params = list_params(&query, &CLIENT_LISTING)?;
    let page = CLIENT_LISTING
        .fetch::<OAuthClient>(&state.pool, &params, &[])
        .await
        .map_err(ApiError::from)
        .during("fetching OAuth clients")?
        .map(|c| resources::oauth_client(&c, &state.sqids, false));
    Ok(ApiResponse::paginated("OAuth clients retrieved successfully", page.items, page.meta))
}

/// POST /api/v1/oauth-clients - Create a password grant client
///
/// Expected Input:
/// ```json
/// { "name": "Storefront", "redirect": "https://shop.example.com/callback", "vendor_id": 12, "vendor_name": "Acme", "client_app": "web" }
/// ```
///
/// The response includes the generated `secret`.
pub async fn store(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(payload): Json<ClientRequest>,
) -> ApiResult<Value> {
    let input = payload
        .validate(&state)
        .await
        .during("creating the OAuth password grant client")?;
    let client = OAuthService::new(state.pool.clone())
        .create_client(auth.id(), input)
        .await
        .map_err(ApiError::from)
        .during("creating the OAuth password grant client")?;
    Ok(ApiResponse::created(
        "OAuth password grant client created successfully",
        resources::oauth_client(&client, &state.sqids, true),
    ))
}

/// GET /api/v1/oauth-clients/:id
pub async fn show(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Value> {
    let id = client_id(&id)?;
    let client = OAuthService::new(state.pool.clone())
        .find_client(id)
        .await
        .map_err(ApiError::from)
        .during("retrieving OAuth client")?;
    Ok(ApiResponse::success(
        "OAuth client retrieved successfully",
        resources::oauth_client(&client, &state.sqids, false),
    ))
}

/// PUT /api/v1/oauth-clients/:id
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<ClientRequest>,
) -> ApiResult<Value> {
    let id = client_id(&id)?;
    let service = OAuthService::new(state.pool.clone());
    service
        .find_client(id)
        .await
        .map_err(ApiError::from)
        .during("updating OAuth client")?;
    let input = payload.validate(&state).await.during("updating OAuth client")?;
    let client = service
        .update_client(id, input)
        .await
        .map_err(ApiError::from)
        .during("updating OAuth client")?;
    Ok(ApiResponse::success(
        "OAuth client updated successfully",
        resources::oauth_client(&client, &state.sqids, false),
    ))
}

/// DELETE /api/v1/oauth-clients/:id - Only revoked clients can be deleted
pub async fn destroy(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Value> {
    let id = client_id(&id)?;
    async {
        let service = OAuthService::new(state.pool.clone());
        let client = service.find_client(id).await?;
        if !client.revoked {
            return Err(ApiError::bad_request("Un-revoked oauth client cannot be deleted"));
        }
        service.delete_client(id).await?;
        Ok::<_, ApiError>(ApiResponse::message("OAuth client deleted successfully"))
    }
    .await
    .during("deleting OAuth client")
}

/// POST /api/v1/oauth-clients/:id/revoke - Revoke a client and every token it issued
pub async fn revoke(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Value> {
    let id = client_id(&id)?;
    async {
        let service = OAuthService::new(state.pool.clone());
        let client = service.find_client(id).await?;
        if client.personal_access_client {
            return Err(ApiError::bad_request("This client cannot be revoked."));
        }
        let client = service.revoke_client(id).await?;
        Ok::<_, ApiError>(ApiResponse::success(
            "OAuth client revoked successfully",
            resources::oauth_client(&client, &state.sqids, false),
        ))
    }
    .await
    .during("revoking OAuth client")
}

/// POST /api/v1/oauth-clients/:id/secret - Reveal the secret after re-entering the password
///
/// Expected Input:
/// ```json
/// { "password": "password" }
/// ```
pub async fn secret(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(payload): Json<SecretRequest>,
) -> ApiResult<Value> {
    let id = client_id(&id)?;
    let mut v = Validator::new();
    let password = v.required("password", payload.password.as_deref());
    v.finish()?;

    let client = OAuthService::new(state.pool.clone())
        .find_client(id)
        .await
        .map_err(ApiError::from)
        .during("retrieving OAuth client secret")?;
    if !verify_password(password.unwrap_or_default(), &auth.user.password) {
        tracing::warn!(user_id = auth.id(), client_id = %id, "secret requested with wrong password");
        return Err(ApiError::unauthorized("Invalid password"));
    }
    Ok(ApiResponse::success(
        "OAuth client secret retrieved successfully",
        json!({ "secret": client.secret }),
    ))
}

/// Attach owner and client summaries to each token
async fn token_resources(
    service: &OAuthService,
    state: &AppState,
    tokens: &[OAuthAccessToken],
) -> Result<Vec<Value>, ApiError> {
    let user_ids: Vec<i64> = tokens.iter().filter_map(|t| t.user_id).collect();
    let client_ids: Vec<Uuid> = tokens.iter().map(|t| t.client_id).collect();
    let (users, clients) = tokio::try_join!(service.token_users(&user_ids), service.token_clients(&client_ids))?;
    Ok(tokens
        .iter()
        .map(|t| {
            let owner = t.user_id.and_then(|id| users.get(&id));
            resources::access_token(t, owner, clients.get(&t.client_id), &state.sqids)
        })
        .collect())
}

/// GET /api/v1/oauth-clients/tokens - The caller's access tokens
pub async fn tokens(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<IndexQuery>,
) -> ApiResult<Vec<Value>> {
    let params = list_params(&query, &TOKEN_LISTING)?;
    async {
        let service = OAuthService::new(state.pool.clone());
        let page = TOKEN_LISTING
            .fetch::<OAuthAccessToken>(&state.pool, &params, &[("user_id", auth.id())])
            .await?;
        let items = token_resources(&service, &state, &page.items).await?;
        Ok::<_, ApiError>(ApiResponse::paginated("Access tokens retrieved successfully", items, page.meta))
    }
    .await
    .during("fetching access tokens")
}

/// GET /api/v1/oauth-clients/all-tokens - Every token with user and client summaries
pub async fn all_tokens(State(state): State<AppState>, Query(query): Query<IndexQuery>) -> ApiResult<Vec<Value>> {
    let params = list_params(&query, &TOKEN_LISTING)?;
    async {
        let service = OAuthService::new(state.pool.clone());
        let page = TOKEN_LISTING
            .fetch::<OAuthAccessToken>(&state.pool, &params, &[])
            .await?;
        let items = token_resources(&service, &state, &page.items).await?;
        Ok::<_, ApiError>(ApiResponse::paginated("OAuth tokens retrieved successfully", items, page.meta))
    }
    .await
    .during("fetching all OAuth tokens")
}

/// DELETE /api/v1/oauth-clients/tokens/:id - Delete one of the caller's tokens
pub async fn delete_token(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    async {
        let service = OAuthService::new(state.pool.clone());
        let token = service.find_token(&id).await?;
        if token.user_id != Some(auth.id()) {
            return Err(ApiError::forbidden("You do not have permission to delete this token"));
        }
        let expires_at = token.expires_at.unwrap_or_else(|| Utc::now() + Duration::days(365));
        AuthService::new(state.pool.clone()).blacklist(&token.id, expires_at).await?;
        service.delete_token(&token.id).await?;
        tracing::info!(user_id = auth.id(), "access token deleted");
        Ok::<_, ApiError>(ApiResponse::message("Access token deleted successfully"))
    }
    .await
    .during("deleting access token")
}
