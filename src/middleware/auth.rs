use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};

use crate::auth::{validate_jwt, Claims};
use crate::database::models::User;
use crate::error::{ApiError, ErrorAction};
use crate::services::{AuthService, UserService};
use crate::state::AppState;

/// Authenticated caller, inserted into request extensions
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user: User,
    pub jti: String,
    pub expires_at: DateTime<Utc>,
}

impl AuthUser {
    pub fn id(&self) -> i64 {
        self.user.id
    }
}

/// JWT authentication middleware: valid signature, not blacklisted, live user
pub async fn jwt_auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_jwt_from_headers(&headers).map_err(ApiError::unauthorized)?;

    let claims: Claims = validate_jwt(&token).map_err(|e| {
        tracing::warn!("Rejected bearer token: {}", e);
        ApiError::unauthorized("Unauthenticated.")
    })?;

    let revoked = AuthService::new(state.pool.clone())
        .is_revoked(&claims.jti)
        .await
        .map_err(ApiError::from)
        .during("authenticating the request")?;
    if revoked {
        tracing::warn!(jti = %claims.jti, "Rejected revoked token");
        return Err(ApiError::unauthorized("Unauthenticated."));
    }

    let user_id = claims.user_id()?;
    let user = match UserService::new(state.pool.clone()).find(user_id).await {
        Ok(user) => user,
        Err(crate::database::DatabaseError::NotFound(_)) => {
            tracing::warn!(user_id, "Token subject no longer exists");
            return Err(ApiError::unauthorized("Unauthenticated."));
        }
        Err(e) => return Err(ApiError::from(e)).during("authenticating the request"),
    };

    request.extensions_mut().insert(AuthUser {
        user,
        expires_at: claims.expires_at(),
        jti: claims.jti,
    });

    Ok(next.run(request).await)
}

/// Extract JWT token from Authorization header
fn extract_jwt_from_headers(headers: &HeaderMap) -> Result<String, String> {
    let auth_header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or_else(|| "Unauthenticated.".to_string())?;

    let auth_str = auth_header
        .to_str()
        .map_err(|_| "Invalid Authorization header format".to_string())?;

    if let Some(token) = auth_str.strip_prefix("Bearer ") {
        if token.trim().is_empty() {
            return Err("Empty JWT token".to_string());
        }
        Ok(token.trim().to_string())
    } else {
        Err("Authorization header must use Bearer token format".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert("authorization", HeaderValue::from_str(value).unwrap());
        h
    }

    #[test]
    fn bearer_scheme_is_required() {
        assert!(extract_jwt_from_headers(&HeaderMap::new()).is_err());
        assert!(extract_jwt_from_headers(&headers("Basic abc")).is_err());
        assert!(extract_jwt_from_headers(&headers("Bearer   ")).is_err());
        assert_eq!(extract_jwt_from_headers(&headers("Bearer abc.def.ghi")).unwrap(), "abc.def.ghi");
    }
}
