use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OAuthClient {
    pub id: Uuid,
    pub user_id: Option<i64>,
    pub name: String,
    pub secret: Option<String>,
    pub provider: Option<String>,
    pub redirect: String,
    pub personal_access_client: bool,
    pub password_client: bool,
    pub revoked: bool,
    pub vendor_id: Option<i64>,
    pub vendor: Option<String>,
    pub client_app: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Issued token record; `id` is the JWT `jti`
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OAuthAccessToken {
    pub id: String,
    pub user_id: Option<i64>,
    pub client_id: Uuid,
    pub name: Option<String>,
    pub scopes: Option<Value>,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}
