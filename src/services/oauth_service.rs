use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

use crate::auth::password::random_string;
use crate::database::models::{OAuthAccessToken, OAuthClient, User};
use crate::database::{DatabaseError, Listing};

pub const CLIENT_LISTING: Listing = Listing {
    table: "oauth_clients",
    search_columns: &["oauth_clients.name", "oauth_clients.client_app"],
    sortable: &["name", "created_at"],
    soft_deletes: false,
};

pub const TOKEN_LISTING: Listing = Listing {
    table: "oauth_access_tokens",
    search_columns: &[
        "oauth_access_tokens.name",
        "(SELECT c.client_app FROM oauth_clients c WHERE c.id = oauth_access_tokens.client_id)",
    ],
    sortable: &["name", "created_at", "expires_at"],
    soft_deletes: false,
};

const SECRET_LENGTH: usize = 40;

#[derive(Debug, Clone, Default)]
pub struct ClientInput {
    pub name: String,
    pub redirect: String,
    pub vendor_id: Option<i64>,
    pub vendor: Option<String>,
    pub client_app: Option<String>,
}

/// Row written for every issued passport token
#[derive(Debug, Clone)]
pub struct NewAccessToken {
    pub jti: String,
    pub user_id: Option<i64>,
    pub client_id: Uuid,
    pub name: Option<String>,
    pub scopes: Option<Value>,
    pub expires_at: DateTime<Utc>,
}

pub struct OAuthService {
    pool: PgPool,
}

impl OAuthService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn client_not_found() -> DatabaseError {
        DatabaseError::NotFound("OAuth client".to_string())
    }

    /// Password-grant client with a fresh secret
    pub async fn create_client(&self, owner: i64, input: ClientInput) -> Result<OAuthClient, DatabaseError> {
        let client = sqlx::query_as::<_, OAuthClient>(
            r#"
            INSERT INTO oauth_clients (id, user_id, name, secret, redirect, password_client,
                                       personal_access_client, revoked, vendor_id, vendor, client_app)
            VALUES ($1, $2, $3, $4, $5, TRUE, FALSE, FALSE, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(owner)
        .bind(&input.name)
        .bind(random_string(SECRET_LENGTH))
        .bind(&input.redirect)
        .bind(input.vendor_id)
        .bind(&input.vendor)
        .bind(&input.client_app)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(client_id = %client.id, "oauth client created");
        Ok(client)
    }

    pub async fn find_client(&self, id: Uuid) -> Result<OAuthClient, DatabaseError> {
        sqlx::query_as::<_, OAuthClient>("SELECT * FROM oauth_clients WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(Self::client_not_found)
    }

    pub async fn update_client(&self, id: Uuid, input: ClientInput) -> Result<OAuthClient, DatabaseError> {
        sqlx::query_as::<_, OAuthClient>(
            r#"
            UPDATE oauth_clients
            SET name = $2, redirect = $3, vendor_id = $4, vendor = $5, client_app = $6, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&input.name)
        .bind(&input.redirect)
        .bind(input.vendor_id)
        .bind(&input.vendor)
        .bind(&input.client_app)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(Self::client_not_found)
    }

    pub async fn delete_client(&self, id: Uuid) -> Result<(), DatabaseError> {
        let result = sqlx::query("DELETE FROM oauth_clients WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Self::client_not_found());
        }
        Ok(())
    }

    /// Revoke the client and every token it issued. Token ids are added to
    /// the JWT blacklist in the same transaction.
    pub async fn revoke_client(&self, id: Uuid) -> Result<OAuthClient, DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let client = sqlx::query_as::<_, OAuthClient>(
            "UPDATE oauth_clients SET revoked = TRUE, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(Self::client_not_found)?;

        sqlx::query(
            r#"
            INSERT INTO jwt_blacklist (jti, expires_at)
            SELECT id, COALESCE(expires_at, NOW() + INTERVAL '1 year')
            FROM oauth_access_tokens
            WHERE client_id = $1 AND revoked = FALSE
            ON CONFLICT (jti) DO NOTHING
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE oauth_access_tokens SET revoked = TRUE, updated_at = NOW() WHERE client_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(client_id = %id, "oauth client revoked");
        Ok(client)
    }

    /// Live client matching both id and secret
    pub async fn verify_client(&self, id: Uuid, secret: &str) -> Result<Option<OAuthClient>, DatabaseError> {
        let client = sqlx::query_as::<_, OAuthClient>(
            "SELECT * FROM oauth_clients WHERE id = $1 AND secret = $2 AND revoked = FALSE",
        )
        .bind(id)
        .bind(secret)
        .fetch_optional(&self.pool)
        .await?;
        Ok(client)
    }

    pub async fn record_token(&self, token: NewAccessToken) -> Result<OAuthAccessToken, DatabaseError> {
        let row = sqlx::query_as::<_, OAuthAccessToken>(
            r#"
            INSERT INTO oauth_access_tokens (id, user_id, client_id, name, scopes, revoked, expires_at)
            VALUES ($1, $2, $3, $4, $5, FALSE, $6)
            RETURNING *
            "#,
        )
        .bind(&token.jti)
        .bind(token.user_id)
        .bind(token.client_id)
        .bind(&token.name)
        .bind(&token.scopes)
        .bind(token.expires_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn find_token(&self, id: &str) -> Result<OAuthAccessToken, DatabaseError> {
        sqlx::query_as::<_, OAuthAccessToken>("SELECT * FROM oauth_access_tokens WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::NotFound("Token".to_string()))
    }

    pub async fn delete_token(&self, id: &str) -> Result<(), DatabaseError> {
        sqlx::query("DELETE FROM oauth_access_tokens WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Users keyed by id, trashed included, for token summaries
    pub async fn token_users(&self, ids: &[i64]) -> Result<HashMap<i64, User>, DatabaseError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let users = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(users.into_iter().map(|u| (u.id, u)).collect())
    }

    pub async fn token_clients(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, OAuthClient>, DatabaseError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let clients = sqlx::query_as::<_, OAuthClient>("SELECT * FROM oauth_clients WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(clients.into_iter().map(|c| (c.id, c)).collect())
    }

    pub async fn count_clients(&self) -> Result<i64, DatabaseError> {
        let n = sqlx::query_scalar("SELECT COUNT(*) FROM oauth_clients")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    pub async fn count_revoked_clients(&self) -> Result<i64, DatabaseError> {
        let n = sqlx::query_scalar("SELECT COUNT(*) FROM oauth_clients WHERE revoked = TRUE")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    pub async fn count_tokens(&self) -> Result<i64, DatabaseError> {
        let n = sqlx::query_scalar("SELECT COUNT(*) FROM oauth_access_tokens")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}

/// Queries against the external vendor database
pub struct VendorDirectory {
    pool: PgPool,
}

impl VendorDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn exists(&self, vendor_id: i64) -> Result<bool, DatabaseError> {
        let exists = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM vendors WHERE id = $1)")
            .bind(vendor_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    pub async fn count(&self) -> Result<i64, DatabaseError> {
        let n = sqlx::query_scalar("SELECT COUNT(*) FROM vendors")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}
