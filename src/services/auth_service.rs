use chrono::{DateTime, Duration, Utc};
use hmac::digest::{CtOutput, Output};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use url::Url;

use crate::auth::password::random_string;
use crate::auth::signed_url;
use crate::database::DatabaseError;

const RESET_TOKEN_LENGTH: usize = 64;

fn sha256_hex(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

/// Constant-time check of `token` against a stored hex digest
fn digest_matches(stored_hex: &str, token: &str) -> bool {
    match hex::decode(stored_hex) {
        Ok(stored) if stored.len() == <Sha256 as Digest>::output_size() => {
            CtOutput::<Sha256>::new(Output::<Sha256>::clone_from_slice(&stored))
                == CtOutput::new(Sha256::digest(token.as_bytes()))
        }
        _ => false,
    }
}

/// Token revocation and password reset bookkeeping
pub struct AuthService {
    pool: PgPool,
}

impl AuthService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Reject `jti` until `expires_at`
    pub async fn blacklist(&self, jti: &str, expires_at: DateTime<Utc>) -> Result<(), DatabaseError> {
        sqlx::query("INSERT INTO jwt_blacklist (jti, expires_at) VALUES ($1, $2) ON CONFLICT (jti) DO NOTHING")
            .bind(jti)
            .bind(expires_at)
            .execute(&self.pool)
            .await?;
        tracing::debug!(jti, "token blacklisted");
        Ok(())
    }

    /// Blacklisted, or recorded as a revoked passport token
    pub async fn is_revoked(&self, jti: &str) -> Result<bool, DatabaseError> {
        let revoked: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(SELECT 1 FROM jwt_blacklist WHERE jti = $1)
                OR EXISTS(SELECT 1 FROM oauth_access_tokens WHERE id = $1 AND revoked = TRUE)
            "#,
        )
        .bind(jti)
        .fetch_one(&self.pool)
        .await?;
        Ok(revoked)
    }

    /// Drop blacklist rows whose tokens have expired anyway
    pub async fn purge_blacklist(&self) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM jwt_blacklist WHERE expires_at < NOW()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Create (or replace) the reset token for `email`; returns the plain token.
    /// Only its SHA-256 is stored.
    pub async fn create_reset_token(&self, email: &str) -> Result<String, DatabaseError> {
        let token = random_string(RESET_TOKEN_LENGTH);
        sqlx::query(
            r#"
            INSERT INTO password_reset_tokens (email, token, created_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (email) DO UPDATE SET token = EXCLUDED.token, created_at = EXCLUDED.created_at
            "#,
        )
        .bind(email)
        .bind(sha256_hex(&token))
        .execute(&self.pool)
        .await?;
        Ok(token)
    }

    /// Whether `token` is the unexpired reset token for `email`
    pub async fn reset_token_is_valid(
        &self,
        email: &str,
        token: &str,
        expire_minutes: i64,
    ) -> Result<bool, DatabaseError> {
        let row: Option<(String, DateTime<Utc>)> =
            sqlx::query_as("SELECT token, created_at FROM password_reset_tokens WHERE email = $1")
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;

        Ok(match row {
            Some((hashed, created_at)) => {
                created_at + Duration::minutes(expire_minutes) > Utc::now() && digest_matches(&hashed, token)
            }
            None => false,
        })
    }

    pub async fn delete_reset_token(&self, email: &str) -> Result<(), DatabaseError> {
        sqlx::query("DELETE FROM password_reset_tokens WHERE email = $1")
            .bind(email)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Signed `/api/v1/auth/email/verify/{sqid}/{hash}` link
pub fn verification_url(app_url: &str, sqid: &str, email: &str, ttl: Duration) -> Result<Url, url::ParseError> {
    let url = Url::parse(&format!(
        "{}/api/v1/auth/email/verify/{}/{}",
        app_url.trim_end_matches('/'),
        sqid,
        signed_url::email_hash(email)
    ))?;
    Ok(signed_url::sign_with_app_key(url, ttl))
}

/// Frontend page that completes a password reset
pub fn reset_url(frontend_url: &str, token: &str, email: &str) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(&format!("{}/reset-password", frontend_url.trim_end_matches('/')))?;
    url.query_pairs_mut().append_pair("token", token).append_pair("email", email);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verification_links_are_signed() {
        let url = verification_url("http://localhost:8000/", "abcDEF1234", "john@example.com", Duration::minutes(60))
            .unwrap();
        assert!(url
            .path()
            .starts_with("/api/v1/auth/email/verify/abcDEF1234/"));
        assert!(url.query_pairs().any(|(k, _)| k == "signature"));
        assert!(signed_url::verify(&url, &crate::config::config().security.app_key).is_ok());
    }

    #[test]
    fn reset_link_carries_token_and_email() {
        let url = reset_url("http://localhost:3000", "tok", "a+b@example.com").unwrap();
        assert_eq!(url.path(), "/reset-password");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs[0], ("token".to_string(), "tok".to_string()));
        assert_eq!(pairs[1], ("email".to_string(), "a+b@example.com".to_string()));
    }

    #[test]
    fn reset_tokens_are_stored_hashed() {
        assert_eq!(sha256_hex("abc").len(), 64);
        assert_ne!(sha256_hex("abc"), "abc");
    }

    #[test]
    fn reset_digests_match_only_their_token() {
        let stored = sha256_hex("token-one");
        assert!(digest_matches(&stored, "token-one"));
        assert!(!digest_matches(&stored, "token-two"));
        assert!(!digest_matches(&stored[..62], "token-one"));
        assert!(!digest_matches("not hex", "token-one"));
    }
}
