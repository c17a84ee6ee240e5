//! Credentials and bearer tokens.

pub mod password;
pub mod signed_url;

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id as a decimal string
    pub sub: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    pub jti: String,
}

impl Claims {
    pub fn new(user_id: i64, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: (now + ttl).timestamp(),
            jti: Uuid::new_v4().simple().to_string(),
        }
    }

    /// Claims with the configured session lifetime
    pub fn session(user_id: i64) -> Self {
        Self::new(user_id, Duration::minutes(config::config().security.jwt_ttl_minutes))
    }

    pub fn user_id(&self) -> Result<i64, JwtError> {
        self.sub
            .parse()
            .map_err(|_| JwtError::Invalid("Token subject is not a user".to_string()))
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0).single().unwrap_or_else(Utc::now)
    }

    /// Seconds until expiry as reported in `expires_in`
    pub fn ttl_seconds(&self) -> i64 {
        (self.exp - self.iat).max(0)
    }
}

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("JWT secret not configured")]
    InvalidSecret,

    #[error("JWT generation error: {0}")]
    TokenGeneration(String),

    #[error("{0}")]
    Invalid(String),
}

/// A signed token plus the claims it carries
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: Claims,
}

fn secret() -> Result<&'static str, JwtError> {
    let secret = config::config().security.jwt_secret.as_str();
    if secret.is_empty() {
        return Err(JwtError::InvalidSecret);
    }
    Ok(secret)
}

pub fn generate_jwt(claims: Claims) -> Result<IssuedToken, JwtError> {
    let encoding_key = EncodingKey::from_secret(secret()?.as_bytes());
    let token = encode(&Header::new(Algorithm::HS256), &claims, &encoding_key)
        .map_err(|e| JwtError::TokenGeneration(e.to_string()))?;
    Ok(IssuedToken { token, claims })
}

/// Validate signature, expiry and not-before, returning the claims
pub fn validate_jwt(token: &str) -> Result<Claims, JwtError> {
    let decoding_key = DecodingKey::from_secret(secret()?.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_nbf = true;

    let token_data = decode::<Claims>(token, &decoding_key, &validation).map_err(|e| {
        use jsonwebtoken::errors::ErrorKind;
        match e.kind() {
            ErrorKind::ExpiredSignature => JwtError::Invalid("Token has expired".to_string()),
            _ => JwtError::Invalid("Token is invalid".to_string()),
        }
    })?;

    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_validates_back_to_claims() {
        let issued = generate_jwt(Claims::new(42, Duration::minutes(5))).unwrap();
        let claims = validate_jwt(&issued.token).unwrap();
        assert_eq!(claims.user_id().unwrap(), 42);
        assert_eq!(claims.jti, issued.claims.jti);
        assert_eq!(claims.ttl_seconds(), 300);
    }

    #[test]
    fn expired_token_is_rejected() {
        let mut claims = Claims::new(1, Duration::minutes(5));
        claims.iat -= 3600;
        claims.nbf -= 3600;
        claims.exp = Utc::now().timestamp() - 3600;
        let issued = generate_jwt(claims).unwrap();
        let err = validate_jwt(&issued.token).unwrap_err();
        assert_eq!(err.to_string(), "Token has expired");
    }

    #[test]
    fn tampered_token_is_rejected() {
        let issued = generate_jwt(Claims::new(1, Duration::minutes(5))).unwrap();
        let mut token = issued.token.clone();
        token.push('x');
        assert!(matches!(validate_jwt(&token), Err(JwtError::Invalid(_))));
    }

    #[test]
    fn every_token_gets_a_fresh_jti() {
        assert_ne!(Claims::session(1).jti, Claims::session(1).jti);
    }
}
