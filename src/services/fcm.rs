//! Firebase Cloud Messaging HTTP v1 client.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::config::FcmConfig;

const MESSAGING_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

#[derive(Debug, Error)]
pub enum PushError {
    #[error("Push notifications are not configured")]
    NotConfigured,

    #[error("Invalid FCM credentials: {0}")]
    Credentials(String),

    #[error("FCM request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("FCM rejected the message ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// One push message addressed to one device token
#[derive(Debug, Clone, Default, Serialize)]
pub struct PushMessage {
    pub token: String,
    pub title: String,
    pub body: String,
    pub data: BTreeMap<String, String>,
    pub image: Option<String>,
}

impl PushMessage {
    pub fn new(token: impl Into<String>, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            title: title.into(),
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn with_data(mut self, data: BTreeMap<String, String>) -> Self {
        self.data = data;
        self
    }

    pub fn with_image(mut self, image: Option<String>) -> Self {
        self.image = image;
        self
    }

    /// FCM v1 `message` object
    pub fn to_fcm(&self) -> Value {
        let mut message = json!({
            "token": self.token,
            "notification": { "title": self.title, "body": self.body },
            "data": self.data,
            "apns": {
                "payload": { "aps": { "sound": "bingbong.aiff", "badge": 1 } }
            },
        });
        if let Some(image) = &self.image {
            message["webpush"] = json!({ "notification": { "image": image } });
        }
        message
    }
}

#[async_trait]
pub trait PushGateway: Send + Sync {
    /// Deliver a message, returning the provider response
    async fn send(&self, message: &PushMessage) -> Result<Value, PushError>;

    /// Dry-run a token; `Ok(false)` when the provider rejects it
    async fn validate(&self, token: &str) -> Result<bool, PushError>;
}

/// Gateway used when no FCM credentials are configured
pub struct DisabledGateway;

#[async_trait]
impl PushGateway for DisabledGateway {
    async fn send(&self, _message: &PushMessage) -> Result<Value, PushError> {
        Err(PushError::NotConfigured)
    }

    async fn validate(&self, _token: &str) -> Result<bool, PushError> {
        Err(PushError::NotConfigured)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccount {
    pub client_email: String,
    pub private_key: String,
    pub project_id: Option<String>,
    pub token_uri: Option<String>,
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

pub struct FcmGateway {
    http: reqwest::Client,
    project_id: String,
    account: ServiceAccount,
    token: RwLock<Option<CachedToken>>,
}

impl FcmGateway {
    pub fn new(http: reqwest::Client, project_id: String, account: ServiceAccount) -> Self {
        Self {
            http,
            project_id,
            account,
            token: RwLock::new(None),
        }
    }

    /// Load the service account JSON named by `FCM_CREDENTIALS`
    pub fn from_config(http: reqwest::Client, config: &FcmConfig) -> Result<Option<Self>, PushError> {
        let Some(path) = &config.credentials_path else {
            return Ok(None);
        };
        let raw = std::fs::read_to_string(path).map_err(|e| PushError::Credentials(format!("{}: {}", path, e)))?;
        let account: ServiceAccount =
            serde_json::from_str(&raw).map_err(|e| PushError::Credentials(e.to_string()))?;
        let project_id = config
            .project_id
            .clone()
            .or_else(|| account.project_id.clone())
            .ok_or_else(|| PushError::Credentials("missing project_id".to_string()))?;
        Ok(Some(Self::new(http, project_id, account)))
    }

    fn endpoint(&self) -> String {
        format!("https://fcm.googleapis.com/v1/projects/{}/messages:send", self.project_id)
    }

    /// OAuth access token for the service account, cached until shortly before expiry
    async fn access_token(&self) -> Result<String, PushError> {
        {
            let cached = self.token.read().await;
            if let Some(token) = cached.as_ref() {
                if token.expires_at > Utc::now() + Duration::seconds(60) {
                    return Ok(token.value.clone());
                }
            }
        }

        let token_uri = self.account.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI);
        let now = Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &self.account.client_email,
            scope: MESSAGING_SCOPE,
            aud: token_uri,
            iat: now,
            exp: now + 3600,
        };
        let key = EncodingKey::from_rsa_pem(self.account.private_key.as_bytes())
            .map_err(|e| PushError::Credentials(e.to_string()))?;
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| PushError::Credentials(e.to_string()))?;

        let response = self
            .http
            .post(token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(PushError::Rejected { status, body });
        }
        let token: TokenResponse = response.json().await?;

        let mut cached = self.token.write().await;
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Utc::now() + Duration::seconds(token.expires_in),
        });
        Ok(token.access_token)
    }

    async fn post(&self, body: Value) -> Result<Value, PushError> {
        let access_token = self.access_token().await?;
        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PushError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl PushGateway for FcmGateway {
    async fn send(&self, message: &PushMessage) -> Result<Value, PushError> {
        self.post(json!({ "message": message.to_fcm() })).await
    }

    async fn validate(&self, token: &str) -> Result<bool, PushError> {
        let body = json!({ "validate_only": true, "message": { "token": token } });
        match self.post(body).await {
            Ok(_) => Ok(true),
            Err(PushError::Rejected { status: 400 | 404, .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fcm_payload_carries_apns_defaults_and_image() {
        let mut data = BTreeMap::new();
        data.insert("type".to_string(), "login_notification".to_string());
        let message = PushMessage::new("tok", "New Login", "Your account was just logged into.")
            .with_data(data)
            .with_image(Some("https://example.com/i.png".to_string()));

        let fcm = message.to_fcm();
        assert_eq!(fcm["token"], "tok");
        assert_eq!(fcm["notification"]["title"], "New Login");
        assert_eq!(fcm["data"]["type"], "login_notification");
        assert_eq!(fcm["apns"]["payload"]["aps"]["sound"], "bingbong.aiff");
        assert_eq!(fcm["apns"]["payload"]["aps"]["badge"], 1);
        assert_eq!(fcm["webpush"]["notification"]["image"], "https://example.com/i.png");
    }

    #[test]
    fn no_image_means_no_webpush_block() {
        let fcm = PushMessage::new("tok", "t", "b").to_fcm();
        assert!(fcm.get("webpush").is_none());
    }

    #[test]
    fn missing_credentials_disable_the_gateway() {
        let config = FcmConfig {
            project_id: None,
            credentials_path: None,
        };
        assert!(FcmGateway::from_config(reqwest::Client::new(), &config).unwrap().is_none());
    }

    #[tokio::test]
    async fn disabled_gateway_reports_not_configured() {
        let err = DisabledGateway.validate("tok").await.unwrap_err();
        assert!(matches!(err, PushError::NotConfigured));
    }
}
