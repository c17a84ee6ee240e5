//! Stateless authorization-code login against Google, Facebook, Twitter and GitHub.

use rand::{distributions::Alphanumeric, Rng};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;
use url::Url;

use crate::config::{OAuthProviderConfig, SocialConfig};
use crate::types::SocialProvider;

#[derive(Debug, Error)]
pub enum SocialError {
    #[error("Social provider {0} is not configured")]
    NotConfigured(SocialProvider),

    #[error("Social provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Social provider returned an unexpected response: {0}")]
    Provider(String),

    #[error("The social account did not provide an email address.")]
    MissingEmail,
}

/// Profile returned by a provider after the code exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocialUser {
    pub id: String,
    pub name: String,
    pub email: String,
}

pub struct SocialAuth {
    http: reqwest::Client,
    config: SocialConfig,
}

impl SocialAuth {
    pub fn new(http: reqwest::Client, config: SocialConfig) -> Self {
        Self { http, config }
    }

    fn provider_config(&self, provider: SocialProvider) -> Result<&OAuthProviderConfig, SocialError> {
        let config = match provider {
            SocialProvider::Google => &self.config.google,
            SocialProvider::Facebook => &self.config.facebook,
            SocialProvider::Twitter => &self.config.twitter,
            SocialProvider::Github => &self.config.github,
        };
        config.as_ref().ok_or(SocialError::NotConfigured(provider))
    }

    /// Provider consent page the client should be sent to
    pub fn redirect_url(&self, provider: SocialProvider) -> Result<String, SocialError> {
        let config = self.provider_config(provider)?;
        let (base, scope) = match provider {
            SocialProvider::Google => ("https://accounts.google.com/o/oauth2/v2/auth", "openid email profile"),
            SocialProvider::Facebook => ("https://www.facebook.com/v18.0/dialog/oauth", "email"),
            SocialProvider::Twitter => ("https://twitter.com/i/oauth2/authorize", "users.read tweet.read"),
            SocialProvider::Github => ("https://github.com/login/oauth/authorize", "user:email"),
        };
        let mut url = Url::parse(base).map_err(|e| SocialError::Provider(e.to_string()))?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &config.client_id)
                .append_pair("redirect_uri", &config.redirect)
                .append_pair("response_type", "code")
                .append_pair("scope", scope);
            if provider == SocialProvider::Twitter {
                let state: String = rand::thread_rng().sample_iter(&Alphanumeric).take(16).map(char::from).collect();
                query
                    .append_pair("state", &state)
                    .append_pair("code_challenge", &pkce_verifier(config))
                    .append_pair("code_challenge_method", "plain");
            }
        }
        Ok(url.into())
    }

    /// Exchange the authorization code and fetch the user's profile
    pub async fn user_from_code(&self, provider: SocialProvider, code: &str) -> Result<SocialUser, SocialError> {
        let config = self.provider_config(provider)?;
        let access_token = self.exchange_code(provider, config, code).await?;
        let profile = self.fetch_profile(provider, &access_token).await?;
        parse_profile(provider, &profile)
    }

    async fn exchange_code(
        &self,
        provider: SocialProvider,
        config: &OAuthProviderConfig,
        code: &str,
    ) -> Result<String, SocialError> {
        let form = [
            ("code", code),
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("redirect_uri", config.redirect.as_str()),
            ("grant_type", "authorization_code"),
        ];
        let request = match provider {
            SocialProvider::Google => self.http.post("https://oauth2.googleapis.com/token").form(&form),
            SocialProvider::Facebook => self
                .http
                .get("https://graph.facebook.com/v18.0/oauth/access_token")
                .query(&form),
            SocialProvider::Github => self
                .http
                .post("https://github.com/login/oauth/access_token")
                .header(reqwest::header::ACCEPT, "application/json")
                .form(&form),
            SocialProvider::Twitter => {
                let verifier = pkce_verifier(config);
                self.http
                    .post("https://api.twitter.com/2/oauth2/token")
                    .basic_auth(&config.client_id, Some(&config.client_secret))
                    .form(&[
                        ("code", code),
                        ("grant_type", "authorization_code"),
                        ("redirect_uri", config.redirect.as_str()),
                        ("code_verifier", verifier.as_str()),
                    ])
            }
        };

        let body: Value = request.send().await?.error_for_status()?.json().await?;
        body.get("access_token")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| SocialError::Provider(format!("no access_token from {}", provider)))
    }

    async fn fetch_profile(&self, provider: SocialProvider, access_token: &str) -> Result<Value, SocialError> {
        let get = |url: &str| {
            self.http
                .get(url)
                .bearer_auth(access_token)
                .header(reqwest::header::USER_AGENT, "atlas-api")
        };
        let mut profile: Value = match provider {
            SocialProvider::Google => get("https://www.googleapis.com/oauth2/v3/userinfo"),
            SocialProvider::Facebook => get("https://graph.facebook.com/me?fields=id,name,email"),
            SocialProvider::Twitter => get("https://api.twitter.com/2/users/me"),
            SocialProvider::Github => get("https://api.github.com/user"),
        }
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

        // GitHub hides private addresses from /user
        if provider == SocialProvider::Github && profile.get("email").map_or(true, Value::is_null) {
            let emails: Value = get("https://api.github.com/user/emails")
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            if let Some(primary) = primary_github_email(&emails) {
                profile["email"] = Value::String(primary);
            }
        }
        Ok(profile)
    }
}

/// PKCE `plain` verifier derived from the client secret so the callback can
/// recompute it without server-side state.
fn pkce_verifier(config: &OAuthProviderConfig) -> String {
    hex::encode(Sha256::digest(format!("{}:{}", config.client_id, config.client_secret).as_bytes()))
}

fn primary_github_email(emails: &Value) -> Option<String> {
    emails.as_array()?.iter().find_map(|e| {
        let primary = e.get("primary").and_then(Value::as_bool).unwrap_or(false);
        let verified = e.get("verified").and_then(Value::as_bool).unwrap_or(false);
        (primary && verified).then(|| e.get("email").and_then(Value::as_str).map(str::to_string))?
    })
}

/// Normalise provider-specific profile JSON
pub fn parse_profile(provider: SocialProvider, profile: &Value) -> Result<SocialUser, SocialError> {
    let profile = match provider {
        SocialProvider::Twitter => profile.get("data").unwrap_or(profile),
        _ => profile,
    };
    let id = match profile.get(if provider == SocialProvider::Google { "sub" } else { "id" }) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return Err(SocialError::Provider(format!("{} profile has no id", provider))),
    };
    let email = profile
        .get("email")
        .and_then(Value::as_str)
        .filter(|e| !e.is_empty())
        .ok_or(SocialError::MissingEmail)?
        .to_string();
    let name = profile
        .get("name")
        .and_then(Value::as_str)
        .filter(|n| !n.is_empty())
        .or_else(|| profile.get("login").and_then(Value::as_str))
        .or_else(|| profile.get("username").and_then(Value::as_str))
        .unwrap_or(&email)
        .to_string();
    Ok(SocialUser { id, name, email })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn configured() -> SocialAuth {
        let provider = OAuthProviderConfig {
            client_id: "client".into(),
            client_secret: "secret".into(),
            redirect: "http://localhost:3000/api/v1/auth/github/callback".into(),
        };
        SocialAuth::new(
            reqwest::Client::new(),
            SocialConfig {
                github: Some(provider.clone()),
                twitter: Some(provider),
                ..Default::default()
            },
        )
    }

    #[test]
    fn redirect_url_carries_client_and_callback() {
        let url = Url::parse(&configured().redirect_url(SocialProvider::Github).unwrap()).unwrap();
        assert_eq!(url.host_str(), Some("github.com"));
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("client_id".into(), "client".into())));
        assert!(pairs.contains(&("scope".into(), "user:email".into())));
    }

    #[test]
    fn twitter_redirect_uses_pkce() {
        let url = configured().redirect_url(SocialProvider::Twitter).unwrap();
        assert!(url.contains("code_challenge_method=plain"));
        assert!(url.contains("state="));
    }

    #[test]
    fn unconfigured_provider_is_an_error() {
        assert!(matches!(
            configured().redirect_url(SocialProvider::Google),
            Err(SocialError::NotConfigured(SocialProvider::Google))
        ));
    }

    #[test]
    fn profiles_normalise_across_providers() {
        let google = parse_profile(
            SocialProvider::Google,
            &json!({ "sub": "1", "name": "Ann", "email": "ann@example.com" }),
        )
        .unwrap();
        assert_eq!(google.id, "1");

        let github = parse_profile(
            SocialProvider::Github,
            &json!({ "id": 99, "name": null, "login": "octo", "email": "octo@example.com" }),
        )
        .unwrap();
        assert_eq!(github, SocialUser { id: "99".into(), name: "octo".into(), email: "octo@example.com".into() });

        let twitter = parse_profile(SocialProvider::Twitter, &json!({ "data": { "id": "5", "name": "T" } }));
        assert!(matches!(twitter, Err(SocialError::MissingEmail)));
    }

    #[test]
    fn github_primary_email_must_be_verified() {
        let emails = json!([
            { "email": "old@example.com", "primary": false, "verified": true },
            { "email": "main@example.com", "primary": true, "verified": true }
        ]);
        assert_eq!(primary_github_email(&emails), Some("main@example.com".to_string()));
        assert_eq!(primary_github_email(&json!([{ "email": "x@example.com", "primary": true, "verified": false }])), None);
    }
}
