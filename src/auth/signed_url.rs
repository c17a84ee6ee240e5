//! Expiring signed links for email verification.

use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;
use url::Url;

use crate::config;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, PartialEq, Eq)]
pub enum SignatureError {
    Missing,
    Expired,
    Invalid,
}

fn mac(key: &str) -> HmacSha256 {
    // HMAC accepts keys of any length
    HmacSha256::new_from_slice(key.as_bytes()).unwrap_or_else(|_| unreachable!())
}

/// Append `expires` and `signature` to `url`. The signature covers the full
/// URL including the `expires` parameter.
pub fn sign(mut url: Url, ttl: Duration, key: &str) -> Url {
    let expires = (Utc::now() + ttl).timestamp();
    url.query_pairs_mut().append_pair("expires", &expires.to_string());
    let mut mac = mac(key);
    mac.update(url.as_str().as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());
    url.query_pairs_mut().append_pair("signature", &signature);
    url
}

/// Sign with the application key.
pub fn sign_with_app_key(url: Url, ttl: Duration) -> Url {
    sign(url, ttl, &config::config().security.app_key)
}

/// Verify a URL produced by [`sign`]. The `signature` parameter must be last.
pub fn verify(url: &Url, key: &str) -> Result<(), SignatureError> {
    let signature = url
        .query_pairs()
        .find(|(k, _)| k == "signature")
        .map(|(_, v)| v.into_owned())
        .ok_or(SignatureError::Missing)?;
    let expires: i64 = url
        .query_pairs()
        .find(|(k, _)| k == "expires")
        .and_then(|(_, v)| v.parse().ok())
        .ok_or(SignatureError::Missing)?;

    let mut unsigned = url.clone();
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "signature")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    unsigned.set_query(None);
    if !kept.is_empty() {
        unsigned.query_pairs_mut().extend_pairs(kept);
    }

    let expected = hex::decode(signature).map_err(|_| SignatureError::Invalid)?;
    let mut mac = mac(key);
    mac.update(unsigned.as_str().as_bytes());
    mac.verify_slice(&expected).map_err(|_| SignatureError::Invalid)?;

    if expires < Utc::now().timestamp() {
        return Err(SignatureError::Expired);
    }
    Ok(())
}

/// Hex SHA-1 of the email, used as the `hash` segment of verification links.
pub fn email_hash(email: &str) -> String {
    use sha1::Digest;
    hex::encode(Sha1::digest(email.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("http://localhost:3000/api/v1/auth/email/verify/abc/def").unwrap()
    }

    #[test]
    fn signed_url_verifies() {
        let signed = sign(base(), Duration::minutes(60), "key");
        assert_eq!(verify(&signed, "key"), Ok(()));
    }

    #[test]
    fn wrong_key_or_tampering_fails() {
        let signed = sign(base(), Duration::minutes(60), "key");
        assert_eq!(verify(&signed, "other"), Err(SignatureError::Invalid));

        let tampered = Url::parse(&signed.as_str().replace("/abc/", "/abd/")).unwrap();
        assert_eq!(verify(&tampered, "key"), Err(SignatureError::Invalid));
    }

    #[test]
    fn expired_link_fails() {
        let signed = sign(base(), Duration::minutes(-1), "key");
        assert_eq!(verify(&signed, "key"), Err(SignatureError::Expired));
    }

    #[test]
    fn missing_signature_fails() {
        assert_eq!(verify(&base(), "key"), Err(SignatureError::Missing));
    }

    #[test]
    fn email_hash_is_sha1_hex() {
        assert_eq!(email_hash("john@example.com").len(), 40);
        assert_eq!(email_hash("abc"), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }
}
