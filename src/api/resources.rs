//! Wire representations of stored rows. Numeric keys leave the server as sqids.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::database::models::{BlockedIp, Notification, OAuthAccessToken, OAuthClient, Upload, User};
use crate::services::storage::StorageService;
use crate::sqid::SqidCodec;

/// `Y-m-d H:i:s`
fn plain_datetime(at: Option<DateTime<Utc>>) -> Value {
    at.map(|t| Value::String(t.format("%Y-%m-%d %H:%M:%S").to_string()))
        .unwrap_or(Value::Null)
}

pub fn user(user: &User, sqids: &SqidCodec) -> Value {
    json!({
        "id": sqids.encode(user.id),
        "name": user.name,
        "email": user.email,
        "username": user.username,
        "phone": user.phone,
        "profile_image": user.profile_image,
        "email_verified_at": user.email_verified_at,
        "last_login_at": user.last_login_at,
        "current_login_at": user.current_login_at,
        "last_login_ip": user.last_login_ip,
        "current_login_ip": user.current_login_ip,
        "login_count": user.login_count,
        "provider": user.provider,
        "provider_id": user.provider_id,
        "created_at": user.created_at,
        "updated_at": user.updated_at,
        "deleted_at": user.deleted_at,
    })
}

pub fn upload(upload: &Upload, sqids: &SqidCodec, storage: &StorageService) -> Value {
    json!({
        "id": sqids.encode(upload.id),
        "user_id": sqids.encode(upload.user_id),
        "filename": upload.filename,
        "original_filename": upload.original_filename,
        "mime_type": upload.mime_type,
        "size": upload.size,
        "path": upload.path,
        "disk": upload.disk,
        "provider": upload.provider,
        "url": storage.url_for(&upload.provider, &upload.disk, &upload.path),
        "meta": upload.meta,
        "created_at": upload.created_at,
        "updated_at": upload.updated_at,
        "deleted_at": upload.deleted_at,
    })
}

pub fn blocked_ip(row: &BlockedIp, sqids: &SqidCodec) -> Value {
    json!({
        "id": sqids.encode(row.id),
        "ip_address": row.ip_address,
        "reason": row.reason,
        "blocked_until": plain_datetime(row.blocked_until),
        "user_id": row.user_id.map(|id| sqids.encode(id)),
        "created_at": plain_datetime(Some(row.created_at)),
        "updated_at": plain_datetime(Some(row.updated_at)),
    })
}

/// The secret is only returned by the dedicated secret endpoint and on creation
pub fn oauth_client(client: &OAuthClient, sqids: &SqidCodec, with_secret: bool) -> Value {
    let mut value = json!({
        "id": client.id,
        "user_id": client.user_id.map(|id| sqids.encode(id)),
        "name": client.name,
        "provider": client.provider,
        "redirect": client.redirect,
        "personal_access_client": client.personal_access_client,
        "password_client": client.password_client,
        "revoked": client.revoked,
        "vendor_id": client.vendor_id,
        "vendor": client.vendor,
        "client_app": client.client_app,
        "created_at": client.created_at,
        "updated_at": client.updated_at,
    });
    if with_secret {
        value["secret"] = json!(client.secret);
    }
    value
}

pub fn access_token(
    token: &OAuthAccessToken,
    owner: Option<&User>,
    client: Option<&OAuthClient>,
    sqids: &SqidCodec,
) -> Value {
    json!({
        "id": token.id,
        "name": token.name,
        "scopes": token.scopes.clone().unwrap_or_else(|| json!([])),
        "revoked": token.revoked,
        "created_at": token.created_at,
        "updated_at": token.updated_at,
        "expires_at": token.expires_at,
        "user": owner.map(|u| json!({
            "id": sqids.encode(u.id),
            "name": u.name,
            "email": u.email,
        })),
        "client": client.map(|c| json!({
            "id": c.id,
            "name": c.name,
            "client_app": c.client_app,
            "revoked": c.revoked,
        })),
    })
}

pub fn notification(n: &Notification) -> Value {
    json!({
        "id": n.id,
        "type": n.kind,
        "data": n.data,
        "read_at": n.read_at,
        "created_at": n.created_at,
        "updated_at": n.updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SqidConfig;
    use chrono::TimeZone;

    fn codec() -> SqidCodec {
        SqidCodec::from_config(&SqidConfig::default()).unwrap()
    }

    fn sample_user() -> User {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        User {
            id: 42,
            name: "John Doe".into(),
            email: "john@example.com".into(),
            username: Some("johndoe".into()),
            phone: None,
            password: "$2b$10$hash".into(),
            pin: "$2b$10$pin".into(),
            email_verified_at: Some(at),
            profile_image: None,
            last_login_at: None,
            current_login_at: None,
            last_login_ip: None,
            current_login_ip: None,
            login_count: 0,
            provider: None,
            provider_id: None,
            created_at: at,
            updated_at: at,
            deleted_at: None,
        }
    }

    #[test]
    fn user_resource_hides_secrets_and_encodes_id() {
        let sqids = codec();
        let value = user(&sample_user(), &sqids);
        assert_eq!(value["id"], sqids.encode(42));
        assert_eq!(sqids.decode(value["id"].as_str().unwrap()), Some(42));
        assert!(value.get("password").is_none());
        assert!(value.get("pin").is_none());
    }

    #[test]
    fn blocked_ip_dates_use_plain_format() {
        let at = Utc.with_ymd_and_hms(2030, 1, 2, 3, 4, 5).unwrap();
        let row = BlockedIp {
            id: 1,
            user_id: None,
            ip_address: "10.0.0.1".into(),
            reason: None,
            blocked_until: Some(at),
            created_at: at,
            updated_at: at,
            deleted_at: None,
        };
        let value = blocked_ip(&row, &codec());
        assert_eq!(value["blocked_until"], "2030-01-02 03:04:05");
        assert_eq!(value["user_id"], Value::Null);
    }
}
