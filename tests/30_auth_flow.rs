// Sign-in flows against a real database. Each test returns early when
// DATABASE_URL is unset.

mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::{json, Value};

use common::{SEED_PASSWORD, SUPERADMIN};

async fn register(server: &common::TestServer, password: &str) -> Result<(StatusCode, Value, String)> {
    let email = format!("{}@example.com", common::unique("flow"));
    let res = reqwest::Client::new()
        .post(server.url("/api/v1/auth/register"))
        .json(&json!({
            "name": "Flow Tester",
            "email": email,
            "username": common::unique("flow"),
            "phone": common::unique("+1"),
            "password": password,
            "password_confirmation": password,
        }))
        .send()
        .await?;
    let status = res.status();
    Ok((status, res.json::<Value>().await?, email))
}

async fn mark_verified(email: &str) -> Result<()> {
    let pool = common::db_pool().await?;
    sqlx::query("UPDATE users SET email_verified_at = NOW() WHERE email = $1")
        .bind(email)
        .execute(&pool)
        .await?;
    Ok(())
}

#[tokio::test]
async fn seeded_account_logs_in() -> Result<()> {
    let Some(server) = common::ensure_db_server().await? else { return Ok(()) };

    let res = common::login_response(server, SUPERADMIN, SEED_PASSWORD).await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body = res.json::<Value>().await?;
    assert_eq!(body["message"], "User logged in successfully");
    assert_eq!(body["data"]["token_type"], "Bearer");
    assert_eq!(body["data"]["user"]["email"], SUPERADMIN);
    assert!(body["data"]["user"]["id"].is_string());
    Ok(())
}

#[tokio::test]
async fn wrong_password_is_unauthorized() -> Result<()> {
    let Some(server) = common::ensure_db_server().await? else { return Ok(()) };

    let res = common::login_response(server, SUPERADMIN, "not-the-password").await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body = res.json::<Value>().await?;
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Invalid login credentials");

    let res = common::login_response(server, "nobody-here@example.com", SEED_PASSWORD).await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn registration_creates_an_unverified_account() -> Result<()> {
    let Some(server) = common::ensure_db_server().await? else { return Ok(()) };

    let (status, body, email) = register(server, "secret-pass-1").await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);

    let res = common::login_response(server, &email, "secret-pass-1").await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body = res.json::<Value>().await?;
    assert_eq!(
        body["message"],
        "Your email is not verified. A new verification link has been sent to your email address."
    );

    let (status, body, _) = register(server, "short").await?;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["errors"]["password"].is_array());
    Ok(())
}

#[tokio::test]
async fn blocked_addresses_cannot_log_in() -> Result<()> {
    let Some(server) = common::ensure_db_server().await? else { return Ok(()) };
    let client = reqwest::Client::new();
    let token = common::login(server, SUPERADMIN, SEED_PASSWORD).await?;

    let octets = uuid::Uuid::new_v4().into_bytes();
    let ip = format!("10.{}.{}.{}", octets[0], octets[1], octets[2].max(1));
    let res = client
        .post(server.url("/api/v1/blocked-ips"))
        .bearer_auth(&token)
        .json(&json!({ "ip_address": ip, "reason": "integration test" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::CREATED);
    let blocked = res.json::<Value>().await?;

    let res = client
        .post(server.url("/api/v1/auth/login"))
        .header("x-forwarded-for", &ip)
        .json(&json!({ "email": SUPERADMIN, "password": SEED_PASSWORD }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(res.json::<Value>().await?["message"], "Your IP address is blocked.");

    let sqid = blocked["data"]["id"].as_str().unwrap_or_default();
    let res = client
        .delete(server.url(&format!("/api/v1/blocked-ips/{}", sqid)))
        .bearer_auth(&token)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn password_reset_round_trip() -> Result<()> {
    let Some(server) = common::ensure_db_server().await? else { return Ok(()) };
    let client = reqwest::Client::new();

    let (status, _, email) = register(server, "old-password-1").await?;
    assert_eq!(status, StatusCode::CREATED);
    mark_verified(&email).await?;

    let res = client
        .post(server.url("/api/v1/auth/forgot-password"))
        .json(&json!({ "email": email }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.json::<Value>().await?["message"], "We have emailed your password reset link.");

    // The mailed token is only logged, so replace it with one we know
    let token = atlas_api::services::AuthService::new(common::db_pool().await?)
        .create_reset_token(&email)
        .await?;

    let reset = json!({
        "token": token,
        "email": email,
        "password": "new-password-1",
        "password_confirmation": "new-password-1",
    });
    let res = client.post(server.url("/api/v1/auth/reset-password")).json(&reset).send().await?;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.json::<Value>().await?["message"], "Your password has been reset.");

    let res = common::login_response(server, &email, "old-password-1").await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    common::login(server, &email, "new-password-1").await?;

    // Tokens are single use
    let res = client.post(server.url("/api/v1/auth/reset-password")).json(&reset).send().await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(res.json::<Value>().await?["message"], "This password reset token is invalid.");
    Ok(())
}

#[tokio::test]
async fn logout_revokes_the_token() -> Result<()> {
    let Some(server) = common::ensure_db_server().await? else { return Ok(()) };
    let client = reqwest::Client::new();
    let token = common::login(server, SUPERADMIN, SEED_PASSWORD).await?;

    let res = client.get(server.url("/api/v1/auth/profile")).bearer_auth(&token).send().await?;
    assert_eq!(res.status(), StatusCode::OK);

    let res = client.post(server.url("/api/v1/auth/logout")).bearer_auth(&token).send().await?;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.json::<Value>().await?["message"], "User successfully logged out");

    let res = client.get(server.url("/api/v1/auth/profile")).bearer_auth(&token).send().await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(res.json::<Value>().await?["message"], "Unauthenticated.");
    Ok(())
}
