// User trash lifecycle against a real database. Each test returns early when
// DATABASE_URL is unset.

mod common;

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

use common::{TestServer, SEED_PASSWORD, SUPERADMIN};

/// Returns the new user's sqid and email
async fn create_user(client: &Client, server: &TestServer, token: &str) -> Result<(String, String)> {
    let handle = common::unique("trash");
    let email = format!("{}@example.com", handle);
    let res = client
        .post(server.url("/api/v1/users"))
        .bearer_auth(token)
        .json(&json!({
            "name": "Trash Candidate",
            "email": email,
            "username": handle,
            "password": "password-123",
        }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::CREATED);
    let body = res.json::<Value>().await?;
    let sqid = body["data"]["id"].as_str().context("created user had no id")?;
    Ok((sqid.to_string(), email))
}

/// Ids of the users whose email matches, optionally including trashed rows
async fn listed(client: &Client, server: &TestServer, token: &str, email: &str, with_trashed: bool) -> Result<Vec<String>> {
    let res = client
        .get(server.url("/api/v1/users"))
        .query(&[("search", email), ("with_trashed", if with_trashed { "1" } else { "0" })])
        .bearer_auth(token)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body = res.json::<Value>().await?;
    Ok(body["data"]
        .as_array()
        .map(|rows| rows.iter().filter_map(|r| r["id"].as_str().map(str::to_string)).collect())
        .unwrap_or_default())
}

async fn status_of(req: reqwest::RequestBuilder) -> Result<StatusCode> {
    Ok(req.send().await?.status())
}

#[tokio::test]
async fn delete_restore_and_force_delete() -> Result<()> {
    let Some(server) = common::ensure_db_server().await? else { return Ok(()) };
    let client = Client::new();
    let token = common::login(server, SUPERADMIN, SEED_PASSWORD).await?;
    let (sqid, email) = create_user(&client, server, &token).await?;
    let user_url = server.url(&format!("/api/v1/users/{}", sqid));

    let res = client.delete(&user_url).bearer_auth(&token).send().await?;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.json::<Value>().await?["message"], "User deleted successfully");
    assert_eq!(status_of(client.get(&user_url).bearer_auth(&token)).await?, StatusCode::NOT_FOUND);

    assert!(listed(&client, server, &token, &email, false).await?.is_empty());
    assert_eq!(listed(&client, server, &token, &email, true).await?, vec![sqid.clone()]);

    let res = client
        .post(format!("{}/restore", user_url))
        .bearer_auth(&token)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.json::<Value>().await?["data"]["id"], sqid.as_str());
    assert_eq!(status_of(client.get(&user_url).bearer_auth(&token)).await?, StatusCode::OK);

    let res = client.delete(format!("{}/force", user_url)).bearer_auth(&token).send().await?;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.json::<Value>().await?["message"], "User permanently deleted successfully");

    assert_eq!(status_of(client.get(&user_url).bearer_auth(&token)).await?, StatusCode::NOT_FOUND);
    assert_eq!(
        status_of(client.post(format!("{}/restore", user_url)).bearer_auth(&token)).await?,
        StatusCode::NOT_FOUND
    );
    Ok(())
}

#[tokio::test]
async fn bulk_restore_returns_only_trashed_rows() -> Result<()> {
    let Some(server) = common::ensure_db_server().await? else { return Ok(()) };
    let client = Client::new();
    let token = common::login(server, SUPERADMIN, SEED_PASSWORD).await?;

    let (trashed, _) = create_user(&client, server, &token).await?;
    let (live, _) = create_user(&client, server, &token).await?;

    let res = client
        .post(server.url("/api/v1/users/bulk-delete"))
        .bearer_auth(&token)
        .json(&json!({ "sqids": [trashed] }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .post(server.url("/api/v1/users/bulk-restore"))
        .bearer_auth(&token)
        .json(&json!({ "sqids": [trashed, live] }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body = res.json::<Value>().await?;
    assert_eq!(body["message"], "Users restored successfully");
    let restored: Vec<&str> = body["data"]
        .as_array()
        .map(|rows| rows.iter().filter_map(|r| r["id"].as_str()).collect())
        .unwrap_or_default();
    assert_eq!(restored, vec![trashed.as_str()]);

    // Nothing is trashed any more, so a second pass restores nothing
    let res = client
        .post(server.url("/api/v1/users/bulk-restore"))
        .bearer_auth(&token)
        .json(&json!({ "sqids": [trashed, live] }))
        .send()
        .await?;
    assert_eq!(res.json::<Value>().await?["data"], json!([]));

    for sqid in [&trashed, &live] {
        client
            .delete(server.url(&format!("/api/v1/users/{}/force", sqid)))
            .bearer_auth(&token)
            .send()
            .await?;
    }
    Ok(())
}
