#![allow(dead_code)]

use std::process::{Child, Command, Stdio};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde_json::{json, Value};

static SERVER: OnceLock<TestServer> = OnceLock::new();
static DB_SERVER: OnceLock<TestServer> = OnceLock::new();

/// Password of the seeded accounts
pub const SEED_PASSWORD: &str = "password";
pub const SUPERADMIN: &str = "superadmin@example.com";

pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    _child: Child,
}

impl TestServer {
    fn spawn(args: &[&str]) -> Result<Self> {
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        // The binary reads DATABASE_URL from the inherited environment or .env;
        // without a reachable database /health answers 503 and the guard still runs.
        let child = Command::new(env!("CARGO_BIN_EXE_atlas-api"))
            .args(args)
            .env("ATLAS_API_PORT", port.to_string())
            .env("MAIL_MAILER", "log")
            .env("RUST_LOG", "warn")
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .context("failed to spawn server binary")?;

        Ok(Self { port, base_url, _child: child })
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let client = reqwest::Client::new();
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Ok(resp) = client.get(format!("{}/health", self.base_url)).send().await {
                if resp.status() == StatusCode::OK || resp.status() == StatusCode::SERVICE_UNAVAILABLE {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

pub async fn ensure_server() -> Result<&'static TestServer> {
    let server = SERVER.get_or_init(|| TestServer::spawn(&["serve"]).expect("failed to spawn server binary"));
    server.wait_ready(Duration::from_secs(15)).await?;
    Ok(server)
}

/// `DATABASE_URL` when the suite has a real database to talk to
pub fn database_url() -> Option<String> {
    std::env::var("DATABASE_URL").ok().filter(|url| !url.is_empty())
}

fn run_command(args: &[&str]) -> Result<()> {
    let status = Command::new(env!("CARGO_BIN_EXE_atlas-api"))
        .args(args)
        .env("RUST_LOG", "warn")
        .stdin(Stdio::null())
        .status()
        .with_context(|| format!("failed to run {:?}", args))?;
    anyhow::ensure!(status.success(), "{:?} exited with {}", args, status);
    Ok(())
}

/// Migrated and seeded server, or `None` when `DATABASE_URL` is unset and the
/// calling test should return early.
pub async fn ensure_db_server() -> Result<Option<&'static TestServer>> {
    if database_url().is_none() {
        eprintln!("DATABASE_URL not set; skipping database test");
        return Ok(None);
    }
    let server = DB_SERVER.get_or_init(|| {
        run_command(&["migrate"]).expect("migrations failed");
        run_command(&["seed"]).expect("seeding failed");
        TestServer::spawn(&["serve"]).expect("failed to spawn server binary")
    });
    server.wait_ready(Duration::from_secs(15)).await?;
    Ok(Some(server))
}

/// Direct connection for arranging state the API does not expose
pub async fn db_pool() -> Result<sqlx::PgPool> {
    let url = database_url().context("DATABASE_URL not set")?;
    Ok(sqlx::PgPool::connect(&url).await?)
}

/// Short random suffix for unique emails, usernames and phones
pub fn unique(prefix: &str) -> String {
    format!("{}{}", prefix, uuid::Uuid::new_v4().simple().to_string().get(..10).unwrap_or_default())
}

/// Raw login response
pub async fn login_response(server: &TestServer, email: &str, password: &str) -> Result<reqwest::Response> {
    Ok(reqwest::Client::new()
        .post(server.url("/api/v1/auth/login"))
        .json(&json!({ "email": email, "password": password }))
        .send()
        .await?)
}

/// Bearer token for a verified account
pub async fn login(server: &TestServer, email: &str, password: &str) -> Result<String> {
    let res = login_response(server, email, password).await?;
    anyhow::ensure!(res.status() == StatusCode::OK, "login as {} answered {}", email, res.status());
    let body = res.json::<Value>().await?;
    body["data"]["access_token"]
        .as_str()
        .map(str::to_string)
        .context("login response had no access_token")
}
