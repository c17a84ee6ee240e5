use anyhow::Context;
use chrono::Utc;
use serde_json::json;

use crate::auth::password::{hash_password, random_string};
use crate::cli::utils::{build_state, output_success};
use crate::cli::OutputFormat;
use crate::config;
use crate::services::user_service::NewUser;
use crate::services::UserService;

struct Account {
    name: &'static str,
    email: &'static str,
    username: &'static str,
    phone: &'static str,
}

const ACCOUNTS: &[Account] = &[
    Account {
        name: "Super Admin",
        email: "superadmin@example.com",
        username: "superadmin",
        phone: "+2348136834496",
    },
    Account {
        name: "John Doe",
        email: "john@example.com",
        username: "johndoe",
        phone: "+1234567890",
    },
];

/// Create the default verified accounts (password `password`). Existing
/// addresses are left alone so the command can be re-run.
pub async fn handle(extra: u32, output_format: OutputFormat) -> anyhow::Result<()> {
    let state = build_state(config::config())?;
    let users = UserService::new(state.pool.clone());
    let password_hash = hash_password("password").context("hashing seed password")?;

    let mut created = 0u32;
    let mut skipped = 0u32;
    for account in ACCOUNTS {
        if users.find_by_email(account.email).await?.is_some() {
            skipped += 1;
            continue;
        }
        users
            .create(NewUser {
                name: account.name.to_string(),
                email: account.email.to_string(),
                username: Some(account.username.to_string()),
                phone: Some(account.phone.to_string()),
                password_hash: password_hash.clone(),
                email_verified_at: Some(Utc::now()),
                ..Default::default()
            })
            .await
            .map_err(|e| anyhow::anyhow!("creating {}: {}", account.email, e))?;
        created += 1;
    }

    for _ in 0..extra {
        let handle = random_string(10).to_lowercase();
        users
            .create(NewUser {
                name: format!("User {}", handle),
                email: format!("{}@example.com", handle),
                username: Some(handle),
                password_hash: password_hash.clone(),
                email_verified_at: Some(Utc::now()),
                ..Default::default()
            })
            .await
            .map_err(|e| anyhow::anyhow!("creating random user: {}", e))?;
        created += 1;
    }

    output_success(
        &output_format,
        "Database seeded",
        Some(json!({ "created": created, "skipped": skipped })),
    )
}
