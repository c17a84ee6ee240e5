use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::collections::BTreeMap;

use crate::api::validation::is_email;
use crate::auth::password::{hash_password, random_string};
use crate::database::models::User;
use crate::database::{DatabaseError, Listing, Repository};
use crate::error::ApiError;

pub const USER_LISTING: Listing = Listing {
    table: "users",
    search_columns: &["users.name", "users.email", "users.username", "users.phone"],
    sortable: &[
        "id",
        "name",
        "email",
        "username",
        "phone",
        "created_at",
        "updated_at",
        "last_login_at",
        "login_count",
    ],
    soft_deletes: true,
};

/// Columns a user export may contain
pub const USER_EXPORT_COLUMNS: &[&str] = &[
    "id",
    "name",
    "email",
    "username",
    "phone",
    "email_verified_at",
    "last_login_at",
    "last_login_ip",
    "login_count",
    "provider",
    "created_at",
    "updated_at",
];

/// Unique user columns
#[derive(Debug, Clone, Copy)]
pub enum UniqueColumn {
    Email,
    Username,
    Phone,
}

impl UniqueColumn {
    fn column(&self) -> &'static str {
        match self {
            UniqueColumn::Email => "email",
            UniqueColumn::Username => "username",
            UniqueColumn::Phone => "phone",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub username: Option<String>,
    pub phone: Option<String>,
    pub password_hash: String,
    pub email_verified_at: Option<DateTime<Utc>>,
    pub profile_image: Option<String>,
    pub provider: Option<String>,
    pub provider_id: Option<String>,
}

/// Partial update; `None` leaves the column unchanged
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub username: Option<String>,
    pub phone: Option<String>,
    pub password_hash: Option<String>,
}

impl UserChanges {
    fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.email.is_none()
            && self.username.is_none()
            && self.phone.is_none()
            && self.password_hash.is_none()
    }
}

/// Device fields sent with a login or registration
#[derive(Debug, Clone, Default)]
pub struct DeviceInfo {
    pub token: Option<String>,
    /// Client user agent
    pub device_type: Option<String>,
    pub device_name: Option<String>,
    pub app_version: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportOutcome {
    pub created: u64,
    pub updated: u64,
    pub skipped: u64,
}

pub struct UserService {
    pool: PgPool,
}

impl UserService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn repository(&self) -> Repository<User> {
        Repository::new("users", "User", self.pool.clone())
    }

    pub async fn find(&self, id: i64) -> Result<User, DatabaseError> {
        self.repository().select_404(id).await
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE LOWER(email) = LOWER($1) AND deleted_at IS NULL")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    /// Whether `value` is already used by another row (trashed rows included)
    pub async fn is_taken(&self, column: UniqueColumn, value: &str, except: Option<i64>) -> Result<bool, DatabaseError> {
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM users WHERE LOWER({0}) = LOWER($1) AND ($2::BIGINT IS NULL OR id <> $2))",
            column.column()
        );
        let taken: bool = sqlx::query_scalar(&sql)
            .bind(value)
            .bind(except)
            .fetch_one(&self.pool)
            .await?;
        Ok(taken)
    }

    pub async fn create(&self, new_user: NewUser) -> Result<User, ApiError> {
        let pin = hash_password("000000")?;
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (name, email, username, phone, password, pin, email_verified_at,
                               profile_image, provider, provider_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(&new_user.name)
        .bind(&new_user.email)
        .bind(&new_user.username)
        .bind(&new_user.phone)
        .bind(&new_user.password_hash)
        .bind(&pin)
        .bind(new_user.email_verified_at)
        .bind(&new_user.profile_image)
        .bind(&new_user.provider)
        .bind(&new_user.provider_id)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(user_id = user.id, "user created");
        Ok(user)
    }

    pub async fn update(&self, id: i64, changes: UserChanges) -> Result<User, DatabaseError> {
        if changes.is_empty() {
            return self.find(id).await;
        }

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE users SET updated_at = NOW()");
        if let Some(name) = changes.name {
            qb.push(", name = ").push_bind(name);
        }
        if let Some(email) = changes.email {
            qb.push(", email = ").push_bind(email);
        }
        if let Some(username) = changes.username {
            qb.push(", username = ").push_bind(username);
        }
        if let Some(phone) = changes.phone {
            qb.push(", phone = ").push_bind(phone);
        }
        if let Some(password) = changes.password_hash {
            qb.push(", password = ").push_bind(password);
        }
        qb.push(" WHERE id = ").push_bind(id);
        qb.push(" AND deleted_at IS NULL RETURNING *");

        qb.build_query_as::<User>()
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::NotFound("User".to_string()))
    }

    pub async fn set_password(&self, id: i64, password_hash: &str) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE users SET password = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_profile_image(&self, id: i64, path: &str) -> Result<User, DatabaseError> {
        sqlx::query_as::<_, User>("UPDATE users SET profile_image = $2, updated_at = NOW() WHERE id = $1 RETURNING *")
            .bind(id)
            .bind(path)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::NotFound("User".to_string()))
    }

    pub async fn mark_email_verified(&self, id: i64) -> Result<User, DatabaseError> {
        sqlx::query_as::<_, User>(
            "UPDATE users SET email_verified_at = COALESCE(email_verified_at, NOW()), updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DatabaseError::NotFound("User".to_string()))
    }

    /// Rotate current login into last login and bump the counter
    pub async fn record_login(&self, id: i64, ip: &str) -> Result<User, DatabaseError> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET last_login_at = current_login_at,
                last_login_ip = current_login_ip,
                current_login_at = NOW(),
                current_login_ip = $2,
                login_count = login_count + 1,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(ip)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DatabaseError::NotFound("User".to_string()))
    }

    /// Register or move a device token; no-op when the login carried none
    pub async fn upsert_device_token(&self, user_id: i64, device: &DeviceInfo) -> Result<(), DatabaseError> {
        let Some(token) = device.token.as_deref().filter(|t| !t.is_empty()) else {
            return Ok(());
        };
        sqlx::query(
            r#"
            INSERT INTO device_tokens (user_id, token, device_type, device_name, app_version)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (token) DO UPDATE
            SET user_id = EXCLUDED.user_id,
                device_type = COALESCE(EXCLUDED.device_type, device_tokens.device_type),
                device_name = COALESCE(EXCLUDED.device_name, device_tokens.device_name),
                app_version = COALESCE(EXCLUDED.app_version, device_tokens.app_version),
                updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(token)
        .bind(&device.device_type)
        .bind(&device.device_name)
        .bind(&device.app_version)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn device_tokens(&self, user_id: i64) -> Result<Vec<String>, DatabaseError> {
        let tokens = sqlx::query_scalar("SELECT token FROM device_tokens WHERE user_id = $1 ORDER BY id")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(tokens)
    }

    pub async fn device_token_owner(&self, token: &str) -> Result<Option<i64>, DatabaseError> {
        let owner = sqlx::query_scalar("SELECT user_id FROM device_tokens WHERE token = $1")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;
        Ok(owner)
    }

    /// Find by email or create a verified account for a social login
    pub async fn upsert_social(
        &self,
        email: &str,
        name: &str,
        provider: &str,
        provider_id: &str,
    ) -> Result<User, ApiError> {
        if let Some(existing) = self.find_by_email(email).await? {
            let user = sqlx::query_as::<_, User>(
                r#"
                UPDATE users
                SET name = $2, provider = $3, provider_id = $4,
                    email_verified_at = COALESCE(email_verified_at, NOW()), updated_at = NOW()
                WHERE id = $1
                RETURNING *
                "#,
            )
            .bind(existing.id)
            .bind(name)
            .bind(provider)
            .bind(provider_id)
            .fetch_one(&self.pool)
            .await?;
            return Ok(user);
        }

        self.create(NewUser {
            name: name.to_string(),
            email: email.to_string(),
            password_hash: hash_password(&random_string(24))?,
            email_verified_at: Some(Utc::now()),
            provider: Some(provider.to_string()),
            provider_id: Some(provider_id.to_string()),
            ..Default::default()
        })
        .await
    }

    /// Live users created within the optional inclusive date range
    pub async fn export_rows(&self, range: Option<(NaiveDate, NaiveDate)>) -> Result<Vec<User>, DatabaseError> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users
            WHERE deleted_at IS NULL
              AND ($1::DATE IS NULL OR created_at::DATE >= $1)
              AND ($2::DATE IS NULL OR created_at::DATE <= $2)
            ORDER BY id
            "#,
        )
        .bind(range.map(|r| r.0))
        .bind(range.map(|r| r.1))
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    /// Upsert rows keyed by email. Rows without a valid email or name, or
    /// whose username/phone belong to someone else, are skipped.
    pub async fn import(
        &self,
        rows: Vec<BTreeMap<String, String>>,
        update_existing: bool,
    ) -> Result<ImportOutcome, ApiError> {
        let mut outcome = ImportOutcome::default();
        for row in rows {
            let field = |k: &str| row.get(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
            let (Some(email), Some(name)) = (field("email"), field("name")) else {
                outcome.skipped += 1;
                continue;
            };
            if !is_email(&email) {
                outcome.skipped += 1;
                continue;
            }
            let username = field("username");
            let phone = field("phone");
            let password = field("password");

            let existing = self.find_by_email(&email).await?;
            let except = existing.as_ref().map(|u| u.id);
            let mut conflict = false;
            if let Some(u) = &username {
                conflict |= self.is_taken(UniqueColumn::Username, u, except).await?;
            }
            if let Some(p) = &phone {
                conflict |= self.is_taken(UniqueColumn::Phone, p, except).await?;
            }
            if conflict {
                outcome.skipped += 1;
                continue;
            }

            match existing {
                Some(user) if update_existing => {
                    let password_hash = password.as_deref().map(hash_password).transpose()?;
                    self.update(
                        user.id,
                        UserChanges {
                            name: Some(name),
                            username,
                            phone,
                            password_hash,
                            ..Default::default()
                        },
                    )
                    .await?;
                    outcome.updated += 1;
                }
                Some(_) => outcome.skipped += 1,
                None => {
                    if self.is_taken(UniqueColumn::Email, &email, None).await? {
                        // Trashed account still holds the address
                        outcome.skipped += 1;
                        continue;
                    }
                    let plain = password.unwrap_or_else(|| random_string(16));
                    self.create(NewUser {
                        name,
                        email,
                        username,
                        phone,
                        password_hash: hash_password(&plain)?,
                        ..Default::default()
                    })
                    .await?;
                    outcome.created += 1;
                }
            }
        }
        tracing::info!(?outcome, "user import finished");
        Ok(outcome)
    }
}
