use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::database::models::BlockedIp;
use crate::database::{DatabaseError, Listing, Repository};

pub const BLOCKED_IP_LISTING: Listing = Listing {
    table: "blocked_ips",
    search_columns: &["blocked_ips.ip_address", "blocked_ips.reason"],
    sortable: &["id", "ip_address", "blocked_until", "created_at"],
    soft_deletes: true,
};

#[derive(Debug, Clone, Default)]
pub struct BlockedIpInput {
    pub ip_address: String,
    pub reason: Option<String>,
    pub blocked_until: Option<DateTime<Utc>>,
    pub user_id: Option<i64>,
}

pub struct BlockedIpService {
    pool: PgPool,
}

impl BlockedIpService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn repository(&self) -> Repository<BlockedIp> {
        Repository::new("blocked_ips", "Blocked IP", self.pool.clone())
    }

    /// Blocked while a live row exists with no end or an end in the future
    pub async fn is_blocked(&self, ip: &str) -> Result<bool, DatabaseError> {
        let blocked: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM blocked_ips
                WHERE ip_address = $1
                  AND deleted_at IS NULL
                  AND (blocked_until IS NULL OR blocked_until > NOW())
            )
            "#,
        )
        .bind(ip)
        .fetch_one(&self.pool)
        .await?;
        Ok(blocked)
    }

    pub async fn create(&self, input: BlockedIpInput) -> Result<BlockedIp, DatabaseError> {
        let row = sqlx::query_as::<_, BlockedIp>(
            r#"
            INSERT INTO blocked_ips (ip_address, reason, blocked_until, user_id)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(&input.ip_address)
        .bind(&input.reason)
        .bind(input.blocked_until)
        .bind(input.user_id)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(ip = %row.ip_address, "IP address blocked");
        Ok(row)
    }

    /// Replace the editable columns of a live row
    pub async fn update(&self, id: i64, input: BlockedIpInput) -> Result<BlockedIp, DatabaseError> {
        sqlx::query_as::<_, BlockedIp>(
            r#"
            UPDATE blocked_ips
            SET ip_address = $2, reason = $3, blocked_until = $4, user_id = $5, updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&input.ip_address)
        .bind(&input.reason)
        .bind(input.blocked_until)
        .bind(input.user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DatabaseError::NotFound("Blocked IP".to_string()))
    }

    /// Soft delete every live block of `ip` attached to `user_id`
    pub async fn unblock_for_user(&self, user_id: i64, ip: &str) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE blocked_ips SET deleted_at = NOW(), updated_at = NOW()
            WHERE user_id = $1 AND ip_address = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(user_id)
        .bind(ip)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound("Blocked IP".to_string()));
        }
        tracing::info!(user_id, ip, "IP address unblocked");
        Ok(())
    }

    pub async fn count(&self) -> Result<i64, DatabaseError> {
        self.repository().count().await
    }
}
