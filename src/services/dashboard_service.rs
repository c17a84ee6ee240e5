use serde::Serialize;
use sqlx::PgPool;

use crate::database::DatabaseError;
use crate::services::{BlockedIpService, OAuthService, UserService, VendorDirectory};

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct DashboardMetrics {
    pub total_oauth_clients: i64,
    pub total_revoked_oauth_clients: i64,
    pub total_users: i64,
    pub total_access_tokens: i64,
    pub total_blocked_ips: i64,
    pub total_vendors: i64,
}

/// Collect the dashboard counters. `total_vendors` stays 0 without a vendor database.
pub async fn collect(pool: &PgPool, vendors: Option<&PgPool>) -> Result<DashboardMetrics, DatabaseError> {
    let oauth = OAuthService::new(pool.clone());
    let (total_oauth_clients, total_revoked_oauth_clients, total_access_tokens) = tokio::try_join!(
        oauth.count_clients(),
        oauth.count_revoked_clients(),
        oauth.count_tokens()
    )?;

    let total_users = UserService::new(pool.clone()).repository().count().await?;
    let total_blocked_ips = BlockedIpService::new(pool.clone()).count().await?;

    let total_vendors = match vendors {
        Some(vendor_pool) => VendorDirectory::new(vendor_pool.clone()).count().await?,
        None => 0,
    };

    Ok(DashboardMetrics {
        total_oauth_clients,
        total_revoked_oauth_clients,
        total_users,
        total_access_tokens,
        total_blocked_ips,
        total_vendors,
    })
}
