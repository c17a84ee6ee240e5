use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::config::DatabaseConfig;

/// Errors from the database layer
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    /// Carries the model name, rendered to clients as "<Model> not found"
    #[error("{0} not found")]
    NotFound(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Builds connection pools for the application and vendor databases
pub struct DatabaseManager;

impl DatabaseManager {
    /// Application pool. Connections open on first use, so the server can
    /// boot and report a degraded `/health` while the database is down.
    pub fn connect_lazy(config: &DatabaseConfig) -> Result<PgPool, DatabaseError> {
        if config.url.is_empty() {
            return Err(DatabaseError::ConfigMissing("DATABASE_URL"));
        }
        Self::lazy_pool(&config.url, config)
    }

    /// Optional vendor pool used for vendor validation and the vendor count
    pub fn connect_vendor_lazy(config: &DatabaseConfig) -> Result<Option<PgPool>, DatabaseError> {
        config
            .vendor_url
            .as_deref()
            .map(|url| Self::lazy_pool(url, config))
            .transpose()
    }

    fn lazy_pool(url: &str, config: &DatabaseConfig) -> Result<PgPool, DatabaseError> {
        url::Url::parse(url).map_err(|_| DatabaseError::InvalidDatabaseUrl)?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout))
            .connect_lazy(url)?;
        Ok(pool)
    }

    /// Pings the pool to ensure connectivity
    pub async fn health_check(pool: &PgPool) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1").execute(pool).await?;
        Ok(())
    }

    /// Apply the embedded migrations
    pub async fn migrate(pool: &PgPool) -> Result<(), DatabaseError> {
        sqlx::migrate!("./migrations").run(pool).await?;
        info!("Database migrations applied");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str) -> DatabaseConfig {
        DatabaseConfig {
            url: url.to_string(),
            vendor_url: None,
            max_connections: 1,
            connection_timeout: 1,
        }
    }

    #[test]
    fn empty_url_is_a_missing_config() {
        assert!(matches!(
            DatabaseManager::connect_lazy(&config("")),
            Err(DatabaseError::ConfigMissing("DATABASE_URL"))
        ));
    }

    #[test]
    fn malformed_url_is_rejected() {
        assert!(matches!(
            DatabaseManager::connect_lazy(&config("not a url")),
            Err(DatabaseError::InvalidDatabaseUrl)
        ));
    }

    #[tokio::test]
    async fn vendor_pool_is_optional() {
        let cfg = config("postgres://localhost/atlas");
        assert!(DatabaseManager::connect_vendor_lazy(&cfg).unwrap().is_none());

        let mut with_vendor = cfg.clone();
        with_vendor.vendor_url = Some("postgres://localhost/ecommerce".to_string());
        assert!(DatabaseManager::connect_vendor_lazy(&with_vendor).unwrap().is_some());
    }
}
