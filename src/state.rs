use anyhow::Context;
use sqlx::PgPool;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::database::DatabaseManager;
use crate::services::fcm::{DisabledGateway, FcmGateway, PushGateway};
use crate::services::mail::{mailer_from_config, Mailer};
use crate::services::social::SocialAuth;
use crate::services::storage::StorageService;
use crate::sqid::SqidCodec;

/// Shared handles passed to every handler
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub vendors: Option<PgPool>,
    pub sqids: Arc<SqidCodec>,
    pub mailer: Arc<dyn Mailer>,
    pub push: Arc<dyn PushGateway>,
    pub storage: Arc<StorageService>,
    pub social: Arc<SocialAuth>,
    pub export_dir: PathBuf,
}

impl AppState {
    /// Build every service from configuration. Pools connect lazily.
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let pool = DatabaseManager::connect_lazy(&config.database).context("application database")?;
        let vendors = DatabaseManager::connect_vendor_lazy(&config.database).context("vendor database")?;
        let sqids = SqidCodec::from_config(&config.sqid).context("sqid alphabet")?;
        let mailer: Arc<dyn Mailer> = Arc::from(mailer_from_config(&config.mail).context("mail transport")?);
        let storage = StorageService::from_config(config).context("storage backends")?;

        let http = reqwest::Client::builder()
            .user_agent(concat!("atlas-api/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("http client")?;

        let push: Arc<dyn PushGateway> = match FcmGateway::from_config(http.clone(), &config.fcm) {
            Ok(Some(gateway)) => Arc::new(gateway),
            Ok(None) => {
                tracing::info!("FCM credentials not configured; push notifications disabled");
                Arc::new(DisabledGateway)
            }
            Err(e) => {
                tracing::warn!("FCM disabled: {}", e);
                Arc::new(DisabledGateway)
            }
        };

        Ok(Self {
            pool,
            vendors,
            sqids: Arc::new(sqids),
            mailer,
            push,
            storage: Arc::new(storage),
            social: Arc::new(SocialAuth::new(http, config.social.clone())),
            export_dir: PathBuf::from(&config.export.dir),
        })
    }

    /// Decode a sqid route parameter, reporting unknown ids as `<model> not found`
    pub fn decode_id(&self, sqid: &str, model: &str) -> Result<i64, crate::error::ApiError> {
        self.sqids
            .decode(sqid)
            .ok_or_else(|| crate::error::ApiError::model_not_found(model))
    }
}
