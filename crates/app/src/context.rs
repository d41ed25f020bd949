use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ledgerlink_aggregator::{Aggregator, AggregatorClient};
use ledgerlink_link::Broker;
use ledgerlink_mirror::{Mirror, TableClient};
use ledgerlink_storage::{create_db, resolve_item, DbPool};
use ledgerlink_core::ItemRef;

use crate::config::{Config, ConfigError};
use crate::error::AppError;

pub const DB_FILE: &str = "ledgerlink.db";

/// Everything a command needs: the loaded configuration and the local store.
/// API clients are built on demand so that purely local commands work without
/// credentials.
pub struct AppContext {
    pub data_dir: PathBuf,
    pub config: Config,
    pub db: DbPool,
}

impl AppContext {
    pub async fn open(data_dir: PathBuf) -> Result<Self, AppError> {
        std::fs::create_dir_all(&data_dir).map_err(|source| ConfigError::Io {
            path: data_dir.clone(),
            source,
        })?;
        let config = Config::load(&data_dir)?;
        let db = create_db(&data_dir.join(DB_FILE)).await?;
        tracing::debug!(data_dir = %data_dir.display(), "Opened local store");
        Ok(AppContext {
            data_dir,
            config,
            db,
        })
    }

    pub fn aggregator(&self) -> Result<Arc<dyn Aggregator>, AppError> {
        let client = AggregatorClient::new(
            self.config.aggregator.environment,
            self.config.credentials()?,
            Duration::from_secs(self.config.aggregator.timeout_secs),
        )?;
        Ok(Arc::new(client))
    }

    pub fn broker(&self, api: Arc<dyn Aggregator>) -> Broker {
        Broker::new(api, self.db.clone(), self.config.link_settings())
    }

    /// The mirror, or `None` when no API key or base is configured.
    pub fn mirror(&self) -> Result<Option<Mirror>, AppError> {
        let mirror = &self.config.mirror;
        let (Some(api_key), Some(base_id)) = (&mirror.api_key, &mirror.base_id) else {
            return Ok(None);
        };
        let client = TableClient::new(
            &mirror.api_url,
            base_id.clone(),
            api_key.clone(),
            Duration::from_secs(mirror.timeout_secs),
        )?;
        Ok(Some(Mirror::new(Arc::new(client), self.config.mirror_tables())))
    }

    pub fn require_mirror(&self) -> Result<Mirror, AppError> {
        self.mirror()?.ok_or_else(|| {
            let missing = if self.config.mirror.api_key.is_none() {
                "LEDGERLINK_MIRROR_KEY"
            } else {
                "LEDGERLINK_MIRROR_BASE"
            };
            AppError::Config(ConfigError::Missing(missing))
        })
    }

    /// Resolves one alias or item id; unknown names are an error.
    pub async fn resolve(&self, item_or_alias: &str) -> Result<ItemRef, AppError> {
        resolve_item(&self.db, item_or_alias)
            .await?
            .ok_or_else(|| AppError::UnknownItem(item_or_alias.to_string()))
    }
}
