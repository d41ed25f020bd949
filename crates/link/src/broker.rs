use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ledgerlink_aggregator::{Aggregator, LinkMode, LinkTokenRequest};
use ledgerlink_core::{ItemId, TokenPair};
use ledgerlink_storage::{get_access_token, DbPool};
use tokio::sync::Mutex;

use crate::error::LinkError;
use crate::server::{CallbackOutcome, CallbackServer, Flow};

/// Products requested when linking a new institution.
pub const FRESH_LINK_PRODUCTS: &[&str] = &["transactions"];

/// Fixed parameters of every link token this tool requests.
#[derive(Debug, Clone)]
pub struct LinkSettings {
    pub client_name: String,
    pub user_ref: String,
    pub country_codes: Vec<String>,
    pub language: String,
    pub days_requested: u32,
    /// Upper bound on how long the user has to finish the browser flow.
    pub timeout: Duration,
    pub open_browser: bool,
}

impl Default for LinkSettings {
    fn default() -> Self {
        LinkSettings {
            client_name: "ledgerlink".to_string(),
            user_ref: "ledgerlink-user".to_string(),
            country_codes: vec!["US".to_string()],
            language: "en".to_string(),
            days_requested: 365,
            timeout: Duration::from_secs(300),
            open_browser: true,
        }
    }
}

/// Anything that can walk the user through repairing an item's credentials.
#[async_trait]
pub trait Relinker: Send + Sync {
    async fn relink(&self, item: &ItemId, port: u16) -> Result<(), LinkError>;
}

/// Runs the browser-based link and relink flows against the aggregator.
pub struct Broker {
    api: Arc<dyn Aggregator>,
    db: DbPool,
    settings: LinkSettings,
    // Relink flows share the configured port, so only one runs at a time.
    relink_guard: Mutex<()>,
}

impl Broker {
    pub fn new(api: Arc<dyn Aggregator>, db: DbPool, settings: LinkSettings) -> Self {
        Broker {
            api,
            db,
            settings,
            relink_guard: Mutex::new(()),
        }
    }

    /// Links a new institution and returns the exchanged credentials. The
    /// caller decides where to persist them.
    pub async fn link(&self, port: u16) -> Result<TokenPair, LinkError> {
        let products = FRESH_LINK_PRODUCTS.iter().map(|p| p.to_string()).collect();
        let token = self
            .api
            .create_link_token(&self.token_request(LinkMode::Fresh { products }))
            .await?;

        let server = CallbackServer::start(port, Flow::Link, &token).await?;
        self.present(&server.url());

        match server.wait(self.settings.timeout).await? {
            CallbackOutcome::PublicToken(public_token) => {
                let pair = self.api.exchange_public_token(&public_token).await?;
                tracing::info!(item = %pair.item_id, "Institution linked");
                Ok(pair)
            }
            CallbackOutcome::Relinked => Err(LinkError::Protocol(
                "link page reported a relink instead of a public token".to_string(),
            )),
        }
    }

    /// Puts an existing item through update mode so its stored access token
    /// works again.
    pub async fn relink(&self, item: &ItemId, port: u16) -> Result<(), LinkError> {
        let _guard = self.relink_guard.lock().await;

        let access_token = get_access_token(&self.db, item)
            .await?
            .ok_or_else(|| LinkError::UnknownItem(item.clone()))?;
        let token = self
            .api
            .create_link_token(&self.token_request(LinkMode::Relink { access_token }))
            .await?;

        let server = CallbackServer::start(port, Flow::Relink, &token).await?;
        tracing::warn!(%item, "Item needs to be relinked before it can be used again");
        self.present(&server.url());

        match server.wait(self.settings.timeout).await? {
            CallbackOutcome::Relinked => {
                tracing::info!(%item, "Item relinked");
                Ok(())
            }
            CallbackOutcome::PublicToken(_) => Err(LinkError::Protocol(
                "relink page returned a public token".to_string(),
            )),
        }
    }

    fn token_request(&self, mode: LinkMode) -> LinkTokenRequest {
        LinkTokenRequest {
            client_name: self.settings.client_name.clone(),
            user_ref: self.settings.user_ref.clone(),
            country_codes: self.settings.country_codes.clone(),
            language: self.settings.language.clone(),
            days_requested: self.settings.days_requested,
            mode,
        }
    }

    fn present(&self, url: &str) {
        tracing::info!(%url, "Open this address in a browser to continue");
        if self.settings.open_browser {
            if let Err(e) = open::that(url) {
                tracing::warn!(error = %e, %url, "Could not open a browser, open the address manually");
            }
        }
    }
}

#[async_trait]
impl Relinker for Broker {
    async fn relink(&self, item: &ItemId, port: u16) -> Result<(), LinkError> {
        Broker::relink(self, item, port).await
    }
}
