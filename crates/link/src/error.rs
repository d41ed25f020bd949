use ledgerlink_aggregator::{AggregatorError, ReauthSignal};
use ledgerlink_core::ItemId;
use ledgerlink_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("Aggregator error: {0}")]
    Api(#[from] AggregatorError),
    #[error("Local store error: {0}")]
    Storage(#[from] StorageError),
    #[error("No access token stored for item `{0}`; run `ledgerlink link` first")]
    UnknownItem(ItemId),
    #[error("Cannot serve link page on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },
    #[error("Link flow reported an error: {0}")]
    Callback(String),
    #[error("Unexpected callback request: {0}")]
    Protocol(String),
    #[error("Link flow was not completed within {0} seconds")]
    TimedOut(u64),
    #[error("Link server stopped before the flow completed")]
    Closed,
}

impl ReauthSignal for LinkError {
    fn requires_reauth(&self) -> bool {
        matches!(self, LinkError::Api(e) if e.requires_reauth())
    }
}
