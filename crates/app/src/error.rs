use ledgerlink_aggregator::{AggregatorError, ReauthSignal};
use ledgerlink_link::LinkError;
use ledgerlink_mirror::MirrorError;
use ledgerlink_reconcile::ReconcileError;
use ledgerlink_storage::StorageError;
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Aggregator(#[from] AggregatorError),
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("Mirror error: {0}")]
    Mirror(#[from] MirrorError),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Unknown item or alias `{0}`; see `ledgerlink tokens`")]
    UnknownItem(String),
    #[error("Cannot write output: {0}")]
    Output(String),
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ReauthSignal for AppError {
    fn requires_reauth(&self) -> bool {
        match self {
            AppError::Aggregator(e) => e.requires_reauth(),
            AppError::Link(e) => e.requires_reauth(),
            _ => false,
        }
    }
}
