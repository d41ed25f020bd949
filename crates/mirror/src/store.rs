use async_trait::async_trait;
use ledgerlink_core::StorageId;

use crate::error::MirrorError;

/// Column name to value, as the tabular store exchanges rows.
pub type Fields = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq)]
pub struct StoredRow {
    pub id: StorageId,
    pub fields: Fields,
}

/// Row-level access to a tabular store. Tables are addressed by name.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Every row of `table`, following the store's paging to the end.
    async fn list(&self, table: &str) -> Result<Vec<StoredRow>, MirrorError>;

    async fn create(&self, table: &str, fields: Fields) -> Result<StorageId, MirrorError>;

    async fn update(&self, table: &str, id: &StorageId, fields: Fields) -> Result<(), MirrorError>;

    async fn delete(&self, table: &str, id: &StorageId) -> Result<(), MirrorError>;
}
