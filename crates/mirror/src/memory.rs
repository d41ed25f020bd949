use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use ledgerlink_core::StorageId;

use crate::error::MirrorError;
use crate::store::{Fields, RecordStore, StoredRow};

/// In-process store. Rows keep insertion order; every write is logged as
/// `"<op> <table> <id>"` so callers can check what was written and in which
/// order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    tables: BTreeMap<String, Vec<StoredRow>>,
    next_id: u64,
    writes: Vec<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a row without logging a write, for seeding.
    pub fn seed(&self, table: &str, fields: Fields) -> StorageId {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = StorageId::new(format!("rec{}", inner.next_id));
        inner.tables.entry(table.to_string()).or_default().push(StoredRow {
            id: id.clone(),
            fields,
        });
        id
    }

    pub fn rows(&self, table: &str) -> Vec<StoredRow> {
        self.lock().tables.get(table).cloned().unwrap_or_default()
    }

    pub fn writes(&self) -> Vec<String> {
        self.lock().writes.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn list(&self, table: &str) -> Result<Vec<StoredRow>, MirrorError> {
        Ok(self.rows(table))
    }

    async fn create(&self, table: &str, fields: Fields) -> Result<StorageId, MirrorError> {
        let id = self.seed(table, fields);
        self.lock().writes.push(format!("create {table} {id}"));
        Ok(id)
    }

    async fn update(&self, table: &str, id: &StorageId, fields: Fields) -> Result<(), MirrorError> {
        let mut inner = self.lock();
        let row = inner
            .tables
            .get_mut(table)
            .and_then(|rows| rows.iter_mut().find(|r| &r.id == id))
            .ok_or_else(|| MirrorError::Api {
                status: 404,
                message: format!("NOT_FOUND: {id}"),
            })?;
        row.fields.extend(fields);
        inner.writes.push(format!("update {table} {id}"));
        Ok(())
    }

    async fn delete(&self, table: &str, id: &StorageId) -> Result<(), MirrorError> {
        let mut inner = self.lock();
        let rows = inner.tables.entry(table.to_string()).or_default();
        let before = rows.len();
        rows.retain(|r| &r.id != id);
        if rows.len() == before {
            return Err(MirrorError::Api {
                status: 404,
                message: format!("NOT_FOUND: {id}"),
            });
        }
        inner.writes.push(format!("delete {table} {id}"));
        Ok(())
    }
}
