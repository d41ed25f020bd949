use std::sync::Arc;

use ledgerlink_core::{AccountRecord, StorageId, TransactionRecord};

use crate::error::MirrorError;
use crate::fields::{account_fields, account_from_row, transaction_fields, transaction_from_row};
use crate::store::RecordStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorTables {
    pub transactions: String,
    pub accounts: String,
}

impl Default for MirrorTables {
    fn default() -> Self {
        MirrorTables {
            transactions: "Transactions".to_string(),
            accounts: "Accounts".to_string(),
        }
    }
}

/// Typed view of the transactions and accounts tables of a [`RecordStore`].
pub struct Mirror {
    store: Arc<dyn RecordStore>,
    tables: MirrorTables,
}

impl Mirror {
    pub fn new(store: Arc<dyn RecordStore>, tables: MirrorTables) -> Self {
        Mirror { store, tables }
    }

    /// All transaction rows. Rows missing their key columns (hand-entered
    /// rows, for instance) are left out with a warning.
    pub async fn transactions(&self) -> Result<Vec<TransactionRecord>, MirrorError> {
        let rows = self.store.list(&self.tables.transactions).await?;
        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            match transaction_from_row(row) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(row = %row.id, error = %e, "Ignoring unreadable mirror row"),
            }
        }
        tracing::info!(count = records.len(), table = %self.tables.transactions, "Loaded mirror transactions");
        Ok(records)
    }

    pub async fn accounts(&self) -> Result<Vec<AccountRecord>, MirrorError> {
        let rows = self.store.list(&self.tables.accounts).await?;
        let mut accounts = Vec::with_capacity(rows.len());
        for row in &rows {
            match account_from_row(row) {
                Ok(account) => accounts.push(account),
                Err(e) => tracing::warn!(row = %row.id, error = %e, "Ignoring unreadable account row"),
            }
        }
        Ok(accounts)
    }

    pub async fn create_transaction(&self, record: &TransactionRecord) -> Result<StorageId, MirrorError> {
        self.store
            .create(&self.tables.transactions, transaction_fields(record))
            .await
    }

    /// Overwrites the row named by the record's `storage_id`.
    pub async fn update_transaction(&self, record: &TransactionRecord) -> Result<(), MirrorError> {
        let id = stored_id(record)?;
        self.store
            .update(&self.tables.transactions, id, transaction_fields(record))
            .await
    }

    pub async fn delete_transaction(&self, record: &TransactionRecord) -> Result<(), MirrorError> {
        let id = stored_id(record)?;
        self.store.delete(&self.tables.transactions, id).await
    }

    pub async fn create_account(&self, account: &AccountRecord) -> Result<StorageId, MirrorError> {
        self.store
            .create(&self.tables.accounts, account_fields(account))
            .await
    }
}

fn stored_id(record: &TransactionRecord) -> Result<&StorageId, MirrorError> {
    record
        .storage_id
        .as_ref()
        .ok_or_else(|| MirrorError::NotStored(record.key().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use ledgerlink_core::{AccountId, Money, RemoteId};
    use serde_json::json;

    fn record(remote: &str) -> TransactionRecord {
        TransactionRecord {
            storage_id: None,
            remote_id: RemoteId::new(remote),
            account_id: AccountId::new("acc-1"),
            amount: Money::from_cents(1000),
            name: "Groceries".to_string(),
            merchant_name: Some("Market".to_string()),
            pending: true,
            date: "2024-05-01".to_string(),
            category: vec!["Shops".to_string()],
            address: None,
        }
    }

    fn mirror(store: Arc<MemoryStore>) -> Mirror {
        Mirror::new(store, MirrorTables::default())
    }

    #[tokio::test]
    async fn written_transactions_read_back() {
        let store = Arc::new(MemoryStore::new());
        let mirror = mirror(store.clone());

        let id = mirror.create_transaction(&record("tx-1")).await.unwrap();
        let mut settled = record("tx-1").with_storage_id(Some(id.clone()));
        settled.pending = false;
        mirror.update_transaction(&settled).await.unwrap();

        let rows = mirror.transactions().await.unwrap();
        assert_eq!(rows, vec![settled]);
        assert_eq!(store.writes(), vec![
            format!("create Transactions {id}"),
            format!("update Transactions {id}"),
        ]);
    }

    #[tokio::test]
    async fn unreadable_rows_are_left_out() {
        let store = Arc::new(MemoryStore::new());
        store.seed("Transactions", json!({"Name": "typed by hand"}).as_object().cloned().unwrap());
        let mirror = mirror(store.clone());
        mirror.create_transaction(&record("tx-1")).await.unwrap();

        let rows = mirror.transactions().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].remote_id, RemoteId::new("tx-1"));
    }

    #[tokio::test]
    async fn reads_rows_written_by_earlier_syncs() {
        let store = Arc::new(MemoryStore::new());
        // Airtable leaves false checkboxes and the Address column out entirely.
        let id = store.seed(
            "Transactions",
            json!({
                "PlaidID": "A1",
                "AccountIDDedupe": "acc-a",
                "AccountID": ["recAcc1"],
                "Amount": 12.5,
                "Name": "Uber",
                "MerchantName": "Uber",
                "DateTime": "2024-06-10",
                "PlaidCategory1": "Travel",
                "PlaidCategory2": "Taxi",
                "PlaidCategory3": ""
            })
            .as_object()
            .cloned()
            .unwrap(),
        );

        let rows = mirror(store).transactions().await.unwrap();

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.storage_id, Some(id));
        assert_eq!(row.key().to_string(), "acc-a/A1");
        assert_eq!(row.amount, Money::from_cents(1250));
        assert_eq!(row.date, "2024-06-10");
        assert_eq!(row.category, vec!["Travel".to_string(), "Taxi".to_string()]);
        assert!(!row.pending);
        assert_eq!(row.address, None);
    }

    #[tokio::test]
    async fn update_requires_storage_id() {
        let mirror = mirror(Arc::new(MemoryStore::new()));
        let err = mirror.update_transaction(&record("tx-1")).await.unwrap_err();
        assert!(matches!(err, MirrorError::NotStored(key) if key == "acc-1/tx-1"));
    }

    #[tokio::test]
    async fn accounts_table_round_trip() {
        let store = Arc::new(MemoryStore::new());
        let mirror = mirror(store.clone());
        mirror
            .create_account(&AccountRecord::new(AccountId::new("acc-1"), Some("Gold Checking"), "Checking"))
            .await
            .unwrap();
        let accounts = mirror.accounts().await.unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].name, "Gold Checking");
        assert_eq!(store.rows("Accounts").len(), 1);
    }
}
