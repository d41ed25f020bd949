use serde::{Deserialize, Serialize};
use std::fmt;

use super::account::AccountId;
use super::money::Money;

/// The aggregator's identifier for a transaction, unique within an account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteId(pub String);

impl RemoteId {
    pub fn new(id: impl Into<String>) -> Self {
        RemoteId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Row identity assigned by the mirror store. Distinct from [`RemoteId`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageId(pub String);

impl StorageId {
    pub fn new(id: impl Into<String>) -> Self {
        StorageId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub account_id: AccountId,
    pub remote_id: RemoteId,
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.account_id, self.remote_id)
    }
}

/// A single transaction, either freshly fetched from the aggregator ("source")
/// or read back from the mirror. Both provenances share this shape; only
/// mirror records carry a `storage_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub storage_id: Option<StorageId>,
    pub remote_id: RemoteId,
    pub account_id: AccountId,
    pub amount: Money,
    pub name: String,
    #[serde(default)]
    pub merchant_name: Option<String>,
    pub pending: bool,
    pub date: String,
    #[serde(default)]
    pub category: Vec<String>,
    #[serde(default)]
    pub address: Option<String>,
}

impl TransactionRecord {
    /// Number of category levels the mirror keeps.
    pub const CATEGORY_DEPTH: usize = 3;

    pub fn key(&self) -> RecordKey {
        RecordKey {
            account_id: self.account_id.clone(),
            remote_id: self.remote_id.clone(),
        }
    }

    /// Category level `n`, or an empty string when the hierarchy is shallower.
    pub fn category_level(&self, n: usize) -> &str {
        self.category.get(n).map(String::as_str).unwrap_or_default()
    }

    /// Only the pending flag and the address may change after a record is
    /// first written; everything else is treated as fixed at creation.
    pub fn mutable_fields_differ(&self, other: &TransactionRecord) -> bool {
        self.pending != other.pending || normalized(&self.address) != normalized(&other.address)
    }

    /// The same record carrying another row's storage identity.
    pub fn with_storage_id(mut self, id: Option<StorageId>) -> Self {
        self.storage_id = id;
        self
    }
}

fn normalized(s: &Option<String>) -> Option<&str> {
    s.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(remote: &str, pending: bool, address: Option<&str>) -> TransactionRecord {
        TransactionRecord {
            storage_id: None,
            remote_id: RemoteId::new(remote),
            account_id: AccountId::new("acc-1"),
            amount: Money::from_cents(1250),
            name: "Coffee".to_string(),
            merchant_name: Some("Blue Bottle".to_string()),
            pending,
            date: "2024-01-15".to_string(),
            category: vec!["Food and Drink".to_string(), "Coffee Shop".to_string()],
            address: address.map(str::to_string),
        }
    }

    #[test]
    fn key_pairs_account_and_remote_id() {
        let k = record("tx-1", false, None).key();
        assert_eq!(k.account_id, AccountId::new("acc-1"));
        assert_eq!(k.remote_id, RemoteId::new("tx-1"));
        assert_eq!(k.to_string(), "acc-1/tx-1");
    }

    #[test]
    fn pending_flag_is_mutable() {
        assert!(record("tx-1", true, None).mutable_fields_differ(&record("tx-1", false, None)));
    }

    #[test]
    fn address_is_mutable() {
        let a = record("tx-1", false, Some("1 Main St"));
        let b = record("tx-1", false, Some("2 Main St"));
        assert!(a.mutable_fields_differ(&b));
    }

    #[test]
    fn blank_address_equals_missing_address() {
        let a = record("tx-1", false, Some(""));
        let b = record("tx-1", false, None);
        assert!(!a.mutable_fields_differ(&b));
    }

    #[test]
    fn immutable_fields_are_ignored() {
        let a = record("tx-1", false, None);
        let mut b = a.clone();
        b.amount = Money::from_cents(9999);
        b.name = "Renamed".to_string();
        b.date = "2024-02-01".to_string();
        b.category.clear();
        assert!(!a.mutable_fields_differ(&b));
    }

    #[test]
    fn category_levels_pad_with_empty() {
        let r = record("tx-1", false, None);
        assert_eq!(r.category_level(0), "Food and Drink");
        assert_eq!(r.category_level(1), "Coffee Shop");
        assert_eq!(r.category_level(2), "");
    }

    #[test]
    fn with_storage_id_replaces_identity() {
        let r = record("tx-1", false, None).with_storage_id(Some(StorageId::new("rec123")));
        assert_eq!(r.storage_id, Some(StorageId::new("rec123")));
    }
}
