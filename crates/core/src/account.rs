use serde::{Deserialize, Serialize};
use std::fmt;

use super::transaction::StorageId;

/// Identifier of one account at a linked institution, as issued by the aggregator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        AccountId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountRecord {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub storage_id: Option<StorageId>,
    pub account_id: AccountId,
    pub name: String,
}

impl AccountRecord {
    /// Prefers the institution's official account name and falls back to the
    /// short display name when the official one is missing or blank.
    pub fn new(account_id: AccountId, official_name: Option<&str>, name: &str) -> Self {
        let name = official_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(name);
        AccountRecord {
            storage_id: None,
            account_id,
            name: name.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_official_name() {
        let a = AccountRecord::new(AccountId::new("acc-1"), Some("Plat Checking 1234"), "Checking");
        assert_eq!(a.name, "Plat Checking 1234");
    }

    #[test]
    fn falls_back_to_short_name() {
        let a = AccountRecord::new(AccountId::new("acc-1"), None, "Checking");
        assert_eq!(a.name, "Checking");
        let b = AccountRecord::new(AccountId::new("acc-1"), Some("  "), "Savings");
        assert_eq!(b.name, "Savings");
    }

    #[test]
    fn account_id_is_transparent_in_json() {
        let json = serde_json::to_string(&AccountId::new("abc")).unwrap();
        assert_eq!(json, "\"abc\"");
    }
}
