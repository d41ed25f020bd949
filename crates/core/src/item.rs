use serde::{Deserialize, Serialize};
use std::fmt;

/// One linked institution connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        ItemId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Short-lived credential for a single link or relink UI flow. Never persisted.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct LinkToken(String);

impl LinkToken {
    pub fn new(token: impl Into<String>) -> Self {
        LinkToken(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for LinkToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LinkToken(..)")
    }
}

/// Result of a successful fresh link. The caller owns persisting it.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct TokenPair {
    pub item_id: ItemId,
    pub access_token: String,
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("item_id", &self.item_id)
            .field("access_token", &"..")
            .finish()
    }
}

/// A user-supplied "item id or alias" after resolution against the local store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRef {
    pub id: ItemId,
    pub alias: Option<String>,
}

impl ItemRef {
    pub fn new(id: ItemId, alias: Option<String>) -> Self {
        ItemRef { id, alias }
    }

    /// Name used for per-alias configuration lookups and log lines.
    pub fn label(&self) -> &str {
        self.alias.as_deref().unwrap_or(self.id.as_str())
    }
}

impl fmt::Display for ItemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.alias {
            Some(alias) => write!(f, "{alias} ({})", self.id),
            None => write!(f, "{}", self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_ref_display_with_alias() {
        let item = ItemRef::new(ItemId::new("item-1"), Some("chase".to_string()));
        assert_eq!(item.to_string(), "chase (item-1)");
        assert_eq!(item.label(), "chase");
    }

    #[test]
    fn item_ref_display_without_alias() {
        let item = ItemRef::new(ItemId::new("item-1"), None);
        assert_eq!(item.to_string(), "item-1");
        assert_eq!(item.label(), "item-1");
    }

    #[test]
    fn secrets_are_redacted_in_debug() {
        let pair = TokenPair {
            item_id: ItemId::new("item-1"),
            access_token: "access-sandbox-secret".to_string(),
        };
        let shown = format!("{pair:?}");
        assert!(shown.contains("item-1"));
        assert!(!shown.contains("secret"));
        assert!(!format!("{:?}", LinkToken::new("link-secret")).contains("secret"));
    }
}
