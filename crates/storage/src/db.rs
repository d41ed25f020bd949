use ledgerlink_core::{ItemId, ItemRef, TokenPair};
use regex::Regex;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;

/// Local store of access tokens and aliases. One pool per process run, passed
/// by reference into every command that needs it.
pub type DbPool = Pool<Sqlite>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("Invalid alias '{0}'. Valid characters: [0-9A-Za-z_]")]
    InvalidAlias(String),
    #[error("No access token found for item ID `{0}`. Try re-linking your account with `ledgerlink link`.")]
    UnknownItem(ItemId),
}

#[derive(Debug, Clone)]
pub struct StoredToken {
    pub item: ItemRef,
    pub access_token: String,
}

fn alias_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\w+$").expect("static alias pattern"))
}

pub async fn create_db(path: &Path) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS items (
            item_id TEXT PRIMARY KEY,
            access_token TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS aliases (
            alias TEXT PRIMARY KEY,
            item_id TEXT NOT NULL UNIQUE,
            FOREIGN KEY (item_id) REFERENCES items(item_id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Stores (or replaces) the access token of a freshly linked item.
pub async fn save_token(pool: &DbPool, pair: &TokenPair) -> Result<(), StorageError> {
    sqlx::query(
        "INSERT INTO items (item_id, access_token) VALUES (?, ?) \
         ON CONFLICT(item_id) DO UPDATE SET access_token = excluded.access_token",
    )
    .bind(pair.item_id.as_str())
    .bind(&pair.access_token)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_access_token(pool: &DbPool, item: &ItemId) -> Result<Option<String>, StorageError> {
    let row = sqlx::query_as::<_, (String,)>("SELECT access_token FROM items WHERE item_id = ?")
        .bind(item.as_str())
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|r| r.0))
}

/// Gives `item` the alias `alias`, replacing any alias the item had and
/// taking the alias away from any other item.
pub async fn set_alias(pool: &DbPool, item: &ItemId, alias: &str) -> Result<(), StorageError> {
    if !alias_pattern().is_match(alias) {
        return Err(StorageError::InvalidAlias(alias.to_string()));
    }
    if get_access_token(pool, item).await?.is_none() {
        return Err(StorageError::UnknownItem(item.clone()));
    }

    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM aliases WHERE item_id = ? OR alias = ?")
        .bind(item.as_str())
        .bind(alias)
        .execute(&mut *tx)
        .await?;
    sqlx::query("INSERT INTO aliases (alias, item_id) VALUES (?, ?)")
        .bind(alias)
        .bind(item.as_str())
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!("Aliased {item} to {alias}.");
    Ok(())
}

pub async fn alias_for(pool: &DbPool, item: &ItemId) -> Result<Option<String>, StorageError> {
    let row = sqlx::query_as::<_, (String,)>("SELECT alias FROM aliases WHERE item_id = ?")
        .bind(item.as_str())
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|r| r.0))
}

pub async fn list_aliases(pool: &DbPool) -> Result<BTreeMap<String, ItemId>, StorageError> {
    let rows = sqlx::query_as::<_, (String, String)>("SELECT alias, item_id FROM aliases ORDER BY alias")
        .fetch_all(pool)
        .await?;
    Ok(rows
        .into_iter()
        .map(|(alias, item)| (alias, ItemId(item)))
        .collect())
}

pub async fn list_tokens(pool: &DbPool) -> Result<Vec<StoredToken>, StorageError> {
    let rows = sqlx::query_as::<_, (String, String, Option<String>)>(
        "SELECT i.item_id, i.access_token, a.alias FROM items i \
         LEFT JOIN aliases a ON a.item_id = i.item_id ORDER BY i.item_id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(item_id, access_token, alias)| StoredToken {
            item: ItemRef::new(ItemId(item_id), alias),
            access_token,
        })
        .collect())
}

/// Every linked item, with its alias when it has one.
pub async fn all_items(pool: &DbPool) -> Result<Vec<ItemRef>, StorageError> {
    Ok(list_tokens(pool).await?.into_iter().map(|t| t.item).collect())
}

/// Resolves an alias or a raw item id to a linked item. Aliases win over item
/// ids; `None` when neither matches.
pub async fn resolve_item(pool: &DbPool, item_or_alias: &str) -> Result<Option<ItemRef>, StorageError> {
    let by_alias = sqlx::query_as::<_, (String,)>("SELECT item_id FROM aliases WHERE alias = ?")
        .bind(item_or_alias)
        .fetch_optional(pool)
        .await?;
    if let Some((item_id,)) = by_alias {
        return Ok(Some(ItemRef::new(ItemId(item_id), Some(item_or_alias.to_string()))));
    }

    let item = ItemId::new(item_or_alias);
    if get_access_token(pool, &item).await?.is_none() {
        return Ok(None);
    }
    let alias = alias_for(pool, &item).await?;
    Ok(Some(ItemRef::new(item, alias)))
}

/// Forgets the item's access token and alias.
pub async fn remove_item(pool: &DbPool, item: &ItemId) -> Result<(), StorageError> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM aliases WHERE item_id = ?")
        .bind(item.as_str())
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM items WHERE item_id = ?")
        .bind(item.as_str())
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> (tempfile::TempDir, DbPool) {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_db(&dir.path().join("ledgerlink.db")).await.unwrap();
        (dir, pool)
    }

    fn pair(item: &str, token: &str) -> TokenPair {
        TokenPair {
            item_id: ItemId::new(item),
            access_token: token.to_string(),
        }
    }

    #[tokio::test]
    async fn save_and_get_token() {
        let (_dir, db) = test_db().await;
        save_token(&db, &pair("item-1", "access-1")).await.unwrap();
        assert_eq!(
            get_access_token(&db, &ItemId::new("item-1")).await.unwrap().as_deref(),
            Some("access-1")
        );
        assert!(get_access_token(&db, &ItemId::new("nope")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_token_replaces_existing() {
        let (_dir, db) = test_db().await;
        save_token(&db, &pair("item-1", "old")).await.unwrap();
        save_token(&db, &pair("item-1", "new")).await.unwrap();
        assert_eq!(list_tokens(&db).await.unwrap().len(), 1);
        assert_eq!(
            get_access_token(&db, &ItemId::new("item-1")).await.unwrap().as_deref(),
            Some("new")
        );
    }

    #[tokio::test]
    async fn set_alias_requires_linked_item() {
        let (_dir, db) = test_db().await;
        let err = set_alias(&db, &ItemId::new("ghost"), "bank").await.unwrap_err();
        assert!(matches!(err, StorageError::UnknownItem(_)));
    }

    #[tokio::test]
    async fn set_alias_rejects_invalid_characters() {
        let (_dir, db) = test_db().await;
        save_token(&db, &pair("item-1", "access-1")).await.unwrap();
        for bad in ["my bank", "", "bank-1", "b@nk"] {
            let err = set_alias(&db, &ItemId::new("item-1"), bad).await.unwrap_err();
            assert!(matches!(err, StorageError::InvalidAlias(_)), "accepted {bad:?}");
        }
        set_alias(&db, &ItemId::new("item-1"), "my_bank_2").await.unwrap();
    }

    #[tokio::test]
    async fn alias_is_bidirectional_and_unique() {
        let (_dir, db) = test_db().await;
        save_token(&db, &pair("item-1", "a1")).await.unwrap();
        save_token(&db, &pair("item-2", "a2")).await.unwrap();

        set_alias(&db, &ItemId::new("item-1"), "chase").await.unwrap();
        set_alias(&db, &ItemId::new("item-1"), "chase2").await.unwrap();
        assert_eq!(alias_for(&db, &ItemId::new("item-1")).await.unwrap().as_deref(), Some("chase2"));

        // Moving an alias takes it away from its previous owner.
        set_alias(&db, &ItemId::new("item-2"), "chase2").await.unwrap();
        assert!(alias_for(&db, &ItemId::new("item-1")).await.unwrap().is_none());

        let aliases = list_aliases(&db).await.unwrap();
        assert_eq!(aliases.len(), 1);
        assert_eq!(aliases["chase2"], ItemId::new("item-2"));
    }

    #[tokio::test]
    async fn resolve_prefers_alias_then_item_id() {
        let (_dir, db) = test_db().await;
        save_token(&db, &pair("item-1", "a1")).await.unwrap();
        set_alias(&db, &ItemId::new("item-1"), "citi").await.unwrap();

        let by_alias = resolve_item(&db, "citi").await.unwrap().unwrap();
        assert_eq!(by_alias.id, ItemId::new("item-1"));
        assert_eq!(by_alias.alias.as_deref(), Some("citi"));

        let by_id = resolve_item(&db, "item-1").await.unwrap().unwrap();
        assert_eq!(by_id.alias.as_deref(), Some("citi"));

        assert!(resolve_item(&db, "unknown").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn all_items_includes_unaliased() {
        let (_dir, db) = test_db().await;
        save_token(&db, &pair("item-1", "a1")).await.unwrap();
        save_token(&db, &pair("item-2", "a2")).await.unwrap();
        set_alias(&db, &ItemId::new("item-2"), "amex").await.unwrap();

        let items = all_items(&db).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].alias, None);
        assert_eq!(items[1].alias.as_deref(), Some("amex"));
    }

    #[tokio::test]
    async fn remove_item_forgets_token_and_alias() {
        let (_dir, db) = test_db().await;
        save_token(&db, &pair("item-1", "a1")).await.unwrap();
        set_alias(&db, &ItemId::new("item-1"), "chase").await.unwrap();

        remove_item(&db, &ItemId::new("item-1")).await.unwrap();

        assert!(get_access_token(&db, &ItemId::new("item-1")).await.unwrap().is_none());
        assert!(list_aliases(&db).await.unwrap().is_empty());
        assert!(resolve_item(&db, "chase").await.unwrap().is_none());
    }
}
