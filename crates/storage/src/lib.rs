pub mod db;

pub use db::{
    alias_for, all_items, create_db, get_access_token, list_aliases, list_tokens, remove_item,
    resolve_item, save_token, set_alias, DbPool, StorageError, StoredToken,
};
