//! Column layout of the mirror's transactions and accounts tables.

use ledgerlink_core::{AccountId, AccountRecord, Money, RemoteId, TransactionRecord};
use serde_json::Value;

use crate::error::MirrorError;
use crate::store::{Fields, StoredRow};

pub const REMOTE_ID: &str = "PlaidID";
/// Plain-text copy of the account id; the linked `AccountID` column cannot be
/// read back as the aggregator's id.
pub const ACCOUNT_ID_DEDUPE: &str = "AccountIDDedupe";
pub const ACCOUNT_LINK: &str = "AccountID";
pub const AMOUNT: &str = "Amount";
pub const NAME: &str = "Name";
pub const MERCHANT_NAME: &str = "MerchantName";
pub const PENDING: &str = "Pending";
pub const DATE: &str = "DateTime";
pub const CATEGORY: [&str; TransactionRecord::CATEGORY_DEPTH] = ["PlaidCategory1", "PlaidCategory2", "PlaidCategory3"];
pub const ADDRESS: &str = "Address";

pub const ACCOUNT_ID: &str = "AccountID";
pub const ACCOUNT_NAME: &str = "Name";

// ── Transactions ─────────────────────────────────────────────────────────────

pub fn transaction_fields(record: &TransactionRecord) -> Fields {
    let mut fields = Fields::new();
    fields.insert(REMOTE_ID.into(), Value::from(record.remote_id.as_str()));
    fields.insert(ACCOUNT_ID_DEDUPE.into(), Value::from(record.account_id.as_str()));
    // Typecast resolves the id against the accounts table's primary column.
    fields.insert(ACCOUNT_LINK.into(), Value::from(vec![record.account_id.as_str()]));
    fields.insert(AMOUNT.into(), amount_value(record.amount));
    fields.insert(NAME.into(), Value::from(record.name.as_str()));
    fields.insert(
        MERCHANT_NAME.into(),
        Value::from(record.merchant_name.as_deref().unwrap_or_default()),
    );
    fields.insert(PENDING.into(), Value::from(record.pending));
    fields.insert(DATE.into(), Value::from(record.date.as_str()));
    for (level, column) in CATEGORY.iter().enumerate() {
        fields.insert((*column).into(), Value::from(record.category_level(level)));
    }
    fields.insert(
        ADDRESS.into(),
        Value::from(record.address.as_deref().unwrap_or_default()),
    );
    fields
}

/// Reads a mirror row back. The store omits empty cells, so only the two key
/// columns are required.
pub fn transaction_from_row(row: &StoredRow) -> Result<TransactionRecord, MirrorError> {
    let f = &row.fields;
    let remote_id = required_text(row, REMOTE_ID)?;
    let account_id = required_text(row, ACCOUNT_ID_DEDUPE)?;
    let amount = match f.get(AMOUNT) {
        None | Some(Value::Null) => Money::zero(),
        Some(v) => serde_json::from_value(v.clone())
            .map_err(|e| MirrorError::Decode(format!("row {}: {AMOUNT}: {e}", row.id)))?,
    };
    let category = CATEGORY
        .iter()
        .map(|column| text(f, column))
        .take_while(|level| !level.is_empty())
        .collect();

    Ok(TransactionRecord {
        storage_id: Some(row.id.clone()),
        remote_id: RemoteId::new(remote_id),
        account_id: AccountId::new(account_id),
        amount,
        name: text(f, NAME),
        merchant_name: optional_text(f, MERCHANT_NAME),
        pending: f.get(PENDING).and_then(Value::as_bool).unwrap_or(false),
        date: text(f, DATE),
        category,
        address: optional_text(f, ADDRESS),
    })
}

// ── Accounts ─────────────────────────────────────────────────────────────────

pub fn account_fields(account: &AccountRecord) -> Fields {
    let mut fields = Fields::new();
    fields.insert(ACCOUNT_ID.into(), Value::from(account.account_id.as_str()));
    fields.insert(ACCOUNT_NAME.into(), Value::from(account.name.as_str()));
    fields
}

pub fn account_from_row(row: &StoredRow) -> Result<AccountRecord, MirrorError> {
    Ok(AccountRecord {
        storage_id: Some(row.id.clone()),
        account_id: AccountId::new(required_text(row, ACCOUNT_ID)?),
        name: text(&row.fields, ACCOUNT_NAME),
    })
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn amount_value(amount: Money) -> Value {
    serde_json::to_value(amount).unwrap_or(Value::Null)
}

fn text(fields: &Fields, column: &str) -> String {
    match fields.get(column) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn optional_text(fields: &Fields, column: &str) -> Option<String> {
    Some(text(fields, column)).filter(|s| !s.is_empty())
}

fn required_text(row: &StoredRow, column: &str) -> Result<String, MirrorError> {
    optional_text(&row.fields, column)
        .ok_or_else(|| MirrorError::Decode(format!("row {} has no {column}", row.id)))
}
