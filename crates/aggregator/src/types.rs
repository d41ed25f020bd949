use async_trait::async_trait;
use ledgerlink_core::{AccountId, AccountRecord, DateRange, ItemId, LinkToken, Money, TokenPair, TransactionRecord};
use serde::{Deserialize, Serialize};

use crate::error::AggregatorError;

/// Page size used when the caller does not ask for another one. The
/// aggregator caps pages at 500.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// The slice of the aggregation API this tool consumes.
#[async_trait]
pub trait Aggregator: Send + Sync {
    async fn create_link_token(&self, request: &LinkTokenRequest) -> Result<LinkToken, AggregatorError>;

    async fn exchange_public_token(&self, public_token: &str) -> Result<TokenPair, AggregatorError>;

    /// One page of the transaction listing plus the server's total count.
    async fn transactions_page(&self, request: &TransactionsRequest) -> Result<TransactionsPage, AggregatorError>;

    async fn accounts(&self, access_token: &str) -> Result<Vec<Account>, AggregatorError>;

    async fn item(&self, access_token: &str) -> Result<ItemDetails, AggregatorError>;

    async fn remove_item(&self, access_token: &str) -> Result<(), AggregatorError>;
}

#[derive(Clone, PartialEq, Eq)]
pub enum LinkMode {
    /// First-time link: the user consents to the listed products.
    Fresh { products: Vec<String> },
    /// Update mode for an existing item; no new consent is requested.
    Relink { access_token: String },
}

impl std::fmt::Debug for LinkMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkMode::Fresh { products } => f.debug_struct("Fresh").field("products", products).finish(),
            LinkMode::Relink { .. } => f.write_str("Relink"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkTokenRequest {
    pub client_name: String,
    pub user_ref: String,
    pub country_codes: Vec<String>,
    pub language: String,
    pub days_requested: u32,
    pub mode: LinkMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionsRequest {
    pub access_token: String,
    pub range: DateRange,
    pub account_ids: Vec<AccountId>,
    pub count: u32,
    pub offset: u32,
}

impl TransactionsRequest {
    pub fn new(access_token: impl Into<String>, range: DateRange) -> Self {
        TransactionsRequest {
            access_token: access_token.into(),
            range,
            account_ids: Vec::new(),
            count: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }

    pub fn with_account(mut self, account_id: Option<AccountId>) -> Self {
        self.account_ids = account_id.into_iter().collect();
        self
    }

    pub fn with_page_size(mut self, count: u32) -> Self {
        self.count = count.max(1);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransactionsPage {
    pub transactions: Vec<TransactionRecord>,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balances {
    #[serde(default)]
    pub available: Option<Money>,
    #[serde(default)]
    pub current: Option<Money>,
    #[serde(default)]
    pub iso_currency_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: AccountId,
    pub name: String,
    #[serde(default)]
    pub official_name: Option<String>,
    #[serde(default)]
    pub mask: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub balances: Option<Balances>,
}

impl Account {
    pub fn to_record(&self) -> AccountRecord {
        AccountRecord::new(self.account_id.clone(), self.official_name.as_deref(), &self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemDetails {
    pub item_id: ItemId,
    #[serde(default)]
    pub institution_id: Option<String>,
    #[serde(default)]
    pub available_products: Vec<String>,
    #[serde(default)]
    pub billed_products: Vec<String>,
    #[serde(default)]
    pub consent_expiration_time: Option<String>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
    #[serde(default, skip_deserializing)]
    pub status: Option<serde_json::Value>,
}
