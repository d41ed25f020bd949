pub mod client;
pub mod error;
pub mod pagination;
pub mod types;

pub use client::{AggregatorClient, Credentials, Environment};
pub use error::{AggregatorError, ReauthSignal, REAUTH_ERROR_CODE};
pub use pagination::all_transactions;
pub use types::{
    Account, Aggregator, ItemDetails, LinkMode, LinkTokenRequest, TransactionsPage,
    TransactionsRequest, DEFAULT_PAGE_SIZE,
};
