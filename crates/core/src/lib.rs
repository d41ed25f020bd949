pub mod account;
pub mod item;
pub mod money;
pub mod period;
pub mod transaction;

pub use account::{AccountId, AccountRecord};
pub use item::{ItemId, ItemRef, LinkToken, TokenPair};
pub use money::Money;
pub use period::{deletion_cutoff, parse_record_date, DateRange, RECORD_DATE_FORMAT};
pub use transaction::{RecordKey, RemoteId, StorageId, TransactionRecord};
