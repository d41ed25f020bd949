pub mod client;
pub mod error;
pub mod fields;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod mirror;
pub mod store;

pub use client::{TableClient, DEFAULT_API_URL};
pub use error::MirrorError;
pub use mirror::{Mirror, MirrorTables};
pub use store::{Fields, RecordStore, StoredRow};

#[cfg(any(test, feature = "test-util"))]
pub use memory::MemoryStore;
