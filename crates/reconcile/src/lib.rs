pub mod accounts;
pub mod duplicates;
pub mod engine;
pub mod plan;

pub use accounts::plan_new_accounts;
pub use duplicates::find_duplicates;
pub use engine::{partition, reconcile, AccountRecords, ByAccount, DatePolicy, ReconcileError};
pub use plan::{ReconciliationPlan, SkippedRecord};
