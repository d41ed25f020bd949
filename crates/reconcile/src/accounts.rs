use std::collections::HashSet;

use ledgerlink_core::AccountRecord;

/// Accounts present at the aggregator but missing from the mirror's accounts
/// table. Existing rows are never updated or deleted.
pub fn plan_new_accounts(source: &[AccountRecord], mirror: &[AccountRecord]) -> Vec<AccountRecord> {
    let mut known: HashSet<_> = mirror.iter().map(|a| &a.account_id).collect();
    source
        .iter()
        .filter(|a| known.insert(&a.account_id))
        .cloned()
        .collect()
}
