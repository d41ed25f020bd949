use std::collections::HashSet;

use ledgerlink_core::TransactionRecord;

use crate::plan::ReconciliationPlan;

/// Plans the removal of mirror rows that repeat an earlier row's
/// `(account, transaction)` key. The first row seen for a key is kept.
pub fn find_duplicates(mirror: &[TransactionRecord]) -> ReconciliationPlan {
    let mut seen = HashSet::new();
    let to_delete: Vec<_> = mirror
        .iter()
        .filter(|record| !seen.insert(record.key()))
        .cloned()
        .collect();

    if !to_delete.is_empty() {
        tracing::info!(count = to_delete.len(), "Found duplicate mirror rows");
    }
    ReconciliationPlan {
        to_delete,
        ..Default::default()
    }
}
