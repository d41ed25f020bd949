use std::fmt;

use ledgerlink_core::{RecordKey, TransactionRecord};

/// A mirror record the engine could not evaluate and left untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRecord {
    pub key: RecordKey,
    pub date: String,
}

/// Writes needed to bring the mirror in line with the source feed. The three
/// write sets never share a key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconciliationPlan {
    pub to_create: Vec<TransactionRecord>,
    /// Source records carrying the `storage_id` of the mirror row they replace.
    pub to_update: Vec<TransactionRecord>,
    pub to_delete: Vec<TransactionRecord>,
    pub skipped: Vec<SkippedRecord>,
}

impl ReconciliationPlan {
    pub fn merge(&mut self, other: ReconciliationPlan) {
        self.to_create.extend(other.to_create);
        self.to_update.extend(other.to_update);
        self.to_delete.extend(other.to_delete);
        self.skipped.extend(other.skipped);
    }

    /// True when applying the plan would not write anything.
    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }
}

impl fmt::Display for ReconciliationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} to delete",
            self.to_create.len(),
            self.to_update.len(),
            self.to_delete.len()
        )?;
        if !self.skipped.is_empty() {
            write!(f, " ({} skipped)", self.skipped.len())?;
        }
        Ok(())
    }
}
