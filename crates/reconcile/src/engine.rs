use std::collections::BTreeMap;

use chrono::NaiveDate;
use ledgerlink_core::{parse_record_date, AccountId, RecordKey, RemoteId, TransactionRecord};
use thiserror::Error;

use crate::plan::{ReconciliationPlan, SkippedRecord};

/// One account's records keyed by the aggregator's transaction id.
pub type AccountRecords = BTreeMap<RemoteId, TransactionRecord>;

/// Records grouped per account, then per transaction id.
pub type ByAccount = BTreeMap<AccountId, AccountRecords>;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Record {key} has an unreadable date `{value}`")]
    InvalidDate { key: RecordKey, value: String },
}

/// What to do with a mirror record whose date cannot be parsed while deciding
/// whether it may be deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DatePolicy {
    /// Leave the record alone and report it in the plan.
    #[default]
    Skip,
    /// Abort the whole reconciliation.
    Strict,
}

impl DatePolicy {
    pub fn from_strict(strict: bool) -> Self {
        if strict {
            DatePolicy::Strict
        } else {
            DatePolicy::Skip
        }
    }
}

/// Groups records by account and transaction id. When a key repeats, the
/// first record wins.
pub fn partition<I>(records: I) -> ByAccount
where
    I: IntoIterator<Item = TransactionRecord>,
{
    let mut grouped = ByAccount::new();
    for record in records {
        grouped
            .entry(record.account_id.clone())
            .or_default()
            .entry(record.remote_id.clone())
            .or_insert(record);
    }
    grouped
}

/// Plans the writes for every account present in `source`. Accounts that only
/// exist in the mirror are never visited, so an item whose fetch failed keeps
/// all of its rows.
pub fn reconcile(
    source: &ByAccount,
    mirror: &ByAccount,
    cutoff: NaiveDate,
    dates: DatePolicy,
) -> Result<ReconciliationPlan, ReconcileError> {
    let empty = AccountRecords::new();
    let mut plan = ReconciliationPlan::default();
    for (account_id, source_records) in source {
        let mirror_records = mirror.get(account_id).unwrap_or(&empty);
        let account_plan = reconcile_account(source_records, mirror_records, cutoff, dates)?;
        if !account_plan.is_empty() {
            tracing::debug!(account = %account_id, plan = %account_plan, "Reconciled account");
        }
        plan.merge(account_plan);
    }
    Ok(plan)
}

fn reconcile_account(
    source: &AccountRecords,
    mirror: &AccountRecords,
    cutoff: NaiveDate,
    dates: DatePolicy,
) -> Result<ReconciliationPlan, ReconcileError> {
    let mut plan = ReconciliationPlan::default();

    for (remote_id, record) in source {
        match mirror.get(remote_id) {
            None => plan.to_create.push(record.clone()),
            Some(stored) if record.mutable_fields_differ(stored) => {
                plan.to_update
                    .push(record.clone().with_storage_id(stored.storage_id.clone()));
            }
            Some(_) => {}
        }
    }

    // Absence from the feed only proves a deletion for recent records; older
    // ones may simply lie outside the fetched window.
    for (remote_id, stored) in mirror {
        if source.contains_key(remote_id) {
            continue;
        }
        match parse_record_date(&stored.date) {
            Ok(date) if date > cutoff => plan.to_delete.push(stored.clone()),
            Ok(_) => {}
            Err(_) => match dates {
                DatePolicy::Strict => {
                    return Err(ReconcileError::InvalidDate {
                        key: stored.key(),
                        value: stored.date.clone(),
                    })
                }
                DatePolicy::Skip => {
                    tracing::warn!(
                        key = %stored.key(),
                        date = %stored.date,
                        "Skipping mirror record with an unreadable date"
                    );
                    plan.skipped.push(SkippedRecord {
                        key: stored.key(),
                        date: stored.date.clone(),
                    });
                }
            },
        }
    }

    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Days;
    use ledgerlink_core::{deletion_cutoff, Money, StorageId, RECORD_DATE_FORMAT};
    use std::collections::HashSet;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }

    fn days_ago(n: u64) -> String {
        today()
            .checked_sub_days(Days::new(n))
            .unwrap()
            .format(RECORD_DATE_FORMAT)
            .to_string()
    }

    fn tx(account: &str, remote: &str, date: &str, pending: bool) -> TransactionRecord {
        TransactionRecord {
            storage_id: None,
            remote_id: RemoteId::new(remote),
            account_id: AccountId::new(account),
            amount: Money::from_cents(999),
            name: format!("Purchase {remote}"),
            merchant_name: None,
            pending,
            date: date.to_string(),
            category: vec!["Shops".to_string()],
            address: None,
        }
    }

    fn stored(account: &str, remote: &str, date: &str, pending: bool) -> TransactionRecord {
        tx(account, remote, date, pending).with_storage_id(Some(StorageId::new(format!("rec{remote}"))))
    }

    fn run(source: Vec<TransactionRecord>, mirror: Vec<TransactionRecord>) -> ReconciliationPlan {
        reconcile(
            &partition(source),
            &partition(mirror),
            deletion_cutoff(today()),
            DatePolicy::Skip,
        )
        .unwrap()
    }

    fn remote_ids(records: &[TransactionRecord]) -> Vec<&str> {
        records.iter().map(|r| r.remote_id.as_str()).collect()
    }

    #[test]
    fn pending_change_becomes_update_with_mirror_identity() {
        let plan = run(
            vec![tx("acc", "A1", &days_ago(2), true)],
            vec![stored("acc", "A1", &days_ago(2), false)],
        );
        assert!(plan.to_create.is_empty());
        assert!(plan.to_delete.is_empty());
        assert_eq!(plan.to_update.len(), 1);
        assert!(plan.to_update[0].pending);
        assert_eq!(plan.to_update[0].storage_id, Some(StorageId::new("recA1")));
    }

    #[test]
    fn address_change_becomes_update() {
        let mut source = tx("acc", "A1", &days_ago(2), false);
        source.address = Some("1 Main St, Springfield".to_string());
        let plan = run(vec![source], vec![stored("acc", "A1", &days_ago(2), false)]);
        assert_eq!(remote_ids(&plan.to_update), vec!["A1"]);
    }

    #[test]
    fn unchanged_record_produces_no_write() {
        let plan = run(
            vec![tx("acc", "A1", &days_ago(2), false)],
            vec![stored("acc", "A1", &days_ago(2), false)],
        );
        assert!(plan.is_empty());
    }

    #[test]
    fn immutable_field_changes_are_ignored() {
        let mut source = tx("acc", "A1", &days_ago(2), false);
        source.amount = Money::from_cents(1);
        source.name = "Renamed".to_string();
        let plan = run(vec![source], vec![stored("acc", "A1", &days_ago(2), false)]);
        assert!(plan.is_empty());
    }

    #[test]
    fn new_source_record_is_created() {
        let plan = run(vec![tx("acc", "A1", &days_ago(2), false)], vec![]);
        assert_eq!(remote_ids(&plan.to_create), vec!["A1"]);
    }

    #[test]
    fn only_recent_absences_are_deleted() {
        let plan = run(
            vec![tx("acc", "A0", &days_ago(1), false)],
            vec![
                stored("acc", "A0", &days_ago(1), false),
                stored("acc", "A2", &days_ago(40), false),
                stored("acc", "A3", &days_ago(5), false),
            ],
        );
        assert_eq!(remote_ids(&plan.to_delete), vec!["A3"]);
        assert_eq!(plan.to_delete[0].storage_id, Some(StorageId::new("recA3")));
    }

    #[test]
    fn record_dated_on_the_cutoff_is_kept() {
        let cutoff = deletion_cutoff(today()).format(RECORD_DATE_FORMAT).to_string();
        let plan = run(
            vec![tx("acc", "A0", &days_ago(1), false)],
            vec![stored("acc", "OLD", &cutoff, false)],
        );
        assert!(plan.to_delete.is_empty());
    }

    #[test]
    fn accounts_missing_from_source_are_left_alone() {
        let plan = run(
            vec![tx("acc-ok", "A1", &days_ago(1), false)],
            vec![
                stored("acc-ok", "A1", &days_ago(1), false),
                stored("acc-failed", "B1", &days_ago(1), false),
            ],
        );
        assert!(plan.is_empty());
    }

    #[test]
    fn unreadable_date_is_skipped_by_default() {
        let plan = run(
            vec![tx("acc", "A0", &days_ago(1), false)],
            vec![stored("acc", "BAD", "15/06/2024", false)],
        );
        assert!(plan.to_delete.is_empty());
        assert_eq!(plan.skipped.len(), 1);
        assert_eq!(plan.skipped[0].date, "15/06/2024");
    }

    #[test]
    fn unreadable_date_aborts_in_strict_mode() {
        let err = reconcile(
            &partition(vec![tx("acc", "A0", &days_ago(1), false)]),
            &partition(vec![stored("acc", "BAD", "not a date", false)]),
            deletion_cutoff(today()),
            DatePolicy::Strict,
        )
        .unwrap_err();
        match err {
            ReconcileError::InvalidDate { key, value } => {
                assert_eq!(key.remote_id, RemoteId::new("BAD"));
                assert_eq!(value, "not a date");
            }
        }
    }

    #[test]
    fn partition_keeps_first_of_repeated_keys() {
        let grouped = partition(vec![
            stored("acc", "A1", &days_ago(1), false),
            tx("acc", "A1", &days_ago(1), true),
            tx("other", "A1", &days_ago(1), true),
        ]);
        assert_eq!(grouped.len(), 2);
        let first = &grouped[&AccountId::new("acc")][&RemoteId::new("A1")];
        assert!(!first.pending);
    }

    /// Exhaustively walks every combination of presence and state for a small
    /// key space and checks that the plan sets are disjoint and complete.
    #[test]
    fn plans_are_disjoint_and_complete() {
        let keys = ["K1", "K2", "K3"];
        // 0 absent, 1 present settled, 2 present pending
        let states = [0u8, 1, 2];
        let mirror_dates = [days_ago(3), days_ago(60)];
        let cutoff = deletion_cutoff(today());

        let combos = states.len().pow(keys.len() as u32);
        for s in 0..combos {
            for m in 0..combos {
                for date in &mirror_dates {
                    let pick = |mut n: usize| {
                        keys.iter()
                            .map(|_| {
                                let state = states[n % states.len()];
                                n /= states.len();
                                state
                            })
                            .collect::<Vec<_>>()
                    };
                    let (s_states, m_states) = (pick(s), pick(m));
                    // keep one anchor record so the account is always visited
                    let mut source = vec![tx("acc", "ANCHOR", &days_ago(1), false)];
                    let mut mirror = vec![stored("acc", "ANCHOR", &days_ago(1), false)];
                    for (i, key) in keys.iter().enumerate() {
                        if s_states[i] > 0 {
                            source.push(tx("acc", key, date, s_states[i] == 2));
                        }
                        if m_states[i] > 0 {
                            mirror.push(stored("acc", key, date, m_states[i] == 2));
                        }
                    }
                    let plan = run(source.clone(), mirror.clone());

                    let created: HashSet<_> = plan.to_create.iter().map(|r| r.key()).collect();
                    let updated: HashSet<_> = plan.to_update.iter().map(|r| r.key()).collect();
                    let deleted: HashSet<_> = plan.to_delete.iter().map(|r| r.key()).collect();
                    assert!(created.is_disjoint(&updated));
                    assert!(created.is_disjoint(&deleted));
                    assert!(updated.is_disjoint(&deleted));

                    let mirror_keys: HashSet<_> = mirror.iter().map(|r| r.key()).collect();
                    let source_keys: HashSet<_> = source.iter().map(|r| r.key()).collect();
                    for r in &source {
                        let k = r.key();
                        if !mirror_keys.contains(&k) {
                            assert!(created.contains(&k));
                        }
                    }
                    for r in &mirror {
                        let k = r.key();
                        if !source_keys.contains(&k) && !deleted.contains(&k) {
                            assert!(parse_record_date(&r.date).unwrap() <= cutoff);
                        }
                    }
                    for r in &plan.to_update {
                        let original = mirror.iter().find(|m| m.key() == r.key()).unwrap();
                        assert_eq!(r.storage_id, original.storage_id);
                    }
                }
            }
        }
    }
}
