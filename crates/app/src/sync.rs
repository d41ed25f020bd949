use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use ledgerlink_aggregator::{all_transactions, Account, Aggregator, TransactionsRequest};
use ledgerlink_core::{deletion_cutoff, AccountRecord, DateRange, ItemRef, TransactionRecord};
use ledgerlink_link::{with_relink_on_auth_error, LinkError, Relinker};
use ledgerlink_mirror::Mirror;
use ledgerlink_reconcile::{find_duplicates, partition, plan_new_accounts, reconcile, ReconciliationPlan};
use ledgerlink_storage::{all_items, get_access_token, DbPool};
use tokio::sync::Mutex;

use crate::config::Config;
use crate::error::AppError;

/// Which linked items a command applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    All,
    Item(String),
}

impl Target {
    pub fn parse(s: &str) -> Self {
        if s == "all" {
            Target::All
        } else {
            Target::Item(s.to_string())
        }
    }
}

/// Shared collaborators of the sync commands.
pub struct SyncContext<'a> {
    pub db: &'a DbPool,
    pub config: &'a Config,
    pub api: Arc<dyn Aggregator>,
    pub relinker: Arc<dyn Relinker>,
    pub today: NaiveDate,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub items_fetched: Vec<String>,
    /// Item label and the error that stopped its fetch.
    pub items_failed: Vec<(String, String)>,
    pub records_fetched: usize,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub skipped: usize,
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} records from {} item(s): {} created, {} updated, {} deleted",
            self.records_fetched,
            self.items_fetched.len(),
            self.created,
            self.updated,
            self.deleted
        )?;
        if self.skipped > 0 {
            write!(f, ", {} skipped", self.skipped)?;
        }
        if !self.items_failed.is_empty() {
            write!(f, "; {} item(s) failed", self.items_failed.len())?;
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ApplyCounts {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
}

#[derive(Debug, Default)]
pub struct AccountsReport {
    pub accounts: Vec<Account>,
    pub created: usize,
    pub items_failed: Vec<(String, String)>,
}

/// Expands `target` into the items to work on. Unknown names fail before any
/// remote call; configured skip items are dropped.
pub async fn resolve_targets(db: &DbPool, config: &Config, target: &Target) -> Result<Vec<ItemRef>, AppError> {
    let items = match target {
        Target::All => all_items(db).await?,
        Target::Item(name) => {
            let item = ledgerlink_storage::resolve_item(db, name)
                .await?
                .ok_or_else(|| AppError::UnknownItem(name.clone()))?;
            vec![item]
        }
    };
    Ok(items
        .into_iter()
        .filter(|item| {
            let skip = config.is_skipped(item.id.as_str(), item.alias.as_deref());
            if skip {
                tracing::info!(%item, "Skipping item listed in sync.skip_items");
            }
            !skip
        })
        .collect())
}

fn fetch_range(config: &Config, item: &ItemRef, today: NaiveDate) -> DateRange {
    match config.start_date_for(item.label()) {
        Some(start) => DateRange::new(start, today),
        None => DateRange::trailing_year(today),
    }
}

async fn access_token(db: &DbPool, item: &ItemRef) -> Result<String, AppError> {
    get_access_token(db, &item.id)
        .await?
        .ok_or_else(|| AppError::Link(LinkError::UnknownItem(item.id.clone())))
}

/// Fetches every target item in parallel, reconciles the combined feed
/// against the mirror and writes the difference.
pub async fn sync_transactions(
    ctx: &SyncContext<'_>,
    mirror: Arc<Mirror>,
    target: &Target,
) -> Result<SyncReport, AppError> {
    let items = resolve_targets(ctx.db, ctx.config, target).await?;
    let sink: Arc<Mutex<Vec<TransactionRecord>>> = Arc::new(Mutex::new(Vec::new()));
    let mut report = SyncReport::default();

    // ── Fetch ─────────────────────────────────────────────────────────────────
    let mut tasks = Vec::with_capacity(items.len());
    for item in items {
        let token = match access_token(ctx.db, &item).await {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(%item, error = %e, "Cannot fetch item");
                report.items_failed.push((item.label().to_string(), e.to_string()));
                continue;
            }
        };
        let range = fetch_range(ctx.config, &item, ctx.today);
        let page_size = ctx.config.sync.page_size;
        let port = ctx.config.link.port;
        let api = Arc::clone(&ctx.api);
        let relinker = Arc::clone(&ctx.relinker);
        let sink = Arc::clone(&sink);
        let label = item.label().to_string();

        tracing::info!(%item, %range, "Downloading transactions");
        let task = tokio::spawn(async move {
            let records = with_relink_on_auth_error(relinker.as_ref(), &item, port, || {
                let api = Arc::clone(&api);
                let request = TransactionsRequest::new(token.clone(), range).with_page_size(page_size);
                async move { all_transactions(api.as_ref(), request).await.map_err(AppError::from) }
            })
            .await?;
            let count = records.len();
            sink.lock().await.extend(records);
            Ok::<usize, AppError>(count)
        });
        tasks.push((label, task));
    }

    let listing = {
        let mirror = Arc::clone(&mirror);
        tokio::spawn(async move { mirror.transactions().await })
    };

    for (label, task) in tasks {
        let outcome = match task.await {
            Ok(outcome) => outcome,
            Err(join) => Err(AppError::Task(join)),
        };
        match outcome {
            Ok(count) => {
                tracing::info!(item = %label, count, "Downloaded transactions");
                report.items_fetched.push(label);
            }
            Err(e) => {
                tracing::warn!(item = %label, error = %e, "Transaction download failed");
                report.items_failed.push((label, e.to_string()));
            }
        }
    }
    let mirror_records = listing.await??;

    // ── Reconcile ─────────────────────────────────────────────────────────────
    let source = std::mem::take(&mut *sink.lock().await);
    report.records_fetched = source.len();
    let plan = reconcile(
        &partition(source),
        &partition(mirror_records),
        deletion_cutoff(ctx.today),
        ctx.config.date_policy(),
    )?;
    tracing::info!(%plan, "Syncing all transactions");
    report.skipped = plan.skipped.len();

    // ── Apply ─────────────────────────────────────────────────────────────────
    let counts = apply_plan(&mirror, &plan).await?;
    report.created = counts.created;
    report.updated = counts.updated;
    report.deleted = counts.deleted;
    Ok(report)
}

/// Writes a plan one row at a time: deletes, then creates, then updates. The
/// first failed write stops the run.
pub async fn apply_plan(mirror: &Mirror, plan: &ReconciliationPlan) -> Result<ApplyCounts, AppError> {
    let mut counts = ApplyCounts::default();

    for record in &plan.to_delete {
        mirror.delete_transaction(record).await?;
        counts.deleted += 1;
    }
    let total = plan.to_create.len();
    for (i, record) in plan.to_create.iter().enumerate() {
        mirror.create_transaction(record).await?;
        counts.created += 1;
        tracing::debug!("Created {}/{} transactions", i + 1, total);
    }
    for record in &plan.to_update {
        mirror.update_transaction(record).await?;
        counts.updated += 1;
    }

    tracing::info!(
        created = counts.created,
        updated = counts.updated,
        deleted = counts.deleted,
        "Mirror updated"
    );
    Ok(counts)
}

/// Lists accounts per item and, when a mirror is given, adds the ones it does
/// not have yet. Item failures are reported without stopping the others.
pub async fn sync_accounts(
    ctx: &SyncContext<'_>,
    mirror: Option<&Mirror>,
    target: &Target,
) -> Result<AccountsReport, AppError> {
    let items = resolve_targets(ctx.db, ctx.config, target).await?;
    let mut report = AccountsReport::default();

    for item in items {
        tracing::info!(%item, "Syncing accounts");
        let fetched = match access_token(ctx.db, &item).await {
            Ok(token) => {
                with_relink_on_auth_error(ctx.relinker.as_ref(), &item, ctx.config.link.port, || {
                    let api = Arc::clone(&ctx.api);
                    let token = token.clone();
                    async move { api.accounts(&token).await.map_err(AppError::from) }
                })
                .await
            }
            Err(e) => Err(e),
        };
        match fetched {
            Ok(accounts) => report.accounts.extend(accounts),
            Err(e) => {
                tracing::warn!(%item, error = %e, "Cannot list accounts");
                report.items_failed.push((item.label().to_string(), e.to_string()));
            }
        }
    }

    if let Some(mirror) = mirror {
        let source: Vec<AccountRecord> = report.accounts.iter().map(Account::to_record).collect();
        let existing = mirror.accounts().await?;
        let missing = plan_new_accounts(&source, &existing);
        let total = missing.len();
        for (i, account) in missing.iter().enumerate() {
            mirror.create_account(account).await?;
            report.created += 1;
            tracing::info!("Created {}/{} accounts", i + 1, total);
        }
    } else {
        tracing::info!("No mirror configured, accounts are only listed");
    }
    Ok(report)
}

/// Deletes mirror rows that repeat an earlier row's key. Returns how many
/// rows were removed.
pub async fn dedupe_mirror(mirror: &Mirror) -> Result<usize, AppError> {
    let rows = mirror.transactions().await?;
    let plan = find_duplicates(&rows);
    Ok(apply_plan(mirror, &plan).await?.deleted)
}
