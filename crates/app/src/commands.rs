use std::io::Write;
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use clap::{Args, Subcommand};
use ledgerlink_aggregator::{all_transactions, Aggregator, TransactionsRequest};
use ledgerlink_core::{AccountId, DateRange, ItemId, ItemRef};
use ledgerlink_link::{with_relink_on_auth_error, Relinker};
use ledgerlink_storage::{alias_for, list_aliases, list_tokens, save_token, set_alias};
use serde::Serialize;

use crate::context::AppContext;
use crate::error::AppError;
use crate::output::{write_json, write_transactions, OutputFormat};
use crate::sync::{self, SyncContext, Target};

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Link an institution, or relink an existing item whose login expired.
    Link(LinkArgs),

    /// List stored access tokens.
    Tokens,

    /// Give a linked item a short name usable in place of its id.
    Alias {
        item_id: String,
        name: String,
    },

    /// List aliases.
    Aliases,

    /// List accounts for an item (or `all`) and add new ones to the mirror.
    Accounts {
        item_or_alias: String,
    },

    /// Print transactions for one item.
    Transactions(TransactionsArgs),

    /// Reconcile the mirror against a fresh download for an item or `all`.
    SyncTransactions {
        item_or_alias: String,
    },

    /// Delete mirror rows that repeat another row's account and transaction id.
    DedupeMirror,

    /// Show the aggregator's details for an item.
    Institution {
        item_or_alias: String,
    },

    /// Remove an item (or `all`) from the aggregator and forget its token.
    Unlink {
        item_or_alias: String,
    },
}

#[derive(Args, Debug)]
pub struct LinkArgs {
    /// Existing item id or alias to relink instead of linking a new institution.
    pub item_or_alias: Option<String>,

    /// Alias for the newly linked item.
    #[arg(long)]
    pub alias: Option<String>,

    /// Port for the local link page (default from `[link] port`).
    #[arg(short, long)]
    pub port: Option<u16>,
}

#[derive(Args, Debug)]
pub struct TransactionsArgs {
    pub item_or_alias: String,

    /// First day to include (YYYY-MM-DD).
    #[arg(short, long)]
    pub from: NaiveDate,

    /// Last day to include (YYYY-MM-DD); defaults to today.
    #[arg(short, long)]
    pub to: Option<NaiveDate>,

    #[arg(short = 'o', long, value_enum, default_value_t = OutputFormat::Json)]
    pub output_format: OutputFormat,

    /// Only include this account.
    #[arg(short, long)]
    pub account_id: Option<String>,
}

#[derive(Serialize)]
struct TokenRow<'a> {
    item_id: &'a ItemId,
    #[serde(skip_serializing_if = "Option::is_none")]
    alias: Option<&'a str>,
    access_token: &'a str,
}

pub async fn run(command: Command, ctx: &AppContext) -> Result<(), AppError> {
    match command {
        Command::Link(args) => link(ctx, args).await,
        Command::Tokens => tokens(ctx).await,
        Command::Alias { item_id, name } => {
            set_alias(&ctx.db, &ItemId::new(item_id.as_str()), &name).await?;
            tracing::info!(item = %item_id, alias = %name, "Alias saved");
            Ok(())
        }
        Command::Aliases => {
            let aliases = list_aliases(&ctx.db).await?;
            write_json(std::io::stdout().lock(), &aliases)
        }
        Command::Accounts { item_or_alias } => accounts(ctx, &item_or_alias).await,
        Command::Transactions(args) => transactions(ctx, args).await,
        Command::SyncTransactions { item_or_alias } => sync_transactions(ctx, &item_or_alias).await,
        Command::DedupeMirror => {
            let mirror = ctx.require_mirror()?;
            let removed = sync::dedupe_mirror(&mirror).await?;
            tracing::info!(removed, "Duplicate rows removed");
            Ok(())
        }
        Command::Institution { item_or_alias } => institution(ctx, &item_or_alias).await,
        Command::Unlink { item_or_alias } => unlink(ctx, &item_or_alias).await,
    }
}

// ── Link ─────────────────────────────────────────────────────────────────────

async fn link(ctx: &AppContext, args: LinkArgs) -> Result<(), AppError> {
    let port = args.port.unwrap_or(ctx.config.link.port);
    let broker = ctx.broker(ctx.aggregator()?);

    if let Some(name) = args.item_or_alias {
        let item = ctx.resolve(&name).await?;
        broker.relink(&item.id, port).await?;
        tracing::info!(%item, "Institution relinked");
        return Ok(());
    }

    let pair = broker.link(port).await?;
    save_token(&ctx.db, &pair).await?;
    tracing::info!(item = %pair.item_id, "Institution linked");

    if let Some(alias) = args.alias {
        set_alias(&ctx.db, &pair.item_id, &alias).await?;
        tracing::info!(item = %pair.item_id, %alias, "Alias saved");
    } else if let Some(alias) = alias_for(&ctx.db, &pair.item_id).await? {
        tracing::info!(item = %pair.item_id, %alias, "Item already has an alias");
    } else {
        tracing::info!("Use `ledgerlink alias {} <name>` to give it a short name", pair.item_id);
    }

    let mut out = std::io::stdout().lock();
    writeln!(out, "{}", pair.item_id).map_err(|e| AppError::Output(e.to_string()))
}

async fn tokens(ctx: &AppContext) -> Result<(), AppError> {
    let stored = list_tokens(&ctx.db).await?;
    let rows: Vec<TokenRow<'_>> = stored
        .iter()
        .map(|t| TokenRow {
            item_id: &t.item.id,
            alias: t.item.alias.as_deref(),
            access_token: &t.access_token,
        })
        .collect();
    write_json(std::io::stdout().lock(), &rows)
}

// ── Aggregator reads ─────────────────────────────────────────────────────────

fn sync_context<'a>(ctx: &'a AppContext, api: Arc<dyn Aggregator>) -> SyncContext<'a> {
    let relinker: Arc<dyn Relinker> = Arc::new(ctx.broker(Arc::clone(&api)));
    SyncContext {
        db: &ctx.db,
        config: &ctx.config,
        api,
        relinker,
        today: Local::now().date_naive(),
    }
}

async fn access_token(ctx: &AppContext, item: &ItemRef) -> Result<String, AppError> {
    ledgerlink_storage::get_access_token(&ctx.db, &item.id)
        .await?
        .ok_or_else(|| AppError::UnknownItem(item.label().to_string()))
}

async fn accounts(ctx: &AppContext, item_or_alias: &str) -> Result<(), AppError> {
    let mirror = ctx.mirror()?;
    let sync_ctx = sync_context(ctx, ctx.aggregator()?);
    let report = sync::sync_accounts(&sync_ctx, mirror.as_ref(), &Target::parse(item_or_alias)).await?;
    for (item, error) in &report.items_failed {
        tracing::warn!(%item, %error, "Accounts not listed");
    }
    write_json(std::io::stdout().lock(), &report.accounts)
}

async fn transactions(ctx: &AppContext, args: TransactionsArgs) -> Result<(), AppError> {
    let item = ctx.resolve(&args.item_or_alias).await?;
    let token = access_token(ctx, &item).await?;
    let sync_ctx = sync_context(ctx, ctx.aggregator()?);
    let range = DateRange::new(args.from, args.to.unwrap_or(sync_ctx.today));
    let account = args.account_id.map(AccountId::new);

    let records = with_relink_on_auth_error(sync_ctx.relinker.as_ref(), &item, ctx.config.link.port, || {
        let request = TransactionsRequest::new(token.as_str(), range)
            .with_account(account.clone())
            .with_page_size(ctx.config.sync.page_size);
        let api = Arc::clone(&sync_ctx.api);
        async move { all_transactions(api.as_ref(), request).await.map_err(AppError::from) }
    })
    .await?;

    tracing::info!(%item, %range, count = records.len(), "Downloaded transactions");
    write_transactions(std::io::stdout().lock(), &records, args.output_format)
}

async fn institution(ctx: &AppContext, item_or_alias: &str) -> Result<(), AppError> {
    let item = ctx.resolve(item_or_alias).await?;
    let token = access_token(ctx, &item).await?;
    let sync_ctx = sync_context(ctx, ctx.aggregator()?);

    let details = with_relink_on_auth_error(sync_ctx.relinker.as_ref(), &item, ctx.config.link.port, || {
        let api = Arc::clone(&sync_ctx.api);
        let token = token.clone();
        async move { api.item(&token).await.map_err(AppError::from) }
    })
    .await?;
    write_json(std::io::stdout().lock(), &details)
}

// ── Mirror ───────────────────────────────────────────────────────────────────

async fn sync_transactions(ctx: &AppContext, item_or_alias: &str) -> Result<(), AppError> {
    let mirror = Arc::new(ctx.require_mirror()?);
    let sync_ctx = sync_context(ctx, ctx.aggregator()?);
    let report = sync::sync_transactions(&sync_ctx, mirror, &Target::parse(item_or_alias)).await?;

    for (item, error) in &report.items_failed {
        tracing::warn!(%item, %error, "Item was not synced");
    }
    let mut out = std::io::stdout().lock();
    writeln!(out, "{report}").map_err(|e| AppError::Output(e.to_string()))
}

// ── Unlink ───────────────────────────────────────────────────────────────────

/// Removes each target at the aggregator first; the local token is only
/// forgotten once the remote removal succeeded.
async fn unlink(ctx: &AppContext, item_or_alias: &str) -> Result<(), AppError> {
    let api = ctx.aggregator()?;
    // Skip lists only apply to syncing, so unlink sees every item.
    let items = match Target::parse(item_or_alias) {
        Target::All => ledgerlink_storage::all_items(&ctx.db).await?,
        Target::Item(name) => vec![ctx.resolve(&name).await?],
    };

    for item in items {
        let token = access_token(ctx, &item).await?;
        api.remove_item(&token).await?;
        ledgerlink_storage::remove_item(&ctx.db, &item.id).await?;
        tracing::info!(%item, "Institution unlinked");
    }
    Ok(())
}
