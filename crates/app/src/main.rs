//! ledgerlink: link institutions through an aggregation API and keep a
//! tabular mirror of their transactions in sync.
//!
//! ```text
//! ledgerlink link [ITEM-ID-OR-ALIAS] [--alias NAME] [--port PORT]
//! ledgerlink tokens | aliases
//! ledgerlink alias ITEM-ID NAME
//! ledgerlink accounts ITEM-ID-OR-ALIAS|all
//! ledgerlink transactions ITEM-ID-OR-ALIAS --from DATE [--to DATE] [-o json|csv] [-a ACCOUNT]
//! ledgerlink sync-transactions ITEM-ID-OR-ALIAS|all
//! ledgerlink dedupe-mirror
//! ledgerlink institution ITEM-ID-OR-ALIAS
//! ledgerlink unlink ITEM-ID-OR-ALIAS|all
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use ledgerlink::config::resolve_data_dir;
use ledgerlink::{AppContext, Command};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "ledgerlink",
    version,
    about = "Link bank accounts and mirror their transactions from the command line"
)]
struct Cli {
    /// Directory holding config.toml and the token database.
    #[arg(long, global = true, env = "LEDGERLINK_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let data_dir = resolve_data_dir(cli.data_dir)?;
    let ctx = AppContext::open(data_dir).await?;
    ledgerlink::run(cli.command, &ctx).await?;
    Ok(())
}
