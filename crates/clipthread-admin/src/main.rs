//! # clipthread-admin
//!
//! Maintenance tool for a clipthread store:
//! - **init** creates the database and applies pending migrations
//! - **stats** prints the document count of every collection
//! - **reset** wipes every collection and the generated media

use std::path::PathBuf;

use anyhow::{bail, Context as _};
use clap::{Parser, Subcommand};
use clipthread_shared::constants::APP_NAME;
use clipthread_store::{Context, StoreConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// clipthread store maintenance
#[derive(Parser)]
#[command(name = "clipthread-admin")]
#[command(about = "Maintenance commands for the clipthread data store")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Database file (overrides CLIPTHREAD_DB_PATH)
    #[arg(long)]
    database: Option<PathBuf>,

    /// Media directory (overrides CLIPTHREAD_MEDIA_DIR)
    #[arg(long)]
    media_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Create the database and apply migrations
    Init,

    /// Print per-collection document counts as JSON
    Stats,

    /// Delete every document and generated media file
    Reset {
        /// Confirm the reset; nothing is deleted without it
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,clipthread_store=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = StoreConfig::from_env();
    if let Some(path) = cli.database {
        config.database_path = Some(path);
    }
    if let Some(dir) = cli.media_dir {
        config.media_dir = Some(dir);
    }
    info!(?config, "{APP_NAME}-admin v{}", env!("CARGO_PKG_VERSION"));

    let ctx = Context::open(&config).context("failed to open the store")?;

    match cli.command {
        Command::Init => {
            let path = ctx
                .database()
                .path()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            info!(%path, "store ready");
            println!("{path}");
        }
        Command::Stats => {
            let stats = ctx.stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Reset { yes } => {
            if !yes {
                bail!("reset deletes every document; pass --yes to confirm");
            }
            let before = ctx.stats().await?;
            ctx.clear_all().await?;
            info!(removed = before.total(), "store reset");
        }
    }

    Ok(())
}
