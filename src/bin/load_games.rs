use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use rusqlite::Connection;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use game_sales_api::load;

/// Load a video game sales CSV into the SQLite table served by the API.
///
/// Each run fully replaces the previous contents of the `games` table.
#[derive(Parser)]
struct Cli {
    /// CSV file to load.
    csv: PathBuf,

    /// SQLite database to (re)build.
    #[arg(long, default_value = "games.db")]
    db: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut conn = Connection::open(&args.db)
        .with_context(|| format!("failed to open database '{}'", args.db.display()))?;
    let stats = load::load_csv(&mut conn, &args.csv)?;

    info!(
        "{}: {} columns, {} rows inserted, {} skipped for missing title",
        args.db.display(),
        stats.columns,
        stats.inserted,
        stats.skipped_missing_title
    );
    Ok(())
}
