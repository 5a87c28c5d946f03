//! shardscrape CLI: sharded, resumable scraping into Google Sheets.
//!
//! Each process renders its share of the source list in headless Chrome and
//! writes the extracted values back in batches, resuming from a per-shard
//! checkpoint after restarts.

mod commands;
mod overrides;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
