use anyhow::Result;
use clap::Parser;
use tracing::info;

use magpie::{cache::CacheStore, cli::Cli, logging, run, settings::Settings};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logger(cli.log)?;

    if cli.clear_cache {
        CacheStore::new(cli.cache_dir.clone()).clear().await?;
        info!(dir = %cli.cache_dir.display(), "cache cleared");
        return Ok(());
    }

    let settings = Settings::from_cli(&cli)?;
    run(settings).await
}
