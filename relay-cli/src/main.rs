//! relayctl: import, look up and roll back relayed message records. Config from env and optional CLI args.

use anyhow::{Context, Result};
use clap::Parser;
use relay_cli::{commands, load_config, Cli, RelayedMsgRepository};
use relay_core::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = load_config(cli.database_url.clone())?;
    init_tracing(Some(config.log_file()))?;

    let repo = RelayedMsgRepository::new(&config.storage)
        .await
        .context("Open relayed message store (check DATABASE_URL)")?;

    let output = commands::run(&repo, cli.command).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
