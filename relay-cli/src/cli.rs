//! CLI parser and config loading.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use relay_core::AppConfig;
use relay_storage::Layer;

#[derive(Parser, Debug)]
#[command(name = "relayctl")]
#[command(about = "Inspect and maintain relayed message records", long_about = None)]
#[command(version)]
pub struct Cli {
    /// SQLite database file; overrides DATABASE_URL.
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Insert relayed messages from a JSON array file.
    Import {
        file: PathBuf,
        /// Merge into existing records with the same hash instead of failing.
        #[arg(long)]
        upsert: bool,
    },
    /// Look up active records by message hash.
    Get {
        #[arg(required = true)]
        hashes: Vec<String>,
    },
    /// Every row stored for a hash, including rolled-back ones.
    History { hash: String },
    /// Latest relayed height on each layer (0 when none).
    Latest,
    /// Soft-delete records relayed on a layer above a height (after a reorg).
    Rollback {
        #[arg(short, long, value_enum)]
        layer: LayerArg,
        #[arg(long)]
        height: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LayerArg {
    L1,
    L2,
}

impl From<LayerArg> for Layer {
    fn from(arg: LayerArg) -> Self {
        match arg {
            LayerArg::L1 => Layer::L1,
            LayerArg::L2 => Layer::L2,
        }
    }
}

/// Load AppConfig from environment. If `database_url` is provided it overrides DATABASE_URL.
pub fn load_config(database_url: Option<String>) -> Result<AppConfig> {
    let config = AppConfig::load(database_url)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rollback() {
        let cli = Cli::try_parse_from([
            "relayctl",
            "--database-url",
            "/tmp/x.db",
            "rollback",
            "--layer",
            "l2",
            "--height",
            "90",
        ])
        .unwrap();

        assert_eq!(cli.database_url.as_deref(), Some("/tmp/x.db"));
        match cli.command {
            Commands::Rollback { layer, height } => {
                assert_eq!(Layer::from(layer), Layer::L2);
                assert_eq!(height, 90);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_get_requires_a_hash() {
        assert!(Cli::try_parse_from(["relayctl", "get"]).is_err());
    }

    #[test]
    fn test_parse_import_upsert() {
        let cli = Cli::try_parse_from(["relayctl", "import", "batch.json", "--upsert"]).unwrap();
        match cli.command {
            Commands::Import { file, upsert } => {
                assert_eq!(file, PathBuf::from("batch.json"));
                assert!(upsert);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
