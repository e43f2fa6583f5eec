//! # relay-cli
//!
//! `relayctl`: argument parsing, config loading and the command handlers run
//! against a [`RelayedMsgRepository`].

pub mod cli;
pub mod commands;

pub use cli::{load_config, Cli, Commands, LayerArg};
pub use relay_storage::RelayedMsgRepository;
