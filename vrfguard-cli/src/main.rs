//! vrfguard - operator CLI
//!
//! Composition root for the resilience layer:
//! - `simulate` wires every component against an in-process oracle
//! - `config` shows, validates and initializes the JSON config
//! - `accounts` lists configured oracle accounts and their health

#![allow(clippy::print_stdout, reason = "CLI tool outputs to stdout")]

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod account_commands;
mod cli;
mod config_commands;
mod simulate_commands;

use cli::{Cli, Commands, ConfigCommands};
use vrfguard_core::modules::config::default_config_path;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).with_target(false).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    let config_path = cli.config.unwrap_or_else(default_config_path);

    match cli.command {
        Commands::Simulate(args) => simulate_commands::run(&config_path, args).await,
        Commands::Config(cmd) => match cmd {
            ConfigCommands::Show { json } => config_commands::show_config(&config_path, json),
            ConfigCommands::Validate => config_commands::validate_config(&config_path),
            ConfigCommands::Init { force } => config_commands::init_config(&config_path, force),
        },
        Commands::Accounts { probe, json } => {
            account_commands::list_accounts(&config_path, probe, json).await
        },
    }
}
