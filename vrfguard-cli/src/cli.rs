use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "vrfguard",
    about = "vrfguard - oracle randomness resilience toolkit",
    version = env!("CARGO_PKG_VERSION"),
    author,
    propagate_version = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, env = "VRFGUARD_CONFIG", help = "Path to the JSON config file")]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run rounds against a simulated oracle and summarize the outcomes")]
    Simulate(SimulateArgs),

    #[command(subcommand, about = "View, validate and create configuration")]
    Config(ConfigCommands),

    #[command(about = "List configured oracle accounts and their health")]
    Accounts {
        #[arg(long, help = "Probe every account through the simulated loader first")]
        probe: bool,

        #[arg(short, long, help = "Output as JSON")]
        json: bool,
    },
}

#[derive(clap::Args)]
pub struct SimulateArgs {
    #[arg(short, long, default_value_t = 20, help = "Number of rounds to run")]
    pub rounds: u32,

    #[arg(short, long, default_value_t = 0.2, help = "Probability that a randomness request fails")]
    pub failure_rate: f64,

    #[arg(long, default_value_t = 200, help = "Simulated submit latency in milliseconds")]
    pub latency_ms: u64,

    #[arg(long = "offline-account", help = "Account name whose queue is paused (repeatable)")]
    pub offline_accounts: Vec<String>,

    #[arg(long, help = "Override the emergency window in milliseconds")]
    pub emergency_timeout_ms: Option<u64>,

    #[arg(long, default_value_t = 7, help = "Seed for the simulated failure profile")]
    pub seed: u64,

    #[arg(long, help = "Print Prometheus metrics after the run")]
    pub metrics: bool,

    #[arg(short, long, help = "Output the summary as JSON")]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    #[command(about = "Show the effective configuration")]
    Show {
        #[arg(short, long, help = "Output as JSON")]
        json: bool,
    },

    #[command(about = "Validate the configuration, including the retry budget invariant")]
    Validate,

    #[command(about = "Write a default configuration file")]
    Init {
        #[arg(long, help = "Overwrite an existing file")]
        force: bool,
    },
}
