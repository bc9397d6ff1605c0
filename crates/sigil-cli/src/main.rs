//! Sigil CLI - inspect, prepare and replay Sigil protocol transitions
//!
//! # Usage
//!
//! ```bash
//! # Show the effective protocol configuration
//! sigil info --config sigil.toml
//!
//! # Compute a registration commitment before submitting it
//! sigil commitment registration --params agent.json --owner alice --salt <hex>
//!
//! # Run a scripted scenario against an in-memory host
//! sigil replay scenario.json
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

mod commands;
mod draft;
mod settings;

use commands::{commitment, info, replay};

/// Sigil - front-running-safe agent identity and stake-based validation
#[derive(Parser)]
#[command(
    name = "sigil",
    version,
    about = "Sigil CLI - agent identity and result validation",
    long_about = "Sigil admits agent identities through commit-reveal and validates\n\
                  task results with staked validators or TEE attestations.\n\n\
                  This tool works entirely offline: it reads configuration,\n\
                  computes commitments and replays scripted transitions."
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Protocol configuration file (TOML, JSON or YAML); SIGIL_* variables override it
    #[arg(long, short = 'c', value_name = "FILE", global = true, env = "SIGIL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the effective protocol configuration
    #[command(name = "info")]
    Info(info::InfoArgs),

    /// Compute a commitment hash for a registration or task authorization
    #[command(name = "commitment")]
    Commitment(commitment::CommitmentArgs),

    /// Replay a JSON scenario against an in-memory host
    #[command(name = "replay")]
    Replay(replay::ReplayArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let config = settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Info(args) => info::run(args, &config),
        Commands::Commitment(args) => commitment::run(args, &config),
        Commands::Replay(args) => replay::run(args, config),
    }
}

/// Setup logging based on verbosity level
fn setup_logging(verbosity: u8) {
    use tracing_subscriber::EnvFilter;

    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .init();
}

/// Print a success message with a checkmark
pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green().bold(), msg);
}

/// Print an error message with an X
pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red().bold(), msg);
}

/// Print an info message
pub fn print_info(msg: &str) {
    println!("{} {}", "ℹ".blue().bold(), msg);
}
