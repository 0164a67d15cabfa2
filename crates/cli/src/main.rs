// Paxlane CLI - reconcile external traffic observations into ground truth.

mod exit_codes;
mod load;
mod reconcile;
mod undo;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use exit_codes::{EXIT_STORE, EXIT_SUCCESS, EXIT_USAGE};

/// Command failure carrying the exit code for the shell contract.
#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

pub fn usage_err(message: impl Into<String>) -> CliError {
    CliError { code: EXIT_USAGE, message: message.into(), hint: None }
}

pub fn store_err(message: impl Into<String>) -> CliError {
    CliError { code: EXIT_STORE, message: message.into(), hint: None }
}

#[derive(Parser)]
#[command(name = "paxlane")]
#[command(about = "Reconcile external passenger-traffic observations into ground truth")]
#[command(version)]
struct Cli {
    /// SQLite database holding records, segments, providers and capacity
    #[arg(long, global = true, default_value = "paxlane.sqlite", env = "PAXLANE_DB")]
    db: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile one month of external observations into the segment table
    #[command(after_help = "\
Examples:
  paxlane reconcile 2017-03
  paxlane reconcile 2017-03 --reset-overlap
  paxlane reconcile 2017-03 --first-step 3 --json")]
    Reconcile {
        /// Target month (YYYY-MM)
        year_month: String,

        /// 1: start from overlap detection, 2: start from ratio calculation,
        /// 3: only do the spreading
        #[arg(long, default_value_t = 1)]
        first_step: u8,

        /// Clear existing overlap markers before detection
        #[arg(long)]
        reset_overlap: bool,

        /// Worker pool size
        #[arg(long, default_value_t = paxlane_recon::DEFAULT_WORKERS)]
        workers: usize,

        /// Print the run report as JSON on stdout
        #[arg(long)]
        json: bool,
    },

    /// Reverse one day's external-source changes for a month
    #[command(after_help = "\
Examples:
  paxlane undo 2017-03 --date 2017/08/21")]
    Undo {
        /// Month affected by the updates (YYYY-MM)
        year_month: String,

        /// Day the updates were made (YYYY/MM/DD)
        #[arg(long)]
        date: String,

        /// Print the undo report as JSON on stdout
        #[arg(long)]
        json: bool,
    },

    /// Load normalized data into the store
    Load {
        #[command(subcommand)]
        command: load::LoadCommands,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Reconcile { year_month, first_step, reset_overlap, workers, json } => {
            reconcile::cmd_reconcile(&cli.db, &year_month, first_step, reset_overlap, workers, json)
        }
        Commands::Undo { year_month, date, json } => {
            undo::cmd_undo(&cli.db, &year_month, &date, json)
        }
        Commands::Load { command } => load::cmd_load(&cli.db, command),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(err) => {
            eprintln!("error: {}", err.message);
            if let Some(hint) = err.hint {
                eprintln!("hint: {hint}");
            }
            ExitCode::from(err.code)
        }
    }
}
