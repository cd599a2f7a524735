mod calendar_file;
mod commands;
mod render;

use std::path::PathBuf;

use anyhow::Result;
use chrono::NaiveTime;
use clap::{Parser, Subcommand};
use occur_core::QueryWindow;
use occur_core::date_range::parse_date;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "occur")]
#[command(about = "Expand recurring events with per-occurrence exceptions")]
struct Cli {
    /// Log engine activity (repeat for more detail)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List events and occurrences in a date range
    Events {
        /// Calendar file (.toml or .json)
        #[arg(short, long)]
        file: PathBuf,

        /// Show events from this date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,

        /// Show events until this date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,

        /// Print occurrences as JSON
        #[arg(long)]
        json: bool,
    },
    /// Split a recurring series into two at a date
    Split {
        /// Calendar file (.toml or .json)
        #[arg(short, long)]
        file: PathBuf,

        /// Series to split
        #[arg(long)]
        id: String,

        /// First day of the new series (YYYY-MM-DD)
        #[arg(long)]
        at: String,

        /// Show occurrences from this date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,

        /// Show occurrences until this date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,
    },
    /// Show the config path and effective settings
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Events {
            file,
            from,
            to,
            json,
        } => {
            let window = QueryWindow::from_args(from.as_deref(), to.as_deref())?;
            commands::events::run(&file, window, json)
        }
        Commands::Split {
            file,
            id,
            at,
            from,
            to,
        } => {
            let at = parse_date(&at)?.and_time(NaiveTime::MIN);
            let window = QueryWindow::from_args(from.as_deref(), to.as_deref())?;
            commands::split::run(&file, &id, at, window)
        }
        Commands::Config => commands::config::run(),
    }
}

/// Logs go to stderr so `--json` output stays clean. `RUST_LOG` wins over
/// `--verbose`.
fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}
