use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use crate::commands;

#[derive(Parser)]
#[command(name = "kline-sync")]
#[command(about = "Rolling one-minute candle store synced from Binance", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch the retention window for each symbol and rewrite its file
    Sync {
        /// Symbol to sync (repeatable, defaults to SYMBOLS)
        #[arg(short, long = "symbol")]
        symbols: Vec<String>,

        /// Override RETENTION_DAYS for this run
        #[arg(long)]
        retention_days: Option<i64>,
    },
    /// Initial load: sync with a long retention window
    Backfill {
        /// Symbol to backfill (repeatable, defaults to SYMBOLS)
        #[arg(short, long = "symbol")]
        symbols: Vec<String>,

        /// Days of history to fetch
        #[arg(long, default_value_t = crate::constants::BACKFILL_RETENTION_DAYS)]
        days: i64,
    },
    /// Show latest price, look-back changes and monthly stats
    Status {
        /// Symbol to show (repeatable, defaults to SYMBOLS)
        #[arg(short, long = "symbol")]
        symbols: Vec<String>,
    },
    /// Summarize candles within a date range (display timezone)
    Range {
        /// Symbol to query
        #[arg(short, long)]
        symbol: String,

        /// First date, inclusive (YYYY-MM-DD)
        #[arg(long, requires = "to", required_unless_present = "last_days")]
        from: Option<NaiveDate>,

        /// Last date, inclusive (YYYY-MM-DD)
        #[arg(long, requires = "from")]
        to: Option<NaiveDate>,

        /// Last N days up to the latest candle
        #[arg(long, conflicts_with_all = ["from", "to"])]
        last_days: Option<i64>,

        /// Print the candles as a JSON array instead of a summary
        #[arg(long)]
        json: bool,
    },
    /// Health check of the persisted files (read-only)
    Check {
        /// Symbol to check (repeatable, defaults to SYMBOLS)
        #[arg(short, long = "symbol")]
        symbols: Vec<String>,
    },
}

pub fn run() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Sync { symbols, retention_days } => {
            commands::sync::run(symbols, retention_days);
        }
        Commands::Backfill { symbols, days } => {
            commands::backfill::run(symbols, days);
        }
        Commands::Status { symbols } => {
            commands::status::run(symbols);
        }
        Commands::Range { symbol, from, to, last_days, json } => {
            commands::range::run(symbol, from, to, last_days, json);
        }
        Commands::Check { symbols } => {
            commands::check::run(symbols);
        }
    }
}
