//! Incremental sync command
//!
//! Usage:
//! - Configured symbols: `sync`
//! - Explicit symbols: `sync --symbol BTCUSDT --symbol ETHUSDT`
//! - Wider window for one run: `sync --retention-days 7`

use crate::models::SyncConfig;
use crate::services::{BinanceClient, SyncEngine, SyncSummary};
use crate::utils::format_number;
use std::time::Instant;

pub fn run(symbols: Vec<String>, retention_days: Option<i64>) {
    let mut config = super::load_config(symbols);

    if let Some(days) = retention_days {
        config = match config.with_retention_days(days) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("❌ {}", e);
                std::process::exit(1);
            }
        };
    }

    execute(config, "Sync");
}

/// Run the engine over every configured symbol and print a summary
///
/// Exits non-zero when any symbol failed; the others are still synced.
pub(crate) fn execute(config: SyncConfig, label: &str) {
    println!(
        "🚀 {}: {} symbol(s), {} day window, data in {}",
        label,
        config.symbols.len(),
        config.retention.num_days(),
        config.data_dir.display()
    );

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("❌ Failed to create async runtime: {}", e);
            std::process::exit(1);
        }
    };

    let client = match BinanceClient::new(&config) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("❌ {}", e);
            std::process::exit(1);
        }
    };

    let started = Instant::now();
    let symbols = config.symbols.clone();
    let engine = SyncEngine::new(client, super::store_for(&config), config);
    let summary = runtime.block_on(engine.sync_all(&symbols));

    print_summary(&summary);
    println!(
        "\n⏱️  {} finished in {:.1}s: {} ok, {} failed",
        label,
        started.elapsed().as_secs_f64(),
        summary.succeeded(),
        summary.failed()
    );

    if summary.has_failures() {
        std::process::exit(1);
    }
}

fn print_summary(summary: &SyncSummary) {
    println!();
    for (symbol, result) in &summary.results {
        match result {
            Ok(report) => {
                println!(
                    "✅ {}: {} rows (+{} new, {} refreshed, {} purged, {} pages)",
                    symbol,
                    format_number(report.total_rows),
                    format_number(report.inserted),
                    format_number(report.replaced),
                    format_number(report.purged),
                    report.pages
                );
                if report.revised > 0 {
                    println!("   ⚠️  {} stored candles were revised by the exchange", report.revised);
                }
                if report.skewed_dropped > 0 {
                    println!("   ⚠️  {} future candles dropped (clock skew)", report.skewed_dropped);
                }
                if report.stale_future > 0 {
                    println!("   ⚠️  {} stored candles newer than this run were removed", report.stale_future);
                }
            }
            Err(e) => {
                eprintln!("❌ {}: {} (previous data kept)", symbol, e);
            }
        }
    }
}
