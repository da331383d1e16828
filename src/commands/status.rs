use crate::constants::STATUS_MONTHS;
use crate::error::AppError;
use crate::models::Series;
use crate::services::{query, LookbackDelta, SeriesStore};
use crate::utils::{format_change, format_number, format_price};
use chrono_tz::Tz;

pub fn run(symbols: Vec<String>) {
    let config = super::load_config(symbols);
    let store = super::store_for(&config);

    println!("📊 Kline Status ({})\n", store.timezone().name());

    let mut failed = false;
    for symbol in &config.symbols {
        println!("═══════════════════════════════════════════════════════════\n");
        if let Err(e) = show_symbol(&store, symbol) {
            match e {
                AppError::NotFound(_) => {
                    println!("⚠️  No data for {}. Run 'sync' first.", symbol);
                }
                other => {
                    eprintln!("❌ Could not read {}: {}", symbol, other);
                    failed = true;
                }
            }
        }
        println!();
    }

    if failed {
        std::process::exit(1);
    }
}

fn show_symbol(store: &SeriesStore, symbol: &str) -> Result<(), AppError> {
    let tz = store.timezone();
    let series = store.load(symbol)?;

    let Some(latest) = query::latest(&series) else {
        println!("⚠️  {} has no rows yet. Run 'sync' first.", symbol);
        return Ok(());
    };

    println!("🔹 {}", symbol);
    println!(
        "   Latest: {}  ({})",
        format_price(latest.close),
        latest.open_time.with_timezone(&tz).format("%Y-%m-%d %H:%M %:z")
    );
    println!("   Rows:   {}", format_number(series.len()));

    if !query::has_min_history(&series) {
        println!("   ⚠️  Less than 30 days of history; longer comparisons are unavailable");
    }

    println!("\n   Changes:");
    for (label, delta) in query::standard_lookbacks(&series) {
        println!("{}", change_line(label, delta.as_ref(), tz));
    }

    print_monthly(&series, tz);
    Ok(())
}

fn print_monthly(series: &Series, tz: Tz) {
    let months = query::monthly_stats(series, STATUS_MONTHS, tz);
    if months.is_empty() {
        return;
    }

    println!("\n   {:<15} {:>14} {:>14} {:>14} {:>12}", "Month", "Max", "Min", "Mean", "Std Dev");
    for month in months {
        let stddev = month.stddev.map(format_price).unwrap_or_else(|| "--".to_string());
        println!(
            "   {:<15} {:>14} {:>14} {:>14} {:>12}",
            month.label,
            format_price(month.max),
            format_price(month.min),
            format_price(month.mean),
            stddev
        );
    }
}

fn change_line(label: &str, delta: Option<&LookbackDelta>, tz: Tz) -> String {
    let Some(delta) = delta else {
        return format!("   {:<9} {:>16}  {:>9}", label, "--", "--");
    };
    let pct = delta
        .pct_change
        .map(|p| format!("{:+.2}%", p))
        .unwrap_or_else(|| "--".to_string());
    format!(
        "   {:<9} {:>16}  {:>9}   from {} at {}",
        label,
        format_change(delta.abs_change),
        pct,
        format_price(delta.past),
        delta.past_time.with_timezone(&tz).format("%Y-%m-%d %H:%M")
    )
}
