use crate::error::AppError;
use crate::models::Candle;
use crate::services::query;
use crate::utils::{format_number, format_price};
use chrono::NaiveDate;
use chrono_tz::Tz;

pub fn run(symbol: String, from: Option<NaiveDate>, to: Option<NaiveDate>, last_days: Option<i64>, json: bool) {
    let config = super::load_config(vec![symbol.clone()]);
    let store = super::store_for(&config);
    let tz = store.timezone();
    let symbol = config.symbols.first().cloned().unwrap_or(symbol);

    let series = match store.load(&symbol) {
        Ok(series) => series,
        Err(AppError::NotFound(_)) => {
            eprintln!("⚠️  No data for {}. Run 'sync' first.", symbol);
            if json {
                println!("[]");
            }
            return;
        }
        Err(e) => {
            eprintln!("❌ Could not read {}: {}", symbol, e);
            std::process::exit(1);
        }
    };

    let bounds = match (from, to, last_days) {
        (Some(from), Some(to), _) => Some((from, to)),
        (_, _, Some(days)) => match query::preset_range(&series, days, tz) {
            Ok(bounds) => bounds,
            Err(e) => {
                eprintln!("❌ {}", e);
                std::process::exit(1);
            }
        },
        _ => None,
    };
    let Some((start, end)) = bounds else {
        if json {
            println!("[]");
        } else {
            println!("⚠️  No data in range");
        }
        return;
    };

    let rows = match query::filter_range(&series, start, end, tz) {
        Ok(rows) => rows,
        Err(e) => {
            eprintln!("❌ {}", e);
            std::process::exit(1);
        }
    };

    if json {
        match candles_to_json(rows) {
            Ok(out) => println!("{}", out),
            Err(e) => {
                eprintln!("❌ {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    println!("📅 {} from {} to {} ({})\n", symbol, start, end, tz.name());

    let (Some(first), Some(last)) = (rows.first(), rows.last()) else {
        println!("⚠️  No data in range");
        return;
    };

    let min = rows.iter().map(|c| c.close).fold(f64::INFINITY, f64::min);
    let max = rows.iter().map(|c| c.close).fold(f64::NEG_INFINITY, f64::max);

    println!("   Rows:   {}", format_number(rows.len()));
    println!("   First:  {}", describe(first, tz));
    println!("   Last:   {}", describe(last, tz));
    println!("   Close:  min {}  max {}", format_price(min), format_price(max));
}

fn describe(candle: &Candle, tz: Tz) -> String {
    format!(
        "{}  O {}  H {}  L {}  C {}  V {}",
        candle.open_time.with_timezone(&tz).format("%Y-%m-%d %H:%M"),
        format_price(candle.open),
        format_price(candle.high),
        format_price(candle.low),
        format_price(candle.close),
        candle.volume
    )
}

/// JSON array of candles, `open_time` in epoch milliseconds
pub fn candles_to_json(rows: &[Candle]) -> Result<String, AppError> {
    serde_json::to_string_pretty(rows).map_err(|e| AppError::Parse(format!("Failed to encode candles: {}", e)))
}
