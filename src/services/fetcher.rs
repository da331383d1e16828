//! Candle Fetcher boundary
//!
//! The sync engine only sees [`CandleFetcher`]. Concrete exchange clients
//! implement it; tests drive the engine through scripted fetchers.
//!
//! Kline wire rows look like:
//!
//! ```text
//! [1710079860000, "72001.10", "72010.00", "71990.55", "72005.00", "3.21400", 1710079919999, ...]
//! ```
//!
//! Only the first six fields matter; anything after the volume is ignored.

use crate::error::{AppError, Result};
use crate::models::Candle;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Source of one-minute candle pages
#[async_trait]
pub trait CandleFetcher: Send + Sync {
    /// Fetch up to one page of candles with `open_time >= start`, ascending
    ///
    /// An empty page means no more data at or after `start`. Transport and
    /// rate-limit failures come back as `AppError::Network` /
    /// `AppError::RateLimit`, never as an empty page.
    async fn fetch_page(&self, symbol: &str, start: DateTime<Utc>) -> Result<Vec<Candle>>;
}

/// Decode one kline row (`[open_time_ms, open, high, low, close, volume, ...]`)
pub fn parse_kline_row(row: &Value) -> Result<Candle> {
    let fields = row
        .as_array()
        .ok_or_else(|| AppError::Parse(format!("Kline row is not an array: {}", row)))?;

    if fields.len() < 6 {
        return Err(AppError::Parse(format!(
            "Kline row has {} fields, expected at least 6",
            fields.len()
        )));
    }

    let open_time_ms = fields[0]
        .as_i64()
        .ok_or_else(|| AppError::Parse(format!("Invalid kline open time: {}", fields[0])))?;
    let open_time = DateTime::from_timestamp_millis(open_time_ms)
        .ok_or_else(|| AppError::Parse(format!("Kline open time out of range: {}", open_time_ms)))?;

    Ok(Candle {
        open_time,
        open: number_field(&fields[1], "open")?,
        high: number_field(&fields[2], "high")?,
        low: number_field(&fields[3], "low")?,
        close: number_field(&fields[4], "close")?,
        volume: number_field(&fields[5], "volume")?,
    })
}

/// Decode a full kline response body (array of rows)
pub fn parse_kline_rows(rows: &[Value]) -> Result<Vec<Candle>> {
    rows.iter().map(parse_kline_row).collect()
}

/// Binance sends prices as strings; accept plain JSON numbers as well
fn number_field(value: &Value, name: &str) -> Result<f64> {
    let parsed = match value {
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    };

    match parsed {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(AppError::Parse(format!("Invalid kline {} field: {}", name, value))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_parse_binance_row_ignores_trailing_fields() {
        let row = json!([
            1710079860000i64,
            "72001.10",
            "72010.00",
            "71990.55",
            "72005.00",
            "3.21400",
            1710079919999i64,
            "231450.12",
            118,
            "1.2",
            "86400.5",
            "0"
        ]);

        let candle = parse_kline_row(&row).unwrap();
        assert_eq!(candle.open_time, Utc.timestamp_millis_opt(1710079860000).unwrap());
        assert_eq!(candle.open, 72001.10);
        assert_eq!(candle.high, 72010.0);
        assert_eq!(candle.low, 71990.55);
        assert_eq!(candle.close, 72005.0);
        assert_eq!(candle.volume, 3.214);
    }

    #[test]
    fn test_parse_numeric_fields() {
        let row = json!([1710079860000i64, 1.5, 2, 1, 1.75, 0]);
        let candle = parse_kline_row(&row).unwrap();
        assert_eq!(candle.high, 2.0);
        assert_eq!(candle.volume, 0.0);
    }

    #[test]
    fn test_parse_rejects_short_or_garbled_rows() {
        assert!(matches!(parse_kline_row(&json!([1, "1", "2"])), Err(AppError::Parse(_))));
        assert!(matches!(parse_kline_row(&json!({"open": 1})), Err(AppError::Parse(_))));
        assert!(matches!(
            parse_kline_row(&json!(["x", "1", "2", "0.5", "1", "1"])),
            Err(AppError::Parse(_))
        ));
        assert!(matches!(
            parse_kline_row(&json!([1710079860000i64, "1", "abc", "0.5", "1", "1"])),
            Err(AppError::Parse(_))
        ));
        assert!(matches!(
            parse_kline_row(&json!([1710079860000i64, "1", "2", "0.5", "NaN", "1"])),
            Err(AppError::Parse(_))
        ));
    }

    #[test]
    fn test_parse_rows_fails_on_first_bad_row() {
        let rows = vec![
            json!([1710079860000i64, "1", "2", "0.5", "1", "1"]),
            json!([1710079920000i64, "1"]),
        ];
        assert!(parse_kline_rows(&rows).is_err());
        assert_eq!(parse_kline_rows(&rows[..1]).unwrap().len(), 1);
    }
}
