//! Query Layer
//!
//! Read-only views over a loaded [`Series`]. Every function is total:
//! insufficient data is `None` or an empty result, never a panic.
//! Calendar boundaries (months, dates) are taken in the display timezone;
//! all comparisons happen on UTC instants.

use crate::constants::{MIN_HISTORY_MINUTES, STANDARD_LOOKBACKS};
use crate::error::{AppError, Result};
use crate::models::{Candle, Series};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::collections::BTreeMap;

/// Latest close compared with the close a number of samples earlier
#[derive(Debug, Clone, PartialEq)]
pub struct LookbackDelta {
    pub current: f64,
    pub past: f64,
    pub past_time: DateTime<Utc>,
    pub abs_change: f64,
    /// `None` when the past close is zero
    pub pct_change: Option<f64>,
}

/// Close-price statistics for one calendar month
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyStats {
    pub year: i32,
    pub month: u32,
    /// e.g. "October 2026"
    pub label: String,
    pub samples: usize,
    pub max: f64,
    pub min: f64,
    pub mean: f64,
    /// Sample standard deviation; `None` for a single sample
    pub stddev: Option<f64>,
}

/// Most recent candle
pub fn latest(series: &Series) -> Option<&Candle> {
    series.last()
}

/// Compare the latest close with the close `minutes` samples before it
///
/// Sample-based, not wall-clock: gaps in the series shift the compared
/// instant further back. Needs at least `minutes + 1` samples.
pub fn lookback_delta(series: &Series, minutes: usize) -> Option<LookbackDelta> {
    let candles = series.candles();
    let last_idx = candles.len().checked_sub(1)?;
    let past_idx = last_idx.checked_sub(minutes)?;

    let current = candles[last_idx].close;
    let past = &candles[past_idx];
    let abs_change = current - past.close;

    Some(LookbackDelta {
        current,
        past: past.close,
        past_time: past.open_time,
        abs_change,
        pct_change: (past.close != 0.0).then(|| abs_change / past.close * 100.0),
    })
}

/// Deltas for the 1 hour / 24 hours / 1 week / 1 month comparisons
pub fn standard_lookbacks(series: &Series) -> Vec<(&'static str, Option<LookbackDelta>)> {
    STANDARD_LOOKBACKS
        .iter()
        .map(|&(label, minutes)| (label, lookback_delta(series, minutes)))
        .collect()
}

/// True once the series holds 30 days of minute samples
pub fn has_min_history(series: &Series) -> bool {
    series.len() >= MIN_HISTORY_MINUTES
}

/// Close statistics for the trailing `n_months` calendar months, most recent first
///
/// Months are anchored on the latest candle's month in `tz`; months without
/// samples are omitted.
pub fn monthly_stats(series: &Series, n_months: u32, tz: Tz) -> Vec<MonthlyStats> {
    let Some(last) = series.last() else {
        return Vec::new();
    };
    if n_months == 0 {
        return Vec::new();
    }

    let anchor = last.open_time.with_timezone(&tz);
    let newest = month_index(anchor.year(), anchor.month());
    let oldest = newest - (n_months as i64 - 1);

    let mut buckets: BTreeMap<i64, Vec<f64>> = BTreeMap::new();
    for candle in series.candles() {
        let local = candle.open_time.with_timezone(&tz);
        let idx = month_index(local.year(), local.month());
        if idx >= oldest {
            buckets.entry(idx).or_default().push(candle.close);
        }
    }

    buckets
        .into_iter()
        .rev()
        .map(|(idx, closes)| {
            let year = idx.div_euclid(12) as i32;
            let month = idx.rem_euclid(12) as u32 + 1;
            summarize(year, month, &closes)
        })
        .collect()
}

/// Candles whose local date in `tz` falls within `[start, end]`, both inclusive
pub fn filter_range(series: &Series, start: NaiveDate, end: NaiveDate, tz: Tz) -> Result<&[Candle]> {
    if start > end {
        return Err(AppError::InvalidRange(format!(
            "start date {} is after end date {}",
            start, end
        )));
    }

    let candles = series.candles();
    let from = start_of_day(start, tz);
    let lo = candles.partition_point(|c| c.open_time < from);
    let hi = match end.succ_opt() {
        Some(next_day) => {
            let until = start_of_day(next_day, tz);
            candles.partition_point(|c| c.open_time < until)
        }
        None => candles.len(),
    };

    Ok(&candles[lo..hi.max(lo)])
}

/// Date range for a "last N days" view ending on the latest candle's date
///
/// `Ok(None)` for an empty series. A negative or unrepresentable day count
/// is `InvalidRange`.
pub fn preset_range(series: &Series, days: i64, tz: Tz) -> Result<Option<(NaiveDate, NaiveDate)>> {
    if days < 0 {
        return Err(AppError::InvalidRange(format!("day count must not be negative, got {}", days)));
    }
    let Some(last) = series.last() else {
        return Ok(None);
    };

    let latest = last.open_time.with_timezone(&tz);
    let start = Duration::try_days(days)
        .and_then(|span| latest.checked_sub_signed(span))
        .ok_or_else(|| AppError::InvalidRange(format!("{} days before {} is out of range", days, latest)))?;

    Ok(Some((start.date_naive(), latest.date_naive())))
}

fn month_index(year: i32, month: u32) -> i64 {
    year as i64 * 12 + (month as i64 - 1)
}

fn summarize(year: i32, month: u32, closes: &[f64]) -> MonthlyStats {
    let samples = closes.len();
    let max = closes.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = closes.iter().copied().fold(f64::INFINITY, f64::min);
    let mean = closes.iter().sum::<f64>() / samples as f64;
    let stddev = (samples > 1).then(|| {
        let sum_sq: f64 = closes.iter().map(|c| (c - mean).powi(2)).sum();
        (sum_sq / (samples - 1) as f64).sqrt()
    });

    let label = NaiveDate::from_ymd_opt(year, month, 1)
        .map(|d| d.format("%B %Y").to_string())
        .unwrap_or_else(|| format!("{}-{:02}", year, month));

    MonthlyStats {
        year,
        month,
        label,
        samples,
        max,
        min,
        mean,
        stddev,
    }
}

/// First instant of `date` in `tz`
///
/// When local midnight falls in a DST gap the day starts at the first
/// valid local time after it.
fn start_of_day(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    (0..=4)
        .find_map(|step| {
            tz.from_local_datetime(&(midnight + Duration::minutes(30 * step)))
                .earliest()
        })
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| midnight.and_utc())
}
