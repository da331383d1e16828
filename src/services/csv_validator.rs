//! CSV Validation Service
//!
//! Read-only health check of a persisted series file. Unlike
//! [`SeriesStore::load`](crate::services::SeriesStore::load), which stops at
//! the first bad row, this scans the whole file and reports every problem.
//! Files are never modified.

use crate::constants::CSV_HEADER;
use crate::error::{AppError, Result};
use crate::services::series_store::{parse_record, SeriesStore};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeSet;
use std::fs::File;

/// Problems found in one persisted file
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub symbol: String,
    pub exists: bool,
    pub header_valid: bool,
    /// Data rows, including corrupted ones
    pub total_rows: usize,
    /// 1-based line numbers with the parse error message
    pub corrupted_lines: Vec<(usize, String)>,
    /// Rows repeating an open time seen earlier in the file
    pub duplicates: usize,
    /// Rows newer than the row above them (file must be descending)
    pub order_violations: usize,
    /// Rows with an open time after the check time
    pub future_rows: usize,
    /// Minutes missing between the oldest and newest row
    pub gap_minutes: i64,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

impl ValidationReport {
    pub fn is_healthy(&self) -> bool {
        self.exists
            && self.header_valid
            && self.corrupted_lines.is_empty()
            && self.duplicates == 0
            && self.order_violations == 0
            && self.future_rows == 0
    }

    /// Rows that parsed and are unique
    pub fn unique_rows(&self) -> usize {
        self.total_rows - self.corrupted_lines.len() - self.duplicates
    }
}

/// Scan the persisted file for `symbol`
pub fn validate_series_file(store: &SeriesStore, symbol: &str, now: DateTime<Utc>) -> Result<ValidationReport> {
    let path = store.path_for(symbol);
    let mut report = ValidationReport {
        symbol: symbol.to_string(),
        ..ValidationReport::default()
    };

    let file = match File::open(&path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(report),
        Err(e) => return Err(AppError::Io(format!("Failed to open {}: {}", path.display(), e))),
    };
    report.exists = true;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(file);

    report.header_valid = match reader.headers() {
        Ok(headers) => {
            headers.len() == CSV_HEADER.len() && headers.iter().zip(CSV_HEADER).all(|(a, b)| a.trim() == b)
        }
        Err(_) => false,
    };

    let mut seen: BTreeSet<DateTime<Utc>> = BTreeSet::new();
    let mut previous: Option<DateTime<Utc>> = None;

    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        report.total_rows += 1;

        let record = match result {
            Ok(record) => record,
            Err(e) => {
                report.corrupted_lines.push((line, e.to_string()));
                continue;
            }
        };

        if record.len() != CSV_HEADER.len() {
            report
                .corrupted_lines
                .push((line, format!("{} fields, expected {}", record.len(), CSV_HEADER.len())));
            continue;
        }

        let candle = match parse_record(&record) {
            Ok(candle) => candle,
            Err(column) => {
                report.corrupted_lines.push((
                    line,
                    format!("invalid '{}' value {:?}", CSV_HEADER[column], record.get(column).unwrap_or("")),
                ));
                continue;
            }
        };

        let t = candle.open_time;
        if !seen.insert(t) {
            report.duplicates += 1;
        }
        if matches!(previous, Some(prev) if t > prev) {
            report.order_violations += 1;
        }
        if t > now {
            report.future_rows += 1;
        }
        previous = Some(t);
    }

    report.oldest = seen.first().copied();
    report.newest = seen.last().copied();
    report.gap_minutes = seen
        .iter()
        .zip(seen.iter().skip(1))
        .map(|(a, b)| (*b - *a).num_minutes() - 1)
        .filter(|missing| *missing > 0)
        .sum();

    tracing::debug!(
        symbol,
        rows = report.total_rows,
        corrupted = report.corrupted_lines.len(),
        duplicates = report.duplicates,
        "Validated series file"
    );

    Ok(report)
}

/// Span covered by the file, if any rows parsed
pub fn covered_span(report: &ValidationReport) -> Option<Duration> {
    Some(report.newest? - report.oldest?)
}
