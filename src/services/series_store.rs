//! Series Store
//!
//! Typed load/save boundary around the per-symbol CSV files. Files are
//! always rewritten whole: the new content goes to a temp file in the same
//! directory, is fsynced, then renamed over the target, so a reader sees
//! either the old file or the new one.

use crate::constants::{csv_column, CSV_FILE_SUFFIX, CSV_HEADER};
use crate::error::{AppError, Result};
use crate::models::{Candle, Series};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use chrono_tz::Tz;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// CSV-backed store, one file per symbol
#[derive(Debug, Clone)]
pub struct SeriesStore {
    data_dir: PathBuf,
    timezone: Tz,
}

impl SeriesStore {
    pub fn new(data_dir: impl Into<PathBuf>, timezone: Tz) -> Self {
        Self {
            data_dir: data_dir.into(),
            timezone,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Path of the persisted file for `symbol` (e.g. `btcusdt_historical.csv`)
    pub fn path_for(&self, symbol: &str) -> PathBuf {
        self.data_dir
            .join(format!("{}{}", symbol.to_lowercase(), CSV_FILE_SUFFIX))
    }

    pub fn exists(&self, symbol: &str) -> bool {
        self.path_for(symbol).is_file()
    }

    /// Load the persisted series for `symbol`
    ///
    /// Returns `NotFound` when no file exists and `CorruptData` when any
    /// row cannot be parsed. Nothing is coerced or skipped.
    pub fn load(&self, symbol: &str) -> Result<Series> {
        let path = self.path_for(symbol);

        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AppError::NotFound(format!(
                    "No data file for {} at {}",
                    symbol,
                    path.display()
                )));
            }
            Err(e) => {
                return Err(AppError::Io(format!("Failed to open {}: {}", path.display(), e)));
            }
        };

        let candles = read_candles(file, &path)?;
        let row_count = candles.len();
        let series = Series::from_candles(symbol, candles);

        if series.len() != row_count {
            warn!(
                symbol,
                path = %path.display(),
                duplicates = row_count - series.len(),
                "Persisted file contains duplicate open times"
            );
        }

        debug!(symbol, rows = series.len(), "Loaded series");
        Ok(series)
    }

    /// Load the series, treating a missing file as an empty series
    pub fn load_or_empty(&self, symbol: &str) -> Result<Series> {
        match self.load(symbol) {
            Ok(series) => Ok(series),
            Err(AppError::NotFound(_)) => {
                debug!(symbol, "No persisted series yet, starting empty");
                Ok(Series::empty(symbol))
            }
            Err(e) => Err(e),
        }
    }

    /// Atomically replace the persisted file with `series`, most recent row first
    pub fn save(&self, series: &Series) -> Result<()> {
        fs::create_dir_all(&self.data_dir).map_err(|e| {
            AppError::Io(format!("Failed to create {}: {}", self.data_dir.display(), e))
        })?;

        let path = self.path_for(series.symbol());
        let temp_path = path.with_extension("tmp");

        if let Err(e) = self.write_file(&temp_path, series) {
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }

        if let Err(e) = fs::rename(&temp_path, &path) {
            let _ = fs::remove_file(&temp_path);
            return Err(AppError::Io(format!(
                "Failed to move {} into place: {}",
                temp_path.display(),
                e
            )));
        }

        debug!(symbol = series.symbol(), rows = series.len(), path = %path.display(), "Saved series");
        Ok(())
    }

    fn write_file(&self, temp_path: &Path, series: &Series) -> Result<()> {
        let file = File::create(temp_path)
            .map_err(|e| AppError::Io(format!("Failed to create {}: {}", temp_path.display(), e)))?;

        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(CSV_HEADER)?;

        for candle in series.iter_desc() {
            writer.write_record(&[
                format_open_time(candle.open_time, self.timezone),
                candle.open.to_string(),
                candle.high.to_string(),
                candle.low.to_string(),
                candle.close.to_string(),
                candle.volume.to_string(),
            ])?;
        }

        let file = writer
            .into_inner()
            .map_err(|e| AppError::Io(format!("Failed to flush {}: {}", temp_path.display(), e)))?;
        file.sync_all()?;
        Ok(())
    }
}

/// Read every row of a persisted file; the first bad row aborts with `CorruptData`
fn read_candles(file: File, path: &Path) -> Result<Vec<Candle>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(|e| AppError::CorruptData(format!("{}: unreadable header: {}", path.display(), e)))?;
    let header_ok = headers.len() == CSV_HEADER.len()
        && headers.iter().zip(CSV_HEADER).all(|(a, b)| a.trim() == b);
    if !header_ok {
        return Err(AppError::CorruptData(format!(
            "{}: unexpected header {:?}, expected {:?}",
            path.display(),
            headers.iter().collect::<Vec<_>>(),
            CSV_HEADER
        )));
    }

    let mut candles = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        // Header is line 1
        let line = idx + 2;
        let record = result
            .map_err(|e| AppError::CorruptData(format!("{} line {}: {}", path.display(), line, e)))?;

        candles.push(parse_record(&record).map_err(|column| {
            AppError::CorruptData(format!(
                "{} line {}: invalid '{}' value {:?}",
                path.display(),
                line,
                CSV_HEADER[column],
                record.get(column).unwrap_or("")
            ))
        })?);
    }

    Ok(candles)
}

/// Parse one data row; on failure returns the index of the offending column
pub(crate) fn parse_record(record: &csv::StringRecord) -> std::result::Result<Candle, usize> {
    let field = |idx: usize| record.get(idx).unwrap_or("");
    let number = |idx: usize| parse_number(field(idx)).ok_or(idx);

    let open_time = parse_open_time(field(csv_column::OPEN_TIME)).ok_or(csv_column::OPEN_TIME)?;

    Ok(Candle {
        open_time,
        open: number(csv_column::OPEN)?,
        high: number(csv_column::HIGH)?,
        low: number(csv_column::LOW)?,
        close: number(csv_column::CLOSE)?,
        volume: number(csv_column::VOLUME)?,
    })
}

/// Format an open time as RFC 3339 in the display timezone
///
/// The offset is always written, so the value maps back to exactly one
/// instant even inside a DST fold.
pub fn format_open_time(open_time: DateTime<Utc>, timezone: Tz) -> String {
    open_time
        .with_timezone(&timezone)
        .to_rfc3339_opts(SecondsFormat::AutoSi, false)
}

/// Parse an `Open Time` cell into an instant
///
/// Accepts RFC 3339 with `T` or a space separator. Values without an offset
/// are taken as UTC.
pub fn parse_open_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    let normalized = if raw.len() > 10 && raw.as_bytes()[10] == b' ' {
        format!("{}T{}", &raw[..10], &raw[11..])
    } else {
        raw.to_string()
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(&normalized) {
        return Some(dt.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}
