//! Kline store constants
//!
//! ## Persisted CSV Format
//!
//! One file per symbol, `<symbol lowercase>_historical.csv`, with a header row
//! and one row per minute candle, most recent first:
//!
//! ```text
//! Open Time,Open,High,Low,Close,Volume
//! 2025-03-10T09:31:00-03:00,80123.5,80150,80100.01,80140.2,12.345
//! ```

/// Header row of every persisted series file
pub const CSV_HEADER: [&str; 6] = ["Open Time", "Open", "High", "Low", "Close", "Volume"];

/// Column indices for the persisted CSV format (0-indexed)
pub mod csv_column {
    pub const OPEN_TIME: usize = 0;
    pub const OPEN: usize = 1;
    pub const HIGH: usize = 2;
    pub const LOW: usize = 3;
    pub const CLOSE: usize = 4;
    pub const VOLUME: usize = 5;
}

/// Suffix appended to the lowercased symbol to build the file name
pub const CSV_FILE_SUFFIX: &str = "_historical.csv";

/// Kline interval requested from the exchange
pub const KLINE_INTERVAL: &str = "1m";

/// Maximum klines Binance returns per request
pub const MAX_PAGE_LIMIT: usize = 1000;

/// Default pause between two page requests for the same symbol
pub const DEFAULT_PAGE_DELAY_MS: u64 = 300;

/// Default rolling window for incremental sync runs
pub const DEFAULT_RETENTION_DAYS: i64 = 3;

/// Window used by the initial backfill
pub const BACKFILL_RETENTION_DAYS: i64 = 370;

/// Symbols synced when none are configured
pub const DEFAULT_SYMBOLS: &[&str] = &["BTCUSDT", "ETHUSDT", "USDTARS"];

/// Default display timezone for dates and monthly buckets
pub const DEFAULT_TIMEZONE: &str = "America/Argentina/Buenos_Aires";

/// Default Binance REST endpoint
pub const DEFAULT_BINANCE_BASE_URL: &str = "https://api.binance.com";

/// Default directory for the per-symbol CSV files
pub const DEFAULT_DATA_DIR: &str = "kline_data";

/// Default HTTP request timeout
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Minutes per day, used to turn day counts into sample counts
pub const MINUTES_PER_DAY: usize = 1440;

/// Look-back comparisons shown next to the latest price
///
/// | Label    | Samples |
/// |----------|---------|
/// | 1 hour   | 60      |
/// | 24 hours | 1,440   |
/// | 1 week   | 10,080  |
/// | 1 month  | 43,200  |
pub const STANDARD_LOOKBACKS: &[(&str, usize)] = &[
    ("1 hour", 60),
    ("24 hours", MINUTES_PER_DAY),
    ("1 week", MINUTES_PER_DAY * 7),
    ("1 month", MINUTES_PER_DAY * 30),
];

/// Minimum samples (30 days of minutes) before the history counts as complete
pub const MIN_HISTORY_MINUTES: usize = MINUTES_PER_DAY * 30;

/// Trailing calendar months covered by the status report
pub const STATUS_MONTHS: u32 = 12;
