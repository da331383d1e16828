use crate::constants::{
    DEFAULT_BINANCE_BASE_URL, DEFAULT_DATA_DIR, DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_PAGE_DELAY_MS,
    DEFAULT_RETENTION_DAYS, DEFAULT_SYMBOLS, MAX_PAGE_LIMIT,
};
use crate::error::{AppError, Result};
use chrono_tz::Tz;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Configuration shared by the store, the sync engine and the query layer
///
/// Nothing reads ambient process state after construction; every component
/// receives the values it needs from here.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Symbols to sync, exchange notation (e.g. "BTCUSDT")
    pub symbols: Vec<String>,

    /// Rolling retention window; also how far back each run re-fetches
    pub retention: chrono::Duration,

    /// Timezone used for display and calendar-date boundaries
    pub timezone: Tz,

    /// Klines requested per page
    pub page_limit: usize,

    /// Fixed pause between page requests
    pub page_delay: Duration,

    /// Optional Binance API key (public kline endpoint works without it)
    pub api_key: Option<String>,

    /// Binance REST base URL
    pub base_url: String,

    /// Per-request HTTP timeout
    pub http_timeout: Duration,

    /// Directory holding the per-symbol CSV files
    pub data_dir: PathBuf,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            symbols: DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect(),
            retention: chrono::Duration::days(DEFAULT_RETENTION_DAYS),
            timezone: chrono_tz::America::Argentina::Buenos_Aires,
            page_limit: MAX_PAGE_LIMIT,
            page_delay: Duration::from_millis(DEFAULT_PAGE_DELAY_MS),
            api_key: None,
            base_url: DEFAULT_BINANCE_BASE_URL.to_string(),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
        }
    }
}

impl SyncConfig {
    /// Build config from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup; absent keys use defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(raw) = get("SYMBOLS") {
            config.symbols = parse_symbols(&raw)?;
        }

        if let Some(raw) = get("RETENTION_DAYS") {
            config.retention = chrono::Duration::days(parse_positive::<i64>("RETENTION_DAYS", &raw)?);
        }

        if let Some(raw) = get("DISPLAY_TIMEZONE") {
            config.timezone = parse_timezone(&raw)?;
        }

        if let Some(raw) = get("PAGE_LIMIT") {
            let limit = parse_positive::<usize>("PAGE_LIMIT", &raw)?;
            if limit > MAX_PAGE_LIMIT {
                return Err(AppError::Config(format!(
                    "PAGE_LIMIT must be between 1 and {}, got {}",
                    MAX_PAGE_LIMIT, limit
                )));
            }
            config.page_limit = limit;
        }

        if let Some(raw) = get("PAGE_DELAY_MS") {
            let ms = raw
                .parse::<u64>()
                .map_err(|e| AppError::Config(format!("Invalid PAGE_DELAY_MS '{}': {}", raw, e)))?;
            config.page_delay = Duration::from_millis(ms);
        }

        config.api_key = get("BINANCE_API_KEY");

        if let Some(raw) = get("BINANCE_BASE_URL") {
            let base_url = raw.trim_end_matches('/').to_string();
            if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
                return Err(AppError::Config(format!(
                    "Invalid BINANCE_BASE_URL: must start with http:// or https://, got: '{}'",
                    base_url
                )));
            }
            config.base_url = base_url;
        }

        if let Some(raw) = get("HTTP_TIMEOUT_SECS") {
            config.http_timeout = Duration::from_secs(parse_positive::<u64>("HTTP_TIMEOUT_SECS", &raw)?);
        }

        if let Some(raw) = get("KLINE_DATA_DIR") {
            config.data_dir = PathBuf::from(raw);
        }

        Ok(config)
    }

    /// Replace the symbol list (CLI override)
    pub fn with_symbols(mut self, symbols: Vec<String>) -> Result<Self> {
        if !symbols.is_empty() {
            self.symbols = parse_symbols(&symbols.join(","))?;
        }
        Ok(self)
    }

    /// Replace the retention window (CLI override, backfill)
    pub fn with_retention_days(mut self, days: i64) -> Result<Self> {
        if days <= 0 {
            return Err(AppError::Config(format!("Retention days must be positive, got {}", days)));
        }
        self.retention = chrono::Duration::days(days);
        Ok(self)
    }
}

/// Parse a comma-separated symbol list, uppercased and deduplicated in order
pub fn parse_symbols(raw: &str) -> Result<Vec<String>> {
    let mut symbols: Vec<String> = Vec::new();
    for part in raw.split(',') {
        let symbol = part.trim().to_uppercase();
        if symbol.is_empty() {
            continue;
        }
        if !symbol.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(AppError::Config(format!("Invalid symbol: '{}'", symbol)));
        }
        if !symbols.contains(&symbol) {
            symbols.push(symbol);
        }
    }

    if symbols.is_empty() {
        return Err(AppError::Config("Symbol list is empty".to_string()));
    }
    Ok(symbols)
}

/// Parse an IANA timezone name (e.g. "America/Argentina/Buenos_Aires")
pub fn parse_timezone(raw: &str) -> Result<Tz> {
    raw.parse::<Tz>()
        .map_err(|e| AppError::Config(format!("Unknown timezone '{}': {}", raw, e)))
}

fn parse_positive<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr + PartialOrd + Default,
    T::Err: std::fmt::Display,
{
    let value = raw
        .parse::<T>()
        .map_err(|e| AppError::Config(format!("Invalid {} '{}': {}", key, raw, e)))?;
    if value <= T::default() {
        return Err(AppError::Config(format!("{} must be positive, got '{}'", key, raw)));
    }
    Ok(value)
}
