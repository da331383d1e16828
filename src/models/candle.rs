use chrono::{DateTime, Utc};
use serde::Serialize;

/// One-minute OHLCV candle
///
/// `open_time` is the natural key within a symbol's series. It is kept as a
/// UTC instant so merges and comparisons never depend on the display
/// timezone; conversion happens only when formatting or bucketing by date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candle {
    /// Start of the minute bucket
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub open_time: DateTime<Utc>,

    /// Opening price
    pub open: f64,

    /// Highest price
    pub high: f64,

    /// Lowest price
    pub low: f64,

    /// Closing price
    pub close: f64,

    /// Base asset volume
    pub volume: f64,
}

impl Candle {
    /// Create a new candle
    pub fn new(
        open_time: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            open_time,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// True when both candles carry identical OHLCV values
    ///
    /// Used to tell a plain re-fetch of a stored minute apart from an
    /// exchange-side correction of it.
    pub fn same_values(&self, other: &Candle) -> bool {
        self.open == other.open
            && self.high == other.high
            && self.low == other.low
            && self.close == other.close
            && self.volume == other.volume
    }
}
