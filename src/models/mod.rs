mod candle;
mod series;
mod sync_config;

pub use candle::Candle;
pub use series::{MergeStats, Series};
pub use sync_config::{parse_symbols, parse_timezone, SyncConfig};
