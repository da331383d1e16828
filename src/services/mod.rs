pub mod binance_client;
pub mod csv_validator;
pub mod fetcher;
pub mod query;
pub mod series_store;
pub mod sync_engine;

pub use binance_client::BinanceClient;
pub use csv_validator::{validate_series_file, ValidationReport};
pub use fetcher::{parse_kline_row, parse_kline_rows, CandleFetcher};
pub use query::{LookbackDelta, MonthlyStats};
pub use series_store::SeriesStore;
pub use sync_engine::{SyncEngine, SyncReport, SyncSummary};
