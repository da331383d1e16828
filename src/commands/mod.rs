pub mod backfill;
pub mod check;
pub mod range;
pub mod status;
pub mod sync;

use crate::models::SyncConfig;
use crate::services::SeriesStore;

/// Load config from the environment, apply CLI symbol overrides, or exit
pub(crate) fn load_config(symbols: Vec<String>) -> SyncConfig {
    match SyncConfig::from_env().and_then(|config| config.with_symbols(symbols)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Invalid configuration: {}", e);
            std::process::exit(1);
        }
    }
}

pub(crate) fn store_for(config: &SyncConfig) -> SeriesStore {
    SeriesStore::new(&config.data_dir, config.timezone)
}
