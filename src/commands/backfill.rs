//! Initial backfill command
//!
//! Same engine as `sync`, with a long retention window so a fresh install
//! gets a year of history plus margin in one run. Usage: `backfill --days 370`

pub fn run(symbols: Vec<String>, days: i64) {
    let config = match super::load_config(symbols).with_retention_days(days) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {}", e);
            std::process::exit(1);
        }
    };

    super::sync::execute(config, "Backfill");
}
