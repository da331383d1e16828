//! Sync Engine
//!
//! Brings one symbol's persisted series up to date and bounded in size:
//!
//! 1. freeze `run_start`, compute `cutoff = run_start - retention`
//! 2. page through the fetcher from `cutoff` until the cursor reaches `run_start`
//! 3. drop fetched rows outside `[cutoff, run_start]`
//! 4. load the existing series, drop stored rows after `run_start`, purge
//!    rows older than `cutoff`
//! 5. merge (fetched rows win) and atomically rewrite the file
//!
//! Any error before step 5 leaves the previous file untouched.

use crate::error::Result;
use crate::models::{Candle, SyncConfig};
use crate::services::fetcher::CandleFetcher;
use crate::services::series_store::SeriesStore;
use chrono::{DateTime, Duration, Utc};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// What one symbol's sync run did
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    pub symbol: String,
    pub run_start: DateTime<Utc>,
    pub cutoff: DateTime<Utc>,
    /// Page requests made, including the final empty one
    pub pages: usize,
    /// Rows returned by the fetcher
    pub fetched: usize,
    /// Fetched rows dropped for lying after `run_start`
    pub skewed_dropped: usize,
    /// Stored rows dropped for lying after `run_start`
    pub stale_future: usize,
    /// Existing rows removed for falling before `cutoff`
    pub purged: usize,
    pub inserted: usize,
    pub replaced: usize,
    /// Replaced rows whose values changed, excluding the provisional tail
    pub revised: usize,
    /// 1 when the newest stored row (saved while its minute was open) got new values
    pub provisional_refreshed: usize,
    /// Rows in the persisted file after the run
    pub total_rows: usize,
}

/// Per-symbol outcomes of a multi-symbol run, in input order
#[derive(Debug, Default)]
pub struct SyncSummary {
    pub results: Vec<(String, Result<SyncReport>)>,
}

impl SyncSummary {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|(_, r)| r.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }
}

/// Sequential sync orchestrator over any [`CandleFetcher`]
pub struct SyncEngine<F: CandleFetcher> {
    fetcher: F,
    store: SeriesStore,
    config: SyncConfig,
}

impl<F: CandleFetcher> SyncEngine<F> {
    pub fn new(fetcher: F, store: SeriesStore, config: SyncConfig) -> Self {
        Self {
            fetcher,
            store,
            config,
        }
    }

    pub fn store(&self) -> &SeriesStore {
        &self.store
    }

    /// Sync one symbol against the current wall clock
    pub async fn sync_symbol(&self, symbol: &str) -> Result<SyncReport> {
        self.sync_symbol_at(symbol, Utc::now()).await
    }

    /// Sync one symbol with a frozen `run_start`
    pub async fn sync_symbol_at(&self, symbol: &str, run_start: DateTime<Utc>) -> Result<SyncReport> {
        let started = Instant::now();
        let cutoff = run_start - self.config.retention;

        info!(symbol, run_start = %run_start, cutoff = %cutoff, "Starting sync");

        let (mut candles, pages) = self.fetch_window(symbol, cutoff, run_start).await?;
        let fetched = candles.len();

        candles.retain(|c| c.open_time >= cutoff);
        let below_cutoff = fetched - candles.len();
        if below_cutoff > 0 {
            debug!(symbol, below_cutoff, "Dropped fetched rows older than cutoff");
        }

        let before_skew = candles.len();
        candles.retain(|c| c.open_time <= run_start);
        let skewed_dropped = before_skew - candles.len();
        if skewed_dropped > 0 {
            warn!(symbol, skewed_dropped, run_start = %run_start, "Dropped fetched rows newer than run start");
        }

        let mut series = self.store.load_or_empty(symbol)?;
        let stale_future = series.drop_after(run_start);
        if stale_future > 0 {
            warn!(symbol, stale_future, run_start = %run_start, "Dropped stored rows newer than run start");
        }
        let purged = series.purge_before(cutoff);

        // The newest stored row was usually still open when it was saved
        let stored_tail = series.last().cloned();
        let stats = series.merge(candles);

        let provisional_refreshed = match stored_tail {
            Some(old) => series
                .get(old.open_time)
                .map_or(0, |new| usize::from(!new.same_values(&old))),
            None => 0,
        };
        let revised = stats.revised - provisional_refreshed;

        if provisional_refreshed > 0 {
            debug!(symbol, "Refreshed provisional tail candle");
        }
        if revised > 0 {
            warn!(symbol, revised, "Exchange revised already stored candles");
        }

        self.store.save(&series)?;

        let report = SyncReport {
            symbol: symbol.to_string(),
            run_start,
            cutoff,
            pages,
            fetched,
            skewed_dropped,
            stale_future,
            purged,
            inserted: stats.inserted,
            replaced: stats.replaced,
            revised,
            provisional_refreshed,
            total_rows: series.len(),
        };

        info!(
            symbol,
            pages,
            fetched,
            skewed_dropped,
            purged,
            inserted = stats.inserted,
            revised,
            total_rows = report.total_rows,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Sync finished"
        );

        Ok(report)
    }

    /// Sync every symbol in order; one failure never stops the others
    pub async fn sync_all(&self, symbols: &[String]) -> SyncSummary {
        let mut summary = SyncSummary::default();

        for symbol in symbols {
            let result = self.sync_symbol(symbol).await;
            if let Err(ref e) = result {
                error!(symbol = %symbol, error = %e, transient = e.is_transient(), "Sync failed, keeping previous data");
            }
            summary.results.push((symbol.clone(), result));
        }

        summary
    }

    /// Page from `cutoff` until the cursor reaches `run_start` or a page comes back empty
    async fn fetch_window(
        &self,
        symbol: &str,
        cutoff: DateTime<Utc>,
        run_start: DateTime<Utc>,
    ) -> Result<(Vec<Candle>, usize)> {
        let mut cursor = cutoff;
        let mut candles = Vec::new();
        let mut pages = 0;

        while cursor < run_start {
            if pages > 0 && !self.config.page_delay.is_zero() {
                tokio::time::sleep(self.config.page_delay).await;
            }

            let page = self.fetcher.fetch_page(symbol, cursor).await?;
            pages += 1;

            let next = match page.last() {
                Some(last) => last.open_time + Duration::minutes(1),
                None => {
                    debug!(symbol, page = pages, cursor = %cursor, "Empty page, no more data");
                    break;
                }
            };

            debug!(symbol, page = pages, rows = page.len(), cursor = %cursor, "Fetched page");
            candles.extend(page);

            if next <= cursor {
                warn!(symbol, cursor = %cursor, next = %next, "Fetcher did not advance the cursor, stopping");
                break;
            }
            cursor = next;
        }

        Ok((candles, pages))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use chrono_tz::Tz;
    use std::collections::VecDeque;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::tempdir;

    const BA: Tz = chrono_tz::America::Argentina::Buenos_Aires;

    fn run_start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 15, 0, 0).unwrap()
    }

    fn test_config(retention: Duration) -> SyncConfig {
        SyncConfig {
            retention,
            page_delay: std::time::Duration::ZERO,
            ..SyncConfig::default()
        }
    }

    fn candle_at(t: DateTime<Utc>, close: f64) -> Candle {
        Candle::new(t, close, close + 1.0, close - 1.0, close, 2.0)
    }

    fn minutes_from(start: DateTime<Utc>, n: i64) -> Vec<Candle> {
        (0..n)
            .map(|i| candle_at(start + Duration::minutes(i), 1000.0 + i as f64))
            .collect()
    }

    /// Returns queued pages in order, then empty pages
    struct ScriptedFetcher {
        pages: Mutex<VecDeque<Result<Vec<Candle>>>>,
        calls: Mutex<Vec<DateTime<Utc>>>,
    }

    impl ScriptedFetcher {
        fn new(pages: Vec<Result<Vec<Candle>>>) -> Self {
            Self {
                pages: Mutex::new(pages.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<DateTime<Utc>> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CandleFetcher for ScriptedFetcher {
        async fn fetch_page(&self, _symbol: &str, start: DateTime<Utc>) -> Result<Vec<Candle>> {
            self.calls.lock().unwrap().push(start);
            self.pages.lock().unwrap().pop_front().unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    /// Deterministic exchange: every minute has a price derived from its timestamp
    struct MarketFetcher {
        page_limit: i64,
        failing_symbol: Option<&'static str>,
    }

    #[async_trait]
    impl CandleFetcher for MarketFetcher {
        async fn fetch_page(&self, symbol: &str, start: DateTime<Utc>) -> Result<Vec<Candle>> {
            if self.failing_symbol == Some(symbol) {
                return Err(AppError::Network(format!("connection reset for {}", symbol)));
            }
            let first_minute = (start.timestamp() + 59).div_euclid(60) * 60;
            Ok((0..self.page_limit)
                .map(|i| {
                    let secs = first_minute + i * 60;
                    let t = Utc.timestamp_opt(secs, 0).unwrap();
                    candle_at(t, (secs / 60 % 997) as f64 + 0.25)
                })
                .collect())
        }
    }

    fn engine<F: CandleFetcher>(fetcher: F, dir: &std::path::Path, retention: Duration) -> SyncEngine<F> {
        SyncEngine::new(fetcher, SeriesStore::new(dir, BA), test_config(retention))
    }

    #[tokio::test]
    async fn test_three_full_pages_into_empty_store() {
        let dir = tempdir().unwrap();
        let cutoff = run_start() - Duration::days(3);
        let fetcher = ScriptedFetcher::new(vec![
            Ok(minutes_from(cutoff, 1000)),
            Ok(minutes_from(cutoff + Duration::minutes(1000), 1000)),
            Ok(minutes_from(cutoff + Duration::minutes(2000), 1000)),
        ]);
        let engine = engine(fetcher, dir.path(), Duration::days(3));

        let report = engine.sync_symbol_at("BTCUSDT", run_start()).await.unwrap();

        assert_eq!(report.fetched, 3000);
        assert_eq!(report.inserted, 3000);
        assert_eq!(report.total_rows, 3000);
        assert_eq!(report.pages, 4);
        assert_eq!(
            engine.fetcher.calls(),
            vec![
                cutoff,
                cutoff + Duration::minutes(1000),
                cutoff + Duration::minutes(2000),
                cutoff + Duration::minutes(3000),
            ]
        );

        let stored = engine.store().load("BTCUSDT").unwrap();
        assert_eq!(stored.len(), 3000);
        assert!(stored.candles().windows(2).all(|w| w[0].open_time < w[1].open_time));

        // On disk: strictly descending
        let content = fs::read_to_string(engine.store().path_for("BTCUSDT")).unwrap();
        let times: Vec<DateTime<Utc>> = content
            .lines()
            .skip(1)
            .map(|line| {
                let raw = line.split(',').next().unwrap();
                crate::services::series_store::parse_open_time(raw).unwrap()
            })
            .collect();
        assert_eq!(times.len(), 3000);
        assert!(times.windows(2).all(|w| w[0] > w[1]));
    }

    #[tokio::test]
    async fn test_existing_rows_older_than_cutoff_are_purged() {
        let dir = tempdir().unwrap();
        let store = SeriesStore::new(dir.path(), BA);
        let existing: Vec<Candle> = (1..=240)
            .map(|h| candle_at(run_start() - Duration::hours(h), h as f64))
            .collect();
        store.save(&crate::models::Series::from_candles("BTCUSDT", existing)).unwrap();

        let engine = engine(ScriptedFetcher::new(vec![]), dir.path(), Duration::days(3));
        let report = engine.sync_symbol_at("BTCUSDT", run_start()).await.unwrap();

        assert_eq!(report.purged, 168);
        assert_eq!(report.total_rows, 72);

        let stored = engine.store().load("BTCUSDT").unwrap();
        assert_eq!(stored.first().unwrap().open_time, run_start() - Duration::days(3));
        assert!(stored.candles().iter().all(|c| c.open_time >= report.cutoff));
    }

    #[tokio::test]
    async fn test_fetch_error_leaves_file_untouched() {
        let dir = tempdir().unwrap();
        let store = SeriesStore::new(dir.path(), BA);
        let cutoff = run_start() - Duration::days(3);
        store
            .save(&crate::models::Series::from_candles("BTCUSDT", minutes_from(cutoff, 10)))
            .unwrap();
        let before = fs::read(store.path_for("BTCUSDT")).unwrap();

        let fetcher = ScriptedFetcher::new(vec![
            Ok(minutes_from(cutoff, 1000)),
            Err(AppError::Network("timed out".to_string())),
            Ok(minutes_from(cutoff + Duration::minutes(2000), 1000)),
        ]);
        let engine = engine(fetcher, dir.path(), Duration::days(3));

        let err = engine.sync_symbol_at("BTCUSDT", run_start()).await.unwrap_err();
        assert!(err.is_transient());

        let after = fs::read(store.path_for("BTCUSDT")).unwrap();
        assert_eq!(before, after);
        assert!(!store.path_for("BTCUSDT").with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn test_repeated_run_is_byte_identical() {
        let dir = tempdir().unwrap();
        let market = MarketFetcher { page_limit: 1000, failing_symbol: None };
        let engine = engine(market, dir.path(), Duration::hours(6));

        engine.sync_symbol_at("ETHUSDT", run_start()).await.unwrap();
        let first = fs::read(engine.store().path_for("ETHUSDT")).unwrap();

        let report = engine.sync_symbol_at("ETHUSDT", run_start()).await.unwrap();
        let second = fs::read(engine.store().path_for("ETHUSDT")).unwrap();

        assert_eq!(first, second);
        assert_eq!(report.inserted, 0);
        assert_eq!(report.revised, 0);
        assert_eq!(report.total_rows, 6 * 60 + 1);
    }

    #[tokio::test]
    async fn test_future_rows_never_persist() {
        let dir = tempdir().unwrap();
        let cutoff = run_start() - Duration::hours(1);
        // 60 minutes up to run_start plus 5 from the "future"
        let fetcher = ScriptedFetcher::new(vec![Ok(minutes_from(cutoff, 66))]);
        let engine = engine(fetcher, dir.path(), Duration::hours(1));

        let report = engine.sync_symbol_at("BTCUSDT", run_start()).await.unwrap();

        assert_eq!(report.skewed_dropped, 5);
        assert_eq!(report.pages, 1);
        let stored = engine.store().load("BTCUSDT").unwrap();
        assert_eq!(stored.last().unwrap().open_time, run_start());
        assert_eq!(stored.len(), 61);
    }

    #[tokio::test]
    async fn test_rows_before_cutoff_from_fetcher_are_ignored() {
        let dir = tempdir().unwrap();
        let cutoff = run_start() - Duration::hours(1);
        let fetcher = ScriptedFetcher::new(vec![Ok(minutes_from(cutoff - Duration::minutes(30), 40))]);
        let engine = engine(fetcher, dir.path(), Duration::hours(1));

        let report = engine.sync_symbol_at("BTCUSDT", run_start()).await.unwrap();

        assert_eq!(report.fetched, 40);
        assert_eq!(report.inserted, 10);
        assert_eq!(engine.store().load("BTCUSDT").unwrap().first().unwrap().open_time, cutoff);
    }

    #[tokio::test]
    async fn test_late_corrections_replace_stored_rows() {
        let dir = tempdir().unwrap();
        let store = SeriesStore::new(dir.path(), BA);
        let cutoff = run_start() - Duration::hours(1);
        store
            .save(&crate::models::Series::from_candles("BTCUSDT", minutes_from(cutoff, 10)))
            .unwrap();

        let mut page = minutes_from(cutoff, 10);
        page[3].close = 1.0;
        let engine = engine(ScriptedFetcher::new(vec![Ok(page)]), dir.path(), Duration::hours(1));

        let report = engine.sync_symbol_at("BTCUSDT", run_start()).await.unwrap();

        assert_eq!(report.replaced, 10);
        assert_eq!(report.revised, 1);
        assert_eq!(engine.store().load("BTCUSDT").unwrap().candles()[3].close, 1.0);
    }

    #[tokio::test]
    async fn test_stuck_cursor_stops_paging() {
        let dir = tempdir().unwrap();
        let cutoff = run_start() - Duration::hours(1);
        let stuck = candle_at(cutoff + Duration::minutes(10), 5.0);
        let fetcher = ScriptedFetcher::new(vec![Ok(vec![stuck.clone()]), Ok(vec![stuck.clone()]), Ok(vec![stuck])]);
        let engine = engine(fetcher, dir.path(), Duration::hours(1));

        let report = engine.sync_symbol_at("BTCUSDT", run_start()).await.unwrap();

        assert_eq!(engine.fetcher.calls().len(), 2);
        assert_eq!(report.total_rows, 1);
    }

    #[tokio::test]
    async fn test_corrupt_file_fails_run_and_is_kept() {
        let dir = tempdir().unwrap();
        let store = SeriesStore::new(dir.path(), BA);
        let garbage = "Open Time,Open,High,Low,Close,Volume\nnot-a-date,1,1,1,1,1\n";
        fs::write(store.path_for("BTCUSDT"), garbage).unwrap();

        let cutoff = run_start() - Duration::hours(1);
        let engine = engine(ScriptedFetcher::new(vec![Ok(minutes_from(cutoff, 10))]), dir.path(), Duration::hours(1));

        let result = engine.sync_symbol_at("BTCUSDT", run_start()).await;
        assert!(matches!(result, Err(AppError::CorruptData(_))));
        assert_eq!(fs::read_to_string(store.path_for("BTCUSDT")).unwrap(), garbage);
    }

    #[tokio::test]
    async fn test_sync_all_isolates_failures() {
        let dir = tempdir().unwrap();
        let market = MarketFetcher { page_limit: 1000, failing_symbol: Some("ETHUSDT") };
        let engine = engine(market, dir.path(), Duration::hours(2));
        let symbols: Vec<String> = ["BTCUSDT", "ETHUSDT", "USDTARS"].iter().map(|s| s.to_string()).collect();

        let summary = engine.sync_all(&symbols).await;

        assert_eq!(summary.results.len(), 3);
        assert_eq!(summary.succeeded(), 2);
        assert!(summary.has_failures());
        assert!(matches!(summary.results[1], (ref s, Err(AppError::Network(_))) if s == "ETHUSDT"));

        assert!(engine.store().exists("BTCUSDT"));
        assert!(!engine.store().exists("ETHUSDT"));
        assert!(engine.store().exists("USDTARS"));

        let report = summary.results[0].1.as_ref().unwrap();
        assert!(report.total_rows > 0);
        assert!(report.skewed_dropped > 0);
    }

    #[tokio::test]
    async fn test_stored_future_rows_are_dropped() {
        let dir = tempdir().unwrap();
        let store = SeriesStore::new(dir.path(), BA);
        let mut stored = minutes_from(run_start() - Duration::minutes(10), 5);
        stored.push(candle_at(run_start() + Duration::hours(1), 42.0));
        store.save(&crate::models::Series::from_candles("BTCUSDT", stored)).unwrap();

        let engine = engine(ScriptedFetcher::new(vec![]), dir.path(), Duration::hours(1));
        let report = engine.sync_symbol_at("BTCUSDT", run_start()).await.unwrap();

        assert_eq!(report.stale_future, 1);
        assert_eq!(report.total_rows, 5);
        let reloaded = engine.store().load("BTCUSDT").unwrap();
        assert!(reloaded.candles().iter().all(|c| c.open_time <= run_start()));
    }

    #[tokio::test]
    async fn test_refreshed_tail_candle_is_not_a_revision() {
        let dir = tempdir().unwrap();
        let store = SeriesStore::new(dir.path(), BA);
        let cutoff = run_start() - Duration::hours(1);
        store
            .save(&crate::models::Series::from_candles("BTCUSDT", minutes_from(cutoff, 10)))
            .unwrap();

        // Only the newest stored minute changes: the open candle kept trading
        let mut page = minutes_from(cutoff, 12);
        page[9].close += 3.0;
        let engine = engine(ScriptedFetcher::new(vec![Ok(page.clone())]), dir.path(), Duration::hours(1));
        let report = engine.sync_symbol_at("BTCUSDT", run_start()).await.unwrap();

        assert_eq!(report.provisional_refreshed, 1);
        assert_eq!(report.revised, 0);
        assert_eq!(report.inserted, 2);

        // An older minute changing is still a revision
        page[2].close += 1.0;
        let engine = engine_with_page(page, dir.path());
        let report = engine.sync_symbol_at("BTCUSDT", run_start()).await.unwrap();

        assert_eq!(report.revised, 1);
        assert_eq!(report.provisional_refreshed, 0);
    }

    fn engine_with_page(page: Vec<Candle>, dir: &std::path::Path) -> SyncEngine<ScriptedFetcher> {
        engine(ScriptedFetcher::new(vec![Ok(page)]), dir, Duration::hours(1))
    }

    #[tokio::test(start_paused = true)]
    async fn test_pages_are_paced_by_fixed_delay() {
        let dir = tempdir().unwrap();
        let cutoff = run_start() - Duration::days(3);
        let fetcher = ScriptedFetcher::new(vec![
            Ok(minutes_from(cutoff, 1000)),
            Ok(minutes_from(cutoff + Duration::minutes(1000), 1000)),
            Ok(minutes_from(cutoff + Duration::minutes(2000), 1000)),
        ]);
        let config = SyncConfig {
            retention: Duration::days(3),
            page_delay: std::time::Duration::from_millis(300),
            ..SyncConfig::default()
        };
        let engine = SyncEngine::new(fetcher, SeriesStore::new(dir.path(), BA), config);

        let before = tokio::time::Instant::now();
        let report = engine.sync_symbol_at("BTCUSDT", run_start()).await.unwrap();
        let elapsed = before.elapsed();

        // One pause before each of the 2nd, 3rd and 4th (empty) requests
        assert_eq!(report.pages, 4);
        assert!(elapsed >= std::time::Duration::from_millis(900), "{:?}", elapsed);
        assert!(elapsed < std::time::Duration::from_millis(910), "{:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_page_run_does_not_sleep() {
        let dir = tempdir().unwrap();
        let config = SyncConfig {
            retention: Duration::hours(1),
            page_delay: std::time::Duration::from_millis(300),
            ..SyncConfig::default()
        };
        let engine = SyncEngine::new(ScriptedFetcher::new(vec![]), SeriesStore::new(dir.path(), BA), config);

        let before = tokio::time::Instant::now();
        let report = engine.sync_symbol_at("BTCUSDT", run_start()).await.unwrap();

        assert_eq!(report.pages, 1);
        assert_eq!(before.elapsed(), std::time::Duration::ZERO);
    }
}
