//! Per-symbol candle series
//!
//! A `Series` is always sorted ascending by `open_time` with no duplicate
//! keys. Every mutation goes through a method that preserves both
//! properties, so readers never re-check them.

use crate::models::Candle;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Outcome of merging a batch of candles into a series
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeStats {
    /// Candles whose open time was not present before
    pub inserted: usize,
    /// Candles that replaced a stored row with the same open time
    pub replaced: usize,
    /// Subset of `replaced` whose OHLCV values changed (exchange corrections)
    pub revised: usize,
}

/// Ordered, deduplicated candles for one symbol
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    symbol: String,
    candles: Vec<Candle>,
}

impl Series {
    /// Create an empty series
    pub fn empty(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            candles: Vec::new(),
        }
    }

    /// Build a series from candles in any order
    ///
    /// Duplicated open times keep the last occurrence in input order.
    pub fn from_candles(symbol: &str, candles: Vec<Candle>) -> Self {
        let mut by_time: BTreeMap<DateTime<Utc>, Candle> = BTreeMap::new();
        for candle in candles {
            by_time.insert(candle.open_time, candle);
        }

        Self {
            symbol: symbol.to_string(),
            candles: by_time.into_values().collect(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Candles in ascending open-time order
    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    /// Oldest candle
    pub fn first(&self) -> Option<&Candle> {
        self.candles.first()
    }

    /// Most recent candle
    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    /// Candle with exactly this open time
    pub fn get(&self, open_time: DateTime<Utc>) -> Option<&Candle> {
        self.candles
            .binary_search_by(|c| c.open_time.cmp(&open_time))
            .ok()
            .map(|idx| &self.candles[idx])
    }

    /// Iterate most recent first (persisted order)
    pub fn iter_desc(&self) -> impl Iterator<Item = &Candle> {
        self.candles.iter().rev()
    }

    /// Drop every candle with `open_time < cutoff`, returning how many were removed
    pub fn purge_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        let keep_from = self.candles.partition_point(|c| c.open_time < cutoff);
        self.candles.drain(..keep_from);
        keep_from
    }

    /// Drop every candle with `open_time > limit`, returning how many were removed
    pub fn drop_after(&mut self, limit: DateTime<Utc>) -> usize {
        let keep_to = self.candles.partition_point(|c| c.open_time <= limit);
        let removed = self.candles.len() - keep_to;
        self.candles.truncate(keep_to);
        removed
    }

    /// Merge `incoming` into the series; incoming candles win on equal open time
    pub fn merge(&mut self, incoming: Vec<Candle>) -> MergeStats {
        let mut stats = MergeStats::default();
        if incoming.is_empty() {
            return stats;
        }

        let mut by_time: BTreeMap<DateTime<Utc>, Candle> = self
            .candles
            .drain(..)
            .map(|c| (c.open_time, c))
            .collect();

        // Collapse duplicates inside the batch first (last one wins) so each
        // key is compared against the stored row exactly once.
        let batch: BTreeMap<DateTime<Utc>, Candle> =
            incoming.into_iter().map(|c| (c.open_time, c)).collect();

        for (key, candle) in batch {
            match by_time.insert(key, candle) {
                Some(previous) => {
                    stats.replaced += 1;
                    if !by_time[&key].same_values(&previous) {
                        stats.revised += 1;
                    }
                }
                None => stats.inserted += 1,
            }
        }

        self.candles = by_time.into_values().collect();
        stats
    }
}
