//! On-disk layout of the candle, swing and gap stores
//!
//! ```text
//! {root}/candles/{exchange}/{symbol}/{interval}/{YYYY-MM-DD}.jsonl
//! {root}/swings/{exchange}/{symbol}/{interval}/p{pivot_len}/{YYYY-MM-DD}.jsonl
//! {root}/gaps/{exchange}/{symbol}/{interval}/{YYYY-MM-DD}.jsonl
//! ```

use super::error::StoreError;
use super::partition::{partition_path, PartitionedLogStore};
use super::upsert::{read_partition, upsert_merge, UpsertStats};
use crate::market::{day_start_ms, Candle, GapRecord, StreamKey};
use crate::series::SwingEvent;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct StoreLayout {
    root: PathBuf,
}

impl StoreLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn stream_dir(&self, store: &str, key: &StreamKey) -> PathBuf {
        self.root
            .join(store)
            .join(&key.exchange)
            .join(&key.symbol)
            .join(key.interval.as_str())
    }

    pub fn candle_dir(&self, key: &StreamKey) -> PathBuf {
        self.stream_dir("candles", key)
    }

    pub fn swing_dir(&self, key: &StreamKey, pivot_len: usize) -> PathBuf {
        self.stream_dir("swings", key).join(format!("p{}", pivot_len))
    }

    pub fn gap_dir(&self, key: &StreamKey) -> PathBuf {
        self.stream_dir("gaps", key)
    }

    pub fn candle_path(&self, key: &StreamKey, date_key: &str) -> PathBuf {
        partition_path(&self.candle_dir(key), date_key)
    }

    pub fn swing_path(&self, key: &StreamKey, pivot_len: usize, date_key: &str) -> PathBuf {
        partition_path(&self.swing_dir(key, pivot_len), date_key)
    }

    /// Appending candle store, deduplicated by open time.
    pub fn candle_store(&self, key: &StreamKey) -> PartitionedLogStore<Candle> {
        let dir = self.candle_dir(key);
        PartitionedLogStore::new(move |day| partition_path(&dir, day))
            .with_dedup(|c: &Candle| c.open_time.to_string())
    }

    /// Appending swing store, deduplicated by swing id.
    pub fn swing_store(&self, key: &StreamKey, pivot_len: usize) -> PartitionedLogStore<SwingEvent> {
        let dir = self.swing_dir(key, pivot_len);
        PartitionedLogStore::new(move |day| partition_path(&dir, day))
            .with_dedup(|s: &SwingEvent| s.id.clone())
    }

    /// Appending gap log, deduplicated by `{expected}-{actual}`.
    pub fn gap_store(&self, key: &StreamKey) -> PartitionedLogStore<GapRecord> {
        let dir = self.gap_dir(key);
        PartitionedLogStore::new(move |day| partition_path(&dir, day)).with_dedup(GapRecord::key)
    }

    pub fn read_candles(&self, key: &StreamKey, date_key: &str) -> Result<Vec<Candle>, StoreError> {
        let mut candles: Vec<Candle> = read_partition(&self.candle_path(key, date_key))?;
        candles.retain(|c| key.owns(c));
        candles.sort_by_key(|c| c.open_time);
        candles.dedup_by_key(|c| c.open_time);
        Ok(candles)
    }

    pub fn read_swings(
        &self,
        key: &StreamKey,
        pivot_len: usize,
        date_key: &str,
    ) -> Result<Vec<SwingEvent>, StoreError> {
        read_partition(&self.swing_path(key, pivot_len, date_key))
    }

    pub fn read_gaps(&self, key: &StreamKey, date_key: &str) -> Result<Vec<GapRecord>, StoreError> {
        read_partition(&partition_path(&self.gap_dir(key), date_key))
    }

    pub fn upsert_candles(
        &self,
        key: &StreamKey,
        date_key: &str,
        candles: Vec<Candle>,
    ) -> Result<UpsertStats, StoreError> {
        upsert_merge(&self.candle_path(key, date_key), candles, |c| c.open_time)
    }

    pub fn upsert_swings(
        &self,
        key: &StreamKey,
        pivot_len: usize,
        date_key: &str,
        swings: Vec<SwingEvent>,
    ) -> Result<UpsertStats, StoreError> {
        upsert_merge(&self.swing_path(key, pivot_len, date_key), swings, |s| {
            (s.open_time, s.id.clone())
        })
    }

    /// Sorted date keys of the base-candle partitions of `key`.
    pub fn candle_days(&self, key: &StreamKey) -> Result<Vec<String>, StoreError> {
        list_days(&self.candle_dir(key))
    }

    pub fn earliest_open_time(&self, key: &StreamKey) -> Result<Option<i64>, StoreError> {
        for day in self.candle_days(key)? {
            if let Some(first) = self.read_candles(key, &day)?.first() {
                return Ok(Some(first.open_time));
            }
        }
        Ok(None)
    }

    pub fn latest_open_time(&self, key: &StreamKey) -> Result<Option<i64>, StoreError> {
        for day in self.candle_days(key)?.iter().rev() {
            if let Some(last) = self.read_candles(key, day)?.last() {
                return Ok(Some(last.open_time));
            }
        }
        Ok(None)
    }
}

/// Date keys of every `YYYY-MM-DD.jsonl` partition in `dir`, ascending.
///
/// A missing directory has no days. Temp files and foreign names are ignored.
pub fn list_days(dir: &Path) -> Result<Vec<String>, StoreError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::io(dir, e)),
    };

    let mut days = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| StoreError::io(dir, e))?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if let Some(day) = name.strip_suffix(".jsonl") {
            if day_start_ms(day).is_some() {
                days.push(day.to_string());
            }
        }
    }
    days.sort();
    Ok(days)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::Interval;
    use tempfile::TempDir;

    fn candle(open_time: i64) -> Candle {
        Candle {
            exchange: "binance".to_string(),
            symbol: "ETHUSDT".to_string(),
            interval: Interval::Min1,
            open_time,
            close_time: open_time + 59_999,
            open: 1.0,
            high: 2.0,
            low: 0.5,
            close: 1.5,
            volume: 10.0,
            quote_volume: 15.0,
            trades: 4,
            taker_buy_base: 5.0,
            taker_buy_quote: 7.5,
        }
    }

    const JAN1: i64 = 1_609_459_200_000;
    const DAY: i64 = 86_400_000;

    #[test]
    fn test_paths() {
        let layout = StoreLayout::new("/data");
        let key = StreamKey::new("binance", "ETHUSDT", Interval::Hour1);
        assert_eq!(
            layout.candle_path(&key, "2021-01-01"),
            PathBuf::from("/data/candles/binance/ETHUSDT/1h/2021-01-01.jsonl")
        );
        assert_eq!(
            layout.swing_path(&key, 5, "2021-01-01"),
            PathBuf::from("/data/swings/binance/ETHUSDT/1h/p5/2021-01-01.jsonl")
        );
        assert_eq!(layout.gap_dir(&key), PathBuf::from("/data/gaps/binance/ETHUSDT/1h"));
    }

    #[test]
    fn test_days_and_bounds() {
        let dir = TempDir::new().unwrap();
        let layout = StoreLayout::new(dir.path());
        let key = StreamKey::new("binance", "ETHUSDT", Interval::Min1);

        assert_eq!(layout.earliest_open_time(&key).unwrap(), None);

        layout
            .upsert_candles(&key, "2021-01-02", vec![candle(JAN1 + DAY), candle(JAN1 + DAY + 60_000)])
            .unwrap();
        layout
            .upsert_candles(&key, "2021-01-01", vec![candle(JAN1 + 120_000), candle(JAN1)])
            .unwrap();
        std::fs::write(layout.candle_dir(&key).join(".2021-01-03.jsonl.tmp"), "").unwrap();
        std::fs::write(layout.candle_dir(&key).join("notes.txt"), "").unwrap();

        assert_eq!(layout.candle_days(&key).unwrap(), vec!["2021-01-01", "2021-01-02"]);
        assert_eq!(layout.earliest_open_time(&key).unwrap(), Some(JAN1));
        assert_eq!(layout.latest_open_time(&key).unwrap(), Some(JAN1 + DAY + 60_000));
    }

    #[test]
    fn test_candle_store_dedups_by_open_time() {
        let dir = TempDir::new().unwrap();
        let layout = StoreLayout::new(dir.path());
        let key = StreamKey::new("binance", "ETHUSDT", Interval::Min1);

        let mut store = layout.candle_store(&key);
        assert!(store.write(&candle(JAN1), JAN1).unwrap());
        store.close().unwrap();

        let mut reopened = layout.candle_store(&key);
        assert!(!reopened.write(&candle(JAN1), JAN1).unwrap());
        reopened.close().unwrap();

        assert_eq!(layout.read_candles(&key, "2021-01-01").unwrap().len(), 1);
    }
}
