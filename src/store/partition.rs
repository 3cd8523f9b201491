use super::error::{IoContext, StoreError};
use crate::market::date_key;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

pub type PathFn = Box<dyn Fn(&str) -> PathBuf + Send + Sync>;
pub type KeyFn<T> = Box<dyn Fn(&T) -> String + Send + Sync>;

struct OpenPartition {
    date_key: String,
    path: PathBuf,
    file: BufWriter<File>,
    keys: HashSet<String>,
}

/// Append-only NDJSON log split into one file per UTC day.
///
/// Records are appended to the partition of their own timestamp. With a dedup
/// key the store refuses records whose key already exists in the open
/// partition, including keys written by earlier processes.
pub struct PartitionedLogStore<T> {
    path_for: PathFn,
    dedup_key: Option<KeyFn<T>>,
    current: Option<OpenPartition>,
    records_written: u64,
    _record: PhantomData<fn(&T)>,
}

impl<T> PartitionedLogStore<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(path_for: impl Fn(&str) -> PathBuf + Send + Sync + 'static) -> Self {
        Self {
            path_for: Box::new(path_for),
            dedup_key: None,
            current: None,
            records_written: 0,
            _record: PhantomData,
        }
    }

    pub fn with_dedup(mut self, key: impl Fn(&T) -> String + Send + Sync + 'static) -> Self {
        self.dedup_key = Some(Box::new(key));
        self
    }

    /// Append `record` to the partition of `timestamp_ms`.
    ///
    /// Returns `false` when the dedup key is already present.
    pub fn write(&mut self, record: &T, timestamp_ms: i64) -> Result<bool, StoreError> {
        let day = date_key(timestamp_ms);
        if self.current.as_ref().map(|p| p.date_key != day).unwrap_or(true) {
            self.rotate(day)?;
        }

        let key = self.dedup_key.as_ref().map(|f| f(record));
        let partition = match self.current.as_mut() {
            Some(partition) => partition,
            None => return Ok(false),
        };

        if let Some(key) = &key {
            if partition.keys.contains(key) {
                return Ok(false);
            }
        }

        let json = serde_json::to_string(record)?;
        writeln!(partition.file, "{}", json).at(&partition.path)?;
        partition.file.flush().at(&partition.path)?;

        if let Some(key) = key {
            partition.keys.insert(key);
        }
        self.records_written += 1;
        Ok(true)
    }

    /// Date key of the partition currently open for appends.
    pub fn current_date_key(&self) -> Option<&str> {
        self.current.as_ref().map(|p| p.date_key.as_str())
    }

    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    /// Flush and release the open partition.
    pub fn close(&mut self) -> Result<(), StoreError> {
        if let Some(mut partition) = self.current.take() {
            partition.file.flush().at(&partition.path)?;
        }
        Ok(())
    }

    fn rotate(&mut self, day: String) -> Result<(), StoreError> {
        self.close()?;

        let path = (self.path_for)(&day);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).at(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .at(&path)?;

        let mut content = Vec::new();
        file.seek(SeekFrom::Start(0)).at(&path)?;
        file.read_to_end(&mut content).at(&path)?;

        let keys = match &self.dedup_key {
            Some(key_fn) => load_keys(&content, key_fn),
            None => HashSet::new(),
        };

        if content.last().map(|b| *b != b'\n').unwrap_or(false) {
            log::warn!("⚠️  Torn last line in {}, isolating it", path.display());
            file.write_all(b"\n").at(&path)?;
        }

        log::debug!(
            "📄 Opened partition {} ({} existing keys)",
            path.display(),
            keys.len()
        );

        self.current = Some(OpenPartition {
            date_key: day,
            path,
            file: BufWriter::new(file),
            keys,
        });
        Ok(())
    }
}

impl<T> Drop for PartitionedLogStore<T> {
    fn drop(&mut self) {
        if let Some(partition) = self.current.as_mut() {
            let _ = partition.file.flush();
        }
    }
}

fn load_keys<T: DeserializeOwned>(content: &[u8], key_fn: &KeyFn<T>) -> HashSet<String> {
    content
        .split(|b| *b == b'\n')
        .filter(|line| !line.iter().all(|b| b.is_ascii_whitespace()))
        .filter_map(|line| serde_json::from_slice::<T>(line).ok())
        .map(|record| key_fn(&record))
        .collect()
}

/// Path of the partition `date_key` under `dir`.
pub fn partition_path(dir: &Path, date_key: &str) -> PathBuf {
    dir.join(format!("{}.jsonl", date_key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Tick {
        ts: i64,
        price: f64,
    }

    const DAY1: i64 = 1_609_459_200_000; // 2021-01-01
    const DAY2: i64 = DAY1 + 86_400_000;

    fn store(dir: &Path) -> PartitionedLogStore<Tick> {
        let dir = dir.to_path_buf();
        PartitionedLogStore::new(move |day| partition_path(&dir, day))
            .with_dedup(|t: &Tick| t.ts.to_string())
    }

    #[test]
    fn test_rotates_on_day_change() {
        let dir = TempDir::new().unwrap();
        let mut s = store(dir.path());

        assert!(s.write(&Tick { ts: DAY1, price: 1.0 }, DAY1).unwrap());
        assert_eq!(s.current_date_key(), Some("2021-01-01"));
        assert!(s.write(&Tick { ts: DAY2, price: 2.0 }, DAY2).unwrap());
        assert_eq!(s.current_date_key(), Some("2021-01-02"));
        s.close().unwrap();

        assert!(dir.path().join("2021-01-01.jsonl").exists());
        assert!(dir.path().join("2021-01-02.jsonl").exists());
        assert_eq!(s.records_written(), 2);
    }

    #[test]
    fn test_duplicate_key_is_not_new() {
        let dir = TempDir::new().unwrap();
        let mut s = store(dir.path());
        let tick = Tick { ts: DAY1 + 60_000, price: 3.5 };

        assert!(s.write(&tick, tick.ts).unwrap());
        assert!(!s.write(&tick, tick.ts).unwrap());
        s.close().unwrap();

        let content = std::fs::read_to_string(dir.path().join("2021-01-01.jsonl")).unwrap();
        assert_eq!(content.lines().count(), 1);
    }

    #[test]
    fn test_dedup_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let tick = Tick { ts: DAY1 + 120_000, price: 7.25 };
        {
            let mut s = store(dir.path());
            assert!(s.write(&tick, tick.ts).unwrap());
        }

        let mut s = store(dir.path());
        assert!(!s.write(&tick, tick.ts).unwrap());
        assert!(s.write(&Tick { ts: tick.ts + 60_000, price: 7.5 }, tick.ts + 60_000).unwrap());
    }

    #[test]
    fn test_torn_line_is_isolated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("2021-01-01.jsonl");
        std::fs::write(&path, format!("{{\"ts\":{},\"price\":1.0}}\n{{\"ts\":12", DAY1)).unwrap();

        let mut s = store(dir.path());
        assert!(!s.write(&Tick { ts: DAY1, price: 1.0 }, DAY1).unwrap());
        assert!(s.write(&Tick { ts: DAY1 + 60_000, price: 2.0 }, DAY1 + 60_000).unwrap());
        s.close().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "{\"ts\":12");
        let last: Tick = serde_json::from_str(lines[2]).unwrap();
        assert_eq!(last.ts, DAY1 + 60_000);
    }

    #[test]
    fn test_without_dedup_appends_everything() {
        let dir = TempDir::new().unwrap();
        let d = dir.path().to_path_buf();
        let mut s: PartitionedLogStore<Tick> = PartitionedLogStore::new(move |day| partition_path(&d, day));
        let tick = Tick { ts: DAY1, price: 1.0 };
        assert!(s.write(&tick, DAY1).unwrap());
        assert!(s.write(&tick, DAY1).unwrap());
    }
}
