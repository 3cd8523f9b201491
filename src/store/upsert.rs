//! Bulk read-merge-sort-replace persistence
//!
//! Used by the maintenance jobs, which write whole days at a time. The merged
//! content is written to a hidden temp file next to the target and renamed
//! over it, so readers only ever see the old file or the new one.

use super::error::{IoContext, StoreError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Outcome of one `upsert_merge` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertStats {
    /// Records in the file after the merge.
    pub total: usize,
    /// Batch records whose key was not in the file before.
    pub inserted: usize,
    /// Batch records that replaced an existing key.
    pub replaced: usize,
}

/// Read every valid record of a partition file, skipping malformed lines.
///
/// A missing file is an empty partition.
pub fn read_partition<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::io(path, e)),
    };

    let mut records = Vec::new();
    let mut skipped = 0usize;
    for line in bytes.split(|b| *b == b'\n') {
        if line.iter().all(|b| b.is_ascii_whitespace()) {
            continue;
        }
        match serde_json::from_slice::<T>(line) {
            Ok(record) => records.push(record),
            Err(_) => skipped += 1,
        }
    }
    if skipped > 0 {
        log::debug!("Skipped {} malformed lines in {}", skipped, path.display());
    }
    Ok(records)
}

/// Merge `batch` into the partition at `path`, keyed by `key_fn`.
///
/// Last write wins per key (batch beats file), output is sorted ascending by
/// key, and the file is replaced atomically. Running the same batch twice
/// leaves byte-identical content.
pub fn upsert_merge<T, K, F>(path: &Path, batch: Vec<T>, key_fn: F) -> Result<UpsertStats, StoreError>
where
    T: Serialize + DeserializeOwned,
    K: Ord,
    F: Fn(&T) -> K,
{
    let mut merged: BTreeMap<K, T> = BTreeMap::new();
    for record in read_partition::<T>(path)? {
        merged.insert(key_fn(&record), record);
    }

    let mut stats = UpsertStats::default();
    for record in batch {
        if merged.insert(key_fn(&record), record).is_some() {
            stats.replaced += 1;
        } else {
            stats.inserted += 1;
        }
    }
    stats.total = merged.len();

    let mut body = Vec::with_capacity(merged.len() * 256);
    for record in merged.values() {
        serde_json::to_writer(&mut body, record)?;
        body.push(b'\n');
    }
    atomic_write(path, &body)?;
    Ok(stats)
}

fn temp_path_for(path: &Path) -> Result<PathBuf, StoreError> {
    let dir = path
        .parent()
        .ok_or_else(|| StoreError::InvalidPath(path.to_path_buf()))?;
    let name = path
        .file_name()
        .ok_or_else(|| StoreError::InvalidPath(path.to_path_buf()))?;
    Ok(dir.join(format!(".{}.tmp", name.to_string_lossy())))
}

pub(crate) fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let tmp = temp_path_for(path)?;
    if let Some(dir) = tmp.parent() {
        fs::create_dir_all(dir).at(dir)?;
    }

    {
        let file = fs::File::create(&tmp).at(&tmp)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(bytes).at(&tmp)?;
        writer.flush().at(&tmp)?;
        writer.get_ref().sync_all().at(&tmp)?;
    }

    fs::rename(&tmp, path).at(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Row {
        t: i64,
        v: f64,
    }

    #[test]
    fn test_merge_sorts_and_dedups() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("2021-01-01.jsonl");

        let first = vec![Row { t: 3, v: 0.3 }, Row { t: 1, v: 0.1 }];
        let stats = upsert_merge(&path, first, |r| r.t).unwrap();
        assert_eq!(stats, UpsertStats { total: 2, inserted: 2, replaced: 0 });

        let second = vec![Row { t: 2, v: 0.2 }, Row { t: 3, v: 9.9 }];
        let stats = upsert_merge(&path, second, |r| r.t).unwrap();
        assert_eq!(stats, UpsertStats { total: 3, inserted: 1, replaced: 1 });

        let rows: Vec<Row> = read_partition(&path).unwrap();
        assert_eq!(
            rows,
            vec![Row { t: 1, v: 0.1 }, Row { t: 2, v: 0.2 }, Row { t: 3, v: 9.9 }]
        );
        assert!(!dir.path().join(".2021-01-01.jsonl.tmp").exists());
    }

    #[test]
    fn test_same_batch_twice_is_byte_identical() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("day.jsonl");
        let batch: Vec<Row> = (0..50)
            .map(|i| Row { t: i, v: 1.0 / (i as f64 + 3.0) })
            .collect();

        upsert_merge(&path, batch.clone(), |r| r.t).unwrap();
        let once = fs::read(&path).unwrap();
        upsert_merge(&path, batch, |r| r.t).unwrap();
        let twice = fs::read(&path).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_corrupt_lines_are_dropped_on_merge() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("day.jsonl");
        fs::write(&path, "{\"t\":5,\"v\":1.5}\nnot json\n{\"t\":4,\"v\"\n").unwrap();

        let stats = upsert_merge(&path, vec![Row { t: 6, v: 2.0 }], |r| r.t).unwrap();
        assert_eq!(stats.total, 2);
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "{\"t\":5,\"v\":1.5}\n{\"t\":6,\"v\":2.0}\n");
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let dir = TempDir::new().unwrap();
        let rows: Vec<Row> = read_partition(&dir.path().join("nope.jsonl")).unwrap();
        assert!(rows.is_empty());
    }
}
