//! Monthly kline archive decoding
//!
//! Archives are ZIP files holding one headerless (older) or headed (newer)
//! CSV per month:
//!
//! ```text
//! open_time,open,high,low,close,volume,close_time,quote_volume,count,
//!     taker_buy_volume,taker_buy_quote_volume,ignore
//! ```
//!
//! Spot archives from 2025 on carry microsecond timestamps.

use super::{ArchiveFile, SourceError};
use crate::market::{Candle, StreamKey};
use std::io::{Cursor, Read};

/// Timestamps above this are microseconds, not milliseconds.
const MICROS_THRESHOLD: i64 = 100_000_000_000_000;

fn normalize_ts(ts: i64) -> i64 {
    if ts > MICROS_THRESHOLD {
        ts / 1000
    } else {
        ts
    }
}

/// Decode one archive CSV row. Headers and malformed rows give `None`.
pub fn parse_archive_line(line: &str, key: &StreamKey) -> Option<Candle> {
    let cols: Vec<&str> = line.trim().split(',').map(str::trim).collect();
    if cols.len() < 11 {
        return None;
    }

    let int = |i: usize| cols[i].parse::<i64>().ok();
    let num = |i: usize| cols[i].parse::<f64>().ok().filter(|v| v.is_finite());

    let open_time = normalize_ts(int(0)?);
    let duration = key.interval.duration_ms();
    if open_time.rem_euclid(duration) != 0 {
        return None;
    }

    Some(Candle {
        exchange: key.exchange.clone(),
        symbol: key.symbol.clone(),
        interval: key.interval,
        open_time,
        close_time: open_time + duration - 1,
        open: num(1)?,
        high: num(2)?,
        low: num(3)?,
        close: num(4)?,
        volume: num(5)?,
        quote_volume: num(7)?,
        trades: cols[8].parse::<u64>().ok()?,
        taker_buy_base: num(9)?,
        taker_buy_quote: num(10)?,
    })
}

/// Decompress every file of a ZIP archive into memory.
pub fn unzip_archive(bytes: &[u8]) -> Result<Vec<ArchiveFile>, SourceError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| SourceError::Archive(e.to_string()))?;

    let mut files = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| SourceError::Archive(e.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        let mut body = String::new();
        entry
            .read_to_string(&mut body)
            .map_err(|e| SourceError::Archive(format!("{}: {}", name, e)))?;
        files.push(ArchiveFile { name, body });
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::Interval;

    fn key() -> StreamKey {
        StreamKey::new("binance", "BTCUSDT", Interval::Min1)
    }

    #[test]
    fn test_parses_millisecond_row() {
        let line = "1609459200000,28923.63,28961.66,28913.12,28961.66,27.457032,1609459259999,794382.01,1292,16.777195,485390.75,0";
        let c = parse_archive_line(line, &key()).unwrap();
        assert_eq!(c.open_time, 1_609_459_200_000);
        assert_eq!(c.close_time, 1_609_459_259_999);
        assert_eq!(c.high, 28961.66);
        assert_eq!(c.trades, 1292);
        assert_eq!(c.taker_buy_quote, 485390.75);
        assert_eq!(c.symbol, "BTCUSDT");
    }

    #[test]
    fn test_normalizes_microseconds() {
        let line = "1735689600000000,1,2,0.5,1.5,10,1735689659999999,15,3,5,7.5,0";
        let c = parse_archive_line(line, &key()).unwrap();
        assert_eq!(c.open_time, 1_735_689_600_000);
        assert_eq!(c.close_time, 1_735_689_659_999);
    }

    #[test]
    fn test_skips_header_and_garbage() {
        let header = "open_time,open,high,low,close,volume,close_time,quote_volume,count,taker_buy_volume,taker_buy_quote_volume,ignore";
        assert!(parse_archive_line(header, &key()).is_none());
        assert!(parse_archive_line("", &key()).is_none());
        assert!(parse_archive_line("1609459200000,1,2", &key()).is_none());
        // not aligned to the interval
        assert!(parse_archive_line("1609459200001,1,2,0.5,1.5,10,0,15,3,5,7.5,0", &key()).is_none());
    }

    #[test]
    fn test_rejects_non_zip() {
        assert!(matches!(unzip_archive(b"not a zip"), Err(SourceError::Archive(_))));
    }
}
