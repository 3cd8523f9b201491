//! Upstream candle sources
//!
//! Two seams, both async traits so jobs can run against the exchange or a
//! test double:
//!
//! - [`RangeSource`]: bounded REST range query, at most [`RANGE_LIMIT`]
//!   candles per call. Used for gap repair.
//! - [`ArchiveSource`]: one zipped month of history. Used by backfill.

pub mod archive;
pub mod binance;

use crate::market::{Candle, StreamKey, YearMonth};
use async_trait::async_trait;
use thiserror::Error;

pub use archive::{parse_archive_line, unzip_archive};
pub use binance::{BinanceSource, MarketKind};

/// Maximum candles returned by one range query.
pub const RANGE_LIMIT: usize = 1000;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Archive error: {0}")]
    Archive(String),
}

/// A decompressed file of a monthly archive.
#[derive(Debug, Clone)]
pub struct ArchiveFile {
    pub name: String,
    pub body: String,
}

#[derive(Debug, Clone)]
pub enum MonthArchive {
    /// The exchange has no archive for this month (HTTP 404).
    NotFound,
    Found(Vec<ArchiveFile>),
}

#[async_trait]
pub trait RangeSource: Send + Sync {
    /// Candles of `key` with `start_ms <= open_time <= end_ms`, ascending,
    /// at most [`RANGE_LIMIT`] of them.
    async fn fetch_range(
        &self,
        key: &StreamKey,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<Candle>, SourceError>;
}

#[async_trait]
pub trait ArchiveSource: Send + Sync {
    async fn fetch_month(
        &self,
        key: &StreamKey,
        month: YearMonth,
    ) -> Result<MonthArchive, SourceError>;
}
