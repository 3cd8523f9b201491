//! Binance REST klines + data.binance.vision monthly archives
//!
//! ## Endpoints
//!
//! - Spot range:    `https://api.binance.com/api/v3/klines`
//! - USD-M range:   `https://fapi.binance.com/fapi/v1/klines`
//! - Spot archive:  `https://data.binance.vision/data/spot/monthly/klines/{SYM}/{iv}/{SYM}-{iv}-{YYYY}-{MM}.zip`
//! - USD-M archive: `https://data.binance.vision/data/futures/um/monthly/klines/...`

use super::{unzip_archive, ArchiveSource, MonthArchive, RangeSource, SourceError, RANGE_LIMIT};
use crate::market::{Candle, StreamKey, YearMonth};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;

const ARCHIVE_BASE: &str = "https://data.binance.vision/data";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketKind {
    Spot,
    /// USD-M perpetual futures.
    Futures,
}

impl MarketKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "spot" => Some(MarketKind::Spot),
            "futures" | "um" | "usdm" => Some(MarketKind::Futures),
            _ => None,
        }
    }

    fn rest_url(&self) -> &'static str {
        match self {
            MarketKind::Spot => "https://api.binance.com/api/v3/klines",
            MarketKind::Futures => "https://fapi.binance.com/fapi/v1/klines",
        }
    }

    fn archive_prefix(&self) -> &'static str {
        match self {
            MarketKind::Spot => "spot",
            MarketKind::Futures => "futures/um",
        }
    }
}

pub struct BinanceSource {
    client: reqwest::Client,
    market: MarketKind,
}

impl BinanceSource {
    pub fn new(market: MarketKind, timeout_secs: u64) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self { client, market })
    }

    pub fn archive_url(&self, key: &StreamKey, month: YearMonth) -> String {
        let iv = key.interval.as_str();
        format!(
            "{}/{}/monthly/klines/{sym}/{iv}/{sym}-{iv}-{:04}-{:02}.zip",
            ARCHIVE_BASE,
            self.market.archive_prefix(),
            month.year,
            month.month,
            sym = key.symbol,
            iv = iv,
        )
    }
}

/// Decode one REST kline row:
/// `[openTime, "o", "h", "l", "c", "v", closeTime, "qv", trades, "tbb", "tbq", "ignore"]`.
fn parse_rest_row(row: &[Value], key: &StreamKey) -> Option<Candle> {
    let num = |i: usize| -> Option<f64> {
        match row.get(i)? {
            Value::String(s) => s.parse().ok(),
            Value::Number(n) => n.as_f64(),
            _ => None,
        }
    };

    let open_time = row.first()?.as_i64()?;
    Some(Candle {
        exchange: key.exchange.clone(),
        symbol: key.symbol.clone(),
        interval: key.interval,
        open_time,
        close_time: open_time + key.interval.duration_ms() - 1,
        open: num(1)?,
        high: num(2)?,
        low: num(3)?,
        close: num(4)?,
        volume: num(5)?,
        quote_volume: num(7)?,
        trades: row.get(8)?.as_u64()?,
        taker_buy_base: num(9)?,
        taker_buy_quote: num(10)?,
    })
}

#[async_trait]
impl RangeSource for BinanceSource {
    async fn fetch_range(
        &self,
        key: &StreamKey,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<Candle>, SourceError> {
        let url = self.market.rest_url();
        let response = self
            .client
            .get(url)
            .query(&[
                ("symbol", key.symbol.clone()),
                ("interval", key.interval.as_str().to_string()),
                ("startTime", start_ms.to_string()),
                ("endTime", end_ms.to_string()),
                ("limit", RANGE_LIMIT.to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let rows: Vec<Vec<Value>> = response
            .json()
            .await
            .map_err(|e| SourceError::Decode(e.to_string()))?;

        let mut candles: Vec<Candle> = rows
            .iter()
            .filter_map(|row| parse_rest_row(row, key))
            .filter(|c| c.open_time >= start_ms && c.open_time <= end_ms)
            .collect();
        candles.sort_by_key(|c| c.open_time);
        candles.truncate(RANGE_LIMIT);

        log::debug!(
            "🌐 {} {} range {}..{} → {} candles",
            key.symbol,
            key.interval,
            start_ms,
            end_ms,
            candles.len()
        );
        Ok(candles)
    }
}

#[async_trait]
impl ArchiveSource for BinanceSource {
    async fn fetch_month(
        &self,
        key: &StreamKey,
        month: YearMonth,
    ) -> Result<MonthArchive, SourceError> {
        let url = self.archive_url(key, month);
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(MonthArchive::NotFound);
        }
        if status != StatusCode::OK {
            return Err(SourceError::Http {
                status: status.as_u16(),
                url,
            });
        }

        let bytes = response.bytes().await?;
        log::debug!("📦 Downloaded {} ({} bytes)", url, bytes.len());

        let files = tokio::task::spawn_blocking(move || unzip_archive(&bytes))
            .await
            .map_err(|e| SourceError::Archive(e.to_string()))??;
        Ok(MonthArchive::Found(files))
    }
}
