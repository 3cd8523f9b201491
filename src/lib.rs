//! klineflow: candle ingestion, storage and derivation
//!
//! Final exchange candles come in through the live path or the maintenance
//! jobs, land in day-partitioned NDJSON stores, and are turned into
//! coarser-interval candles, indicator values and swing events.

pub mod indicators;
pub mod jobs;
pub mod market;
pub mod pipeline;
pub mod series;
pub mod sources;
pub mod store;
