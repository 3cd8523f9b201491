//! # Candle pipeline
//!
//! Configuration, per-candle derivation and the live ingestion path.
//!
//! ## Architecture
//!
//! ```text
//!  feed ──mpsc<Candle>──▶ start_live_ingestion
//!                               │
//!                               ▼
//!                         LiveIngestor ──gap──▶ RangeSource (repair)
//!                               │
//!                               ▼
//!                       DerivationEngine ◀── rebuild job (same engine)
//!                               │
//!                               ▼
//!              candle / swing / gap PartitionedLogStores
//! ```
//!
//! ## Module Organization
//!
//! - `config` - `PipelineConfig` loaded from `KLINE_*` environment variables
//! - `derive` - `DerivationEngine`: series, aggregators and swing detection
//! - `live` - `LiveIngestor`: gap handling, persistence and outbound events
//! - `ingestion` - channel loop driving a `LiveIngestor`

pub mod config;
pub mod derive;
pub mod ingestion;
pub mod live;

pub use config::{ConfigError, PipelineConfig};
pub use derive::{DerivationEngine, Derived};
pub use ingestion::start_live_ingestion;
pub use live::{LiveError, LiveEvent, LiveIngestor, LiveStats};
