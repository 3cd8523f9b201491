//! In-memory derivation primitives
//!
//! ```text
//! base Candle ──► CandleSeries (indicators, bounded) ──► detect_swing_at ──► SwingEvent
//!      │
//!      └────────► TimeframeAggregator (one per derived interval) ──► closed Candle
//! ```

pub mod aggregator;
pub mod candle_series;
pub mod swing;

pub use aggregator::TimeframeAggregator;
pub use candle_series::{CandleSeries, IndicatorPoint};
pub use swing::{detect_swing_at, Swing, SwingEvent, SwingType};
