//! Market data primitives: candles, intervals, gaps and UTC calendar keys

pub mod candle;
pub mod gap;
pub mod interval;
pub mod time;

pub use candle::{Candle, StreamKey};
pub use gap::{detect_gaps, GapRecord};
pub use interval::Interval;
pub use time::{date_key, day_start_ms, now_ms, YearMonth, DAY_MS};
