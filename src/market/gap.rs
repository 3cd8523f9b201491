use serde::{Deserialize, Serialize};

/// A discontinuity in a candle stream. Logged, never repaired in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GapRecord {
    pub expected_open_time: i64,
    pub actual_open_time: i64,
    pub missing_candles: i64,
}

impl GapRecord {
    /// Gap between the expected next open time and the one actually seen.
    ///
    /// `None` unless `actual` is at least one full interval past `expected`.
    pub fn between(expected: i64, actual: i64, interval_ms: i64) -> Option<Self> {
        if interval_ms <= 0 || actual <= expected {
            return None;
        }
        let missing = (actual - expected) / interval_ms;
        if missing < 1 {
            return None;
        }
        Some(Self {
            expected_open_time: expected,
            actual_open_time: actual,
            missing_candles: missing,
        })
    }

    /// Dedup key in the gap log.
    pub fn key(&self) -> String {
        format!("{}-{}", self.expected_open_time, self.actual_open_time)
    }

    /// Open times that should exist to close this gap.
    pub fn missing_open_times(&self, interval_ms: i64) -> impl Iterator<Item = i64> {
        let start = self.expected_open_time;
        (0..self.missing_candles).map(move |i| start + i * interval_ms)
    }
}

/// Walk ascending open times and report every discontinuity.
///
/// `prev` is the open time seen just before `open_times` (e.g. the last
/// candle of the previous day), if any.
pub fn detect_gaps(open_times: &[i64], interval_ms: i64, prev: Option<i64>) -> Vec<GapRecord> {
    let mut gaps = Vec::new();
    let mut prev = prev;
    for &t in open_times {
        if let Some(p) = prev {
            if let Some(gap) = GapRecord::between(p + interval_ms, t, interval_ms) {
                gaps.push(gap);
            }
        }
        prev = Some(prev.map_or(t, |p| p.max(t)));
    }
    gaps
}
