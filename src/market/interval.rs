//! Candle interval catalogue

use serde::{Deserialize, Serialize};
use std::fmt;

const MINUTE_MS: i64 = 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Interval {
    Min1,
    Min3,
    Min5,
    Min15,
    Min30,
    Hour1,
    Hour2,
    Hour4,
    Hour6,
    Hour8,
    Hour12,
    Day1,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::Min1 => "1m",
            Interval::Min3 => "3m",
            Interval::Min5 => "5m",
            Interval::Min15 => "15m",
            Interval::Min30 => "30m",
            Interval::Hour1 => "1h",
            Interval::Hour2 => "2h",
            Interval::Hour4 => "4h",
            Interval::Hour6 => "6h",
            Interval::Hour8 => "8h",
            Interval::Hour12 => "12h",
            Interval::Day1 => "1d",
        }
    }

    pub fn duration_ms(&self) -> i64 {
        match self {
            Interval::Min1 => MINUTE_MS,
            Interval::Min3 => 3 * MINUTE_MS,
            Interval::Min5 => 5 * MINUTE_MS,
            Interval::Min15 => 15 * MINUTE_MS,
            Interval::Min30 => 30 * MINUTE_MS,
            Interval::Hour1 => 60 * MINUTE_MS,
            Interval::Hour2 => 2 * 60 * MINUTE_MS,
            Interval::Hour4 => 4 * 60 * MINUTE_MS,
            Interval::Hour6 => 6 * 60 * MINUTE_MS,
            Interval::Hour8 => 8 * 60 * MINUTE_MS,
            Interval::Hour12 => 12 * 60 * MINUTE_MS,
            Interval::Day1 => 24 * 60 * MINUTE_MS,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::all().into_iter().find(|i| i.as_str() == s.trim())
    }

    pub fn all() -> [Interval; 12] {
        [
            Interval::Min1,
            Interval::Min3,
            Interval::Min5,
            Interval::Min15,
            Interval::Min30,
            Interval::Hour1,
            Interval::Hour2,
            Interval::Hour4,
            Interval::Hour6,
            Interval::Hour8,
            Interval::Hour12,
            Interval::Day1,
        ]
    }

    /// Start of the bucket of this interval that contains `ts_ms`.
    pub fn bucket_start(&self, ts_ms: i64) -> i64 {
        ts_ms.div_euclid(self.duration_ms()) * self.duration_ms()
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Interval {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Interval::parse(&value).ok_or_else(|| format!("unknown interval '{}'", value))
    }
}

impl From<Interval> for String {
    fn from(value: Interval) -> Self {
        value.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_names() {
        for interval in Interval::all() {
            assert_eq!(Interval::parse(interval.as_str()), Some(interval));
        }
        assert_eq!(Interval::parse("7m"), None);
    }

    #[test]
    fn test_bucket_start() {
        let five = Interval::Min5;
        assert_eq!(five.bucket_start(0), 0);
        assert_eq!(five.bucket_start(299_999), 0);
        assert_eq!(five.bucket_start(300_000), 300_000);
        assert_eq!(Interval::Hour1.bucket_start(3_600_000 + 59_000), 3_600_000);
    }
}
