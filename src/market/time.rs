//! UTC calendar helpers shared by the store and the jobs

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};

pub const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// UTC calendar day of `ts_ms`, formatted `YYYY-MM-DD`.
pub fn date_key(ts_ms: i64) -> String {
    match DateTime::<Utc>::from_timestamp_millis(ts_ms) {
        Some(dt) => dt.format("%Y-%m-%d").to_string(),
        None => NaiveDate::MIN.format("%Y-%m-%d").to_string(),
    }
}

/// Midnight UTC of a `YYYY-MM-DD` key, in milliseconds.
pub fn day_start_ms(date_key: &str) -> Option<i64> {
    let date = NaiveDate::parse_from_str(date_key, "%Y-%m-%d").ok()?;
    let midnight = date.and_hms_opt(0, 0, 0)?;
    Some(Utc.from_utc_datetime(&midnight).timestamp_millis())
}

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// A calendar month, used to walk monthly archives backward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Self {
        Self {
            year,
            month: month.clamp(1, 12),
        }
    }

    pub fn containing(ts_ms: i64) -> Self {
        let dt = DateTime::<Utc>::from_timestamp_millis(ts_ms).unwrap_or_default();
        Self::new(dt.year(), dt.month())
    }

    pub fn prev(&self) -> Self {
        if self.month == 1 {
            Self::new(self.year - 1, 12)
        } else {
            Self::new(self.year, self.month - 1)
        }
    }

    pub fn label(&self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }
}
