//! Extraction windows
//!
//! A window is the half-open range `[start, end)` of submission times pulled
//! for one survey in one run. `start` is the survey's bookmark (or the epoch
//! when it has none) and `end` is "now" minus a safety lag, because the
//! source's most recent submissions may not be visible yet.
//!
//! All timestamps live in the API's fixed UTC offset.

use crate::error::{ExtractError, Result};
use crate::filter::{FilterSet, Operator};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Utc};
use std::collections::BTreeMap;

/// Per-survey end of the last successfully extracted window
pub type Bookmarks = BTreeMap<String, DateTime<FixedOffset>>;

/// Date format the remote API compares `date_submitted` against
pub const FILTER_FORMAT: &str = "%Y-%m-%d %H:%M:%S %:z";

/// Month and day the academic year starts on
const ACADEMIC_YEAR_START: (u32, u32) = (7, 1);

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
}

impl Window {
    pub fn new(start: DateTime<FixedOffset>, end: DateTime<FixedOffset>) -> Self {
        Self { start, end }
    }

    /// `start > end`: the survey is already up to date
    pub fn is_inverted(&self) -> bool {
        self.start > self.end
    }

    /// Marker used in partitioned export file names: start as Unix seconds
    pub fn marker(&self) -> String {
        self.start.timestamp().to_string()
    }

    /// `field >= start AND field < end`, appended to `base`
    pub fn filters(&self, base: &FilterSet, field: &str) -> Result<FilterSet> {
        base.with(field, Operator::Gte, format_filter_value(&self.start))?
            .with(field, Operator::Lt, format_filter_value(&self.end))
    }
}

/// Derives windows in a fixed timezone with a fixed lag
#[derive(Debug, Clone, Copy)]
pub struct WindowCalculator {
    tz: FixedOffset,
    lag: TimeDelta,
}

impl WindowCalculator {
    pub fn new(tz: FixedOffset, lag: TimeDelta) -> Self {
        Self { tz, lag }
    }

    pub fn timezone(&self) -> FixedOffset {
        self.tz
    }

    /// Stand-in start for a survey that has never been extracted
    pub fn epoch(&self) -> DateTime<FixedOffset> {
        DateTime::<Utc>::UNIX_EPOCH.with_timezone(&self.tz)
    }

    pub fn compute_window(
        &self,
        resource_id: &str,
        now: DateTime<Utc>,
        bookmarks: &Bookmarks,
    ) -> Window {
        let start = bookmarks
            .get(resource_id)
            .map(|b| b.with_timezone(&self.tz))
            .unwrap_or_else(|| self.epoch());
        let end = (now - self.lag).with_timezone(&self.tz);
        Window::new(start, end)
    }

    /// Window from July 1 of `anchor_year` up to `end`
    pub fn academic_year_window(
        &self,
        anchor_year: i32,
        end: DateTime<FixedOffset>,
    ) -> Result<Window> {
        let (month, day) = ACADEMIC_YEAR_START;
        let start = NaiveDate::from_ymd_opt(anchor_year, month, day)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .and_then(|naive| self.tz.from_local_datetime(&naive).single())
            .ok_or_else(|| {
                ExtractError::config(format!("academic year {} is out of range", anchor_year))
            })?;
        Ok(Window::new(start, end))
    }
}

pub fn format_filter_value(ts: &DateTime<FixedOffset>) -> String {
    ts.format(FILTER_FORMAT).to_string()
}

/// Parse an RFC 3339 timestamp, or a naive one interpreted in `tz`.
pub fn parse_timestamp(s: &str, tz: FixedOffset) -> Result<DateTime<FixedOffset>> {
    let s = s.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts);
    }
    if let Ok(ts) = DateTime::parse_from_str(s, FILTER_FORMAT) {
        return Ok(ts);
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .and_then(|naive| tz.from_local_datetime(&naive).single())
        .ok_or_else(|| ExtractError::record(format!("unrecognized timestamp '{}'", s)))
}

/// Parse `UTC`, `Z`, `+HH:MM`, `-HH:MM` or `-HHMM` into a fixed offset
pub fn parse_offset(s: &str) -> Result<FixedOffset> {
    let s = s.trim();
    if matches!(s.to_ascii_uppercase().as_str(), "UTC" | "Z" | "GMT") {
        return FixedOffset::east_opt(0).ok_or_else(|| ExtractError::config("invalid UTC offset"));
    }

    let invalid = || ExtractError::config(format!("invalid timezone offset '{}'", s));
    let (sign, rest) = match s.as_bytes().first() {
        Some(b'+') => (1, &s[1..]),
        Some(b'-') => (-1, &s[1..]),
        _ => return Err(invalid()),
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    let hours: i32 = digits[..2].parse().map_err(|_| invalid())?;
    let minutes: i32 = digits[2..].parse().map_err(|_| invalid())?;
    if minutes >= 60 {
        return Err(invalid());
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}
