//! Decides which surveys and sub-extractions can be left alone this run

use crate::api::{Statistics, Survey};
use crate::window::Window;
use std::fmt;

/// Outcome label of disqualified responses in survey statistics
pub const DISQUALIFIED: &str = "Disqualified";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Archived and not modified since the last extraction
    ArchivedUnmodified,
    /// Bookmark is already past the end of this run's window
    UpToDate,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::ArchivedUnmodified => f.write_str("archived and unmodified since last run"),
            SkipReason::UpToDate => f.write_str("bookmark is ahead of the window end"),
        }
    }
}

/// An archived survey that has not changed since `window.start` has nothing
/// new. Anything not archived may still receive responses and is never skipped.
pub fn should_skip(survey: &Survey, window: &Window) -> bool {
    if !survey.status.is_archived() {
        return false;
    }
    match survey.modified_on {
        Some(modified_on) => window.start > modified_on,
        None => false,
    }
}

/// Why a survey needs no work at all, if it doesn't
pub fn skip_reason(survey: &Survey, window: &Window) -> Option<SkipReason> {
    if window.is_inverted() {
        Some(SkipReason::UpToDate)
    } else if should_skip(survey, window) {
        Some(SkipReason::ArchivedUnmodified)
    } else {
        None
    }
}

/// Response counts that gate the paginated response fetches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResponseCounts {
    pub total: u64,
    pub disqualified: u64,
}

impl ResponseCounts {
    /// Absent statistics count as zero responses
    pub fn from_statistics(statistics: Option<&Statistics>) -> Self {
        statistics
            .map(|s| Self {
                total: s.total(),
                disqualified: s.count(DISQUALIFIED),
            })
            .unwrap_or_default()
    }

    pub fn wants_responses(&self) -> bool {
        self.total > 0
    }

    pub fn wants_disqualified(&self) -> bool {
        self.disqualified > 0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::api::SurveyStatus;
    use chrono::{DateTime, FixedOffset, TimeDelta, TimeZone};
    use serde_json::Value;

    fn ts(days: i64) -> DateTime<FixedOffset> {
        FixedOffset::west_opt(5 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .unwrap()
            + TimeDelta::days(days)
    }

    fn survey(status: SurveyStatus, modified_on: Option<DateTime<FixedOffset>>) -> Survey {
        Survey {
            id: "7".into(),
            title: String::new(),
            status,
            modified_on,
            statistics: None,
            raw: Value::Null,
        }
    }

    #[test]
    fn test_archived_skip_iff_start_after_modified() {
        let modified = ts(10);
        let archived = survey(SurveyStatus::Archived, Some(modified));

        for (start_day, expected) in [(0, false), (9, false), (10, false), (11, true), (200, true)] {
            let window = Window::new(ts(start_day), ts(365));
            assert_eq!(should_skip(&archived, &window), expected, "start day {start_day}");
        }
    }

    #[test]
    fn test_non_archived_never_skipped() {
        let window = Window::new(ts(300), ts(365));
        for status in [
            SurveyStatus::Active,
            SurveyStatus::Other("Closed".into()),
            SurveyStatus::Other("Launched".into()),
        ] {
            assert!(!should_skip(&survey(status, Some(ts(1))), &window));
        }
    }

    #[test]
    fn test_archived_without_modified_on_is_not_skipped() {
        let window = Window::new(ts(300), ts(365));
        assert!(!should_skip(&survey(SurveyStatus::Archived, None), &window));
    }

    #[test]
    fn test_skip_reason_prefers_up_to_date() {
        let archived = survey(SurveyStatus::Archived, Some(ts(1)));
        let inverted = Window::new(ts(20), ts(10));
        assert_eq!(skip_reason(&archived, &inverted), Some(SkipReason::UpToDate));

        let normal = Window::new(ts(5), ts(10));
        assert_eq!(skip_reason(&archived, &normal), Some(SkipReason::ArchivedUnmodified));

        let active = survey(SurveyStatus::Active, Some(ts(1)));
        assert_eq!(skip_reason(&active, &normal), None);
    }

    #[test]
    fn test_response_counts() {
        let stats = Statistics::from([("Complete", 5), ("Disqualified", 2)]);
        let counts = ResponseCounts::from_statistics(Some(&stats));
        assert_eq!(counts.total, 7);
        assert!(counts.wants_responses());
        assert!(counts.wants_disqualified());

        let none = ResponseCounts::from_statistics(None);
        assert!(!none.wants_responses());
        assert!(!none.wants_disqualified());
    }
}
