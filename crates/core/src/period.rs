use chrono::{Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed layout of every `date` field exchanged with the aggregator and the mirror.
pub const RECORD_DATE_FORMAT: &str = "%Y-%m-%d";

/// How far back a record may have vanished from the source feed and still be
/// trusted as a real deletion.
const DELETION_WINDOW: Months = Months::new(1);

const DEFAULT_HISTORY_DAYS: u64 = 365;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        DateRange { start, end }
    }

    /// The default sync window: one year of history ending `today`.
    pub fn trailing_year(today: NaiveDate) -> Self {
        let start = today
            .checked_sub_days(Days::new(DEFAULT_HISTORY_DAYS))
            .unwrap_or(NaiveDate::MIN);
        DateRange { start, end: today }
    }

    pub fn start_str(self) -> String {
        self.start.format(RECORD_DATE_FORMAT).to_string()
    }

    pub fn end_str(self) -> String {
        self.end.format(RECORD_DATE_FORMAT).to_string()
    }
}

/// Mirror records dated strictly after this day may be deleted when they are
/// missing from the source feed. Month arithmetic clamps to the end of the
/// shorter month (Mar 31 → Feb 28/29).
pub fn deletion_cutoff(today: NaiveDate) -> NaiveDate {
    today.checked_sub_months(DELETION_WINDOW).unwrap_or(NaiveDate::MIN)
}

pub fn parse_record_date(s: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(s.trim(), RECORD_DATE_FORMAT)
}
