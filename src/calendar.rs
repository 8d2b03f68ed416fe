//! Civil-date helpers shared by every other module.
//!
//! Everything here works on calendar days; time-of-day is discarded at the
//! boundary so two timestamps on the same day compare equal.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Weekday};
use serde::{Deserialize, Serialize};

/// Truncate a zoned timestamp to its civil date in that zone.
pub fn civil_date<Tz: TimeZone>(ts: &DateTime<Tz>) -> NaiveDate {
    ts.date_naive()
}

/// Truncate a naive timestamp to its day.
pub fn truncate_to_day(ts: NaiveDateTime) -> NaiveDate {
    ts.date()
}

pub fn is_same_day<Tz: TimeZone>(a: &DateTime<Tz>, b: &DateTime<Tz>) -> bool {
    civil_date(a) == civil_date(b)
}

pub fn is_before_or_same_day<Tz: TimeZone>(a: &DateTime<Tz>, b: &DateTime<Tz>) -> bool {
    civil_date(a) <= civil_date(b)
}

/// First day of the week containing `date`, where weeks begin on `first_day`.
pub fn week_start(date: NaiveDate, first_day: Weekday) -> NaiveDate {
    let offset = (7 + date.weekday().num_days_from_monday()
        - first_day.num_days_from_monday())
        % 7;
    date.checked_sub_days(chrono::Days::new(u64::from(offset)))
        .unwrap_or(NaiveDate::MIN)
}

/// Whole weeks between the week containing `from` and the week containing `to`.
/// Negative when `to` lies in an earlier week.
pub fn weeks_between(from: NaiveDate, to: NaiveDate, first_day: Weekday) -> i64 {
    let days = (week_start(to, first_day) - week_start(from, first_day)).num_days();
    days.div_euclid(7)
}

pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

pub fn year_start(date: NaiveDate) -> NaiveDate {
    date.with_ordinal(1).unwrap_or(date)
}

/// Inclusive range of calendar days. A range whose start is after its end is
/// empty rather than invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Range spanning the civil dates of two timestamps.
    pub fn from_timestamps<Tz: TimeZone>(start: &DateTime<Tz>, end: &DateTime<Tz>) -> Self {
        Self::new(civil_date(start), civil_date(end))
    }

    pub fn single(day: NaiveDate) -> Self {
        Self::new(day, day)
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Overlap of two ranges; empty when they are disjoint.
    #[must_use]
    pub fn intersect(&self, other: &DateRange) -> DateRange {
        DateRange::new(self.start.max(other.start), self.end.min(other.end))
    }

    /// Days in the range, ascending.
    pub fn days(&self) -> DayIter {
        DayIter {
            next: (!self.is_empty()).then_some(self.start),
            end: self.end,
        }
    }

    pub fn len_days(&self) -> u64 {
        if self.is_empty() {
            0
        } else {
            (self.end - self.start).num_days().unsigned_abs() + 1
        }
    }
}

/// Iterator over the days of a [`DateRange`].
#[derive(Debug, Clone)]
pub struct DayIter {
    next: Option<NaiveDate>,
    end: NaiveDate,
}

impl Iterator for DayIter {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<NaiveDate> {
        let current = self.next?;
        self.next = current.succ_opt().filter(|d| *d <= self.end);
        Some(current)
    }
}
