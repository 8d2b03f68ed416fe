//! Completion statistics over the due dates of a habit.
//!
//! Only generated, non-deleted dates count; completion marks on any other date
//! are orphans and ignored.

use std::collections::BTreeMap;

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::calendar::{month_start, week_start, year_start, DateRange};
use crate::model::HabitDefinition;
use crate::occurrence::{due_dates, OccurrenceState};
use crate::recurrence::RecurrenceEngine;

/// Upper bound on buckets per query: ten years of days.
pub const MAX_BUCKETS: usize = 3660;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StatsError {
    #[error("{start}..={end} needs more than {max} {granularity:?} buckets")]
    TooManyBuckets {
        start: NaiveDate,
        end: NaiveDate,
        granularity: Granularity,
        max: usize,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub due: u32,
    pub complete: u32,
    /// `complete / due`, or 0 when nothing was due.
    pub rate: f64,
}

impl Summary {
    fn record(&mut self, completed: bool) {
        self.due += 1;
        self.complete += u32::from(completed);
        self.rate = f64::from(self.complete) / f64::from(self.due);
    }

    pub fn incomplete(&self) -> u32 {
        self.due - self.complete
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Day,
    Week,
    Month,
    Year,
}

/// One chart bucket, keyed by the first day of its calendar unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub period_start: NaiveDate,
    pub summary: Summary,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Streaks {
    /// Completed due dates in a row, ending at the last due date in range.
    pub current: u32,
    pub longest: u32,
}

pub fn summarize(
    engine: &RecurrenceEngine,
    definition: &HabitDefinition,
    state: &OccurrenceState,
    range_start: NaiveDate,
    range_end: NaiveDate,
) -> Summary {
    let mut summary = Summary::default();
    for date in due_dates(engine, definition, state, range_start, range_end) {
        summary.record(state.is_complete(date));
    }
    summary
}

/// Start of the calendar unit containing `date`.
pub fn period_start(
    engine: &RecurrenceEngine,
    granularity: Granularity,
    date: NaiveDate,
) -> NaiveDate {
    match granularity {
        Granularity::Day => date,
        Granularity::Week => week_start(date, engine.week_start()),
        Granularity::Month => month_start(date),
        Granularity::Year => year_start(date),
    }
}

fn next_period(granularity: Granularity, start: NaiveDate) -> Option<NaiveDate> {
    match granularity {
        Granularity::Day => start.succ_opt(),
        Granularity::Week => start.checked_add_days(chrono::Days::new(7)),
        Granularity::Month => start.checked_add_months(Months::new(1)),
        Granularity::Year => start.with_year(start.year() + 1),
    }
}

/// Per-unit summaries for every unit the range touches, including empty ones.
/// Fails when that would take more than [`MAX_BUCKETS`] buckets.
pub fn bucketize(
    engine: &RecurrenceEngine,
    definition: &HabitDefinition,
    state: &OccurrenceState,
    range_start: NaiveDate,
    range_end: NaiveDate,
    granularity: Granularity,
) -> Result<Vec<Bucket>, StatsError> {
    let range = DateRange::new(range_start, range_end);
    if range.is_empty() {
        return Ok(Vec::new());
    }

    let mut buckets: BTreeMap<NaiveDate, Summary> = BTreeMap::new();
    let mut cursor = Some(period_start(engine, granularity, range_start));
    while let Some(start) = cursor.filter(|d| *d <= range_end) {
        if buckets.len() == MAX_BUCKETS {
            return Err(StatsError::TooManyBuckets {
                start: range_start,
                end: range_end,
                granularity,
                max: MAX_BUCKETS,
            });
        }
        buckets.insert(start, Summary::default());
        cursor = next_period(granularity, start);
    }

    for date in due_dates(engine, definition, state, range_start, range_end) {
        buckets
            .entry(period_start(engine, granularity, date))
            .or_default()
            .record(state.is_complete(date));
    }

    Ok(buckets
        .into_iter()
        .map(|(period_start, summary)| Bucket {
            period_start,
            summary,
        })
        .collect())
}

pub fn streaks(
    engine: &RecurrenceEngine,
    definition: &HabitDefinition,
    state: &OccurrenceState,
    range_start: NaiveDate,
    range_end: NaiveDate,
) -> Streaks {
    let due = due_dates(engine, definition, state, range_start, range_end);

    let current = due
        .iter()
        .rev()
        .take_while(|d| state.is_complete(**d))
        .fold(0u32, |n, _| n + 1);

    let mut longest = 0u32;
    let mut run = 0u32;
    for d in &due {
        if state.is_complete(*d) {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 0;
        }
    }

    Streaks { current, longest }
}
