//! Recurrence expansion: the ideal series of due dates for a definition.
//!
//! Expansion is total. Already-persisted definitions are never re-validated
//! here; malformed fields degrade to an empty or shorter series instead of an
//! error. Deleted occurrences are applied downstream by [`crate::occurrence`].

use chrono::{Datelike, Days, NaiveDate, Weekday};

use crate::calendar::{week_start, weeks_between, DateRange};
use crate::config::RecurrenceConfig;
use crate::model::{DayOfWeek, HabitDefinition, RepeatType};

/// Expands definitions against a query window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecurrenceEngine {
    week_start: Weekday,
}

impl Default for RecurrenceEngine {
    fn default() -> Self {
        Self {
            week_start: Weekday::Mon,
        }
    }
}

impl RecurrenceEngine {
    pub fn new(config: &RecurrenceConfig) -> Self {
        Self {
            week_start: config.week_start.into(),
        }
    }

    /// First day of a week for interval counting and weekly buckets.
    pub fn week_start(&self) -> Weekday {
        self.week_start
    }

    /// Due dates within `[range_start, range_end]`, ascending and unique.
    ///
    /// A `repeat_count` caps the lifetime series counted from `start_date`,
    /// independent of the query window.
    pub fn expand(
        &self,
        definition: &HabitDefinition,
        range_start: NaiveDate,
        range_end: NaiveDate,
    ) -> Vec<NaiveDate> {
        let window = DateRange::new(range_start, range_end);
        if window.is_empty() || definition.start_date > range_end {
            return Vec::new();
        }

        let dates = match definition.repeat_type {
            RepeatType::None => expand_single(definition, window),
            RepeatType::Daily => expand_daily(definition, window),
            RepeatType::Weekly => self.expand_weekly(definition, window),
            RepeatType::Monthly => expand_monthly(definition, window),
        };

        tracing::trace!(
            habit_id = %definition.habit_id,
            repeat_type = ?definition.repeat_type,
            %range_start,
            %range_end,
            count = dates.len(),
            "expanded recurrence"
        );
        dates
    }

    /// Whether `date` belongs to the ideal series.
    pub fn occurs_on(&self, definition: &HabitDefinition, date: NaiveDate) -> bool {
        !self.expand(definition, date, date).is_empty()
    }

    /// First due date strictly after `after`, if the series has one.
    pub fn next_occurrence(
        &self,
        definition: &HabitDefinition,
        after: NaiveDate,
    ) -> Option<NaiveDate> {
        let from = after.succ_opt()?.max(definition.start_date);
        let horizon_days = match definition.repeat_type {
            RepeatType::None | RepeatType::Daily => 0,
            // One full interval plus a week always contains the next qualifying day.
            RepeatType::Weekly => 7 * u64::from(definition.weekly_interval_weeks.max(1)) + 7,
            RepeatType::Monthly => {
                return self
                    .expand(definition, from, NaiveDate::MAX)
                    .into_iter()
                    .next();
            }
        };
        let until = match definition.repeat_type {
            RepeatType::None => definition.end_date.unwrap_or(definition.start_date),
            _ => from
                .checked_add_days(chrono::Days::new(horizon_days))
                .unwrap_or(NaiveDate::MAX),
        };
        self.expand(definition, from, until).into_iter().next()
    }

    /// Qualifying weekly dates in `[from, until]`, ascending. Only active weeks
    /// (a multiple of the interval away from the start week) are visited.
    fn weekly_dates<'a>(
        &self,
        definition: &'a HabitDefinition,
        from: NaiveDate,
        until: NaiveDate,
    ) -> impl Iterator<Item = NaiveDate> + 'a {
        let interval = i64::from(definition.weekly_interval_weeks.max(1));
        let anchor = week_start(definition.start_date, self.week_start);
        let from = from.max(definition.start_date);
        let skipped = weeks_between(definition.start_date, from, self.week_start).max(0);
        let first_active = (skipped + interval - 1) / interval;

        (first_active..)
            .map_while(move |n| {
                let offset = n.checked_mul(interval)?.checked_mul(7)?;
                anchor.checked_add_days(Days::new(u64::try_from(offset).ok()?))
            })
            .take_while(move |week| *week <= until)
            .flat_map(|week| (0..7).filter_map(move |i| week.checked_add_days(Days::new(i))))
            .filter(move |d| {
                *d >= from
                    && *d <= until
                    && definition
                        .weekly_days
                        .contains(&DayOfWeek::from(d.weekday()))
            })
    }

    fn expand_weekly(&self, definition: &HabitDefinition, window: DateRange) -> Vec<NaiveDate> {
        if definition.weekly_days.is_empty() {
            return Vec::new();
        }

        match definition.repeat_count {
            None => self
                .weekly_dates(definition, window.start, window.end)
                .collect(),
            // The cap counts from start_date, so walk the whole prefix.
            Some(limit) => self
                .weekly_dates(definition, definition.start_date, window.end)
                .take(usize::try_from(limit).unwrap_or(usize::MAX))
                .filter(|d| window.contains(*d))
                .collect(),
        }
    }
}

/// Expand with the default engine (weeks start on Monday).
pub fn expand(
    definition: &HabitDefinition,
    range_start: NaiveDate,
    range_end: NaiveDate,
) -> Vec<NaiveDate> {
    RecurrenceEngine::default().expand(definition, range_start, range_end)
}

fn expand_single(definition: &HabitDefinition, window: DateRange) -> Vec<NaiveDate> {
    let series = DateRange::new(
        definition.start_date,
        definition.end_date.unwrap_or(definition.start_date),
    );
    series.intersect(&window).days().collect()
}

fn expand_daily(definition: &HabitDefinition, window: DateRange) -> Vec<NaiveDate> {
    let last = match definition.repeat_count {
        Some(0) => return Vec::new(),
        Some(limit) => definition
            .start_date
            .checked_add_days(chrono::Days::new(u64::from(limit - 1)))
            .unwrap_or(NaiveDate::MAX),
        None => NaiveDate::MAX,
    };
    DateRange::new(definition.start_date, last)
        .intersect(&window)
        .days()
        .collect()
}

fn expand_monthly(definition: &HabitDefinition, window: DateRange) -> Vec<NaiveDate> {
    let limit = definition
        .repeat_count
        .map_or(usize::MAX, |n| usize::try_from(n).unwrap_or(usize::MAX));
    definition
        .monthly_dates
        .iter()
        .copied()
        .filter(|d| *d >= definition.start_date)
        .take(limit)
        .filter(|d| window.contains(*d))
        .collect()
}
