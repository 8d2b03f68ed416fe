use std::collections::BTreeSet;

use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ulid::Ulid;

/// Stable identifiers.
pub type HabitId = Ulid;
pub type SharedHabitId = Ulid;
pub type UserId = Ulid;

/// Upper bound on `repeat_count` unless configured otherwise.
pub const DEFAULT_MAX_REPEAT_COUNT: u32 = 365;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatType {
    None,
    Daily,
    Weekly,
    Monthly,
}

impl RepeatType {
    pub fn is_repeating(self) -> bool {
        !matches!(self, RepeatType::None)
    }
}

/// Weekday with a total order (Mon first), so it can live in ordered sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayOfWeek {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl From<Weekday> for DayOfWeek {
    fn from(day: Weekday) -> Self {
        match day {
            Weekday::Mon => DayOfWeek::Mon,
            Weekday::Tue => DayOfWeek::Tue,
            Weekday::Wed => DayOfWeek::Wed,
            Weekday::Thu => DayOfWeek::Thu,
            Weekday::Fri => DayOfWeek::Fri,
            Weekday::Sat => DayOfWeek::Sat,
            Weekday::Sun => DayOfWeek::Sun,
        }
    }
}

impl From<DayOfWeek> for Weekday {
    fn from(day: DayOfWeek) -> Self {
        match day {
            DayOfWeek::Mon => Weekday::Mon,
            DayOfWeek::Tue => Weekday::Tue,
            DayOfWeek::Wed => Weekday::Wed,
            DayOfWeek::Thu => Weekday::Thu,
            DayOfWeek::Fri => Weekday::Fri,
            DayOfWeek::Sat => Weekday::Sat,
            DayOfWeek::Sun => Weekday::Sun,
        }
    }
}

fn default_interval() -> u32 {
    1
}

/// A habit and its recurrence definition.
///
/// `end_date` is only meaningful for non-repeating habits, where it turns the
/// single start date into a continuous daily window. `repeat_count` caps the
/// lifetime series of repeating habits. See [`validate_definition`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HabitDefinition {
    pub habit_id: HabitId,
    pub owner_id: UserId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub start_date: NaiveDate,
    pub repeat_type: RepeatType,
    #[serde(default)]
    pub weekly_days: BTreeSet<DayOfWeek>,
    #[serde(default = "default_interval")]
    pub weekly_interval_weeks: u32,
    /// Explicit due dates, not a day-of-month rule.
    #[serde(default)]
    pub monthly_dates: BTreeSet<NaiveDate>,
    /// Stored for display; explicit dates drive generation.
    #[serde(default = "default_interval")]
    pub monthly_interval_months: u32,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub repeat_count: Option<u32>,
    /// Day counts before an occurrence; carried through untouched.
    #[serde(default)]
    pub reminder_offsets: BTreeSet<u32>,
}

impl HabitDefinition {
    /// A non-repeating habit due only on `start_date`.
    pub fn new(owner_id: UserId, name: impl Into<String>, start_date: NaiveDate) -> Self {
        Self {
            habit_id: Ulid::new(),
            owner_id,
            name: name.into(),
            description: String::new(),
            start_date,
            repeat_type: RepeatType::None,
            weekly_days: BTreeSet::new(),
            weekly_interval_weeks: 1,
            monthly_dates: BTreeSet::new(),
            monthly_interval_months: 1,
            end_date: None,
            repeat_count: None,
            reminder_offsets: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn daily(mut self) -> Self {
        self.repeat_type = RepeatType::Daily;
        self
    }

    #[must_use]
    pub fn weekly(mut self, days: impl IntoIterator<Item = DayOfWeek>, every_weeks: u32) -> Self {
        self.repeat_type = RepeatType::Weekly;
        self.weekly_days = days.into_iter().collect();
        self.weekly_interval_weeks = every_weeks;
        self
    }

    #[must_use]
    pub fn monthly(
        mut self,
        dates: impl IntoIterator<Item = NaiveDate>,
        every_months: u32,
    ) -> Self {
        self.repeat_type = RepeatType::Monthly;
        self.monthly_dates = dates.into_iter().collect();
        self.monthly_interval_months = every_months;
        self
    }

    #[must_use]
    pub fn with_repeat_count(mut self, count: u32) -> Self {
        self.repeat_count = Some(count);
        self
    }

    #[must_use]
    pub fn with_end_date(mut self, end: NaiveDate) -> Self {
        self.end_date = Some(end);
        self
    }

    #[must_use]
    pub fn with_reminders(mut self, offsets: impl IntoIterator<Item = u32>) -> Self {
        self.reminder_offsets = offsets.into_iter().collect();
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Errors when validating a habit definition.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("invalid {field}: {reason}")]
    InvalidDefinition { field: &'static str, reason: String },
    #[error("{field} {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },
}

impl ModelError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ModelError::InvalidDefinition {
            field,
            reason: reason.into(),
        }
    }

    /// The offending field, surfaced verbatim to callers.
    pub fn field(&self) -> &'static str {
        match self {
            ModelError::InvalidDefinition { field, .. } | ModelError::OutOfRange { field, .. } => {
                field
            }
        }
    }
}

/// Validate the recurrence invariants of a definition.
///
/// - Name must not be blank.
/// - Weekly needs at least one weekday, monthly at least one explicit date.
/// - Intervals are positive.
/// - `end_date` only on non-repeating habits and never before `start_date`.
/// - `repeat_count` only on repeating habits, within `[1, max_repeat_count]`.
/// - Reminder offsets only on repeating habits, each positive.
///
/// Monthly dates earlier than `start_date` are not an error; expansion drops them.
pub fn validate_definition(
    definition: &HabitDefinition,
    max_repeat_count: u32,
) -> Result<(), ModelError> {
    if definition.name.trim().is_empty() {
        return Err(ModelError::invalid("name", "habit name is required"));
    }

    match definition.repeat_type {
        RepeatType::Weekly if definition.weekly_days.is_empty() => {
            return Err(ModelError::invalid(
                "weekly_days",
                "weekly habits need at least one weekday",
            ));
        }
        RepeatType::Monthly if definition.monthly_dates.is_empty() => {
            return Err(ModelError::invalid(
                "monthly_dates",
                "monthly habits need at least one date",
            ));
        }
        _ => {}
    }

    if definition.weekly_interval_weeks == 0 {
        return Err(ModelError::invalid(
            "weekly_interval_weeks",
            "interval must be positive",
        ));
    }
    if definition.monthly_interval_months == 0 {
        return Err(ModelError::invalid(
            "monthly_interval_months",
            "interval must be positive",
        ));
    }

    if let Some(end) = definition.end_date {
        if definition.repeat_type.is_repeating() {
            return Err(ModelError::invalid(
                "end_date",
                "end date is only allowed on non-repeating habits",
            ));
        }
        if end < definition.start_date {
            return Err(ModelError::invalid(
                "end_date",
                format!("{end} is before start date {}", definition.start_date),
            ));
        }
    }

    if let Some(count) = definition.repeat_count {
        if !definition.repeat_type.is_repeating() {
            return Err(ModelError::invalid(
                "repeat_count",
                "repeat count is only allowed on repeating habits",
            ));
        }
        if count < 1 || count > max_repeat_count {
            return Err(ModelError::OutOfRange {
                field: "repeat_count",
                value: count,
                min: 1,
                max: max_repeat_count,
            });
        }
    }

    if !definition.reminder_offsets.is_empty() {
        if !definition.repeat_type.is_repeating() {
            return Err(ModelError::invalid(
                "reminder_offsets",
                "reminders are only allowed on repeating habits",
            ));
        }
        if definition.reminder_offsets.contains(&0) {
            return Err(ModelError::invalid(
                "reminder_offsets",
                "offsets must be positive day counts",
            ));
        }
    }

    Ok(())
}

/// Validation at creation time: everything in [`validate_definition`] plus a
/// start date that is not in the past relative to `today`.
pub fn validate_new_definition(
    definition: &HabitDefinition,
    today: NaiveDate,
    max_repeat_count: u32,
) -> Result<(), ModelError> {
    validate_definition(definition, max_repeat_count)?;
    if definition.start_date < today {
        return Err(ModelError::invalid(
            "start_date",
            format!("{} is in the past", definition.start_date),
        ));
    }
    Ok(())
}
