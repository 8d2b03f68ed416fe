use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::model::HabitDefinition;
use crate::recurrence::RecurrenceEngine;

/// Per-habit completion marks and deleted occurrences.
///
/// Entries for dates the current recurrence no longer generates are kept and
/// ignored on read; nothing here purges them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccurrenceState {
    #[serde(default)]
    pub completion_dates: BTreeSet<NaiveDate>,
    #[serde(default)]
    pub deleted_occurrences: BTreeSet<NaiveDate>,
}

/// What `delete_occurrence` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OccurrenceDeletion {
    /// The date was added to the deleted set.
    Excluded,
    /// The date is the series start; the caller must delete the whole habit.
    /// State is left untouched.
    SeriesDeletionRequired,
}

impl OccurrenceState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_complete(&self, date: NaiveDate) -> bool {
        self.completion_dates.contains(&date)
    }

    pub fn is_deleted(&self, date: NaiveDate) -> bool {
        self.deleted_occurrences.contains(&date)
    }

    /// Set or clear the completion mark. Returns whether anything changed.
    pub fn set_completion(&mut self, date: NaiveDate, completed: bool) -> bool {
        if completed {
            self.completion_dates.insert(date)
        } else {
            self.completion_dates.remove(&date)
        }
    }
}

/// Due means generated by the recurrence and not deleted.
pub fn is_due(
    engine: &RecurrenceEngine,
    definition: &HabitDefinition,
    state: &OccurrenceState,
    date: NaiveDate,
) -> bool {
    !state.is_deleted(date) && engine.occurs_on(definition, date)
}

pub fn is_complete(state: &OccurrenceState, date: NaiveDate) -> bool {
    state.is_complete(date)
}

/// Idempotent set/unset of a completion mark.
#[must_use]
pub fn toggle_completion(
    mut state: OccurrenceState,
    date: NaiveDate,
    completed: bool,
) -> OccurrenceState {
    state.set_completion(date, completed);
    state
}

/// Remove a single occurrence from the series.
///
/// Deleting the start date is equivalent to deleting the whole habit, which is
/// the caller's decision; this returns [`OccurrenceDeletion::SeriesDeletionRequired`]
/// without touching state. A completion mark on the deleted date is kept.
pub fn delete_occurrence(
    definition: &HabitDefinition,
    state: &mut OccurrenceState,
    date: NaiveDate,
) -> OccurrenceDeletion {
    if date == definition.start_date {
        return OccurrenceDeletion::SeriesDeletionRequired;
    }
    state.deleted_occurrences.insert(date);
    OccurrenceDeletion::Excluded
}

/// Expanded series minus deleted occurrences.
pub fn due_dates(
    engine: &RecurrenceEngine,
    definition: &HabitDefinition,
    state: &OccurrenceState,
    range_start: NaiveDate,
    range_end: NaiveDate,
) -> Vec<NaiveDate> {
    engine
        .expand(definition, range_start, range_end)
        .into_iter()
        .filter(|d| !state.is_deleted(*d))
        .collect()
}

/// A due date with its completion mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    pub date: NaiveDate,
    pub completed: bool,
}

pub fn occurrences(
    engine: &RecurrenceEngine,
    definition: &HabitDefinition,
    state: &OccurrenceState,
    range_start: NaiveDate,
    range_end: NaiveDate,
) -> Vec<Occurrence> {
    due_dates(engine, definition, state, range_start, range_end)
        .into_iter()
        .map(|date| Occurrence {
            date,
            completed: state.is_complete(date),
        })
        .collect()
}
