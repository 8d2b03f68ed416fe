use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ulid::Ulid;

use crate::events::{SharedEventKind, SharedHabitEvent};
use crate::model::{HabitDefinition, SharedHabitId, UserId};
use crate::recurrence::RecurrenceEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionStatus {
    Complete,
    Incomplete,
}

/// How a shared habit ended for both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Termination {
    /// Owner withdrew a pending request.
    Cancelled,
    /// Either side removed an active shared habit.
    Deleted { by: UserId },
}

/// Whole-entity lifecycle, derived from request status and termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SharedState {
    Pending,
    Active,
    Rejected,
    Cancelled,
    Deleted,
}

impl fmt::Display for SharedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SharedState::Pending => "pending",
            SharedState::Active => "active",
            SharedState::Rejected => "rejected",
            SharedState::Cancelled => "cancelled",
            SharedState::Deleted => "deleted",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SharedError {
    #[error("request already actioned (now {current})")]
    AlreadyActioned { current: SharedState },
    #[error("shared habit is not active (now {current})")]
    NotActive { current: SharedState },
    #[error("user {user} is not part of this shared habit")]
    NotMember { user: UserId },
    #[error("only user {expected} may perform this action, not {user}")]
    WrongActor { user: UserId, expected: UserId },
    #[error("a habit cannot be shared with its owner")]
    SelfShare,
}

impl SharedError {
    /// True when a retried transition already landed in the requested state,
    /// so the caller can treat the failure as success.
    pub fn settles(&self, requested: SharedState) -> bool {
        matches!(self, SharedError::AlreadyActioned { current } if *current == requested)
    }
}

/// A habit shared between its owner and exactly one participant.
///
/// Completion entries are keyed by `(user, date)`; re-tracking overwrites.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedHabit {
    pub shared_habit_id: SharedHabitId,
    pub habit: HabitDefinition,
    pub owner_id: UserId,
    pub participant_id: UserId,
    pub request_status: RequestStatus,
    #[serde(default)]
    pub termination: Option<Termination>,
    #[serde(default, with = "completion_entries")]
    completion_status: BTreeMap<(UserId, NaiveDate), CompletionStatus>,
    pub requested_at: DateTime<Utc>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Two-state comparison for one date; no entry counts as not completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub date: NaiveDate,
    pub owner_completed: bool,
    pub participant_completed: bool,
}

/// Progress over the due dates of a range.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressReport {
    pub days: Vec<Progress>,
    pub due: u32,
    pub owner_completed: u32,
    pub participant_completed: u32,
    pub both_completed: u32,
}

impl SharedHabit {
    /// Owner offers `habit` to `participant_id`; starts pending.
    pub fn request(
        habit: HabitDefinition,
        participant_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<(Self, SharedHabitEvent), SharedError> {
        if habit.owner_id == participant_id {
            return Err(SharedError::SelfShare);
        }
        let shared = Self {
            shared_habit_id: Ulid::new(),
            owner_id: habit.owner_id,
            participant_id,
            habit,
            request_status: RequestStatus::Pending,
            termination: None,
            completion_status: BTreeMap::new(),
            requested_at: now,
            resolved_at: None,
        };
        tracing::info!(
            shared_habit_id = %shared.shared_habit_id,
            owner = %shared.owner_id,
            participant = %participant_id,
            "shared habit requested"
        );
        let event = shared.event(shared.owner_id, SharedEventKind::Requested, now);
        Ok((shared, event))
    }

    pub fn state(&self) -> SharedState {
        match (self.termination, self.request_status) {
            (Some(Termination::Cancelled), _) => SharedState::Cancelled,
            (Some(Termination::Deleted { .. }), _) => SharedState::Deleted,
            (None, RequestStatus::Pending) => SharedState::Pending,
            (None, RequestStatus::Accepted) => SharedState::Active,
            (None, RequestStatus::Rejected) => SharedState::Rejected,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state() == SharedState::Active
    }

    pub fn is_member(&self, user: UserId) -> bool {
        user == self.owner_id || user == self.participant_id
    }

    /// The other side of the pair.
    pub fn counterpart(&self, user: UserId) -> Option<UserId> {
        if user == self.owner_id {
            Some(self.participant_id)
        } else if user == self.participant_id {
            Some(self.owner_id)
        } else {
            None
        }
    }

    pub fn accept(
        &mut self,
        by: UserId,
        now: DateTime<Utc>,
    ) -> Result<SharedHabitEvent, SharedError> {
        self.resolve(by, RequestStatus::Accepted, now)
    }

    pub fn reject(
        &mut self,
        by: UserId,
        now: DateTime<Utc>,
    ) -> Result<SharedHabitEvent, SharedError> {
        self.resolve(by, RequestStatus::Rejected, now)
    }

    /// Owner withdraws a pending request.
    pub fn cancel(
        &mut self,
        by: UserId,
        now: DateTime<Utc>,
    ) -> Result<SharedHabitEvent, SharedError> {
        if by != self.owner_id {
            return Err(SharedError::WrongActor {
                user: by,
                expected: self.owner_id,
            });
        }
        self.ensure_pending()?;
        self.termination = Some(Termination::Cancelled);
        self.resolved_at = Some(now);
        tracing::info!(shared_habit_id = %self.shared_habit_id, "shared habit request cancelled");
        Ok(self.event(by, SharedEventKind::Cancelled, now))
    }

    /// Upsert `(user, date)`; the last write wins.
    pub fn track(
        &mut self,
        user: UserId,
        date: NaiveDate,
        completed: bool,
        now: DateTime<Utc>,
    ) -> Result<SharedHabitEvent, SharedError> {
        if !self.is_member(user) {
            return Err(SharedError::NotMember { user });
        }
        let current = self.state();
        if current != SharedState::Active {
            return Err(SharedError::NotActive { current });
        }
        let status = if completed {
            CompletionStatus::Complete
        } else {
            CompletionStatus::Incomplete
        };
        self.completion_status.insert((user, date), status);
        tracing::debug!(
            shared_habit_id = %self.shared_habit_id,
            %user,
            %date,
            completed,
            "shared habit tracked"
        );
        Ok(self.event(user, SharedEventKind::Tracked { date, completed }, now))
    }

    /// Either side ends an active shared habit for both.
    pub fn delete(
        &mut self,
        by: UserId,
        now: DateTime<Utc>,
    ) -> Result<SharedHabitEvent, SharedError> {
        if !self.is_member(by) {
            return Err(SharedError::NotMember { user: by });
        }
        match self.state() {
            SharedState::Active => {}
            current @ (SharedState::Cancelled | SharedState::Deleted) => {
                return Err(SharedError::AlreadyActioned { current });
            }
            current @ (SharedState::Pending | SharedState::Rejected) => {
                return Err(SharedError::NotActive { current });
            }
        }
        self.termination = Some(Termination::Deleted { by });
        tracing::info!(shared_habit_id = %self.shared_habit_id, %by, "shared habit deleted");
        Ok(self.event(by, SharedEventKind::Deleted, now))
    }

    /// The explicit entry for `(user, date)`, if that user acted on it.
    pub fn status_for(&self, user: UserId, date: NaiveDate) -> Option<CompletionStatus> {
        self.completion_status.get(&(user, date)).copied()
    }

    pub fn is_completed_by(&self, user: UserId, date: NaiveDate) -> bool {
        self.status_for(user, date) == Some(CompletionStatus::Complete)
    }

    pub fn progress(&self, date: NaiveDate) -> Progress {
        Progress {
            date,
            owner_completed: self.is_completed_by(self.owner_id, date),
            participant_completed: self.is_completed_by(self.participant_id, date),
        }
    }

    /// Due dates of the wrapped habit; both sides share the same series.
    pub fn due_dates(
        &self,
        engine: &RecurrenceEngine,
        range_start: NaiveDate,
        range_end: NaiveDate,
    ) -> Vec<NaiveDate> {
        engine.expand(&self.habit, range_start, range_end)
    }

    pub fn progress_report(
        &self,
        engine: &RecurrenceEngine,
        range_start: NaiveDate,
        range_end: NaiveDate,
    ) -> ProgressReport {
        let mut report = ProgressReport::default();
        for date in self.due_dates(engine, range_start, range_end) {
            let day = self.progress(date);
            report.due += 1;
            report.owner_completed += u32::from(day.owner_completed);
            report.participant_completed += u32::from(day.participant_completed);
            report.both_completed += u32::from(day.owner_completed && day.participant_completed);
            report.days.push(day);
        }
        report
    }

    fn resolve(
        &mut self,
        by: UserId,
        target: RequestStatus,
        now: DateTime<Utc>,
    ) -> Result<SharedHabitEvent, SharedError> {
        if by != self.participant_id {
            return Err(SharedError::WrongActor {
                user: by,
                expected: self.participant_id,
            });
        }
        self.ensure_pending()?;
        self.request_status = target;
        self.resolved_at = Some(now);
        tracing::info!(
            shared_habit_id = %self.shared_habit_id,
            status = ?target,
            "shared habit request resolved"
        );
        let kind = match target {
            RequestStatus::Accepted => SharedEventKind::Accepted,
            RequestStatus::Rejected | RequestStatus::Pending => SharedEventKind::Rejected,
        };
        Ok(self.event(by, kind, now))
    }

    fn ensure_pending(&self) -> Result<(), SharedError> {
        match self.state() {
            SharedState::Pending => Ok(()),
            current => {
                tracing::warn!(
                    shared_habit_id = %self.shared_habit_id,
                    %current,
                    "shared habit request already actioned"
                );
                Err(SharedError::AlreadyActioned { current })
            }
        }
    }

    fn event(&self, actor: UserId, kind: SharedEventKind, now: DateTime<Utc>) -> SharedHabitEvent {
        SharedHabitEvent {
            shared_habit_id: self.shared_habit_id,
            habit_id: self.habit.habit_id,
            actor,
            recipient: self.counterpart(actor).unwrap_or(self.owner_id),
            kind,
            occurred_at: now,
        }
    }
}

/// `(user, date) -> status` as a list of entries, since JSON keys must be strings.
mod completion_entries {
    use std::collections::BTreeMap;

    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::CompletionStatus;
    use crate::model::UserId;

    #[derive(Serialize, Deserialize)]
    struct Entry {
        user_id: UserId,
        date: NaiveDate,
        status: CompletionStatus,
    }

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<(UserId, NaiveDate), CompletionStatus>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(map.iter().map(|(&(user_id, date), &status)| Entry {
            user_id,
            date,
            status,
        }))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<(UserId, NaiveDate), CompletionStatus>, D::Error> {
        let entries = Vec::<Entry>::deserialize(deserializer)?;
        Ok(entries
            .into_iter()
            .map(|e| ((e.user_id, e.date), e.status))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DayOfWeek;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn pending() -> SharedHabit {
        let habit = HabitDefinition::new(Ulid::new(), "Run", date(2024, 1, 1)).daily();
        SharedHabit::request(habit, Ulid::new(), Utc::now()).unwrap().0
    }

    fn active() -> SharedHabit {
        let mut shared = pending();
        shared.accept(shared.participant_id, Utc::now()).unwrap();
        shared
    }

    #[test]
    fn request_starts_pending_and_notifies_participant() {
        let habit = HabitDefinition::new(Ulid::new(), "Run", date(2024, 1, 1));
        let participant = Ulid::new();
        let (shared, event) = SharedHabit::request(habit, participant, Utc::now()).unwrap();
        assert_eq!(shared.state(), SharedState::Pending);
        assert_eq!(event.kind, SharedEventKind::Requested);
        assert_eq!(event.recipient, participant);
    }

    #[test]
    fn cannot_share_with_self() {
        let owner = Ulid::new();
        let habit = HabitDefinition::new(owner, "Run", date(2024, 1, 1));
        assert_eq!(
            SharedHabit::request(habit, owner, Utc::now()).unwrap_err(),
            SharedError::SelfShare
        );
    }

    #[test]
    fn accept_activates_and_notifies_owner() {
        let mut shared = pending();
        let event = shared.accept(shared.participant_id, Utc::now()).unwrap();
        assert_eq!(shared.state(), SharedState::Active);
        assert_eq!(shared.request_status, RequestStatus::Accepted);
        assert!(shared.resolved_at.is_some());
        assert_eq!(event.recipient, shared.owner_id);
    }

    #[test]
    fn only_participant_resolves() {
        let mut shared = pending();
        let err = shared.accept(shared.owner_id, Utc::now()).unwrap_err();
        assert!(matches!(err, SharedError::WrongActor { .. }));
        assert_eq!(shared.state(), SharedState::Pending);
    }

    #[test]
    fn rejected_is_terminal() {
        let mut shared = pending();
        let participant = shared.participant_id;
        shared.reject(participant, Utc::now()).unwrap();
        for _ in 0..3 {
            let err = shared.accept(participant, Utc::now()).unwrap_err();
            assert_eq!(
                err,
                SharedError::AlreadyActioned {
                    current: SharedState::Rejected
                }
            );
            assert!(err.settles(SharedState::Rejected));
            assert!(!err.settles(SharedState::Active));
            let err = shared.reject(participant, Utc::now()).unwrap_err();
            assert!(err.settles(SharedState::Rejected));
        }
        assert_eq!(shared.state(), SharedState::Rejected);
        assert!(matches!(
            shared.track(participant, date(2024, 1, 1), true, Utc::now()),
            Err(SharedError::NotActive { .. })
        ));
    }

    #[test]
    fn cancel_vs_accept_has_a_single_winner() {
        let mut shared = pending();
        shared.cancel(shared.owner_id, Utc::now()).unwrap();
        let err = shared.accept(shared.participant_id, Utc::now()).unwrap_err();
        assert_eq!(
            err,
            SharedError::AlreadyActioned {
                current: SharedState::Cancelled
            }
        );

        let mut shared = pending();
        shared.accept(shared.participant_id, Utc::now()).unwrap();
        let err = shared.cancel(shared.owner_id, Utc::now()).unwrap_err();
        assert_eq!(
            err,
            SharedError::AlreadyActioned {
                current: SharedState::Active
            }
        );
        // The owner asked to cancel; an active habit is a conflict, not a retry.
        assert!(!err.settles(SharedState::Cancelled));
        assert_eq!(shared.state(), SharedState::Active);
    }

    #[test]
    fn tracking_is_an_upsert_per_user_and_date() {
        let mut shared = active();
        let owner = shared.owner_id;
        let d = date(2024, 1, 5);
        shared.track(owner, d, true, Utc::now()).unwrap();
        shared.track(owner, d, false, Utc::now()).unwrap();
        shared.track(owner, d, true, Utc::now()).unwrap();
        assert_eq!(shared.status_for(owner, d), Some(CompletionStatus::Complete));
        assert_eq!(shared.completion_status.len(), 1);
    }

    #[test]
    fn progress_is_two_state() {
        let mut shared = active();
        let d = date(2024, 1, 5);
        shared.track(shared.owner_id, d, true, Utc::now()).unwrap();
        assert_eq!(
            shared.progress(d),
            Progress {
                date: d,
                owner_completed: true,
                participant_completed: false
            }
        );

        shared.track(shared.participant_id, d, false, Utc::now()).unwrap();
        assert!(!shared.progress(d).participant_completed);
        assert_eq!(
            shared.status_for(shared.participant_id, d),
            Some(CompletionStatus::Incomplete)
        );
    }

    #[test]
    fn outsiders_cannot_track_or_delete() {
        let mut shared = active();
        let stranger = Ulid::new();
        assert_eq!(
            shared.track(stranger, date(2024, 1, 1), true, Utc::now()),
            Err(SharedError::NotMember { user: stranger })
        );
        assert_eq!(
            shared.delete(stranger, Utc::now()),
            Err(SharedError::NotMember { user: stranger })
        );
    }

    #[test]
    fn delete_ends_for_both_sides() {
        let mut shared = active();
        let participant = shared.participant_id;
        let event = shared.delete(participant, Utc::now()).unwrap();
        assert_eq!(event.recipient, shared.owner_id);
        assert_eq!(shared.state(), SharedState::Deleted);
        assert_eq!(
            shared.termination,
            Some(Termination::Deleted { by: participant })
        );
        assert!(shared
            .delete(shared.owner_id, Utc::now())
            .unwrap_err()
            .settles(SharedState::Deleted));
        assert!(matches!(
            shared.track(shared.owner_id, date(2024, 1, 1), true, Utc::now()),
            Err(SharedError::NotActive { current: SharedState::Deleted })
        ));
    }

    #[test]
    fn progress_report_counts_due_dates_only() {
        let habit = HabitDefinition::new(Ulid::new(), "Swim", date(2024, 1, 1))
            .weekly([DayOfWeek::Mon], 1);
        let participant = Ulid::new();
        let (mut shared, _) = SharedHabit::request(habit, participant, Utc::now()).unwrap();
        shared.accept(participant, Utc::now()).unwrap();
        let owner = shared.owner_id;
        shared.track(owner, date(2024, 1, 1), true, Utc::now()).unwrap();
        shared.track(owner, date(2024, 1, 8), true, Utc::now()).unwrap();
        shared.track(participant, date(2024, 1, 8), true, Utc::now()).unwrap();
        // Not a due date; ignored by the report.
        shared.track(participant, date(2024, 1, 9), true, Utc::now()).unwrap();

        let report = shared.progress_report(
            &RecurrenceEngine::default(),
            date(2024, 1, 1),
            date(2024, 1, 21),
        );
        assert_eq!(report.due, 3);
        assert_eq!(report.owner_completed, 2);
        assert_eq!(report.participant_completed, 1);
        assert_eq!(report.both_completed, 1);
        assert_eq!(report.days.len(), 3);
    }

    #[test]
    fn serde_round_trip_keeps_completion_entries() {
        let mut shared = active();
        shared
            .track(shared.owner_id, date(2024, 1, 2), true, Utc::now())
            .unwrap();
        let json = serde_json::to_string(&shared).unwrap();
        let back: SharedHabit = serde_json::from_str(&json).unwrap();
        assert_eq!(back, shared);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["completion_status"][0]["status"], "complete");
    }
}
