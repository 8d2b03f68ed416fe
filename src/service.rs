//! Request-level control flow: authenticate, load, apply, save, notify.
//!
//! Every operation takes the acting [`Credential`] and the current instant
//! explicitly. Storage atomicity comes from the repository; this layer holds
//! no state of its own beyond configuration.

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use crate::config::Config;
use crate::credential::{Credential, CredentialError};
use crate::events::{EventSink, SharedEventKind, SharedHabitEvent};
use crate::model::{
    validate_definition, validate_new_definition, HabitDefinition, HabitId, ModelError,
    SharedHabitId, UserId,
};
use crate::occurrence::{self, Occurrence, OccurrenceDeletion};
use crate::recurrence::RecurrenceEngine;
use crate::shared::{Progress, ProgressReport, SharedError, SharedHabit, SharedState};
use crate::stats::{self, Bucket, Granularity, StatsError, Streaks, Summary};
use crate::store::{HabitRecord, HabitRepository, StoreError};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Shared(#[from] SharedError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error(transparent)]
    Stats(#[from] StatsError),
    #[error("user {user} does not own habit {habit_id}")]
    Forbidden { user: UserId, habit_id: HabitId },
    #[error("habit {habit_id} already exists")]
    AlreadyExists { habit_id: HabitId },
}

impl ServiceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ServiceError::Store(e) if e.is_not_found())
    }

    /// See [`SharedError::settles`].
    pub fn settles(&self, requested: SharedState) -> bool {
        matches!(self, ServiceError::Shared(e) if e.settles(requested))
    }
}

/// Outcome of removing a single occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OccurrenceRemoval {
    Excluded,
    /// The target was the start date, so the whole habit was deleted.
    SeriesDeleted,
}

pub struct HabitService<R, S> {
    repo: R,
    sink: S,
    engine: RecurrenceEngine,
    config: Config,
}

impl<R: HabitRepository, S: EventSink> HabitService<R, S> {
    pub fn new(repo: R, sink: S, config: Config) -> Self {
        Self {
            repo,
            sink,
            engine: RecurrenceEngine::new(&config.recurrence),
            config,
        }
    }

    pub fn engine(&self) -> &RecurrenceEngine {
        &self.engine
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn into_repository(self) -> R {
        self.repo
    }

    // -- habits ------------------------------------------------------------

    /// Validate and store a new habit owned by the caller. The id must not be
    /// in use; editing goes through [`Self::edit_habit`].
    pub fn create_habit(
        &mut self,
        credential: &Credential,
        mut definition: HabitDefinition,
        now: DateTime<Utc>,
    ) -> Result<HabitId, ServiceError> {
        let user = self.authenticate(credential, now)?;
        definition.owner_id = user;
        validate_new_definition(
            &definition,
            now.date_naive(),
            self.config.recurrence.max_repeat_count,
        )?;
        let habit_id = definition.habit_id;
        match self.repo.load_habit(habit_id) {
            Ok(_) => {
                tracing::warn!(%habit_id, %user, "habit id already in use");
                return Err(ServiceError::AlreadyExists { habit_id });
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }
        self.repo.save_habit(HabitRecord::new(definition))?;
        tracing::info!(%habit_id, %user, "habit created");
        Ok(habit_id)
    }

    /// Replace a habit's definition in place. Completion and exception marks
    /// are kept even when the new recurrence no longer generates their dates.
    pub fn edit_habit(
        &mut self,
        credential: &Credential,
        mut definition: HabitDefinition,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        let user = self.authenticate(credential, now)?;
        let mut record = self.owned(user, definition.habit_id)?;
        definition.owner_id = record.definition.owner_id;
        validate_definition(&definition, self.config.recurrence.max_repeat_count)?;
        record.definition = definition;
        let habit_id = record.habit_id();
        self.repo.save_habit(record)?;
        tracing::info!(%habit_id, "habit edited");
        Ok(())
    }

    pub fn delete_habit(
        &mut self,
        credential: &Credential,
        habit_id: HabitId,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        let user = self.authenticate(credential, now)?;
        self.owned(user, habit_id)?;
        self.repo.delete_habit(habit_id)?;
        tracing::info!(%habit_id, "habit deleted");
        Ok(())
    }

    /// Remove one occurrence; removing the start date deletes the series.
    pub fn delete_occurrence(
        &mut self,
        credential: &Credential,
        habit_id: HabitId,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<OccurrenceRemoval, ServiceError> {
        let user = self.authenticate(credential, now)?;
        let mut record = self.owned(user, habit_id)?;
        match occurrence::delete_occurrence(&record.definition, &mut record.occurrences, date) {
            OccurrenceDeletion::Excluded => {
                self.repo.save_habit(record)?;
                tracing::debug!(%habit_id, %date, "occurrence excluded");
                Ok(OccurrenceRemoval::Excluded)
            }
            OccurrenceDeletion::SeriesDeletionRequired => {
                self.repo.delete_habit(habit_id)?;
                tracing::info!(%habit_id, %date, "start occurrence deleted; habit removed");
                Ok(OccurrenceRemoval::SeriesDeleted)
            }
        }
    }

    /// The caller's habits, ordered by id.
    pub fn habits(
        &self,
        credential: &Credential,
        now: DateTime<Utc>,
    ) -> Result<Vec<HabitRecord>, ServiceError> {
        let user = self.authenticate(credential, now)?;
        Ok(self.repo.habits_for_owner(user)?)
    }

    /// Set or clear a completion mark. Returns whether anything changed.
    pub fn set_completion(
        &mut self,
        credential: &Credential,
        habit_id: HabitId,
        date: NaiveDate,
        completed: bool,
        now: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        let user = self.authenticate(credential, now)?;
        let mut record = self.owned(user, habit_id)?;
        let changed = record.occurrences.set_completion(date, completed);
        if changed {
            self.repo.save_habit(record)?;
        }
        tracing::debug!(%habit_id, %date, completed, changed, "completion set");
        Ok(changed)
    }

    pub fn is_due(
        &self,
        credential: &Credential,
        habit_id: HabitId,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        let record = self.readable(credential, habit_id, now)?;
        Ok(occurrence::is_due(
            &self.engine,
            &record.definition,
            &record.occurrences,
            date,
        ))
    }

    /// Due dates in range with their completion marks.
    pub fn occurrences(
        &self,
        credential: &Credential,
        habit_id: HabitId,
        range_start: NaiveDate,
        range_end: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Vec<Occurrence>, ServiceError> {
        let record = self.readable(credential, habit_id, now)?;
        Ok(occurrence::occurrences(
            &self.engine,
            &record.definition,
            &record.occurrences,
            range_start,
            range_end,
        ))
    }

    pub fn summary(
        &self,
        credential: &Credential,
        habit_id: HabitId,
        range_start: NaiveDate,
        range_end: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Summary, ServiceError> {
        let record = self.readable(credential, habit_id, now)?;
        Ok(stats::summarize(
            &self.engine,
            &record.definition,
            &record.occurrences,
            range_start,
            range_end,
        ))
    }

    pub fn buckets(
        &self,
        credential: &Credential,
        habit_id: HabitId,
        range_start: NaiveDate,
        range_end: NaiveDate,
        granularity: Granularity,
        now: DateTime<Utc>,
    ) -> Result<Vec<Bucket>, ServiceError> {
        let record = self.readable(credential, habit_id, now)?;
        Ok(stats::bucketize(
            &self.engine,
            &record.definition,
            &record.occurrences,
            range_start,
            range_end,
            granularity,
        )?)
    }

    pub fn streaks(
        &self,
        credential: &Credential,
        habit_id: HabitId,
        range_start: NaiveDate,
        range_end: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Streaks, ServiceError> {
        let record = self.readable(credential, habit_id, now)?;
        Ok(stats::streaks(
            &self.engine,
            &record.definition,
            &record.occurrences,
            range_start,
            range_end,
        ))
    }

    // -- shared habits -----------------------------------------------------

    /// Offer one of the caller's habits to `participant`.
    pub fn share_habit(
        &mut self,
        credential: &Credential,
        habit_id: HabitId,
        participant: UserId,
        now: DateTime<Utc>,
    ) -> Result<SharedHabitId, ServiceError> {
        let user = self.authenticate(credential, now)?;
        let record = self.owned(user, habit_id)?;
        let (shared, event) = SharedHabit::request(record.definition, participant, now)?;
        let id = shared.shared_habit_id;
        self.repo.save_shared(shared)?;
        self.publish(event);
        Ok(id)
    }

    pub fn accept_shared(
        &mut self,
        credential: &Credential,
        id: SharedHabitId,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        self.transition(credential, id, now, |shared, user, now| shared.accept(user, now))
    }

    pub fn reject_shared(
        &mut self,
        credential: &Credential,
        id: SharedHabitId,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        self.transition(credential, id, now, |shared, user, now| shared.reject(user, now))
    }

    pub fn cancel_shared(
        &mut self,
        credential: &Credential,
        id: SharedHabitId,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        self.transition(credential, id, now, |shared, user, now| shared.cancel(user, now))
    }

    pub fn delete_shared(
        &mut self,
        credential: &Credential,
        id: SharedHabitId,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        self.transition(credential, id, now, |shared, user, now| shared.delete(user, now))
    }

    pub fn track_shared(
        &mut self,
        credential: &Credential,
        id: SharedHabitId,
        date: NaiveDate,
        completed: bool,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        self.transition(credential, id, now, |shared, user, now| {
            shared.track(user, date, completed, now)
        })
    }

    pub fn shared_progress(
        &self,
        credential: &Credential,
        id: SharedHabitId,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Progress, ServiceError> {
        let shared = self.member_view(credential, id, now)?;
        Ok(shared.progress(date))
    }

    pub fn shared_progress_report(
        &self,
        credential: &Credential,
        id: SharedHabitId,
        range_start: NaiveDate,
        range_end: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<ProgressReport, ServiceError> {
        let shared = self.member_view(credential, id, now)?;
        Ok(shared.progress_report(&self.engine, range_start, range_end))
    }

    /// The caller's shared habits that are still pending or active.
    pub fn shared_habits(
        &self,
        credential: &Credential,
        now: DateTime<Utc>,
    ) -> Result<Vec<SharedHabit>, ServiceError> {
        let user = self.authenticate(credential, now)?;
        Ok(self
            .repo
            .shared_for_user(user)?
            .into_iter()
            .filter(|s| matches!(s.state(), SharedState::Pending | SharedState::Active))
            .collect())
    }

    /// A shared habit in any state, for notification history.
    pub fn shared_habit(
        &self,
        credential: &Credential,
        id: SharedHabitId,
        now: DateTime<Utc>,
    ) -> Result<SharedHabit, ServiceError> {
        self.member_view(credential, id, now)
    }

    // -- helpers -----------------------------------------------------------

    fn authenticate(
        &self,
        credential: &Credential,
        now: DateTime<Utc>,
    ) -> Result<UserId, ServiceError> {
        if let Err(e) = credential.validate(now) {
            tracing::warn!(user = %credential.user_id, "rejected expired credential");
            return Err(e.into());
        }
        Ok(credential.user_id)
    }

    fn owned(&self, user: UserId, habit_id: HabitId) -> Result<HabitRecord, ServiceError> {
        let record = self.repo.load_habit(habit_id)?;
        if record.definition.owner_id != user {
            tracing::warn!(%habit_id, %user, "habit access denied");
            return Err(ServiceError::Forbidden { user, habit_id });
        }
        Ok(record)
    }

    fn readable(
        &self,
        credential: &Credential,
        habit_id: HabitId,
        now: DateTime<Utc>,
    ) -> Result<HabitRecord, ServiceError> {
        let user = self.authenticate(credential, now)?;
        self.owned(user, habit_id)
    }

    fn member_view(
        &self,
        credential: &Credential,
        id: SharedHabitId,
        now: DateTime<Utc>,
    ) -> Result<SharedHabit, ServiceError> {
        let user = self.authenticate(credential, now)?;
        let shared = self.repo.load_shared(id)?;
        if !shared.is_member(user) {
            return Err(SharedError::NotMember { user }.into());
        }
        Ok(shared)
    }

    fn transition<F>(
        &mut self,
        credential: &Credential,
        id: SharedHabitId,
        now: DateTime<Utc>,
        apply: F,
    ) -> Result<(), ServiceError>
    where
        F: FnOnce(&mut SharedHabit, UserId, DateTime<Utc>) -> Result<SharedHabitEvent, SharedError>,
    {
        let user = self.authenticate(credential, now)?;
        let mut shared = self.repo.load_shared(id)?;
        let event = apply(&mut shared, user, now)?;
        self.repo.save_shared(shared)?;
        self.publish(event);
        Ok(())
    }

    fn publish(&self, event: SharedHabitEvent) {
        if matches!(event.kind, SharedEventKind::Tracked { .. })
            && !self.config.sharing.emit_tracked_events
        {
            return;
        }
        self.sink.emit(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ChannelSink;
    use crate::model::DayOfWeek;
    use crate::store::{InMemoryHabitStore, JsonFileStore};
    use chrono::{Duration, TimeZone};
    use std::sync::mpsc::Receiver;
    use tracing_test::traced_test;
    use ulid::Ulid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap()
    }

    fn credential() -> Credential {
        Credential::new(Ulid::new(), "token", now(), now() + Duration::days(30))
    }

    fn service(
        config: Config,
    ) -> (
        HabitService<InMemoryHabitStore, ChannelSink>,
        Receiver<SharedHabitEvent>,
    ) {
        let (sink, rx) = ChannelSink::new();
        (HabitService::new(InMemoryHabitStore::new(), sink, config), rx)
    }

    #[test]
    #[traced_test]
    fn create_assigns_owner_and_logs() {
        let (mut svc, _rx) = service(Config::default());
        let cred = credential();
        let def = HabitDefinition::new(Ulid::new(), "Read", date(2024, 1, 1)).daily();
        let id = svc.create_habit(&cred, def, now()).unwrap();
        let stored = svc.repository().load_habit(id).unwrap();
        assert_eq!(stored.definition.owner_id, cred.user_id);
        assert!(logs_contain("habit created"));
    }

    #[test]
    fn create_rejects_past_start_and_invalid_fields() {
        let (mut svc, _rx) = service(Config::default());
        let cred = credential();
        let past = HabitDefinition::new(cred.user_id, "Read", date(2023, 12, 31)).daily();
        let err = svc.create_habit(&cred, past, now()).unwrap_err();
        assert!(matches!(err, ServiceError::Model(ref e) if e.field() == "start_date"));

        let over = HabitDefinition::new(cred.user_id, "Read", date(2024, 1, 1))
            .daily()
            .with_repeat_count(400);
        assert!(matches!(
            svc.create_habit(&cred, over, now()),
            Err(ServiceError::Model(ModelError::OutOfRange { .. }))
        ));
    }

    #[test]
    fn configured_repeat_cap_applies() {
        let mut config = Config::default();
        config.recurrence.max_repeat_count = 10;
        let (mut svc, _rx) = service(config);
        let cred = credential();
        let def = HabitDefinition::new(cred.user_id, "Read", date(2024, 1, 1))
            .daily()
            .with_repeat_count(11);
        assert!(matches!(
            svc.create_habit(&cred, def, now()),
            Err(ServiceError::Model(ModelError::OutOfRange { max: 10, .. }))
        ));
    }

    #[test]
    fn create_cannot_reuse_a_stored_id() {
        let (mut svc, _rx) = service(Config::default());
        let owner = credential();
        let def = HabitDefinition::new(owner.user_id, "Read", date(2024, 1, 1)).daily();
        let id = svc.create_habit(&owner, def.clone(), now()).unwrap();
        svc.set_completion(&owner, id, date(2024, 1, 2), true, now()).unwrap();

        let other = credential();
        let takeover = def.clone().with_description("Mine now");
        assert!(matches!(
            svc.create_habit(&other, takeover, now()),
            Err(ServiceError::AlreadyExists { habit_id }) if habit_id == id
        ));
        assert!(matches!(
            svc.create_habit(&owner, def, now()),
            Err(ServiceError::AlreadyExists { .. })
        ));

        let record = svc.repository().load_habit(id).unwrap();
        assert_eq!(record.definition.owner_id, owner.user_id);
        assert!(record.definition.description.is_empty());
        assert!(record.occurrences.is_complete(date(2024, 1, 2)));
        assert!(svc.is_due(&owner, id, date(2024, 1, 2), now()).unwrap());
    }

    #[test]
    fn failed_save_changes_nothing_and_emits_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("habits.json");
        let (sink, rx) = ChannelSink::new();
        let store = JsonFileStore::open(&path).unwrap();
        let mut svc = HabitService::new(store, sink, Config::default());
        let owner = credential();
        let participant = credential();
        let def = HabitDefinition::new(owner.user_id, "Run", date(2024, 1, 1)).daily();
        let habit_id = svc.create_habit(&owner, def, now()).unwrap();
        let id = svc
            .share_habit(&owner, habit_id, participant.user_id, now())
            .unwrap();
        assert_eq!(rx.try_iter().count(), 1);

        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();

        let err = svc
            .set_completion(&owner, habit_id, date(2024, 1, 2), true, now())
            .unwrap_err();
        assert!(matches!(err, ServiceError::Store(StoreError::Io { .. })));
        let record = svc.repository().load_habit(habit_id).unwrap();
        assert!(!record.occurrences.is_complete(date(2024, 1, 2)));

        assert!(svc.accept_shared(&participant, id, now()).is_err());
        let shared = svc.shared_habit(&owner, id, now()).unwrap();
        assert_eq!(shared.state(), SharedState::Pending);
        assert_eq!(rx.try_iter().count(), 0);
    }

    #[test]
    fn oversized_bucket_range_is_rejected() {
        let (mut svc, _rx) = service(Config::default());
        let cred = credential();
        let def = HabitDefinition::new(cred.user_id, "Read", date(2024, 1, 1)).daily();
        let id = svc.create_habit(&cred, def, now()).unwrap();
        let err = svc
            .buckets(
                &cred,
                id,
                NaiveDate::MIN,
                NaiveDate::MAX,
                Granularity::Day,
                now(),
            )
            .unwrap_err();
        assert!(matches!(err, ServiceError::Stats(StatsError::TooManyBuckets { .. })));
    }

    #[test]
    fn expired_credential_is_rejected() {
        let (mut svc, _rx) = service(Config::default());
        let cred = credential();
        let def = HabitDefinition::new(cred.user_id, "Read", date(2024, 1, 5));
        let err = svc
            .create_habit(&cred, def, now() + Duration::days(30))
            .unwrap_err();
        assert!(matches!(err, ServiceError::Credential(_)));
    }

    #[test]
    fn edit_keeps_marks_and_allows_past_start() {
        let (mut svc, _rx) = service(Config::default());
        let cred = credential();
        let def = HabitDefinition::new(cred.user_id, "Yoga", date(2024, 1, 1)).daily();
        let id = svc.create_habit(&cred, def.clone(), now()).unwrap();
        svc.set_completion(&cred, id, date(2024, 1, 2), true, now()).unwrap();

        let later = now() + Duration::days(10);
        let edited = def.weekly([DayOfWeek::Mon], 1);
        svc.edit_habit(&cred, edited, later).unwrap();

        let record = svc.repository().load_habit(id).unwrap();
        // 01-02 is a Tuesday: orphaned but retained.
        assert!(record.occurrences.is_complete(date(2024, 1, 2)));
        let summary = svc
            .summary(&cred, id, date(2024, 1, 1), date(2024, 1, 14), later)
            .unwrap();
        assert_eq!((summary.due, summary.complete), (2, 0));
    }

    #[test]
    fn strangers_cannot_touch_habits() {
        let (mut svc, _rx) = service(Config::default());
        let cred = credential();
        let def = HabitDefinition::new(cred.user_id, "Yoga", date(2024, 1, 1)).daily();
        let id = svc.create_habit(&cred, def, now()).unwrap();
        let other = credential();
        assert!(matches!(
            svc.set_completion(&other, id, date(2024, 1, 1), true, now()),
            Err(ServiceError::Forbidden { .. })
        ));
        assert!(svc
            .summary(&cred, Ulid::new(), date(2024, 1, 1), date(2024, 1, 2), now())
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn deleting_start_occurrence_removes_series() {
        let (mut svc, _rx) = service(Config::default());
        let cred = credential();
        let def = HabitDefinition::new(cred.user_id, "Floss", date(2024, 1, 1)).daily();
        let id = svc.create_habit(&cred, def, now()).unwrap();

        assert_eq!(
            svc.delete_occurrence(&cred, id, date(2024, 1, 3), now()).unwrap(),
            OccurrenceRemoval::Excluded
        );
        assert!(!svc.is_due(&cred, id, date(2024, 1, 3), now()).unwrap());
        assert!(svc.is_due(&cred, id, date(2024, 1, 4), now()).unwrap());

        assert_eq!(
            svc.delete_occurrence(&cred, id, date(2024, 1, 1), now()).unwrap(),
            OccurrenceRemoval::SeriesDeleted
        );
        assert!(svc.repository().load_habit(id).unwrap_err().is_not_found());
        assert!(svc.habits(&cred, now()).unwrap().is_empty());
    }

    #[test]
    fn shared_lifecycle_emits_events() {
        let (mut svc, rx) = service(Config::default());
        let owner = credential();
        let participant = credential();
        let def = HabitDefinition::new(owner.user_id, "Run", date(2024, 1, 1)).daily();
        let habit_id = svc.create_habit(&owner, def, now()).unwrap();
        let id = svc
            .share_habit(&owner, habit_id, participant.user_id, now())
            .unwrap();
        svc.accept_shared(&participant, id, now()).unwrap();
        svc.track_shared(&owner, id, date(2024, 1, 2), true, now()).unwrap();

        let kinds: Vec<_> = rx.try_iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                SharedEventKind::Requested,
                SharedEventKind::Accepted,
                SharedEventKind::Tracked {
                    date: date(2024, 1, 2),
                    completed: true
                },
            ]
        );

        let progress = svc
            .shared_progress(&participant, id, date(2024, 1, 2), now())
            .unwrap();
        assert!(progress.owner_completed);
        assert!(!progress.participant_completed);
        assert_eq!(svc.shared_habits(&participant, now()).unwrap().len(), 1);
    }

    #[test]
    fn repeated_accept_reports_already_actioned() {
        let (mut svc, _rx) = service(Config::default());
        let owner = credential();
        let participant = credential();
        let def = HabitDefinition::new(owner.user_id, "Run", date(2024, 1, 1)).daily();
        let habit_id = svc.create_habit(&owner, def, now()).unwrap();
        let id = svc
            .share_habit(&owner, habit_id, participant.user_id, now())
            .unwrap();
        svc.accept_shared(&participant, id, now()).unwrap();
        let err = svc.accept_shared(&participant, id, now()).unwrap_err();
        assert!(err.settles(SharedState::Active));
        let err = svc.cancel_shared(&owner, id, now()).unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Shared(SharedError::AlreadyActioned { .. })
        ));
    }

    #[test]
    fn terminated_shared_habits_stay_queryable_but_hidden() {
        let (mut svc, rx) = service(Config::default());
        let owner = credential();
        let participant = credential();
        let def = HabitDefinition::new(owner.user_id, "Run", date(2024, 1, 1)).daily();
        let habit_id = svc.create_habit(&owner, def, now()).unwrap();
        let id = svc
            .share_habit(&owner, habit_id, participant.user_id, now())
            .unwrap();
        svc.reject_shared(&participant, id, now()).unwrap();

        assert!(svc.shared_habits(&owner, now()).unwrap().is_empty());
        let shared = svc.shared_habit(&owner, id, now()).unwrap();
        assert_eq!(shared.state(), SharedState::Rejected);
        let last = rx.try_iter().last().unwrap();
        assert_eq!(last.kind, SharedEventKind::Rejected);
        assert_eq!(last.recipient, owner.user_id);

        let stranger = credential();
        assert!(matches!(
            svc.shared_progress(&stranger, id, date(2024, 1, 1), now()),
            Err(ServiceError::Shared(SharedError::NotMember { .. }))
        ));
    }

    #[test]
    fn tracked_events_can_be_muted() {
        let mut config = Config::default();
        config.sharing.emit_tracked_events = false;
        let (mut svc, rx) = service(config);
        let owner = credential();
        let participant = credential();
        let def = HabitDefinition::new(owner.user_id, "Run", date(2024, 1, 1)).daily();
        let habit_id = svc.create_habit(&owner, def, now()).unwrap();
        let id = svc
            .share_habit(&owner, habit_id, participant.user_id, now())
            .unwrap();
        svc.accept_shared(&participant, id, now()).unwrap();
        svc.track_shared(&participant, id, date(2024, 1, 1), true, now())
            .unwrap();
        svc.delete_shared(&owner, id, now()).unwrap();

        let kinds: Vec<_> = rx.try_iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                SharedEventKind::Requested,
                SharedEventKind::Accepted,
                SharedEventKind::Deleted
            ]
        );
    }
}
