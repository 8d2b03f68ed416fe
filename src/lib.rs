//! Habit sync core.
//!
//! Recurrence expansion, per-date completion and exception overlays, shared
//! habits between two users, and completion statistics. Time is always passed
//! in by the caller; storage and notification delivery sit behind the
//! [`store::HabitRepository`] and [`events::EventSink`] traits.

pub mod calendar;
pub mod config;
pub mod credential;
pub mod events;
pub mod model;
pub mod occurrence;
pub mod recurrence;
pub mod service;
pub mod shared;
pub mod stats;
pub mod store;

pub use config::Config;
pub use credential::{Credential, CredentialError};
pub use events::{ChannelSink, EventSink, NoopSink, SharedEventKind, SharedHabitEvent};
pub use model::*;
pub use occurrence::{Occurrence, OccurrenceDeletion, OccurrenceState};
pub use recurrence::RecurrenceEngine;
pub use service::{HabitService, OccurrenceRemoval, ServiceError};
pub use shared::{Progress, ProgressReport, SharedError, SharedHabit, SharedState};
pub use stats::{Bucket, Granularity, StatsError, Streaks, Summary};
pub use store::{HabitRecord, HabitRepository, InMemoryHabitStore, JsonFileStore, StoreError};
