use std::sync::mpsc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{HabitId, SharedHabitId, UserId};

/// Lifecycle changes of a shared habit worth telling the other side about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SharedEventKind {
    Requested,
    Accepted,
    Rejected,
    Cancelled,
    Tracked { date: NaiveDate, completed: bool },
    Deleted,
}

/// Event emitted to sinks; `recipient` is the party that did not act.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedHabitEvent {
    pub shared_habit_id: SharedHabitId,
    pub habit_id: HabitId,
    pub actor: UserId,
    pub recipient: UserId,
    pub kind: SharedEventKind,
    pub occurred_at: DateTime<Utc>,
}

/// Fire-and-forget hook; typically the notification service implements this.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: SharedHabitEvent);
}

/// Forwards events into a channel. Useful for tests or a notifier thread.
pub struct ChannelSink {
    pub sender: mpsc::Sender<SharedHabitEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::Receiver<SharedHabitEvent>) {
        let (sender, receiver) = mpsc::channel();
        (Self { sender }, receiver)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: SharedHabitEvent) {
        if self.sender.send(event).is_err() {
            tracing::debug!("event receiver dropped; discarding shared habit event");
        }
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: SharedHabitEvent) {}
}
