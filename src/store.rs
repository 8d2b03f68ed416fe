use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{HabitDefinition, HabitId, SharedHabitId, UserId};
use crate::occurrence::OccurrenceState;
use crate::shared::SharedHabit;

/// A habit definition together with its occurrence overlay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HabitRecord {
    pub definition: HabitDefinition,
    #[serde(default)]
    pub occurrences: OccurrenceState,
}

impl HabitRecord {
    pub fn new(definition: HabitDefinition) -> Self {
        Self {
            definition,
            occurrences: OccurrenceState::default(),
        }
    }

    pub fn habit_id(&self) -> HabitId {
        self.definition.habit_id
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("habit {0} not found")]
    HabitNotFound(HabitId),
    #[error("shared habit {0} not found")]
    SharedHabitNotFound(SharedHabitId),
    #[error("storage io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("storage snapshot is corrupted: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u32),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::HabitNotFound(_) | StoreError::SharedHabitNotFound(_)
        )
    }
}

/// Keyed load/save of habits and shared habits.
///
/// Each call is atomic with respect to the others: implementations must never
/// expose a partially applied save. `&mut self` on writers gives that for free
/// in-process; wrap the repository in a lock to share it across threads.
pub trait HabitRepository {
    fn load_habit(&self, id: HabitId) -> Result<HabitRecord, StoreError>;
    fn save_habit(&mut self, record: HabitRecord) -> Result<(), StoreError>;
    fn delete_habit(&mut self, id: HabitId) -> Result<HabitRecord, StoreError>;
    /// Habits owned by `owner`, ordered by id.
    fn habits_for_owner(&self, owner: UserId) -> Result<Vec<HabitRecord>, StoreError>;

    fn load_shared(&self, id: SharedHabitId) -> Result<SharedHabit, StoreError>;
    fn save_shared(&mut self, shared: SharedHabit) -> Result<(), StoreError>;
    /// Shared habits where `user` is owner or participant, ordered by id.
    fn shared_for_user(&self, user: UserId) -> Result<Vec<SharedHabit>, StoreError>;
}

/// In-memory store; callers can serialize it or rehydrate it through
/// [`JsonFileStore`].
#[derive(Debug, Default, Clone)]
pub struct InMemoryHabitStore {
    habits: HashMap<HabitId, HabitRecord>,
    shared: HashMap<SharedHabitId, SharedHabit>,
}

impl InMemoryHabitStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            habits: snapshot
                .habits
                .into_iter()
                .map(|r| (r.habit_id(), r))
                .collect(),
            shared: snapshot
                .shared
                .into_iter()
                .map(|s| (s.shared_habit_id, s))
                .collect(),
        }
    }

    fn snapshot(&self) -> Snapshot {
        let mut habits: Vec<HabitRecord> = self.habits.values().cloned().collect();
        habits.sort_by_key(HabitRecord::habit_id);
        let mut shared: Vec<SharedHabit> = self.shared.values().cloned().collect();
        shared.sort_by_key(|s| s.shared_habit_id);
        Snapshot {
            version: SNAPSHOT_VERSION,
            habits,
            shared,
        }
    }
}

impl HabitRepository for InMemoryHabitStore {
    fn load_habit(&self, id: HabitId) -> Result<HabitRecord, StoreError> {
        self.habits
            .get(&id)
            .cloned()
            .ok_or(StoreError::HabitNotFound(id))
    }

    fn save_habit(&mut self, record: HabitRecord) -> Result<(), StoreError> {
        self.habits.insert(record.habit_id(), record);
        Ok(())
    }

    fn delete_habit(&mut self, id: HabitId) -> Result<HabitRecord, StoreError> {
        self.habits.remove(&id).ok_or(StoreError::HabitNotFound(id))
    }

    fn habits_for_owner(&self, owner: UserId) -> Result<Vec<HabitRecord>, StoreError> {
        let mut out: Vec<HabitRecord> = self
            .habits
            .values()
            .filter(|r| r.definition.owner_id == owner)
            .cloned()
            .collect();
        out.sort_by_key(HabitRecord::habit_id);
        Ok(out)
    }

    fn load_shared(&self, id: SharedHabitId) -> Result<SharedHabit, StoreError> {
        self.shared
            .get(&id)
            .cloned()
            .ok_or(StoreError::SharedHabitNotFound(id))
    }

    fn save_shared(&mut self, shared: SharedHabit) -> Result<(), StoreError> {
        self.shared.insert(shared.shared_habit_id, shared);
        Ok(())
    }

    fn shared_for_user(&self, user: UserId) -> Result<Vec<SharedHabit>, StoreError> {
        let mut out: Vec<SharedHabit> = self
            .shared
            .values()
            .filter(|s| s.is_member(user))
            .cloned()
            .collect();
        out.sort_by_key(|s| s.shared_habit_id);
        Ok(out)
    }
}

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    #[serde(default)]
    habits: Vec<HabitRecord>,
    #[serde(default)]
    shared: Vec<SharedHabit>,
}

/// Whole-snapshot JSON file. Every write lands in a sibling temp file that is
/// renamed over the target, so readers see either the old or the new snapshot.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    inner: InMemoryHabitStore,
}

impl JsonFileStore {
    /// Open `path`, starting empty when the file does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let inner = match std::fs::read_to_string(&path) {
            Ok(raw) => {
                let snapshot: Snapshot = serde_json::from_str(&raw)?;
                if snapshot.version != SNAPSHOT_VERSION {
                    return Err(StoreError::UnsupportedVersion(snapshot.version));
                }
                tracing::debug!(
                    path = %path.display(),
                    habits = snapshot.habits.len(),
                    shared = snapshot.shared.len(),
                    "loaded habit snapshot"
                );
                InMemoryHabitStore::from_snapshot(snapshot)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => InMemoryHabitStore::new(),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        Ok(Self { path, inner })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `change` to a copy, persist the copy, then swap it in. A failed
    /// write leaves both the file and the in-memory state untouched.
    fn commit<T>(
        &mut self,
        change: impl FnOnce(&mut InMemoryHabitStore) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut next = self.inner.clone();
        let out = change(&mut next)?;
        self.flush(&next)?;
        self.inner = next;
        Ok(out)
    }

    fn flush(&self, store: &InMemoryHabitStore) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(io_err)?;
        }
        let body = serde_json::to_string_pretty(&store.snapshot())?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, body).map_err(io_err)?;
        if let Err(source) = std::fs::rename(&tmp, &self.path) {
            tracing::warn!(path = %self.path.display(), "snapshot write failed");
            let _ = std::fs::remove_file(&tmp);
            return Err(io_err(source));
        }
        Ok(())
    }
}

impl HabitRepository for JsonFileStore {
    fn load_habit(&self, id: HabitId) -> Result<HabitRecord, StoreError> {
        self.inner.load_habit(id)
    }

    fn save_habit(&mut self, record: HabitRecord) -> Result<(), StoreError> {
        self.commit(|store| store.save_habit(record))
    }

    fn delete_habit(&mut self, id: HabitId) -> Result<HabitRecord, StoreError> {
        self.commit(|store| store.delete_habit(id))
    }

    fn habits_for_owner(&self, owner: UserId) -> Result<Vec<HabitRecord>, StoreError> {
        self.inner.habits_for_owner(owner)
    }

    fn load_shared(&self, id: SharedHabitId) -> Result<SharedHabit, StoreError> {
        self.inner.load_shared(id)
    }

    fn save_shared(&mut self, shared: SharedHabit) -> Result<(), StoreError> {
        self.commit(|store| store.save_shared(shared))
    }

    fn shared_for_user(&self, user: UserId) -> Result<Vec<SharedHabit>, StoreError> {
        self.inner.shared_for_user(user)
    }
}
