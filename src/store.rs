use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::types::{OnboardingRecord, Session, UserId};

/// Durable persistence for the current session and per-user onboarding state.
///
/// All operations are synchronous and local: the store never does network
/// I/O. `save`/`clear` are atomic with respect to the single logical session
/// record, so a partial write (token saved, user id missing) cannot happen.
///
/// Onboarding accessors take `Option<&UserId>`: `Some(id)` addresses the
/// per-user record, `None` addresses the legacy global record kept for
/// backward compatibility with older clients.
pub trait SessionStore: Send + Sync + 'static {
    /// Load the persisted session, if any.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageCorrupt`] if a record exists but fails to
    /// deserialize. Callers treat that as "no session" after logging.
    fn load(&self) -> Result<Option<Session>, Error>;

    /// Persist the session as one unit.
    fn save(&self, session: &Session) -> Result<(), Error>;

    /// Remove the persisted session. Safe to call when none exists.
    fn clear(&self) -> Result<(), Error>;

    /// Load an onboarding record (`None` key = legacy global record).
    fn load_onboarding(&self, user_id: Option<&UserId>) -> Result<Option<OnboardingRecord>, Error>;

    /// Write an onboarding record (`None` key = legacy global record).
    fn save_onboarding(
        &self,
        user_id: Option<&UserId>,
        record: &OnboardingRecord,
    ) -> Result<(), Error>;

    /// Remove an onboarding record (`None` key = legacy global record).
    fn clear_onboarding(&self, user_id: Option<&UserId>) -> Result<(), Error>;
}

/// Everything the store persists, as one serialized document.
///
/// Keeping the session a single field is what makes `save`/`clear` atomic:
/// there is no token-without-user-id intermediate state on disk.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct PersistedState {
    #[serde(default)]
    session: Option<Session>,
    /// Per-user onboarding records, keyed by user id.
    #[serde(default)]
    onboarding: HashMap<String, OnboardingRecord>,
    /// Legacy global record consulted only when no per-user record exists.
    #[serde(default)]
    legacy_onboarding: Option<OnboardingRecord>,
}

impl PersistedState {
    fn onboarding_slot(&self, user_id: Option<&UserId>) -> Option<&OnboardingRecord> {
        match user_id {
            Some(id) => self.onboarding.get(id.0.as_str()),
            None => self.legacy_onboarding.as_ref(),
        }
    }

    fn set_onboarding(&mut self, user_id: Option<&UserId>, record: OnboardingRecord) {
        match user_id {
            Some(id) => {
                self.onboarding.insert(id.0.clone(), record);
            }
            None => self.legacy_onboarding = Some(record),
        }
    }

    fn remove_onboarding(&mut self, user_id: Option<&UserId>) {
        match user_id {
            Some(id) => {
                self.onboarding.remove(id.0.as_str());
            }
            None => self.legacy_onboarding = None,
        }
    }
}

// ── In-memory store ────────────────────────────────────────────────

/// Ephemeral store for tests and non-persistent embeddings.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<PersistedState>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PersistedState> {
        // Lock poisoning only matters if a writer panicked; the state is
        // still structurally valid, so recover it.
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl SessionStore for MemoryStore {
    fn load(&self) -> Result<Option<Session>, Error> {
        Ok(self.lock().session.clone())
    }

    fn save(&self, session: &Session) -> Result<(), Error> {
        self.lock().session = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), Error> {
        self.lock().session = None;
        Ok(())
    }

    fn load_onboarding(&self, user_id: Option<&UserId>) -> Result<Option<OnboardingRecord>, Error> {
        Ok(self.lock().onboarding_slot(user_id).cloned())
    }

    fn save_onboarding(
        &self,
        user_id: Option<&UserId>,
        record: &OnboardingRecord,
    ) -> Result<(), Error> {
        self.lock().set_onboarding(user_id, record.clone());
        Ok(())
    }

    fn clear_onboarding(&self, user_id: Option<&UserId>) -> Result<(), Error> {
        self.lock().remove_onboarding(user_id);
        Ok(())
    }
}

// ── File-backed store ──────────────────────────────────────────────

/// JSON document on disk, written atomically (temp file + rename).
///
/// Every operation is a read-modify-write under an internal lock; the file
/// is small, so this stays simple and crash-safe rather than cached.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    io: Mutex<()>,
}

impl JsonFileStore {
    /// Open a store at `path`. The file is created lazily on first write;
    /// its parent directory must exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the parent directory is missing.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            return Err(Error::Storage(format!(
                "parent directory does not exist: {}",
                parent.display()
            )));
        }
        Ok(Self {
            path,
            io: Mutex::new(()),
        })
    }

    fn read_state(&self) -> Result<PersistedState, Error> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => {
                serde_json::from_str(&raw).map_err(|e| Error::StorageCorrupt(e.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(PersistedState::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Like `read_state`, but a corrupt document yields an empty one so that
    /// writes can still proceed (the corrupt file gets replaced wholesale).
    fn read_state_or_default(&self) -> Result<PersistedState, Error> {
        match self.read_state() {
            Ok(state) => Ok(state),
            Err(Error::StorageCorrupt(detail)) => {
                tracing::warn!(%detail, "discarding corrupt state file on write");
                Ok(PersistedState::default())
            }
            Err(e) => Err(e),
        }
    }

    fn write_state(&self, state: &PersistedState) -> Result<(), Error> {
        let raw = serde_json::to_string_pretty(state)
            .map_err(|e| Error::Storage(e.to_string()))?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, raw)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn with_state<T>(
        &self,
        f: impl FnOnce(&mut PersistedState) -> T,
    ) -> Result<T, Error> {
        let _guard = self.io.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut state = self.read_state_or_default()?;
        let out = f(&mut state);
        self.write_state(&state)?;
        Ok(out)
    }
}

impl SessionStore for JsonFileStore {
    fn load(&self) -> Result<Option<Session>, Error> {
        let _guard = self.io.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(self.read_state()?.session)
    }

    fn save(&self, session: &Session) -> Result<(), Error> {
        self.with_state(|state| state.session = Some(session.clone()))
    }

    fn clear(&self) -> Result<(), Error> {
        self.with_state(|state| state.session = None)
    }

    fn load_onboarding(&self, user_id: Option<&UserId>) -> Result<Option<OnboardingRecord>, Error> {
        let _guard = self.io.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(self.read_state()?.onboarding_slot(user_id).cloned())
    }

    fn save_onboarding(
        &self,
        user_id: Option<&UserId>,
        record: &OnboardingRecord,
    ) -> Result<(), Error> {
        self.with_state(|state| state.set_onboarding(user_id, record.clone()))
    }

    fn clear_onboarding(&self, user_id: Option<&UserId>) -> Result<(), Error> {
        self.with_state(|state| state.remove_onboarding(user_id))
    }
}
