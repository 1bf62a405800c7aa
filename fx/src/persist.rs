//! Cross-session persistence of the display currency and last snapshot.

use parking_lot::Mutex;
use pricefx_common::{CurrencySettings, ExchangeRateSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::PersistError;
use crate::sync::LegacySink;

/// Key the state is stored under unless configured otherwise.
pub const DEFAULT_STATE_KEY: &str = "pricefx.currency.v1";

/// Everything persisted between sessions, stored under a single key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    #[serde(default)]
    pub display_currency: Option<CurrencySettings>,
    #[serde(default)]
    pub exchange_rate_snapshot: Option<ExchangeRateSnapshot>,
}

/// Key-value storage for persisted state.
pub trait StateStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<String>, PersistError>;

    fn save(&self, key: &str, value: &str) -> Result<(), PersistError>;

    fn remove(&self, key: &str) -> Result<(), PersistError>;
}

/// Stores each key as `<dir>/<key>.json`.
pub struct FileStateStore {
    dir: PathBuf,
    // Writers share one temp path per key.
    write_lock: Mutex<()>,
}

impl FileStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, PersistError> {
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
        if !valid {
            return Err(PersistError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl StateStore for FileStateStore {
    fn load(&self, key: &str) -> Result<Option<String>, PersistError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, key: &str, value: &str) -> Result<(), PersistError> {
        let path = self.path_for(key)?;
        let _guard = self.write_lock.lock();
        fs::create_dir_all(&self.dir)?;

        // Write then rename so a crash never leaves a truncated file.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), PersistError> {
        let path = self.path_for(key)?;
        match fs::remove_file(path) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

/// Process-local store, mainly for tests.
#[derive(Default)]
pub struct MemoryStateStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self, key: &str) -> Result<Option<String>, PersistError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> Result<(), PersistError> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), PersistError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// Writes the state store whenever the display currency or rates change.
///
/// Registered with a [`SyncAdapter`](crate::sync::SyncAdapter), so rates
/// published by background refreshes are persisted as well.
pub struct StatePersister {
    store: Arc<dyn StateStore>,
    key: String,
    state: Mutex<PersistedState>,
}

impl StatePersister {
    /// `initial` is what the store should hold until the first change.
    pub fn new(store: Arc<dyn StateStore>, key: impl Into<String>, initial: PersistedState) -> Self {
        Self {
            store,
            key: key.into(),
            state: Mutex::new(initial),
        }
    }

    fn write(&self, state: &PersistedState) {
        if let Err(e) = save_state(self.store.as_ref(), &self.key, state) {
            warn!(key = %self.key, error = %e, "Failed to persist currency state");
        }
    }
}

impl LegacySink for StatePersister {
    fn publish_settings(&self, settings: &CurrencySettings) {
        let mut state = self.state.lock();
        if state.display_currency.as_ref() == Some(settings) {
            return;
        }
        state.display_currency = Some(settings.clone());
        self.write(&state);
    }

    fn publish_rates(&self, snapshot: &ExchangeRateSnapshot) {
        let mut state = self.state.lock();
        if state.exchange_rate_snapshot.as_ref() == Some(snapshot) {
            return;
        }
        state.exchange_rate_snapshot = Some(snapshot.clone());
        self.write(&state);
    }
}

/// Load state, treating missing, unreadable or corrupt data as absent.
pub fn load_state(store: &dyn StateStore, key: &str) -> Option<PersistedState> {
    let raw = match store.load(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => {
            debug!(key = %key, "No persisted currency state");
            return None;
        }
        Err(e) => {
            warn!(key = %key, error = %e, "Failed to read persisted currency state");
            return None;
        }
    };

    match serde_json::from_str(&raw) {
        Ok(state) => Some(state),
        Err(e) => {
            warn!(key = %key, error = %e, "Ignoring corrupt persisted currency state");
            None
        }
    }
}

pub fn save_state(
    store: &dyn StateStore,
    key: &str,
    state: &PersistedState,
) -> Result<(), PersistError> {
    let raw = serde_json::to_string(state)?;
    store.save(key, &raw)
}
