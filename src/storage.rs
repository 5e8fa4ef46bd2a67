//! Persistent key-value settings storage
//!
//! This module provides the storage seam used to cache credentials across
//! process restarts. The [`SettingsStore`] trait models a small string
//! key-value store with an explicit save step; two backends are provided:
//!
//! - [`FileSettings`] -- a JSON object in a single file, written atomically.
//!   This is the default backend.
//! - [`KeyringSettings`] -- one OS keyring entry per key (Keychain on macOS,
//!   Secret Service on Linux, Windows Credential Manager on Windows).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{Result, TidalSessionError};

// ---------------------------------------------------------------------------
// SettingsStore
// ---------------------------------------------------------------------------

/// String key-value store with an explicit save step.
///
/// `set` and `remove` may buffer in memory; callers that need durability
/// must call [`save`](Self::save) afterwards. Backends for which writes are
/// immediately durable implement `save` as a no-op.
pub trait SettingsStore: Send + Sync {
    /// Returns the value for `key`, or `None` when the key is absent.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Sets `key` to `value`, overwriting any previous value.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Removes `key`. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<()>;

    /// Flushes buffered writes to persistent storage.
    fn save(&self) -> Result<()>;
}

// ---------------------------------------------------------------------------
// FileSettings
// ---------------------------------------------------------------------------

/// JSON-file-backed settings store.
///
/// The entire store is a single flat JSON object. Writes go through an
/// in-memory map guarded by a mutex; [`save`](SettingsStore::save) serializes
/// the map and replaces the file with a write-then-rename so a crash mid-save
/// never leaves a truncated file behind.
///
/// # Examples
///
/// ```no_run
/// use tidal_session::storage::{FileSettings, SettingsStore};
///
/// # fn example() -> tidal_session::error::Result<()> {
/// let store = FileSettings::open("/tmp/tidal-session/settings.json")?;
/// store.set("accessToken", "abc123")?;
/// store.save()?;
/// assert_eq!(store.get("accessToken")?, Some("abc123".to_string()));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct FileSettings {
    path: PathBuf,
    values: Mutex<HashMap<String, String>>,
}

impl FileSettings {
    /// Opens the settings file at `path`, loading existing values.
    ///
    /// A missing file is treated as an empty store. Parent directories are
    /// created on demand so first-run setups need no manual preparation.
    ///
    /// # Errors
    ///
    /// Returns [`TidalSessionError::Store`] if the file exists but cannot be
    /// read or parsed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                TidalSessionError::Store(format!(
                    "failed to create settings directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let values = if path.exists() {
            let contents = std::fs::read_to_string(&path).map_err(|e| {
                TidalSessionError::Store(format!(
                    "failed to read settings file {}: {e}",
                    path.display()
                ))
            })?;
            serde_json::from_str(&contents).map_err(|e| {
                TidalSessionError::Store(format!(
                    "settings file {} is not valid JSON: {e}",
                    path.display()
                ))
            })?
        } else {
            HashMap::new()
        };

        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    /// Returns the path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for FileSettings {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self.values.lock().expect("settings mutex poisoned");
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.lock().expect("settings mutex poisoned");
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut values = self.values.lock().expect("settings mutex poisoned");
        values.remove(key);
        Ok(())
    }

    fn save(&self) -> Result<()> {
        let json = {
            let values = self.values.lock().expect("settings mutex poisoned");
            serde_json::to_string_pretty(&*values)?
        };

        // Write to a sibling temp file, then rename over the target.
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json).map_err(|e| {
            TidalSessionError::Store(format!(
                "failed to write settings file {}: {e}",
                tmp_path.display()
            ))
        })?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| {
            TidalSessionError::Store(format!(
                "failed to replace settings file {}: {e}",
                self.path.display()
            ))
        })?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// KeyringSettings
// ---------------------------------------------------------------------------

/// OS-keyring-backed settings store.
///
/// Each key is stored as its own keyring entry under a service name derived
/// from the store's namespace, preventing collisions with other applications.
/// Keyring writes are immediately durable, so `save` is a no-op.
pub struct KeyringSettings {
    namespace: String,
}

impl KeyringSettings {
    /// Creates a keyring store with the given namespace.
    ///
    /// The namespace becomes part of every entry's service name, e.g.
    /// `tidal-session-default`.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<keyring::Entry> {
        let service = format!("tidal-session-{}", self.namespace);
        keyring::Entry::new(&service, key)
            .map_err(|e| TidalSessionError::Keyring(e).into())
    }
}

impl SettingsStore for KeyringSettings {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(TidalSessionError::Keyring(e).into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entry(key)?
            .set_password(value)
            .map_err(|e| TidalSessionError::Keyring(e).into())
    }

    fn remove(&self, key: &str) -> Result<()> {
        match self.entry(key)?.delete_password() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(TidalSessionError::Keyring(e).into()),
        }
    }

    fn save(&self) -> Result<()> {
        // Keyring writes are durable as soon as set_password returns.
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
