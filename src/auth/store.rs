//! Credential store adapter
//!
//! Wraps a [`SettingsStore`] backend and maps the credential triple onto the
//! three persisted keys. Loading is all-or-none: unless every key is present
//! and the expiry parses as an integer, the cache is treated as absent so a
//! partially written store can never produce a partial credential.

use std::sync::Arc;

use tracing::debug;

use crate::auth::credentials::Credentials;
use crate::error::Result;
use crate::storage::SettingsStore;

/// Persisted key for the access token.
const KEY_ACCESS_TOKEN: &str = "accessToken";
/// Persisted key for the refresh token.
const KEY_REFRESH_TOKEN: &str = "refreshToken";
/// Persisted key for the expiry epoch seconds.
const KEY_EXPIRES_AT: &str = "tokenExpiresAt";

/// Adapter between [`Credentials`] and the key-value settings backend.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use tidal_session::auth::credentials::Credentials;
/// use tidal_session::auth::store::CredentialStore;
/// use tidal_session::storage::FileSettings;
///
/// # fn example() -> tidal_session::error::Result<()> {
/// let settings = Arc::new(FileSettings::open("/tmp/tidal-session/settings.json")?);
/// let store = CredentialStore::new(settings);
///
/// store.save(&Credentials::new("at", "rt", 2_000_000_000))?;
/// assert!(store.load()?.is_some());
/// store.clear()?;
/// assert!(store.load()?.is_none());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct CredentialStore {
    settings: Arc<dyn SettingsStore>,
}

impl CredentialStore {
    /// Creates a credential store over the given settings backend.
    pub fn new(settings: Arc<dyn SettingsStore>) -> Self {
        Self { settings }
    }

    /// Loads cached credentials.
    ///
    /// Returns `Ok(None)` when any of the three keys is missing or the
    /// expiry value does not parse as an integer; malformed partial state is
    /// never surfaced as a partial credential.
    ///
    /// # Errors
    ///
    /// Returns an error only when the underlying backend fails to read.
    pub fn load(&self) -> Result<Option<Credentials>> {
        let access_token = self.settings.get(KEY_ACCESS_TOKEN)?;
        let refresh_token = self.settings.get(KEY_REFRESH_TOKEN)?;
        let expires_at = self.settings.get(KEY_EXPIRES_AT)?;

        let (Some(access_token), Some(refresh_token), Some(expires_at)) =
            (access_token, refresh_token, expires_at)
        else {
            debug!("no complete cached credentials found");
            return Ok(None);
        };

        let Ok(expires_at) = expires_at.parse::<i64>() else {
            debug!("cached expiry is not an integer, treating cache as absent");
            return Ok(None);
        };

        Ok(Some(Credentials {
            access_token,
            refresh_token,
            expires_at,
        }))
    }

    /// Persists credentials synchronously.
    ///
    /// All three keys are written and the backend is saved before this
    /// method returns; callers may rely on durability.
    pub fn save(&self, credentials: &Credentials) -> Result<()> {
        self.settings
            .set(KEY_ACCESS_TOKEN, &credentials.access_token)?;
        self.settings
            .set(KEY_REFRESH_TOKEN, &credentials.refresh_token)?;
        self.settings
            .set(KEY_EXPIRES_AT, &credentials.expires_at.to_string())?;
        self.settings.save()?;
        debug!("credentials saved to cache");
        Ok(())
    }

    /// Removes all three credential keys. Idempotent.
    pub fn clear(&self) -> Result<()> {
        self.settings.remove(KEY_ACCESS_TOKEN)?;
        self.settings.remove(KEY_REFRESH_TOKEN)?;
        self.settings.remove(KEY_EXPIRES_AT)?;
        self.settings.save()?;
        debug!("cached credentials cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FileSettings;
    use tempfile::TempDir;

    fn temp_credential_store() -> (CredentialStore, Arc<FileSettings>, TempDir) {
        let tmp = TempDir::new().expect("tempdir");
        let settings = Arc::new(
            FileSettings::open(tmp.path().join("settings.json")).expect("open settings"),
        );
        (CredentialStore::new(settings.clone()), settings, tmp)
    }

    #[test]
    fn test_load_returns_none_when_empty() {
        let (store, _settings, _tmp) = temp_credential_store();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_save_then_load_roundtrip() {
        let (store, _settings, _tmp) = temp_credential_store();
        let creds = Credentials::new("access", "refresh", 1_900_000_000);
        store.save(&creds).unwrap();
        assert_eq!(store.load().unwrap(), Some(creds));
    }

    #[test]
    fn test_load_returns_none_when_access_token_missing() {
        let (store, settings, _tmp) = temp_credential_store();
        settings.set(KEY_REFRESH_TOKEN, "rt").unwrap();
        settings.set(KEY_EXPIRES_AT, "123").unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_load_returns_none_when_refresh_token_missing() {
        let (store, settings, _tmp) = temp_credential_store();
        settings.set(KEY_ACCESS_TOKEN, "at").unwrap();
        settings.set(KEY_EXPIRES_AT, "123").unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_load_returns_none_when_expiry_missing() {
        let (store, settings, _tmp) = temp_credential_store();
        settings.set(KEY_ACCESS_TOKEN, "at").unwrap();
        settings.set(KEY_REFRESH_TOKEN, "rt").unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_load_returns_none_when_expiry_not_integer() {
        let (store, settings, _tmp) = temp_credential_store();
        settings.set(KEY_ACCESS_TOKEN, "at").unwrap();
        settings.set(KEY_REFRESH_TOKEN, "rt").unwrap();
        settings.set(KEY_EXPIRES_AT, "not-a-number").unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_save_is_durable_before_return() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("settings.json");
        let store = CredentialStore::new(Arc::new(FileSettings::open(&path).unwrap()));
        store
            .save(&Credentials::new("at", "rt", 42))
            .expect("save");

        // A fresh store over the same file sees the saved credentials.
        let reopened = CredentialStore::new(Arc::new(FileSettings::open(&path).unwrap()));
        assert_eq!(
            reopened.load().unwrap(),
            Some(Credentials::new("at", "rt", 42))
        );
    }

    #[test]
    fn test_clear_removes_all_keys() {
        let (store, settings, _tmp) = temp_credential_store();
        store.save(&Credentials::new("at", "rt", 42)).unwrap();
        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
        assert_eq!(settings.get(KEY_ACCESS_TOKEN).unwrap(), None);
        assert_eq!(settings.get(KEY_REFRESH_TOKEN).unwrap(), None);
        assert_eq!(settings.get(KEY_EXPIRES_AT).unwrap(), None);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let (store, _settings, _tmp) = temp_credential_store();
        store.clear().unwrap();
        store.clear().unwrap();
    }

    #[test]
    fn test_save_replaces_whole_triple() {
        let (store, _settings, _tmp) = temp_credential_store();
        store.save(&Credentials::new("old_at", "old_rt", 1)).unwrap();
        store.save(&Credentials::new("new_at", "new_rt", 2)).unwrap();
        assert_eq!(
            store.load().unwrap(),
            Some(Credentials::new("new_at", "new_rt", 2))
        );
    }
}
