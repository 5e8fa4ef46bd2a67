//! Live authorized TIDAL API client handle
//!
//! A [`TidalApi`] is produced by a successful authorization and is the only
//! object callers use to issue authenticated requests. It reads its bearer
//! token from the session's shared credential slot, so a background refresh
//! is observed by every in-flight holder without any handle swap.

use std::sync::{Arc, RwLock};

use crate::api::oauth::{TidalOAuth, UserProfile};
use crate::auth::credentials::Credentials;
use crate::error::{Result, TidalSessionError};

/// Authorized client handle bound to the session's current credentials.
///
/// Cloning is cheap; clones share the same credential slot. The coordinator
/// replaces the whole handle on each (re-)authorization, so holders of a
/// previous handle keep a coherent view rather than a half-updated one.
#[derive(Clone)]
pub struct TidalApi {
    oauth: Arc<dyn TidalOAuth>,
    credentials: Arc<RwLock<Option<Credentials>>>,
}

impl std::fmt::Debug for TidalApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TidalApi").finish_non_exhaustive()
    }
}

impl TidalApi {
    /// Creates a handle over the shared credential slot.
    pub fn new(oauth: Arc<dyn TidalOAuth>, credentials: Arc<RwLock<Option<Credentials>>>) -> Self {
        Self { oauth, credentials }
    }

    /// Returns the current access token.
    ///
    /// # Errors
    ///
    /// Returns [`TidalSessionError::NotInitialized`] when the credential
    /// slot is empty (the session was torn down underneath the handle).
    pub fn access_token(&self) -> Result<String> {
        let guard = self.credentials.read().expect("credentials lock poisoned");
        guard
            .as_ref()
            .map(|c| c.access_token.clone())
            .ok_or_else(|| TidalSessionError::NotInitialized.into())
    }

    /// Fetches the authenticated user's profile.
    ///
    /// The token is read immediately before the request, never held across
    /// it, so a concurrent refresh cannot block or be blocked by this call.
    pub async fn current_user(&self) -> Result<UserProfile> {
        let token = self.access_token()?;
        self.oauth.current_user(&token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::oauth::MockTidalOAuth;

    fn shared_slot(credentials: Option<Credentials>) -> Arc<RwLock<Option<Credentials>>> {
        Arc::new(RwLock::new(credentials))
    }

    #[test]
    fn test_access_token_reads_current_credentials() {
        let slot = shared_slot(Some(Credentials::new("tok_a", "rt", 0)));
        let api = TidalApi::new(Arc::new(MockTidalOAuth::new()), slot);
        assert_eq!(api.access_token().unwrap(), "tok_a");
    }

    #[test]
    fn test_access_token_observes_replacement() {
        let slot = shared_slot(Some(Credentials::new("tok_a", "rt", 0)));
        let api = TidalApi::new(Arc::new(MockTidalOAuth::new()), slot.clone());

        *slot.write().unwrap() = Some(Credentials::new("tok_b", "rt", 0));
        assert_eq!(api.access_token().unwrap(), "tok_b");
    }

    #[test]
    fn test_access_token_fails_when_slot_empty() {
        let api = TidalApi::new(Arc::new(MockTidalOAuth::new()), shared_slot(None));
        let err = api.access_token().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TidalSessionError>(),
            Some(TidalSessionError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn test_current_user_uses_current_token() {
        let mut oauth = MockTidalOAuth::new();
        oauth
            .expect_current_user()
            .withf(|token| token == "tok_now")
            .times(1)
            .returning(|_| {
                Ok(UserProfile {
                    id: "42".to_string(),
                    username: None,
                    email: None,
                    country: None,
                })
            });

        let slot = shared_slot(Some(Credentials::new("tok_now", "rt", 0)));
        let api = TidalApi::new(Arc::new(oauth), slot);
        let profile = api.current_user().await.unwrap();
        assert_eq!(profile.id, "42");
    }
}
