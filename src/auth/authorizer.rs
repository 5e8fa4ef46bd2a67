//! Session coordinator
//!
//! [`TidalAuthorizer`] owns one authorization session end to end. It decides
//! between the silent path (cached credentials, refreshed once if stale) and
//! the interactive flow, publishes the resulting [`TidalApi`] handle, caches
//! the user profile, and keeps exactly one refresh scheduler alive per
//! established session. Shutdown is explicit and idempotent; afterwards
//! every entry point reports [`TidalSessionError::AlreadyShutdown`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::oauth::{TidalOAuth, UserProfile};
use crate::api::TidalApi;
use crate::auth::credentials::Credentials;
use crate::auth::flow::{AuthFlow, CALLBACK_PORT, CALLBACK_TIMEOUT_SECS};
use crate::auth::scheduler::RefreshScheduler;
use crate::auth::store::CredentialStore;
use crate::error::{Result, TidalSessionError};

/// Coordinates credential acquisition, the live API handle, and the
/// background refresh loop for one session.
///
/// All methods take `&self`; the authorizer is designed to sit behind an
/// `Arc` and be called from multiple tasks. Concurrent `authorize()` calls
/// are serialized: the first performs the work and later callers adopt the
/// session it established instead of starting flows of their own.
pub struct TidalAuthorizer {
    oauth: Arc<dyn TidalOAuth>,
    store: CredentialStore,
    /// Shared slot read by every [`TidalApi`] clone and written by the
    /// refresh loop.
    credentials: Arc<RwLock<Option<Credentials>>>,
    api: StdMutex<Option<TidalApi>>,
    current_user: StdMutex<Option<UserProfile>>,
    scheduler: Mutex<Option<RefreshScheduler>>,
    /// Serializes authorization attempts. Held only inside `authorize()`.
    auth_gate: Mutex<()>,
    shut_down: AtomicBool,
    shutdown: CancellationToken,
    callback_port: u16,
    callback_timeout: Duration,
    open_browser: bool,
}

impl TidalAuthorizer {
    /// Creates an authorizer with the fixed production callback port and
    /// timeout.
    pub fn new(oauth: Arc<dyn TidalOAuth>, store: CredentialStore) -> Self {
        Self {
            oauth,
            store,
            credentials: Arc::new(RwLock::new(None)),
            api: StdMutex::new(None),
            current_user: StdMutex::new(None),
            scheduler: Mutex::new(None),
            auth_gate: Mutex::new(()),
            shut_down: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            callback_port: CALLBACK_PORT,
            callback_timeout: Duration::from_secs(CALLBACK_TIMEOUT_SECS),
            open_browser: true,
        }
    }

    /// Overrides the callback port for the interactive flow.
    pub fn with_callback_port(mut self, port: u16) -> Self {
        self.callback_port = port;
        self
    }

    /// Overrides the callback timeout. Useful for tests.
    pub fn with_callback_timeout(mut self, timeout: Duration) -> Self {
        self.callback_timeout = timeout;
        self
    }

    /// Enables or disables opening the login URL in the system browser.
    pub fn with_open_browser(mut self, open: bool) -> Self {
        self.open_browser = open;
        self
    }

    /// Establishes an authorized session and returns the live API handle.
    ///
    /// Resolution order:
    ///
    /// 1. A caller that queued behind an in-flight authorization adopts the
    ///    session it established.
    /// 2. Cached credentials that are still fresh are used as-is.
    /// 3. Cached credentials inside the expiry buffer get exactly one
    ///    refresh attempt; a failed refresh clears the cache.
    /// 4. Otherwise the interactive flow runs.
    ///
    /// The user profile is fetched as part of establishment; a profile
    /// failure fails the whole authorization and leaves the session
    /// unestablished.
    ///
    /// # Errors
    ///
    /// Returns [`TidalSessionError::AlreadyShutdown`] after `shutdown()`,
    /// or any error from the interactive flow, token refresh, persistence,
    /// or the profile fetch.
    pub async fn authorize(&self) -> Result<TidalApi> {
        self.ensure_active()?;
        let _gate = self.auth_gate.lock().await;
        self.ensure_active()?;

        if let Some(api) = self.established_session() {
            debug!("joining already-established session");
            return Ok(api);
        }

        let credentials = self.acquire_credentials().await?;
        *self
            .credentials
            .write()
            .expect("credentials lock poisoned") = Some(credentials);

        let api = TidalApi::new(Arc::clone(&self.oauth), Arc::clone(&self.credentials));
        let profile = match api.current_user().await {
            Ok(profile) => profile,
            Err(e) => {
                self.credentials
                    .write()
                    .expect("credentials lock poisoned")
                    .take();
                return Err(e);
            }
        };
        // A shutdown that arrived while the profile fetch was in flight
        // wins; a terminal session must never be repopulated.
        if self.shut_down.load(Ordering::SeqCst) {
            self.credentials
                .write()
                .expect("credentials lock poisoned")
                .take();
            return Err(TidalSessionError::AlreadyShutdown.into());
        }
        info!(
            "Successfully authenticated user: {}",
            profile.username.as_deref().unwrap_or(&profile.id)
        );

        *self.api.lock().expect("api lock poisoned") = Some(api.clone());
        *self
            .current_user
            .lock()
            .expect("current_user lock poisoned") = Some(profile);

        self.restart_scheduler().await;
        Ok(api)
    }

    /// Returns the live API handle.
    ///
    /// # Errors
    ///
    /// Returns [`TidalSessionError::NotInitialized`] before a successful
    /// `authorize()` or after `shutdown()`.
    pub fn tidal_api(&self) -> Result<TidalApi> {
        self.api
            .lock()
            .expect("api lock poisoned")
            .clone()
            .ok_or_else(|| TidalSessionError::NotInitialized.into())
    }

    /// The profile cached by the last successful authorization, if any.
    pub fn current_user(&self) -> Option<UserProfile> {
        self.current_user
            .lock()
            .expect("current_user lock poisoned")
            .clone()
    }

    /// Tears the session down: stops the refresh loop, unblocks any
    /// in-flight interactive flow, and drops the in-memory session state.
    /// An `authorize()` call still in flight observes the shutdown, fails
    /// with [`TidalSessionError::AlreadyShutdown`], and never repopulates
    /// the torn-down session.
    ///
    /// Persisted credentials are left intact so the next run can resume
    /// silently. Idempotent; later calls are no-ops.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            debug!("authorizer already shut down");
            return;
        }
        self.shutdown.cancel();
        // Drain the gate so an in-flight authorize() observes the flag and
        // settles before the session state is torn down underneath it.
        drop(self.auth_gate.lock().await);
        if let Some(scheduler) = self.scheduler.lock().await.take() {
            scheduler.stop().await;
        }
        self.api.lock().expect("api lock poisoned").take();
        self.current_user
            .lock()
            .expect("current_user lock poisoned")
            .take();
        self.credentials
            .write()
            .expect("credentials lock poisoned")
            .take();
        info!("authorizer shut down");
    }

    fn ensure_active(&self) -> Result<()> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(TidalSessionError::AlreadyShutdown.into());
        }
        Ok(())
    }

    /// The current session, when its credentials are still fresh.
    fn established_session(&self) -> Option<TidalApi> {
        let api = self.api.lock().expect("api lock poisoned").clone()?;
        let fresh = self
            .credentials
            .read()
            .expect("credentials lock poisoned")
            .as_ref()
            .map(|c| !c.is_expired())
            .unwrap_or(false);
        fresh.then_some(api)
    }

    /// Silent path first, interactive flow as the fallback.
    async fn acquire_credentials(&self) -> Result<Credentials> {
        if let Some(cached) = self.store.load()? {
            if !cached.is_expired() {
                debug!("using cached credentials");
                return Ok(cached);
            }
            debug!("cached credentials are stale, refreshing");
            match self.oauth.refresh(&cached.refresh_token).await {
                Ok(refreshed) => {
                    self.store.save(&refreshed)?;
                    return Ok(refreshed);
                }
                Err(e) => {
                    warn!("token refresh failed, re-authorization required: {e}");
                    self.store.clear()?;
                }
            }
        }

        let flow = AuthFlow::new(
            Arc::clone(&self.oauth),
            self.store.clone(),
            self.shutdown.child_token(),
        )
        .with_port(self.callback_port)
        .with_callback_timeout(self.callback_timeout)
        .with_open_browser(self.open_browser);
        flow.run().await
    }

    /// One scheduler per established session. Restarting on every
    /// authorization keeps the loop keyed to the freshest credentials.
    async fn restart_scheduler(&self) {
        let mut guard = self.scheduler.lock().await;
        if let Some(old) = guard.take() {
            old.stop().await;
        }
        *guard = Some(RefreshScheduler::start(
            Arc::clone(&self.oauth),
            self.store.clone(),
            Arc::clone(&self.credentials),
        ));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::oauth::MockTidalOAuth;
    use crate::storage::FileSettings;
    use async_trait::async_trait;
    use chrono::Utc;
    use tempfile::TempDir;
    use tokio::sync::Notify;

    fn temp_store() -> (CredentialStore, TempDir) {
        let tmp = TempDir::new().expect("tempdir");
        let settings = Arc::new(
            FileSettings::open(tmp.path().join("settings.json")).expect("open settings"),
        );
        (CredentialStore::new(settings), tmp)
    }

    fn profile() -> UserProfile {
        UserProfile {
            id: "42".to_string(),
            username: Some("alice".to_string()),
            email: None,
            country: Some("NO".to_string()),
        }
    }

    fn fresh_credentials() -> Credentials {
        Credentials::new("at_cached", "rt_cached", Utc::now().timestamp() + 3600)
    }

    fn stale_credentials() -> Credentials {
        Credentials::new("at_stale", "rt_stale", Utc::now().timestamp() + 10)
    }

    #[tokio::test]
    async fn test_authorize_uses_fresh_cached_credentials_without_any_flow() {
        let mut oauth = MockTidalOAuth::new();
        oauth.expect_build_login_url().times(0);
        oauth.expect_exchange_code().times(0);
        oauth.expect_refresh().times(0);
        oauth
            .expect_current_user()
            .times(1)
            .returning(|token| {
                assert_eq!(token, "at_cached");
                Ok(profile())
            });

        let (store, _tmp) = temp_store();
        store.save(&fresh_credentials()).unwrap();

        let authorizer = TidalAuthorizer::new(Arc::new(oauth), store);
        let api = authorizer.authorize().await.unwrap();

        assert_eq!(api.access_token().unwrap(), "at_cached");
        assert_eq!(authorizer.current_user().unwrap().id, "42");
        authorizer.shutdown().await;
    }

    #[tokio::test]
    async fn test_authorize_refreshes_stale_cached_credentials_once() {
        let mut oauth = MockTidalOAuth::new();
        oauth.expect_build_login_url().times(0);
        oauth.expect_exchange_code().times(0);
        oauth.expect_refresh().times(1).returning(|rt| {
            assert_eq!(rt, "rt_stale");
            Ok(Credentials::new(
                "at_refreshed",
                "rt_refreshed",
                Utc::now().timestamp() + 3600,
            ))
        });
        oauth
            .expect_current_user()
            .returning(|_| Ok(profile()));

        let (store, _tmp) = temp_store();
        store.save(&stale_credentials()).unwrap();

        let authorizer = TidalAuthorizer::new(Arc::new(oauth), store.clone());
        let api = authorizer.authorize().await.unwrap();

        assert_eq!(api.access_token().unwrap(), "at_refreshed");
        // Refreshed credentials are persisted before authorize() returns.
        assert_eq!(store.load().unwrap().unwrap().access_token, "at_refreshed");
        authorizer.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_clears_cache_and_falls_back_to_interactive() {
        let mut oauth = MockTidalOAuth::new();
        oauth.expect_refresh().times(1).returning(|_| {
            Err(TidalSessionError::Refresh("revoked".to_string()).into())
        });
        oauth.expect_build_login_url().returning(|_, _, _| {
            Ok(url::Url::parse("https://login.tidal.com/authorize?client_id=x").unwrap())
        });
        oauth.expect_exchange_code().times(0);

        let (store, _tmp) = temp_store();
        store.save(&stale_credentials()).unwrap();

        // Nobody drives the interactive flow, so it times out; what matters
        // is that the fallback was reached and the stale cache was dropped.
        let authorizer = TidalAuthorizer::new(Arc::new(oauth), store.clone())
            .with_callback_port(0)
            .with_callback_timeout(Duration::from_secs(1))
            .with_open_browser(false);

        let err = authorizer.authorize().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TidalSessionError>(),
            Some(TidalSessionError::CallbackTimeout(1))
        ));
        assert!(store.load().unwrap().is_none());
        authorizer.shutdown().await;
    }

    #[tokio::test]
    async fn test_concurrent_authorize_joins_one_session() {
        let mut oauth = MockTidalOAuth::new();
        oauth.expect_refresh().times(0);
        // Exactly one profile fetch: the second caller adopts the first
        // caller's session instead of re-establishing.
        oauth
            .expect_current_user()
            .times(1)
            .returning(|_| Ok(profile()));

        let (store, _tmp) = temp_store();
        store.save(&fresh_credentials()).unwrap();

        let authorizer = Arc::new(TidalAuthorizer::new(Arc::new(oauth), store));
        let a = Arc::clone(&authorizer);
        let b = Arc::clone(&authorizer);
        let (first, second) =
            tokio::join!(tokio::spawn(async move { a.authorize().await }), tokio::spawn(
                async move { b.authorize().await }
            ));

        let first = first.unwrap().unwrap();
        let second = second.unwrap().unwrap();
        assert_eq!(first.access_token().unwrap(), second.access_token().unwrap());
        authorizer.shutdown().await;
    }

    #[tokio::test]
    async fn test_profile_failure_leaves_session_unestablished() {
        let mut oauth = MockTidalOAuth::new();
        oauth
            .expect_current_user()
            .returning(|_| Err(TidalSessionError::OAuth("profile unavailable".to_string()).into()));

        let (store, _tmp) = temp_store();
        store.save(&fresh_credentials()).unwrap();

        let authorizer = TidalAuthorizer::new(Arc::new(oauth), store);
        assert!(authorizer.authorize().await.is_err());

        let err = authorizer.tidal_api().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TidalSessionError>(),
            Some(TidalSessionError::NotInitialized)
        ));
        assert!(authorizer.current_user().is_none());
        authorizer.shutdown().await;
    }

    #[tokio::test]
    async fn test_tidal_api_before_authorize_is_not_initialized() {
        let (store, _tmp) = temp_store();
        let authorizer = TidalAuthorizer::new(Arc::new(MockTidalOAuth::new()), store);

        let err = authorizer.tidal_api().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TidalSessionError>(),
            Some(TidalSessionError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn test_authorize_after_shutdown_is_rejected() {
        let (store, _tmp) = temp_store();
        let authorizer = TidalAuthorizer::new(Arc::new(MockTidalOAuth::new()), store);

        authorizer.shutdown().await;
        let err = authorizer.authorize().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TidalSessionError>(),
            Some(TidalSessionError::AlreadyShutdown)
        ));
    }

    /// Parks `current_user` until the test releases it, so a shutdown can
    /// be interleaved with an authorize that is mid profile fetch.
    struct BlockingProfileOAuth {
        entered: Arc<Notify>,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl crate::api::oauth::TidalOAuth for BlockingProfileOAuth {
        async fn build_login_url(
            &self,
            _redirect_uri: &str,
            _scope: &str,
            _state: &str,
        ) -> crate::error::Result<url::Url> {
            unimplemented!("not exercised")
        }

        async fn exchange_code(
            &self,
            _code: &str,
            _redirect_uri: &str,
        ) -> crate::error::Result<Credentials> {
            unimplemented!("not exercised")
        }

        async fn refresh(&self, _refresh_token: &str) -> crate::error::Result<Credentials> {
            unimplemented!("not exercised")
        }

        async fn current_user(&self, _access_token: &str) -> crate::error::Result<UserProfile> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(profile())
        }
    }

    #[tokio::test]
    async fn test_shutdown_during_in_flight_authorize_keeps_session_terminal() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let oauth = Arc::new(BlockingProfileOAuth {
            entered: Arc::clone(&entered),
            release: Arc::clone(&release),
        });

        let (store, _tmp) = temp_store();
        store.save(&fresh_credentials()).unwrap();

        let authorizer = Arc::new(TidalAuthorizer::new(oauth, store));
        let in_flight = {
            let authorizer = Arc::clone(&authorizer);
            tokio::spawn(async move { authorizer.authorize().await })
        };

        // Wait until the authorize is parked inside the profile fetch,
        // then shut down while it is still in flight.
        entered.notified().await;
        let teardown = {
            let authorizer = Arc::clone(&authorizer);
            tokio::spawn(async move { authorizer.shutdown().await })
        };
        // Let the shutdown set the terminal flag and queue on the gate
        // before the profile fetch is released.
        tokio::time::sleep(Duration::from_millis(50)).await;
        release.notify_one();

        let err = in_flight.await.unwrap().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TidalSessionError>(),
            Some(TidalSessionError::AlreadyShutdown)
        ));
        teardown.await.unwrap();

        // The late-finishing authorize must not have repopulated anything.
        let err = authorizer.tidal_api().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TidalSessionError>(),
            Some(TidalSessionError::NotInitialized)
        ));
        assert!(authorizer.current_user().is_none());
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent_and_clears_session_state() {
        let mut oauth = MockTidalOAuth::new();
        oauth
            .expect_current_user()
            .returning(|_| Ok(profile()));

        let (store, _tmp) = temp_store();
        store.save(&fresh_credentials()).unwrap();

        let authorizer = TidalAuthorizer::new(Arc::new(oauth), store.clone());
        authorizer.authorize().await.unwrap();

        authorizer.shutdown().await;
        authorizer.shutdown().await;

        assert!(authorizer.current_user().is_none());
        assert!(authorizer.tidal_api().is_err());
        // Persisted credentials survive shutdown.
        assert!(store.load().unwrap().is_some());
    }
}
