//! Background token refresh loop
//!
//! [`RefreshScheduler`] keeps the session's credentials valid without user
//! interaction. It owns a single tokio task that sleeps until shortly
//! before expiry, refreshes, persists, updates the shared credential slot,
//! and recomputes the next delay, forming a self-perpetuating loop for the
//! life of the session. Refreshes run strictly one at a time.
//!
//! A failed refresh (or a failed persist) is logged and retried after a
//! fixed one-minute backoff, indefinitely, until a refresh succeeds or the
//! scheduler is stopped. Failures are never surfaced to callers; they are
//! observable only through logs.

use std::sync::{Arc, RwLock};

use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::api::oauth::TidalOAuth;
use crate::auth::credentials::Credentials;
use crate::auth::store::CredentialStore;
use crate::auth::SHUTDOWN_GRACE;

/// Fixed backoff between refresh retries after a failure.
pub const RETRY_DELAY_SECS: u64 = 60;

/// Cancellable handle to the background refresh loop.
pub struct RefreshScheduler {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl RefreshScheduler {
    /// Spawns the refresh loop over the shared credential slot.
    ///
    /// The loop reads the slot to compute each delay and writes it after
    /// every successful refresh; locks are never held across the refresh
    /// call itself.
    pub fn start(
        oauth: Arc<dyn TidalOAuth>,
        store: CredentialStore,
        credentials: Arc<RwLock<Option<Credentials>>>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_loop(oauth, store, credentials, cancel.clone()));
        Self { cancel, task }
    }

    /// Cancels the loop and waits for it to exit.
    ///
    /// Bounded by the session grace period; a loop that does not wind down
    /// in time is aborted. No refresh fires after this returns.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut self.task)
            .await
            .is_err()
        {
            warn!("refresh loop did not stop gracefully, aborting");
            self.task.abort();
        }
        debug!("refresh scheduler stopped");
    }
}

async fn run_loop(
    oauth: Arc<dyn TidalOAuth>,
    store: CredentialStore,
    credentials: Arc<RwLock<Option<Credentials>>>,
    cancel: CancellationToken,
) {
    loop {
        let delay = {
            let guard = credentials.read().expect("credentials lock poisoned");
            match guard.as_ref() {
                Some(creds) => creds.refresh_delay(),
                None => {
                    warn!("refresh loop started without credentials, exiting");
                    break;
                }
            }
        };

        debug!(delay_secs = delay.as_secs(), "scheduling token refresh");
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }

        let refresh_token = {
            let guard = credentials.read().expect("credentials lock poisoned");
            match guard.as_ref() {
                Some(creds) => creds.refresh_token.clone(),
                None => break,
            }
        };

        debug!("refreshing token");
        let refreshed = match oauth.refresh(&refresh_token).await {
            Ok(new_credentials) => store.save(&new_credentials).map(|()| new_credentials),
            Err(e) => Err(e),
        };

        match refreshed {
            Ok(new_credentials) => {
                *credentials.write().expect("credentials lock poisoned") =
                    Some(new_credentials);
                debug!("token refreshed");
            }
            Err(e) => {
                error!("failed to refresh token: {e}");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(Duration::from_secs(RETRY_DELAY_SECS)) => {}
                }
            }
        }
    }
    debug!("refresh loop exited");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::oauth::MockTidalOAuth;
    use crate::auth::credentials::REFRESH_BUFFER_SECS;
    use crate::error::TidalSessionError;
    use crate::storage::FileSettings;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn temp_store() -> (CredentialStore, TempDir) {
        let tmp = TempDir::new().expect("tempdir");
        let settings = Arc::new(
            FileSettings::open(tmp.path().join("settings.json")).expect("open settings"),
        );
        (CredentialStore::new(settings), tmp)
    }

    fn shared_slot(credentials: Credentials) -> Arc<RwLock<Option<Credentials>>> {
        Arc::new(RwLock::new(Some(credentials)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_refresh_updates_slot_and_store() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut oauth = MockTidalOAuth::new();
        {
            let calls = Arc::clone(&calls);
            oauth.expect_refresh().returning(move |rt| {
                calls.fetch_add(1, Ordering::SeqCst);
                assert_eq!(rt, "rt_old");
                Ok(Credentials::new(
                    "at_new",
                    "rt_new",
                    Utc::now().timestamp() + 100_000,
                ))
            });
        }

        let (store, _tmp) = temp_store();
        // Expires inside the buffer window: refresh fires immediately.
        let slot = shared_slot(Credentials::new(
            "at_old",
            "rt_old",
            Utc::now().timestamp() + 60,
        ));
        let scheduler = RefreshScheduler::start(Arc::new(oauth), store.clone(), slot.clone());

        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(calls.load(Ordering::SeqCst) >= 1);
        assert_eq!(
            slot.read().unwrap().as_ref().unwrap().access_token,
            "at_new"
        );
        assert_eq!(
            store.load().unwrap().unwrap().access_token,
            "at_new"
        );

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_retries_on_fixed_cadence_without_giving_up() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut oauth = MockTidalOAuth::new();
        {
            let calls = Arc::clone(&calls);
            oauth.expect_refresh().returning(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TidalSessionError::Refresh("boom".to_string()).into())
            });
        }

        let (store, _tmp) = temp_store();
        let slot = shared_slot(Credentials::new(
            "at",
            "rt",
            Utc::now().timestamp() - 10,
        ));
        let scheduler = RefreshScheduler::start(Arc::new(oauth), store, slot.clone());

        // First attempt fires immediately, then one retry per minute.
        tokio::time::sleep(Duration::from_secs(RETRY_DELAY_SECS * 5 + 1)).await;

        let observed = calls.load(Ordering::SeqCst);
        assert!(
            (5..=7).contains(&observed),
            "expected ~6 attempts after 5 retry periods, got {observed}"
        );
        // Credentials are untouched after failures.
        assert_eq!(slot.read().unwrap().as_ref().unwrap().access_token, "at");

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_prevents_further_refreshes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut oauth = MockTidalOAuth::new();
        {
            let calls = Arc::clone(&calls);
            oauth.expect_refresh().returning(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TidalSessionError::Refresh("boom".to_string()).into())
            });
        }

        let (store, _tmp) = temp_store();
        let slot = shared_slot(Credentials::new("at", "rt", Utc::now().timestamp() - 10));
        let scheduler = RefreshScheduler::start(Arc::new(oauth), store, slot);

        tokio::time::sleep(Duration::from_secs(1)).await;
        scheduler.stop().await;
        let after_stop = calls.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_secs(RETRY_DELAY_SECS * 10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), after_stop);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_waits_for_buffer_boundary() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut oauth = MockTidalOAuth::new();
        {
            let calls = Arc::clone(&calls);
            oauth.expect_refresh().returning(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Credentials::new(
                    "at_new",
                    "rt_new",
                    Utc::now().timestamp() + 100_000,
                ))
            });
        }

        let (store, _tmp) = temp_store();
        // Expires one hour out: the refresh should not fire before
        // 3600 - buffer seconds of (virtual) time have passed.
        let slot = shared_slot(Credentials::new(
            "at",
            "rt",
            Utc::now().timestamp() + 3600,
        ));
        let scheduler = RefreshScheduler::start(Arc::new(oauth), store, slot);

        let early = 3600 - REFRESH_BUFFER_SECS as u64 - 30;
        tokio::time::sleep(Duration::from_secs(early)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(calls.load(Ordering::SeqCst) >= 1);

        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_loop_exits_when_slot_is_empty() {
        let oauth = MockTidalOAuth::new();
        let (store, _tmp) = temp_store();
        let slot: Arc<RwLock<Option<Credentials>>> = Arc::new(RwLock::new(None));
        let scheduler = RefreshScheduler::start(Arc::new(oauth), store, slot);

        // The task ends on its own; stop() still works afterwards.
        tokio::time::sleep(Duration::from_millis(50)).await;
        scheduler.stop().await;
    }
}
