//! Interactive authorization-code flow
//!
//! [`AuthFlow`] drives the user-interaction leg of the OAuth2
//! authorization-code grant end-to-end:
//!
//! 1. Compute the fixed local redirect URI and scope set.
//! 2. Start the callback listener.
//! 3. Concurrently, build the login URL, log it for the operator, and
//!    (optionally) open it in the system browser.
//! 4. Race the callback settlement against the 5-minute timeout and the
//!    session shutdown token.
//! 5. Validate the CSRF state and exchange the code for credentials.
//! 6. Stop the listener unconditionally, success or failure.
//! 7. Persist the credentials before returning.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::api::oauth::TidalOAuth;
use crate::auth::callback::{AuthCode, CallbackListener, Settlement, CALLBACK_PATH};
use crate::auth::credentials::Credentials;
use crate::auth::store::CredentialStore;
use crate::error::{Result, TidalSessionError};

/// Fixed local port the authorization server redirects to.
pub const CALLBACK_PORT: u16 = 8888;

/// How long to wait for the user to complete the browser leg.
pub const CALLBACK_TIMEOUT_SECS: u64 = 300;

/// Scopes requested on every authorization. Not user-configurable.
pub const SCOPES: &[&str] = &[
    "user.read",
    "playlists.read",
    "playlists.write",
    "user.library.read",
    "user.library.write",
];

/// Drives one interactive authorization attempt.
///
/// The flow owns its callback listener for exactly one attempt; the listener
/// never outlives the attempt. The callback timeout is a field so tests can
/// compress it; production construction keeps the 5-minute default.
pub struct AuthFlow {
    oauth: Arc<dyn TidalOAuth>,
    store: CredentialStore,
    port: u16,
    callback_timeout: Duration,
    open_browser: bool,
    shutdown: CancellationToken,
}

impl AuthFlow {
    /// Creates a flow with the fixed production port and timeout.
    ///
    /// `shutdown` pre-empts a still-waiting callback so the session can be
    /// torn down while a flow is in flight.
    pub fn new(
        oauth: Arc<dyn TidalOAuth>,
        store: CredentialStore,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            oauth,
            store,
            port: CALLBACK_PORT,
            callback_timeout: Duration::from_secs(CALLBACK_TIMEOUT_SECS),
            open_browser: true,
            shutdown,
        }
    }

    /// Overrides the callback port. Pass `0` for an OS-assigned port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Overrides the callback timeout. Useful for tests.
    pub fn with_callback_timeout(mut self, timeout: Duration) -> Self {
        self.callback_timeout = timeout;
        self
    }

    /// Enables or disables the browser auto-open. The login URL is logged
    /// either way.
    pub fn with_open_browser(mut self, open: bool) -> Self {
        self.open_browser = open;
        self
    }

    /// The redirect URI registered with the authorization server.
    pub fn redirect_uri(&self) -> String {
        format!("http://localhost:{}{}", self.port, CALLBACK_PATH)
    }

    /// Runs the full interactive flow and returns validated credentials.
    ///
    /// The resulting credentials are persisted to the store before this
    /// method returns. Exchange failures are not retried; the caller must
    /// restart the flow.
    ///
    /// # Errors
    ///
    /// - [`TidalSessionError::OAuth`] -- the server returned an `error`
    ///   parameter, the state nonce did not match, or the login URL could
    ///   not be constructed.
    /// - [`TidalSessionError::MalformedCallback`] -- the redirect was
    ///   missing `code` or `state`.
    /// - [`TidalSessionError::CallbackTimeout`] -- no redirect arrived in
    ///   time.
    /// - [`TidalSessionError::TokenExchange`] -- the code exchange was
    ///   rejected.
    /// - [`TidalSessionError::AlreadyShutdown`] -- the session shut down
    ///   while waiting.
    pub async fn run(&self) -> Result<Credentials> {
        let redirect_uri = self.redirect_uri();
        let state = generate_state();

        let (listener, settle_rx) = CallbackListener::bind(self.port).await?;
        debug!(port = listener.port(), "awaiting OAuth callback");

        // Build and surface the login URL without blocking the callback
        // wait; a URL construction failure fails the whole attempt.
        let mut url_task = tokio::spawn({
            let oauth = Arc::clone(&self.oauth);
            let redirect_uri = redirect_uri.clone();
            let state = state.clone();
            let open_browser = self.open_browser;
            async move {
                let url = oauth
                    .build_login_url(&redirect_uri, &SCOPES.join(" "), &state)
                    .await?;
                info!("Authorization URL: {url}");
                info!("Please visit this URL to authorize the application");
                if open_browser {
                    try_open_browser(url.as_str());
                }
                Ok::<(), anyhow::Error>(())
            }
        });

        let outcome = self.wait_for_callback(settle_rx, &mut url_task).await;

        // The listener never outlives the attempt, whatever the outcome.
        url_task.abort();
        listener.stop().await;

        let auth_code = outcome?;
        if auth_code.state != state {
            return Err(TidalSessionError::OAuth(
                "state mismatch in OAuth callback".to_string(),
            )
            .into());
        }

        let credentials = self.oauth.exchange_code(&auth_code.code, &redirect_uri).await?;
        self.store.save(&credentials)?;
        debug!("authentication finalized successfully");
        Ok(credentials)
    }

    /// Races the callback settlement against the login-URL task, the
    /// timeout, and session shutdown.
    async fn wait_for_callback(
        &self,
        mut settle_rx: oneshot::Receiver<Settlement>,
        url_task: &mut JoinHandle<Result<()>>,
    ) -> Result<AuthCode> {
        let timeout = tokio::time::sleep(self.callback_timeout);
        tokio::pin!(timeout);
        let mut url_pending = true;

        loop {
            tokio::select! {
                settled = &mut settle_rx => {
                    return match settled {
                        Ok(Ok(auth_code)) => Ok(auth_code),
                        Ok(Err(e)) => Err(e.into()),
                        Err(_) => Err(TidalSessionError::MalformedCallback(
                            "callback listener dropped before settling".to_string(),
                        )
                        .into()),
                    };
                }
                res = &mut *url_task, if url_pending => {
                    url_pending = false;
                    match res {
                        // URL surfaced; keep waiting for the redirect.
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => return Err(e),
                        Err(e) => {
                            return Err(TidalSessionError::OAuth(format!(
                                "login URL construction failed: {e}"
                            ))
                            .into())
                        }
                    }
                }
                _ = &mut timeout => {
                    return Err(TidalSessionError::CallbackTimeout(
                        self.callback_timeout.as_secs(),
                    )
                    .into());
                }
                _ = self.shutdown.cancelled() => {
                    return Err(TidalSessionError::AlreadyShutdown.into());
                }
            }
        }
    }
}

/// Generates a cryptographically random CSRF state nonce.
///
/// 16 random bytes encoded as base64url without padding.
pub fn generate_state() -> String {
    use rand::RngCore as _;
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Attempts to open the login URL in the user's default browser.
///
/// Errors are intentionally ignored; the URL is always logged so the user
/// can open it manually.
fn try_open_browser(url: &str) {
    #[cfg(target_os = "macos")]
    {
        let _ = std::process::Command::new("open").arg(url).spawn();
    }
    #[cfg(target_os = "linux")]
    {
        let _ = std::process::Command::new("xdg-open").arg(url).spawn();
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        let _ = url;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
