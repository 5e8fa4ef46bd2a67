//! Local HTTP endpoint for the OAuth redirect
//!
//! A [`CallbackListener`] is a short-lived axum server bound to the fixed
//! local callback port. It accepts the authorization-server redirect,
//! extracts `code`/`state`/`error`, and settles a oneshot channel exactly
//! once. Requests arriving after settlement get an error page and cannot
//! overwrite the first result, so a second attacker-supplied redirect is
//! harmless. Every request is answered with a rendered HTML page so the
//! user's browser is never left hanging.
//!
//! The listener's lifetime is owned by the authorization attempt that
//! created it; [`stop`](CallbackListener::stop) releases the port even when
//! no redirect ever arrived.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::auth::SHUTDOWN_GRACE;
use crate::error::{Result, TidalSessionError};

/// Path the authorization server redirects to.
pub const CALLBACK_PATH: &str = "/callback";

/// The `code`/`state` pair delivered by a well-formed redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthCode {
    /// One-time authorization code to exchange for tokens.
    pub code: String,

    /// CSRF state nonce echoed back by the authorization server.
    pub state: String,
}

/// Outcome of one listener instance, delivered through the oneshot channel.
pub type Settlement = std::result::Result<AuthCode, TidalSessionError>;

struct CallbackState {
    settle: Mutex<Option<oneshot::Sender<Settlement>>>,
}

/// One-shot localhost listener for the OAuth redirect.
pub struct CallbackListener {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    server: JoinHandle<()>,
}

impl CallbackListener {
    /// Binds `127.0.0.1:port` and starts serving the callback path.
    ///
    /// Pass `0` to let the OS assign a free port (tests); production uses
    /// the fixed callback port. Returns the listener handle together with
    /// the receiver that resolves on the first redirect.
    ///
    /// # Errors
    ///
    /// Returns [`TidalSessionError::Io`] when the port cannot be bound,
    /// typically because a previous attempt is still holding it.
    pub async fn bind(port: u16) -> Result<(Self, oneshot::Receiver<Settlement>)> {
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
        let addr = listener.local_addr()?;

        let (settle_tx, settle_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let state = Arc::new(CallbackState {
            settle: Mutex::new(Some(settle_tx)),
        });

        let app = Router::new()
            .route(CALLBACK_PATH, get(handle_redirect))
            .with_state(state);

        let server = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = serve.await {
                warn!("callback server terminated with error: {e}");
            }
        });

        debug!(%addr, "callback server started");

        Ok((
            Self {
                addr,
                shutdown: Some(shutdown_tx),
                server,
            },
            settle_rx,
        ))
    }

    /// The bound socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The bound port.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Stops the server and releases the port.
    ///
    /// Graceful shutdown is bounded by the session grace period; a server
    /// that does not wind down in time is aborted.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut self.server)
            .await
            .is_err()
        {
            warn!("callback server did not stop gracefully, aborting");
            self.server.abort();
        }
        debug!("callback server stopped");
    }
}

async fn handle_redirect(
    State(state): State<Arc<CallbackState>>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, Html<String>) {
    // Take the sender first; a listener that has already settled serves an
    // error page and leaves the original result untouched.
    let Some(tx) = state
        .settle
        .lock()
        .expect("settlement mutex poisoned")
        .take()
    else {
        return (
            StatusCode::BAD_REQUEST,
            Html(render_error_page(
                "This authorization attempt has already completed.",
            )),
        );
    };

    if let Some(error) = params.get("error") {
        let _ = tx.send(Err(TidalSessionError::OAuth(error.clone())));
        return (
            StatusCode::BAD_REQUEST,
            Html(render_error_page(&format!("OAuth error: {error}"))),
        );
    }

    match (params.get("code"), params.get("state")) {
        (Some(code), Some(csrf_state)) => {
            let _ = tx.send(Ok(AuthCode {
                code: code.clone(),
                state: csrf_state.clone(),
            }));
            (StatusCode::OK, Html(render_success_page()))
        }
        _ => {
            let _ = tx.send(Err(TidalSessionError::MalformedCallback(
                "missing code or state parameter".to_string(),
            )));
            (
                StatusCode::BAD_REQUEST,
                Html(render_error_page("Missing code or state parameter")),
            )
        }
    }
}

fn render_success_page() -> String {
    r#"<!DOCTYPE html>
<html>
<head>
    <title>Authentication Successful</title>
    <style>
        body { font-family: Arial, sans-serif; text-align: center; padding: 50px; }
        h1 { color: #4CAF50; }
    </style>
</head>
<body>
    <h1>Authentication Successful!</h1>
    <p>You have successfully authenticated with TIDAL.</p>
    <p>You may close this window and return to the application.</p>
</body>
</html>
"#
    .to_string()
}

fn render_error_page(message: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Authentication Failed</title>
    <style>
        body {{ font-family: Arial, sans-serif; text-align: center; padding: 50px; }}
        h1 {{ color: #f44336; }}
    </style>
</head>
<body>
    <h1>Authentication Failed</h1>
    <p>{message}</p>
    <p>Please try again or contact support.</p>
</body>
</html>
"#
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
