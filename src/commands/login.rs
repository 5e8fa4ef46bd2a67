//! `login` command handler
//!
//! Runs the full authorization path: cached credentials when fresh, a
//! silent refresh when stale, and the interactive browser flow otherwise.

use std::sync::Arc;

use colored::Colorize as _;

use crate::auth::TidalAuthorizer;
use crate::commands::{build_oauth_client, format_expiry, open_credential_store};
use crate::config::Config;
use crate::error::Result;

/// Authorizes with TIDAL and caches the resulting credentials.
///
/// The authorizer is torn down before returning; the persisted credentials
/// are what later `status` calls and future sessions read.
pub async fn run_login(config: Config) -> Result<()> {
    let store = open_credential_store(&config)?;
    let oauth = Arc::new(build_oauth_client(&config)?);
    let authorizer = TidalAuthorizer::new(oauth, store.clone())
        .with_callback_port(config.tidal.callback_port)
        .with_open_browser(config.tidal.open_browser);

    let outcome = authorizer.authorize().await;
    let user = authorizer.current_user();
    authorizer.shutdown().await;
    outcome?;

    match user {
        Some(profile) => {
            let name = profile.username.unwrap_or(profile.id);
            println!("{} logged in as {}", "OK".green().bold(), name.bold());
        }
        None => println!("{} logged in", "OK".green().bold()),
    }
    if let Some(credentials) = store.load()? {
        println!(
            "Access token valid until {}",
            format_expiry(credentials.expires_at)
        );
    }
    Ok(())
}
