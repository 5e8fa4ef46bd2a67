//! `status` command handler
//!
//! Reports on the cached credentials without touching the network, so it
//! works offline and never triggers a refresh or a browser flow.

use colored::Colorize as _;

use crate::commands::{format_expiry, open_credential_store};
use crate::config::Config;
use crate::error::Result;

/// Prints the cached session state.
pub fn run_status(config: Config) -> Result<()> {
    let store = open_credential_store(&config)?;
    let Some(credentials) = store.load()? else {
        println!("{} no cached session", "--".yellow().bold());
        println!("Run {} to authorize.", "tidal-session login".bold());
        return Ok(());
    };

    let expiry = format_expiry(credentials.expires_at);

    if credentials.is_expired() {
        println!("{} cached session (stale)", "!!".yellow().bold());
        println!("Access token expired or expiring at {expiry}");
        println!("The next {} will refresh it.", "login".bold());
    } else {
        println!("{} cached session", "OK".green().bold());
        println!("Access token valid until {expiry}");
    }
    Ok(())
}
