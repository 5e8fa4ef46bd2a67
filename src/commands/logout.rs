//! `logout` command handler

use colored::Colorize as _;

use crate::commands::open_credential_store;
use crate::config::Config;
use crate::error::Result;

/// Removes cached credentials. Offline and idempotent; logging out with no
/// cached session is not an error.
pub fn run_logout(config: Config) -> Result<()> {
    let store = open_credential_store(&config)?;
    let had_session = store.load()?.is_some();
    store.clear()?;

    if had_session {
        println!("{} cached credentials removed", "OK".green().bold());
    } else {
        println!("{} no cached session to remove", "--".yellow().bold());
    }
    Ok(())
}
