/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint.

It exposes three top-level command modules:

- `login`  — Run the OAuth2 authorization flow and cache credentials
- `status` — Show the cached session state, offline
- `logout` — Remove cached credentials, offline

The handlers are intentionally small and wire the library components
together: the settings backend, the OAuth client, and the authorizer.
*/

use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use url::Url;

use crate::api::oauth::TidalOAuthClient;
use crate::auth::store::CredentialStore;
use crate::config::Config;
use crate::error::{Result, TidalSessionError};
use crate::storage::{FileSettings, KeyringSettings, SettingsStore};

pub mod login;
pub mod logout;
pub mod status;

/// Opens the settings backend named by the configuration.
pub fn open_settings(config: &Config) -> Result<Arc<dyn SettingsStore>> {
    match config.storage.backend.as_str() {
        "keyring" => Ok(Arc::new(KeyringSettings::new("default"))),
        _ => Ok(Arc::new(FileSettings::open(config.storage.settings_path()?)?)),
    }
}

/// Opens the credential store over the configured settings backend.
pub fn open_credential_store(config: &Config) -> Result<CredentialStore> {
    Ok(CredentialStore::new(open_settings(config)?))
}

/// Builds the OAuth client from the configuration, honoring any endpoint
/// base overrides.
pub fn build_oauth_client(config: &Config) -> Result<TidalOAuthClient> {
    let http = Arc::new(reqwest::Client::new());
    let mut client = TidalOAuthClient::new(
        http,
        config.tidal.client_id.clone(),
        config.tidal.client_secret.clone(),
    );
    if let Some(base) = &config.tidal.login_base {
        client = client.with_login_base(parse_base("tidal.login_base", base)?);
    }
    if let Some(base) = &config.tidal.auth_base {
        client = client.with_auth_base(parse_base("tidal.auth_base", base)?);
    }
    if let Some(base) = &config.tidal.api_base {
        client = client.with_api_base(parse_base("tidal.api_base", base)?);
    }
    Ok(client)
}

fn parse_base(field: &str, value: &str) -> Result<Url> {
    Url::parse(value)
        .map_err(|e| TidalSessionError::Config(format!("Invalid {}: {}", field, e)).into())
}

/// Renders an epoch-second expiry in the local timezone, falling back to
/// the raw number when the timestamp is out of range.
pub fn format_expiry(expires_at: i64) -> String {
    DateTime::<Utc>::from_timestamp(expires_at, 0)
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| expires_at.to_string())
}
