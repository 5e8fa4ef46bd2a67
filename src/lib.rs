//! tidal-session - TIDAL authorization and token lifecycle library
//!
//! This library authorizes against the TIDAL API with the OAuth2
//! authorization-code grant, persists the resulting credentials, and keeps
//! them fresh with a background refresh loop.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `auth`: The authorizer coordinator, interactive flow, local callback
//!   listener, refresh scheduler, and credential store
//! - `api`: The OAuth/OpenAPI wire client and the live API handle
//! - `storage`: Settings backends (JSON file, OS keyring)
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tidal_session::api::oauth::TidalOAuthClient;
//! use tidal_session::auth::{CredentialStore, TidalAuthorizer};
//! use tidal_session::storage::FileSettings;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Arc::new(FileSettings::open("settings.json")?);
//!     let oauth = Arc::new(TidalOAuthClient::new(
//!         Arc::new(reqwest::Client::new()),
//!         "client-id",
//!         "client-secret",
//!     ));
//!     let authorizer = TidalAuthorizer::new(oauth, CredentialStore::new(settings));
//!
//!     let api = authorizer.authorize().await?;
//!     let profile = api.current_user().await?;
//!     println!("authorized as {}", profile.id);
//!
//!     authorizer.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod auth;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod storage;

pub use api::TidalApi;
pub use auth::{Credentials, TidalAuthorizer};
pub use config::Config;
pub use error::{Result, TidalSessionError};
