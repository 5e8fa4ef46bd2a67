//! TIDAL API collaborators
//!
//! This module holds the two halves of the vendor surface:
//!
//! - [`oauth`]: the [`TidalOAuth`](oauth::TidalOAuth) trait -- the narrow
//!   collaborator interface the authorization machinery consumes -- and its
//!   production implementation [`TidalOAuthClient`](oauth::TidalOAuthClient).
//! - [`client`]: [`TidalApi`](client::TidalApi), the live authorized client
//!   handle produced by a successful authorization.

pub mod client;
pub mod oauth;

pub use client::TidalApi;
pub use oauth::{TidalOAuth, TidalOAuthClient, UserProfile};
