//! Error types for tidal-session
//!
//! This module defines all error types used throughout the application,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for tidal-session operations
///
/// This enum encompasses all possible errors that can occur during
/// configuration loading, credential persistence, the interactive
/// authorization flow, and the background refresh loop.
#[derive(Error, Debug)]
pub enum TidalSessionError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Credential store unreadable or unwritable
    #[error("Credential store error: {0}")]
    Store(String),

    /// The authorization server returned an `error` parameter, or the
    /// callback failed CSRF state validation
    #[error("OAuth error: {0}")]
    OAuth(String),

    /// The callback redirect was missing required query parameters
    #[error("Malformed OAuth callback: {0}")]
    MalformedCallback(String),

    /// No callback redirect arrived within the timeout window
    #[error("OAuth callback timed out after {0} seconds")]
    CallbackTimeout(u64),

    /// The token endpoint rejected the authorization-code exchange
    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    /// The token endpoint rejected a refresh-token exchange
    #[error("Token refresh failed: {0}")]
    Refresh(String),

    /// An API client was requested before any successful authorization
    #[error("Tidal API client not initialized. Call authorize() first.")]
    NotInitialized,

    /// An operation was requested after the session was shut down
    #[error("Authorizer has been shut down")]
    AlreadyShutdown,

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Keyring/credential storage errors
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),
}

/// Result type alias for tidal-session operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation. Callers that
/// need to branch on a specific failure downcast to [`TidalSessionError`].
pub type Result<T> = anyhow::Result<T>;
