//! Configuration management for tidal-session
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{Result, TidalSessionError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure for tidal-session
///
/// Holds everything needed to authorize against TIDAL and persist the
/// resulting credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// TIDAL application and endpoint settings
    pub tidal: TidalConfig,

    /// Credential storage settings
    #[serde(default)]
    pub storage: StorageConfig,
}

/// TIDAL application settings
///
/// The client id and secret come from the TIDAL developer dashboard. The
/// endpoint bases are only overridden in tests and local mocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TidalConfig {
    /// OAuth client identifier
    #[serde(default)]
    pub client_id: String,

    /// OAuth client secret
    #[serde(default)]
    pub client_secret: String,

    /// Local port the authorization server redirects back to
    ///
    /// Must match the redirect URI registered with the TIDAL application.
    #[serde(default = "default_callback_port")]
    pub callback_port: u16,

    /// Whether `login` opens the authorization URL in the system browser
    #[serde(default = "default_open_browser")]
    pub open_browser: bool,

    /// Optional base URL for the login page (useful for tests and local mocks)
    #[serde(default)]
    pub login_base: Option<String>,

    /// Optional base URL for the token endpoint (useful for tests and local mocks)
    #[serde(default)]
    pub auth_base: Option<String>,

    /// Optional base URL for the TIDAL OpenAPI (useful for tests and local mocks)
    #[serde(default)]
    pub api_base: Option<String>,
}

fn default_callback_port() -> u16 {
    8888
}

fn default_open_browser() -> bool {
    true
}

impl Default for TidalConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            callback_port: default_callback_port(),
            open_browser: default_open_browser(),
            login_base: None,
            auth_base: None,
            api_base: None,
        }
    }
}

/// Credential storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Storage backend: `file` or `keyring`
    #[serde(default = "default_storage_backend")]
    pub backend: String,

    /// Path of the settings file for the `file` backend
    ///
    /// Defaults to `settings.json` under the platform data directory.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn default_storage_backend() -> String {
    "file".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            path: None,
        }
    }
}

impl StorageConfig {
    /// Resolves the settings file path for the `file` backend.
    ///
    /// # Errors
    ///
    /// Returns an error when no path is configured and the platform data
    /// directory cannot be determined.
    pub fn settings_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.path {
            return Ok(path.clone());
        }
        let dirs = directories::ProjectDirs::from("", "", "tidal-session").ok_or_else(|| {
            TidalSessionError::Config("Could not determine platform data directory".to_string())
        })?;
        Ok(dirs.data_dir().join("settings.json"))
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// Missing files are not an error; defaults are used and must then be
    /// completed through environment variables.
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default_config()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn default_config() -> Self {
        Self {
            tidal: TidalConfig::default(),
            storage: StorageConfig::default(),
        }
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| TidalSessionError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| TidalSessionError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(client_id) = std::env::var("TIDAL_CLIENT_ID") {
            self.tidal.client_id = client_id;
        }

        if let Ok(client_secret) = std::env::var("TIDAL_CLIENT_SECRET") {
            self.tidal.client_secret = client_secret;
        }

        if let Ok(port) = std::env::var("TIDAL_CALLBACK_PORT") {
            match port.parse::<u16>() {
                Ok(port) => self.tidal.callback_port = port,
                Err(_) => {
                    tracing::warn!("Ignoring non-numeric TIDAL_CALLBACK_PORT: {}", port)
                }
            }
        }

        if let Ok(backend) = std::env::var("TIDAL_STORAGE_BACKEND") {
            self.storage.backend = backend;
        }

        if let Ok(path) = std::env::var("TIDAL_STORAGE_PATH") {
            self.storage.path = Some(PathBuf::from(path));
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let crate::cli::Commands::Login { no_browser } = &cli.command {
            if *no_browser {
                self.tidal.open_browser = false;
            }
        }
    }

    /// Validate the loaded configuration
    ///
    /// # Errors
    ///
    /// Returns [`TidalSessionError::Config`] describing the first invalid
    /// field found.
    pub fn validate(&self) -> Result<()> {
        if self.tidal.client_id.is_empty() {
            return Err(TidalSessionError::Config(
                "tidal.client_id cannot be empty (set it in the config file or TIDAL_CLIENT_ID)"
                    .to_string(),
            )
            .into());
        }

        if self.tidal.client_secret.is_empty() {
            return Err(TidalSessionError::Config(
                "tidal.client_secret cannot be empty (set it in the config file or TIDAL_CLIENT_SECRET)"
                    .to_string(),
            )
            .into());
        }

        if self.tidal.callback_port == 0 {
            return Err(TidalSessionError::Config(
                "tidal.callback_port must match the registered redirect URI and cannot be 0"
                    .to_string(),
            )
            .into());
        }

        let valid_backends = ["file", "keyring"];
        if !valid_backends.contains(&self.storage.backend.as_str()) {
            return Err(TidalSessionError::Config(format!(
                "Invalid storage backend: {}. Must be one of: {}",
                self.storage.backend,
                valid_backends.join(", ")
            ))
            .into());
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
