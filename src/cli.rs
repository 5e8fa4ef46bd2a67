//! Command-line interface definition for tidal-session
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for login, session status, and logout.

use clap::{Parser, Subcommand};

/// tidal-session - TIDAL authorization and token lifecycle CLI
///
/// Authorize against the TIDAL API with the OAuth2 authorization-code
/// grant and keep the resulting credentials cached and refreshed.
#[derive(Parser, Debug, Clone)]
#[command(name = "tidal-session")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for tidal-session
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Authorize with TIDAL and cache the resulting credentials
    Login {
        /// Print the authorization URL instead of opening a browser
        #[arg(long)]
        no_browser: bool,
    },

    /// Show the cached session status without touching the network
    Status,

    /// Remove cached credentials
    Logout,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
