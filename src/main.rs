//! tidal-session - TIDAL authorization and token lifecycle CLI
//!
#![doc = "Main entry point for the tidal-session application."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tidal_session::cli::{Cli, Commands};
use tidal_session::commands;
use tidal_session::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();
    init_tracing(cli.verbose);

    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;
    config.validate()?;

    match cli.command {
        Commands::Login { no_browser } => {
            tracing::info!("Starting TIDAL authorization");
            if no_browser {
                tracing::debug!("Browser auto-open disabled");
            }
            commands::login::run_login(config).await
        }
        Commands::Status => commands::status::run_status(config),
        Commands::Logout => commands::logout::run_logout(config),
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "tidal_session=debug"
    } else {
        "tidal_session=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
