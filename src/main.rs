//! corvid - an IRC bot built around a priority-ordered hook registry.
//!
//! Plugins hook events, commands, chat triggers, URLs, and timers; one
//! cooperative loop dispatches everything.

mod bot;
mod config;
mod core;
mod error;
mod hooks;
mod message;
mod permissions;
mod plugins;
mod urls;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    info!(
        host = %config.network.host,
        port = config.network.port,
        nick = %config.bot.nick,
        "Starting corvid"
    );

    core::run(config).await
}
