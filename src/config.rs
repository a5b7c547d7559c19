//! Configuration loading and management.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level bot configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server to connect to.
    pub network: NetworkConfig,
    /// Bot identity and behavior.
    pub bot: BotConfig,
    /// Free-form per-plugin tables (`[plugins.<name>]`); the core never
    /// interprets these, plugins read their own.
    #[serde(default)]
    pub plugins: HashMap<String, toml::value::Table>,
}

/// Server connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    /// Hostname to connect to (e.g., "irc.libera.chat").
    pub host: String,
    /// Port, 6667 unless set.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Connect over TLS.
    #[serde(default)]
    pub tls: bool,
}

/// Bot identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    /// Nickname to register with.
    pub nick: String,
    /// Ident; falls back to the nick.
    username: Option<String>,
    /// Realname; falls back to the nick.
    realname: Option<String>,
    /// Prefix mask granted full permissions (e.g., `*!admin@example.*`).
    pub superuser: String,
    /// Triggers are `nick: command` instead of `!command`.
    #[serde(default)]
    pub directed_triggers: bool,
    /// Plugins to load at startup, in order.
    #[serde(default)]
    pub autoload: Vec<String>,
}

impl BotConfig {
    pub fn username(&self) -> &str {
        self.username.as_deref().unwrap_or(&self.nick)
    }

    pub fn realname(&self) -> &str {
        self.realname.as_deref().unwrap_or(&self.nick)
    }
}

fn default_port() -> u16 {
    6667
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// A plugin's own config table, if the file has one.
    pub fn plugin(&self, name: &str) -> Option<&toml::value::Table> {
        self.plugins.get(name)
    }

    /// A string-array option from a plugin table, empty when unset.
    pub fn plugin_str_list(&self, plugin: &str, key: &str) -> Vec<String> {
        self.plugin(plugin)
            .and_then(|t| t.get(key))
            .and_then(|v| v.as_array())
            .map(|a| {
                a.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}
