use serde::Deserialize;
use std::path::Path;
use tracing::info;

use crate::db::models::{DEFAULT_LANG, DEFAULT_PREFIX};
use crate::engine::server::ServerDefaults;

/// Top-level relay configuration, loaded from relay.toml.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct RelayConfig {
    pub database: DatabaseSection,
    pub defaults: DefaultsSection,
    pub roster: RosterSection,
    pub log: LogSection,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    pub url: String,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            url: "sqlite:relay.db?mode=rwc".into(),
        }
    }
}

/// Settings for server records the relay creates on its own.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DefaultsSection {
    pub lang: String,
    pub prefix: String,
}

impl Default for DefaultsSection {
    fn default() -> Self {
        Self {
            lang: DEFAULT_LANG.into(),
            prefix: DEFAULT_PREFIX.into(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct RosterSection {
    /// JSON snapshot of connected communities. No file means an empty roster.
    pub path: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Filter used when RUST_LOG is unset.
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl RelayConfig {
    /// Load config from a TOML file. Falls back to defaults if the file doesn't exist.
    /// Environment variables override TOML values.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let mut config = if Path::new(path).exists() {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| anyhow::anyhow!("failed to read config file {}: {}", path, e))?;
            Self::parse(&contents)
                .map_err(|e| anyhow::anyhow!("failed to parse config file {}: {}", path, e))?
        } else {
            info!("No config file found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("DATABASE_URL") {
            self.database.url = v;
        }
        if let Ok(v) = std::env::var("DEFAULT_LANG") {
            self.defaults.lang = v;
        }
        if let Ok(v) = std::env::var("DEFAULT_PREFIX") {
            self.defaults.prefix = v;
        }
        if let Ok(v) = std::env::var("ROSTER_PATH")
            && !v.is_empty()
        {
            self.roster.path = Some(v);
        }
        if let Ok(v) = std::env::var("LOG_LEVEL") {
            self.log.level = v;
        }
    }

    /// Convert into the defaults used by the reconciler and server registry.
    pub fn to_server_defaults(&self) -> ServerDefaults {
        ServerDefaults {
            lang: self.defaults.lang.clone(),
            prefix: self.defaults.prefix.clone(),
        }
    }
}
