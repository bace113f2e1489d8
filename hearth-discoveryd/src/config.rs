use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    /// How long one scan listens for responses, in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Service types queried directly, for responders that ignore the
    /// service enumeration meta-query
    #[serde(default = "default_fallback_services")]
    pub fallback_services: Vec<String>,
}

fn default_listen() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_window_ms() -> u64 {
    5000
}

fn default_fallback_services() -> Vec<String> {
    vec![
        "_http._tcp.local".to_string(),
        "_workstation._tcp.local".to_string(),
        "_mi-connect._udp.local".to_string(),
    ]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            discovery: DiscoveryConfig::default(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
            fallback_services: default_fallback_services(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file. A missing file means defaults;
    /// an unreadable or invalid one is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }
}
