//! Configuration loading
//!
//! Handles:
//! - Home Assistant broker settings and the global tick interval
//! - The list of configured agents
//! - Cross-platform fallback location

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{AgentError, Result};

/// Default config file looked up relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub homeassistant: HassConfig,
    pub agents: Vec<AgentSection>,
}

/// Broker connection and discovery settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HassConfig {
    pub server: String,
    pub port: u16,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    /// Discovery topic prefix.
    pub prefix: String,
    /// Global tick interval in seconds.
    pub update_s: u64,
    pub keep_alive_secs: u64,
}

impl Default for HassConfig {
    fn default() -> Self {
        Self {
            server: "localhost".to_string(),
            port: 1883,
            username: None,
            password: None,
            prefix: "homeassistant".to_string(),
            update_s: 60,
            keep_alive_secs: 30,
        }
    }
}

/// One `[[agents]]` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: Option<String>,
    pub name: Option<String>,
    pub update_frequency: Option<u32>,
    pub email: Option<String>,
    pub url: Option<String>,
    #[serde(skip_serializing)]
    pub token: Option<String>,
}

impl AgentConfig {
    /// Load config from `path`. A missing file yields the defaults.
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!("Configuration file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        debug!("Loading configuration from {}", path.display());
        let content = tokio::fs::read_to_string(path).await?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AgentConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.homeassistant.update_s == 0 {
            return Err(AgentError::validation("homeassistant.update_s must be at least 1"));
        }
        if self.homeassistant.server.trim().is_empty() {
            return Err(AgentError::validation("homeassistant.server must not be empty"));
        }

        for (index, agent) in self.agents.iter().enumerate() {
            if agent.update_frequency == Some(0) {
                return Err(AgentError::validation(format!(
                    "agents[{}].update_frequency must be at least 1",
                    index
                )));
            }
            if agent.kind == "mailbox" {
                if agent.url.as_deref().map_or(true, |url| url.trim().is_empty()) {
                    return Err(AgentError::validation(format!(
                        "agents[{}]: mailbox agent requires a url",
                        index
                    )));
                }
                if agent.email.is_none() && agent.id.is_none() {
                    return Err(AgentError::validation(format!(
                        "agents[{}]: mailbox agent requires an email or id",
                        index
                    )));
                }
            }
        }

        Ok(())
    }

    /// Per-user config location, `<config_dir>/hass-agent/config.toml`.
    pub fn config_file_path() -> Option<PathBuf> {
        let mut path = dirs::config_dir()?;
        path.push("hass-agent");
        path.push(DEFAULT_CONFIG_FILE);
        Some(path)
    }

    /// Pick the file to load: an explicit path is used as is, the default
    /// falls back to the per-user location when absent from the working
    /// directory.
    pub fn resolve_path(requested: &Path) -> PathBuf {
        if requested.exists() || requested != Path::new(DEFAULT_CONFIG_FILE) {
            return requested.to_path_buf();
        }
        match Self::config_file_path() {
            Some(fallback) if fallback.exists() => fallback,
            _ => requested.to_path_buf(),
        }
    }
}
