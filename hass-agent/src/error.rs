//! Error types for the agent.

use std::time::Duration;

use thiserror::Error;

/// Result type alias using [`AgentError`].
pub type Result<T> = std::result::Result<T, AgentError>;

/// Errors surfaced by the agent core.
#[derive(Error, Debug)]
pub enum AgentError {
    /// Publish attempted while the MQTT channel is down.
    #[error("Not connected to MQTT")]
    NotConnected,

    /// Initial broker connection failed.
    #[error("MQTT connection to {server}:{port} failed: {message}")]
    Connect {
        server: String,
        port: u16,
        message: String,
    },

    /// The MQTT client refused a publish request.
    #[error("Failed to publish to {topic}: {message}")]
    Publish { topic: String, message: String },

    /// Configuration parse error.
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration validation error.
    #[error("Configuration validation failed: {0}")]
    ConfigValidation(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AgentError {
    /// Create a configuration validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ConfigValidation(msg.into())
    }

    /// Whether the error comes from a broken transport.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::NotConnected | Self::Connect { .. })
    }
}

/// Failures reported by a mailbox provider.
#[derive(Error, Debug)]
pub enum MailboxError {
    /// The remote asked us to slow down.
    #[error("Server busy; retry after {} ms", .retry_after.as_millis())]
    ServerBusy { retry_after: Duration },

    /// The remote answered with an error.
    #[error("Remote error: {0}")]
    Remote(String),

    /// Transport or decoding failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Failures of a single reachability probe.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("timed out after {} ms", .0.as_millis())]
    Timeout(Duration),

    #[error("unreachable: {0}")]
    Unreachable(String),

    #[error("failed to run ping: {0}")]
    Spawn(#[from] std::io::Error),
}
