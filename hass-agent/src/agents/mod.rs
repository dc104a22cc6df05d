//! Agents and their construction from configuration
//!
//! Every agent pairs an [`UpdateThrottle`] with one [`AgentKind`]. The kind is
//! chosen once when the configuration is loaded; unknown types become a
//! [`NoopAgent`] that only logs a warning.

pub mod mailbox;
pub mod noop;
pub mod system;

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{AgentSection, HassConfig};
use crate::discovery::{expire_after, DeviceDescriptor, NodeIdentity, SensorPublisher};
use crate::error::Result;
use crate::metrics::{self, SysinfoProvider};
use crate::mqtt::PublishChannel;
use crate::network;
use crate::probe::SystemPinger;
use crate::throttle::UpdateThrottle;

pub use mailbox::{HttpMailboxProvider, MailboxAgent, MailboxProvider};
pub use noop::NoopAgent;
pub use system::SystemAgent;

/// Closed set of agent behaviours.
pub enum AgentKind {
    System(SystemAgent),
    Mailbox(MailboxAgent),
    Noop(NoopAgent),
}

pub struct Agent {
    label: String,
    throttle: UpdateThrottle,
    kind: AgentKind,
}

impl Agent {
    pub fn new(label: impl Into<String>, frequency: u32, kind: AgentKind) -> Self {
        Self {
            label: label.into(),
            throttle: UpdateThrottle::new(frequency),
            kind,
        }
    }

    /// Build an agent from its `[[agents]]` table.
    pub fn from_config(
        section: &AgentSection,
        hass: &HassConfig,
        channel: Arc<dyn PublishChannel>,
    ) -> Self {
        match section.kind.as_str() {
            "system" => {
                let hostname = network::hostname();
                let name = section.name.clone().unwrap_or_else(|| hostname.clone());
                let id_source = section.id.clone().unwrap_or_else(|| name.clone());
                let node = NodeIdentity::new(&id_source, &name);
                let frequency = section.update_frequency.unwrap_or(1);

                let device_node = node.clone();
                let publisher = SensorPublisher::new(
                    channel,
                    &hass.prefix,
                    node.clone(),
                    expire_after(hass.update_s, frequency),
                    Box::new(move || {
                        DeviceDescriptor::for_node(
                            &device_node,
                            metrics::os_manufacturer(),
                            metrics::os_model(),
                        )
                    }),
                );
                let agent = SystemAgent::new(
                    publisher,
                    Box::new(SysinfoProvider::new()),
                    Box::new(SystemPinger),
                );
                Self::new(format!("System({})", node.id), frequency, AgentKind::System(agent))
            }
            "mailbox" => {
                let email = section.email.clone().unwrap_or_else(|| "(unnamed)".to_string());
                let name = section.name.clone().unwrap_or_else(|| email.clone());
                let id_source = section.id.clone().unwrap_or_else(|| email.clone());
                let node = NodeIdentity::new(&id_source, &name);
                let frequency = section
                    .update_frequency
                    .unwrap_or(mailbox::DEFAULT_UPDATE_FREQUENCY);

                let device_node = node.clone();
                let publisher = SensorPublisher::new(
                    channel,
                    &hass.prefix,
                    node.clone(),
                    expire_after(hass.update_s, frequency),
                    Box::new(move || DeviceDescriptor::for_node(&device_node, None, None)),
                );
                let provider = HttpMailboxProvider::new(
                    section.url.clone().unwrap_or_default(),
                    section.token.clone(),
                );
                let agent = MailboxAgent::new(publisher, Box::new(provider));
                Self::new(format!("Mailbox({})", node.id), frequency, AgentKind::Mailbox(agent))
            }
            other => Self::new(
                format!("Noop({})", other),
                1,
                AgentKind::Noop(NoopAgent::new(other)),
            ),
        }
    }

    /// Display label used in logs, e.g. `System(office_pc)`.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn kind(&self) -> &AgentKind {
        &self.kind
    }

    pub fn frequency(&self) -> u32 {
        self.throttle.frequency()
    }

    /// Prime the throttle and run one-time setup.
    pub async fn start(&mut self) -> Result<()> {
        self.throttle.start();
        match &mut self.kind {
            AgentKind::System(agent) => agent.start().await,
            AgentKind::Mailbox(agent) => {
                if let Err(e) = agent.start().await {
                    warn!("{}: start failed: {}", self.label, e);
                }
                Ok(())
            }
            AgentKind::Noop(_) => Ok(()),
        }
    }

    /// Advance the throttle and run the body when due.
    pub async fn tick(&mut self) -> Result<()> {
        if !self.throttle.tick() {
            return Ok(());
        }
        self.execute().await
    }

    /// Run the body unconditionally.
    pub async fn execute(&mut self) -> Result<()> {
        match &mut self.kind {
            AgentKind::System(agent) => agent.execute().await,
            AgentKind::Mailbox(agent) => agent.execute().await,
            AgentKind::Noop(_) => Ok(()),
        }
    }
}

/// Build every configured agent, in configuration order.
pub fn build_agents(
    sections: &[AgentSection],
    hass: &HassConfig,
    channel: Arc<dyn PublishChannel>,
) -> Vec<Agent> {
    let agents: Vec<Agent> = sections
        .iter()
        .map(|section| Agent::from_config(section, hass, channel.clone()))
        .collect();

    info!(
        "Configured agents: {}",
        agents.iter().map(Agent::label).collect::<Vec<_>>().join(", ")
    );
    agents
}
