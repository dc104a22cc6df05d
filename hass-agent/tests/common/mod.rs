//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use hass_agent::agents::{Agent, AgentKind, SystemAgent};
use hass_agent::discovery::{expire_after, DeviceDescriptor, NodeIdentity, SensorPublisher};
use hass_agent::metrics::io::{DiskIoReading, NetworkIoReading};
use hass_agent::metrics::{Capacity, MetricsProvider};
use hass_agent::mqtt::PublishChannel;
use hass_agent::probe::Pinger;
use hass_agent::registry::Named;
use hass_agent::{AgentError, ProbeError};
use hass_devkit::MockMqttClient;

pub const GIB: u64 = 1024 * 1024 * 1024;

/// `PublishChannel` over the devkit mock client.
#[derive(Clone, Default)]
pub struct MockChannel(pub MockMqttClient);

#[async_trait]
impl PublishChannel for MockChannel {
    fn is_connected(&self) -> bool {
        self.0.is_connected()
    }

    async fn publish(&self, topic: &str, payload: String, retain: bool) -> hass_agent::Result<()> {
        if !self.0.is_connected() {
            return Err(AgentError::NotConnected);
        }
        self.0
            .publish(topic, retain, payload)
            .await
            .map_err(|e| AgentError::Publish {
                topic: topic.to_string(),
                message: e.to_string(),
            })
    }
}

/// Host with one `C:` volume, 12.5 GiB free out of 50, running at half speed.
pub struct StaticHost;

impl MetricsProvider for StaticHost {
    fn cpu_usage(&mut self) -> Option<f64> {
        Some(7.34)
    }

    fn memory(&mut self) -> Vec<Named<Capacity>> {
        vec![Named::new("Memory", Capacity::new(2 * GIB, 8 * GIB))]
    }

    fn memory_breakdown(&mut self) -> Vec<Named<u64>> {
        vec![Named::new("kernel", GIB / 2), Named::new("free", 2 * GIB)]
    }

    fn processor_performance(&mut self) -> Option<f64> {
        Some(50.0)
    }

    fn volumes(&mut self) -> Vec<Named<Capacity>> {
        vec![Named::new("C:", Capacity::new(12 * GIB + GIB / 2, 50 * GIB))]
    }

    fn disk_io(&mut self) -> BTreeMap<String, DiskIoReading> {
        BTreeMap::new()
    }

    fn network_io(&mut self) -> BTreeMap<String, NetworkIoReading> {
        BTreeMap::new()
    }

    fn last_boot(&mut self) -> Option<DateTime<Utc>> {
        Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).single()
    }

    fn battery_level(&mut self) -> Option<f64> {
        None
    }
}

/// Every target answers in a fixed time.
pub struct InstantPinger(pub f64);

#[async_trait]
impl Pinger for InstantPinger {
    async fn ping(&self, _target: IpAddr, _timeout: Duration) -> Result<f64, ProbeError> {
        Ok(self.0)
    }
}

/// System agent for the node "Office PC" publishing through `channel`.
pub fn office_pc(channel: MockChannel, update_frequency: u32) -> Agent {
    let node = NodeIdentity::new("Office PC", "Office PC");
    let device_node = node.clone();
    let publisher = SensorPublisher::new(
        Arc::new(channel),
        "homeassistant",
        node,
        expire_after(60, update_frequency),
        Box::new(move || {
            DeviceDescriptor::for_node(&device_node, Some("Linux".into()), Some("Test OS 1.0".into()))
        }),
    );
    let system = SystemAgent::new(publisher, Box::new(StaticHost), Box::new(InstantPinger(4.0)))
        .with_targets(
            Box::new(|| BTreeSet::from(["192.168.1.1".parse::<IpAddr>().unwrap()])),
            Box::new(|| BTreeSet::from(["9.9.9.9".parse::<IpAddr>().unwrap()])),
        );
    Agent::new("System(office_pc)", update_frequency, AgentKind::System(system))
}
