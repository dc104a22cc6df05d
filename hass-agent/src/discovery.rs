//! Home Assistant MQTT discovery
//!
//! This module handles:
//! - Topic layout `{prefix}/{component}/{nodeId}/{nodeId}_{sensor}/{config,state}`
//! - Sparse discovery payloads (absent attributes are omitted, never `null`)
//! - Device grouping, with the device descriptor computed once per agent
//! - Staleness (`expire_after`) derived from the agent's effective period

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};

use serde::Serialize;
use tracing::warn;

use crate::error::Result;
use crate::mqtt::PublishChannel;
use crate::naming::{normalize, safe_id, sensor_id};

/// Missed periods tolerated before the hub marks a sensor unavailable.
pub const EXPIRE_AFTER_FACTOR: f64 = 5.5;

/// Discovery component a sensor registers as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Sensor,
    BinarySensor,
}

impl Component {
    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Sensor => "sensor",
            Component::BinarySensor => "binary_sensor",
        }
    }
}

/// Identity shared by every sensor of one agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    /// Sanitized id used in topics.
    pub id: String,
    /// Display name.
    pub name: String,
}

impl NodeIdentity {
    pub fn new(id_source: &str, name: &str) -> Self {
        Self {
            id: safe_id(id_source),
            name: normalize(name),
        }
    }
}

/// Metadata of one sensor, built per publish call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorDescriptor {
    pub component: Component,
    pub name: String,
    pub device_class: Option<&'static str>,
    pub entity_category: Option<&'static str>,
    pub icon: Option<&'static str>,
    pub state_class: Option<&'static str>,
    pub unit_of_measurement: Option<&'static str>,
}

impl SensorDescriptor {
    /// A plain `sensor` component with no optional attributes.
    pub fn sensor(name: impl Into<String>) -> Self {
        Self {
            component: Component::Sensor,
            name: name.into(),
            device_class: None,
            entity_category: None,
            icon: None,
            state_class: None,
            unit_of_measurement: None,
        }
    }

    pub fn icon(mut self, icon: &'static str) -> Self {
        self.icon = Some(icon);
        self
    }

    pub fn device_class(mut self, device_class: &'static str) -> Self {
        self.device_class = Some(device_class);
        self
    }

    pub fn unit(mut self, unit: &'static str) -> Self {
        self.unit_of_measurement = Some(unit);
        self
    }

    /// `state_class: measurement`
    pub fn measurement(mut self) -> Self {
        self.state_class = Some("measurement");
        self
    }

    /// `entity_category: diagnostic`
    pub fn diagnostic(mut self) -> Self {
        self.entity_category = Some("diagnostic");
        self
    }
}

/// The `device` block grouping an agent's sensors in the hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceDescriptor {
    pub identifiers: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub name: String,
}

impl DeviceDescriptor {
    pub fn for_node(node: &NodeIdentity, manufacturer: Option<String>, model: Option<String>) -> Self {
        Self {
            identifiers: format!("hass-agent.{}", node.id),
            manufacturer: manufacturer.filter(|m| !m.is_empty()),
            model: model.filter(|m| !m.is_empty()),
            name: node.name.clone(),
        }
    }
}

/// Config/state topic pair of one sensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorTopics {
    pub unique_id: String,
    pub config: String,
    pub state: String,
}

impl SensorTopics {
    pub fn new(prefix: &str, component: Component, node_id: &str, sensor_name: &str) -> Self {
        let unique_id = format!("{}_{}", node_id, sensor_id(sensor_name));
        let base = format!("{}/{}/{}/{}", prefix, component.as_str(), node_id, unique_id);

        Self {
            config: format!("{base}/config"),
            state: format!("{base}/state"),
            unique_id,
        }
    }
}

/// Serialized discovery payload. Field order is the wire order.
#[derive(Debug, Serialize)]
pub struct DiscoveryConfig<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_class: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_of_measurement: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_class: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<&'a str>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_category: Option<&'a str>,
    pub device: &'a DeviceDescriptor,
    pub unique_id: &'a str,
    pub state_topic: &'a str,
    pub expire_after: u64,
}

/// Seconds without a state update before the hub marks a sensor stale.
pub fn expire_after(update_interval_s: u64, update_frequency: u32) -> u64 {
    (update_interval_s as f64 * f64::from(update_frequency) * EXPIRE_AFTER_FACTOR).round() as u64
}

/// Lazily evaluated source of the agent's device descriptor.
pub type DeviceSource = Box<dyn Fn() -> DeviceDescriptor + Send + Sync>;

/// Renders and publishes sensors for one agent.
pub struct SensorPublisher {
    channel: Arc<dyn PublishChannel>,
    prefix: String,
    node: NodeIdentity,
    expire_after: u64,
    device: OnceLock<DeviceDescriptor>,
    device_source: DeviceSource,
    names_by_id: HashMap<String, String>,
    reported_collisions: HashSet<String>,
}

impl SensorPublisher {
    pub fn new(
        channel: Arc<dyn PublishChannel>,
        prefix: impl Into<String>,
        node: NodeIdentity,
        expire_after: u64,
        device_source: DeviceSource,
    ) -> Self {
        Self {
            channel,
            prefix: prefix.into(),
            node,
            expire_after,
            device: OnceLock::new(),
            device_source,
            names_by_id: HashMap::new(),
            reported_collisions: HashSet::new(),
        }
    }

    pub fn node(&self) -> &NodeIdentity {
        &self.node
    }

    pub fn expire_after(&self) -> u64 {
        self.expire_after
    }

    /// The device descriptor, computed on first use and cached.
    pub fn device(&self) -> &DeviceDescriptor {
        self.device.get_or_init(|| (self.device_source)())
    }

    pub fn topics(&self, sensor: &SensorDescriptor) -> SensorTopics {
        SensorTopics::new(&self.prefix, sensor.component, &self.node.id, &sensor.name)
    }

    /// Start a publish cycle. Collisions are tracked per cycle; a collision
    /// that persists across cycles is still reported only once.
    pub fn begin_cycle(&mut self) {
        let names_by_id = &self.names_by_id;
        self.reported_collisions.retain(|id| names_by_id.contains_key(id));
        self.names_by_id.clear();
    }

    /// Publish discovery config then state. `None` state skips both.
    pub async fn publish_sensor(&mut self, sensor: &SensorDescriptor, state: Option<String>) -> Result<()> {
        let Some(state) = state else {
            return Ok(());
        };

        let topics = self.topics(sensor);
        self.note_sensor_id(&topics.unique_id, &sensor.name);

        let config = DiscoveryConfig {
            state_class: sensor.state_class,
            unit_of_measurement: sensor.unit_of_measurement,
            device_class: sensor.device_class,
            icon: sensor.icon,
            name: normalize(&format!("{} {}", self.node.name, sensor.name)),
            entity_category: sensor.entity_category,
            device: self.device(),
            unique_id: &topics.unique_id,
            state_topic: &topics.state,
            expire_after: self.expire_after,
        };
        let payload = serde_json::to_string(&config)?;

        self.channel.publish(&topics.config, payload, true).await?;
        self.channel.publish(&topics.state, state, false).await
    }

    /// Warn once when two different names share a unique id. Last publish wins.
    fn note_sensor_id(&mut self, unique_id: &str, name: &str) {
        let name = normalize(name);
        match self.names_by_id.get(unique_id) {
            Some(previous) if *previous != name => {
                if self.reported_collisions.insert(unique_id.to_string()) {
                    warn!(
                        "Sensor names {:?} and {:?} both map to {}; last publish wins",
                        previous, name, unique_id
                    );
                }
            }
            Some(_) => {}
            None => {
                self.names_by_id.insert(unique_id.to_string(), name);
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn collision_count(&self) -> usize {
        self.reported_collisions.len()
    }

    #[cfg(test)]
    pub(crate) fn tracked_ids(&self) -> usize {
        self.names_by_id.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingChannel;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn office_pc() -> NodeIdentity {
        NodeIdentity::new("Office PC", "Office PC")
    }

    fn publisher(channel: Arc<RecordingChannel>) -> SensorPublisher {
        let node = office_pc();
        let device_node = node.clone();
        SensorPublisher::new(
            channel,
            "homeassistant",
            node,
            expire_after(60, 1),
            Box::new(move || {
                DeviceDescriptor::for_node(&device_node, Some("Acme".into()), None)
            }),
        )
    }

    #[test]
    fn test_expire_after() {
        assert_eq!(expire_after(60, 5), 1650);
        assert_eq!(expire_after(60, 1), 330);
        assert_eq!(expire_after(1, 1), 6);
    }

    #[test]
    fn test_topics() {
        let topics = SensorTopics::new("homeassistant", Component::Sensor, "office_pc", "Disk C: free");
        assert_eq!(topics.unique_id, "office_pc_disk_c_free");
        assert_eq!(
            topics.config,
            "homeassistant/sensor/office_pc/office_pc_disk_c_free/config"
        );
        assert_eq!(
            topics.state,
            "homeassistant/sensor/office_pc/office_pc_disk_c_free/state"
        );

        let binary = SensorTopics::new("ha", Component::BinarySensor, "n", "Online");
        assert_eq!(binary.config, "ha/binary_sensor/n/n_online/config");
    }

    #[test]
    fn test_sparse_payload() {
        let node = office_pc();
        let device = DeviceDescriptor::for_node(&node, None, Some(String::new()));
        let config = DiscoveryConfig {
            state_class: None,
            unit_of_measurement: Some("%"),
            device_class: None,
            icon: None,
            name: "Office PC Processor use".into(),
            entity_category: None,
            device: &device,
            unique_id: "office_pc_processor_use",
            state_topic: "t/state",
            expire_after: 330,
        };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(
            json,
            r#"{"unit_of_measurement":"%","name":"Office PC Processor use","device":{"identifiers":"hass-agent.office_pc","name":"Office PC"},"unique_id":"office_pc_processor_use","state_topic":"t/state","expire_after":330}"#
        );
    }

    #[tokio::test]
    async fn test_absent_state_skips_publish() {
        let channel = Arc::new(RecordingChannel::connected());
        let mut publisher = publisher(channel.clone());

        publisher
            .publish_sensor(&SensorDescriptor::sensor("Battery Level"), None)
            .await
            .unwrap();

        assert!(channel.messages().is_empty());
    }

    #[tokio::test]
    async fn test_publish_config_then_state() {
        let channel = Arc::new(RecordingChannel::connected());
        let mut publisher = publisher(channel.clone());
        let sensor = SensorDescriptor::sensor("Disk C: free")
            .icon("mdi:harddisk")
            .measurement()
            .unit("GiB")
            .diagnostic();

        publisher
            .publish_sensor(&sensor, Some("12.5".into()))
            .await
            .unwrap();

        let messages = channel.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(
            messages[0].topic,
            "homeassistant/sensor/office_pc/office_pc_disk_c_free/config"
        );
        assert!(messages[0].retain);
        assert_eq!(
            messages[1].topic,
            "homeassistant/sensor/office_pc/office_pc_disk_c_free/state"
        );
        assert_eq!(messages[1].payload_str(), "12.5");
        assert!(!messages[1].retain);

        let config: serde_json::Value = serde_json::from_slice(&messages[0].payload).unwrap();
        assert_eq!(config["name"], "Office PC Disk C: free");
        assert_eq!(config["state_class"], "measurement");
        assert_eq!(config["entity_category"], "diagnostic");
        assert_eq!(config["device"]["manufacturer"], "Acme");
        assert_eq!(config["expire_after"], 330);
        assert!(config.get("device_class").is_none());
        assert!(config["device"].get("model").is_none());
    }

    #[tokio::test]
    async fn test_device_computed_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let node = office_pc();
        let device_node = node.clone();
        let channel = Arc::new(RecordingChannel::connected());
        let mut publisher = SensorPublisher::new(
            channel,
            "homeassistant",
            node,
            330,
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                DeviceDescriptor::for_node(&device_node, None, None)
            }),
        );

        for name in ["A", "B", "C"] {
            publisher
                .publish_sensor(&SensorDescriptor::sensor(name), Some("1".into()))
                .await
                .unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_not_connected_is_an_error() {
        let channel = Arc::new(RecordingChannel::disconnected());
        let mut publisher = publisher(channel.clone());

        let result = publisher
            .publish_sensor(&SensorDescriptor::sensor("Processor use"), Some("3.0".into()))
            .await;

        assert!(matches!(result, Err(crate::AgentError::NotConnected)));
        assert!(channel.messages().is_empty());
    }

    #[tokio::test]
    async fn test_collision_reported_once() {
        let channel = Arc::new(RecordingChannel::connected());
        let mut publisher = publisher(channel.clone());

        for _ in 0..3 {
            publisher.begin_cycle();
            for name in ["Disk C: free", "Disk C free"] {
                publisher
                    .publish_sensor(&SensorDescriptor::sensor(name), Some("1".into()))
                    .await
                    .unwrap();
            }
        }

        assert_eq!(publisher.collision_count(), 1);
        // Both still publish on the shared topic
        assert_eq!(channel.messages().len(), 12);
    }

    #[tokio::test]
    async fn test_churning_adapters_do_not_accumulate() {
        let channel = Arc::new(RecordingChannel::connected());
        let mut publisher = publisher(channel.clone());

        for n in 0..1000 {
            publisher.begin_cycle();
            for counter in ["total", "received", "sent", "bandwidth"] {
                let sensor = SensorDescriptor::sensor(format!("NetworkIO veth{n} {counter}"));
                publisher
                    .publish_sensor(&sensor, Some("0.0".into()))
                    .await
                    .unwrap();
            }
            assert!(publisher.tracked_ids() <= 4);
        }

        assert_eq!(publisher.collision_count(), 0);
        assert_eq!(channel.messages().len(), 8000);
    }

    #[tokio::test]
    async fn test_collision_forgotten_once_resolved() {
        let channel = Arc::new(RecordingChannel::connected());
        let mut publisher = publisher(channel.clone());

        publisher.begin_cycle();
        for name in ["Disk C: free", "Disk C free"] {
            publisher
                .publish_sensor(&SensorDescriptor::sensor(name), Some("1".into()))
                .await
                .unwrap();
        }
        assert_eq!(publisher.collision_count(), 1);

        // Two cycles without the clash
        for _ in 0..2 {
            publisher.begin_cycle();
            publisher
                .publish_sensor(&SensorDescriptor::sensor("Processor use"), Some("1".into()))
                .await
                .unwrap();
        }
        assert_eq!(publisher.collision_count(), 0);
        assert_eq!(publisher.tracked_ids(), 1);
    }
}
