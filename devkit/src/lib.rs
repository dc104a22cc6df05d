/*!
# hass-devkit - test doubles for hass-agent

- In-memory MQTT recorder standing in for a broker
- Helpers to inspect discovery/state topics in assertions
*/

pub mod mqtt_stub;

pub use mqtt_stub::{MockMessage, MockMqttClient};
