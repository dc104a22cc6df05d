/*!
Mock MQTT client for tests without a broker

Records every published message and lets tests flip the connection state to
exercise fail-fast paths.
*/

use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub struct MockMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retain: bool,
}

impl MockMessage {
    /// Payload decoded as UTF-8 (lossy).
    pub fn payload_str(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// Mock MQTT client mirroring the publish side of `rumqttc::AsyncClient`
#[derive(Clone)]
pub struct MockMqttClient {
    published_messages: Arc<Mutex<Vec<MockMessage>>>,
    connected: Arc<AtomicBool>,
}

impl MockMqttClient {
    /// A client that reports itself connected.
    pub fn new() -> Self {
        Self {
            published_messages: Arc::new(Mutex::new(Vec::new())),
            connected: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Simulate the broker going away or coming back.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Record a publication. Fails while disconnected, like a real client
    /// whose event loop has gone away.
    pub async fn publish<S, V>(&self, topic: S, retain: bool, payload: V) -> Result<()>
    where
        S: Into<String>,
        V: Into<Vec<u8>>,
    {
        if !self.is_connected() {
            anyhow::bail!("mock client disconnected");
        }

        let message = MockMessage {
            topic: topic.into(),
            payload: payload.into(),
            retain,
        };

        tracing::debug!("[MOCK] Published to {}: {} bytes", message.topic, message.payload.len());
        self.published_messages.lock().unwrap().push(message);
        Ok(())
    }

    /// All published messages, in publish order
    pub fn get_published_messages(&self) -> Vec<MockMessage> {
        self.published_messages.lock().unwrap().clone()
    }

    /// Messages published on one topic
    pub fn find_messages_by_topic(&self, topic: &str) -> Vec<MockMessage> {
        self.published_messages
            .lock()
            .unwrap()
            .iter()
            .filter(|msg| msg.topic == topic)
            .cloned()
            .collect()
    }

    /// Distinct topics that received at least one message, in first-seen order
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = Vec::new();
        for msg in self.published_messages.lock().unwrap().iter() {
            if !topics.contains(&msg.topic) {
                topics.push(msg.topic.clone());
            }
        }
        topics
    }

    /// Last payload published on `topic`, as text
    pub fn last_payload(&self, topic: &str) -> Option<String> {
        self.find_messages_by_topic(topic)
            .last()
            .map(MockMessage::payload_str)
    }

    /// Parse the last message of a topic as JSON
    pub fn get_last_json_message<T>(&self, topic: &str) -> Result<Option<T>>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        let messages = self.find_messages_by_topic(topic);
        if let Some(last_msg) = messages.last() {
            let parsed: T = serde_json::from_slice(&last_msg.payload)?;
            Ok(Some(parsed))
        } else {
            Ok(None)
        }
    }

    /// Forget recorded messages
    pub fn clear(&self) {
        self.published_messages.lock().unwrap().clear();
    }
}

impl Default for MockMqttClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_client_records_publications() {
        let client = MockMqttClient::new();

        client.publish("a/config", true, b"{}".to_vec()).await.unwrap();
        client.publish("a/state", false, "42.0").await.unwrap();
        client.publish("a/state", false, "43.0").await.unwrap();

        let messages = client.get_published_messages();
        assert_eq!(messages.len(), 3);
        assert!(messages[0].retain);
        assert_eq!(client.topics(), vec!["a/config", "a/state"]);
        assert_eq!(client.last_payload("a/state").as_deref(), Some("43.0"));
        assert_eq!(client.find_messages_by_topic("a/state").len(), 2);
    }

    #[tokio::test]
    async fn test_disconnected_client_rejects_publish() {
        let client = MockMqttClient::new();
        client.set_connected(false);

        assert!(client.publish("t", false, "x").await.is_err());
        assert!(client.get_published_messages().is_empty());
    }

    #[tokio::test]
    async fn test_json_message_parsing() {
        let client = MockMqttClient::new();

        let test_data = serde_json::json!({
            "unique_id": "node_sensor",
            "expire_after": 330
        });

        let payload = serde_json::to_vec(&test_data).unwrap();
        client.publish("json/topic", true, payload).await.unwrap();

        let parsed: Option<serde_json::Value> = client.get_last_json_message("json/topic").unwrap();
        assert_eq!(parsed.unwrap()["expire_after"], 330);

        client.clear();
        assert!(client.last_payload("json/topic").is_none());
    }
}
