//! MQTT publish channel
//!
//! One shared `rumqttc` client per process. The event loop runs on its own
//! task and keeps [`MqttChannel::is_connected`] current; publishing while the
//! broker is unreachable fails fast with [`AgentError::NotConnected`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, Incoming, MqttOptions, QoS};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::config::HassConfig;
use crate::error::{AgentError, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Capability the agents publish through.
#[async_trait]
pub trait PublishChannel: Send + Sync {
    /// Whether the underlying transport is currently up.
    fn is_connected(&self) -> bool;

    /// Publish `payload` on `topic`. Errors with [`AgentError::NotConnected`]
    /// when the transport is down.
    async fn publish(&self, topic: &str, payload: String, retain: bool) -> Result<()>;
}

/// `rumqttc`-backed publish channel.
pub struct MqttChannel {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
    endpoint: String,
}

impl MqttChannel {
    /// Connect to the broker described by `config` and wait for the first
    /// `ConnAck`.
    pub async fn connect(config: &HassConfig, client_id: &str) -> Result<Self> {
        let endpoint = format!("{}:{}", config.server, config.port);

        let mut options = MqttOptions::new(client_id, &config.server, config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
        if let Some(username) = &config.username {
            options.set_credentials(username, config.password.clone().unwrap_or_default());
        }

        let (client, eventloop) = AsyncClient::new(options, 10);
        let connected = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = oneshot::channel();

        tokio::spawn(drive_event_loop(
            eventloop,
            connected.clone(),
            endpoint.clone(),
            ready_tx,
        ));

        let failure = |message: String| AgentError::Connect {
            server: config.server.clone(),
            port: config.port,
            message,
        };

        match tokio::time::timeout(CONNECT_TIMEOUT, ready_rx).await {
            Ok(Ok(Ok(()))) => {
                info!("MQTT connected to {}", endpoint);
                Ok(Self {
                    client,
                    connected,
                    endpoint,
                })
            }
            Ok(Ok(Err(message))) => Err(failure(message)),
            Ok(Err(_)) => Err(failure("event loop stopped".to_string())),
            Err(_) => Err(failure(format!(
                "no answer within {}s",
                CONNECT_TIMEOUT.as_secs()
            ))),
        }
    }

    /// Send a clean MQTT disconnect.
    pub async fn disconnect(&self) {
        if let Err(e) = self.client.disconnect().await {
            debug!("MQTT disconnect from {} failed: {}", self.endpoint, e);
        }
    }
}

#[async_trait]
impl PublishChannel for MqttChannel {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn publish(&self, topic: &str, payload: String, retain: bool) -> Result<()> {
        if !self.is_connected() {
            return Err(AgentError::NotConnected);
        }

        debug!("Publish {} payload {}", topic, payload);
        self.client
            .publish(topic, QoS::AtLeastOnce, retain, payload)
            .await
            .map_err(|e| AgentError::Publish {
                topic: topic.to_string(),
                message: e.to_string(),
            })
    }
}

/// Channel that logs what it would publish instead of sending it. Connection
/// state still comes from the wrapped channel.
pub struct DryRunChannel {
    inner: Arc<dyn PublishChannel>,
}

impl DryRunChannel {
    pub fn new(inner: Arc<dyn PublishChannel>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl PublishChannel for DryRunChannel {
    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    async fn publish(&self, topic: &str, payload: String, retain: bool) -> Result<()> {
        if !self.is_connected() {
            return Err(AgentError::NotConnected);
        }
        info!("Would publish {} payload {} (retain {})", topic, payload, retain);
        Ok(())
    }
}

/// Poll the event loop forever, mirroring connection state into `connected`.
///
/// The first `ConnAck` or error is reported through `ready`. A failure before
/// the first `ConnAck` ends the task; later failures are retried by polling
/// again after [`RECONNECT_DELAY`].
async fn drive_event_loop(
    mut eventloop: EventLoop,
    connected: Arc<AtomicBool>,
    endpoint: String,
    ready: oneshot::Sender<std::result::Result<(), String>>,
) {
    let mut ready = Some(ready);

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Incoming::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    if !connected.swap(true, Ordering::SeqCst) {
                        debug!("MQTT connected to {}", endpoint);
                    }
                    if let Some(tx) = ready.take() {
                        let _ = tx.send(Ok(()));
                    }
                } else {
                    connected.store(false, Ordering::SeqCst);
                    warn!("MQTT connection to {} refused: {:?}", endpoint, ack.code);
                    if let Some(tx) = ready.take() {
                        let _ = tx.send(Err(format!("refused: {:?}", ack.code)));
                        return;
                    }
                }
            }
            Ok(Event::Incoming(Incoming::Disconnect)) => {
                connected.store(false, Ordering::SeqCst);
                debug!("MQTT disconnected from {}", endpoint);
            }
            Ok(_) => {}
            Err(e) => {
                if connected.swap(false, Ordering::SeqCst) {
                    warn!("MQTT disconnected from {}: {}", endpoint, e);
                }
                if let Some(tx) = ready.take() {
                    let _ = tx.send(Err(e.to_string()));
                    return;
                }
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingChannel;

    #[tokio::test]
    async fn test_dry_run_sends_nothing() {
        let recorder = Arc::new(RecordingChannel::connected());
        let channel = DryRunChannel::new(recorder.clone());

        assert!(channel.is_connected());
        channel
            .publish("homeassistant/sensor/n/n_x/config", "{}".into(), true)
            .await
            .unwrap();
        channel
            .publish("homeassistant/sensor/n/n_x/state", "1.0".into(), false)
            .await
            .unwrap();

        assert!(recorder.messages().is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_still_reports_disconnect() {
        let recorder = Arc::new(RecordingChannel::disconnected());
        let channel = DryRunChannel::new(recorder.clone());

        assert!(!channel.is_connected());
        let result = channel
            .publish("homeassistant/sensor/n/n_x/state", "1.0".into(), false)
            .await;

        assert!(matches!(result, Err(AgentError::NotConnected)));
        recorder.0.set_connected(true);
        assert!(channel.is_connected());
        assert!(recorder.messages().is_empty());
    }
}
