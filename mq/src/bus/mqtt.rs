//! MQTT bus client (one connection per publish)

use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, Outgoing, QoS};
use tracing::debug;
use uuid::Uuid;

use super::{BusClient, PublishError};
use crate::config::MqttConfig;

/// rumqttc rejects keep-alive intervals below this
const MIN_KEEP_ALIVE: Duration = Duration::from_secs(5);

const DEFAULT_CLIENT_ID_PREFIX: &str = "mailqtt";

/// Publishes through a short-lived rumqttc connection
///
/// Each publish connects, sends, waits for the broker acknowledgement the
/// QoS level requires, and disconnects, all bounded by the configured timeout.
#[derive(Debug, Clone)]
pub struct MqttBusClient {
    config: MqttConfig,
}

impl MqttBusClient {
    pub fn new(config: MqttConfig) -> Self {
        debug!(host = %config.host, port = config.port, "MqttBusClient::new: called");
        Self { config }
    }

    fn qos(&self) -> QoS {
        match self.config.qos {
            0 => QoS::AtMostOnce,
            1 => QoS::AtLeastOnce,
            _ => QoS::ExactlyOnce,
        }
    }

    /// Client ids stay within the 23 characters MQTT 3.1.1 brokers must accept
    ///
    /// Leading whitespace is dropped, since `MqttOptions::new` panics on it.
    fn client_id(&self) -> String {
        let unique = Uuid::now_v7().simple().to_string();
        let prefix: String = self.config.client_id_prefix.trim_start().chars().take(10).collect();
        let prefix = if prefix.is_empty() { DEFAULT_CLIENT_ID_PREFIX.to_string() } else { prefix };
        format!("{}-{}", prefix, &unique[unique.len() - 12..])
    }

    fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(self.client_id(), &self.config.host, self.config.port);
        options.set_keep_alive(self.config.keep_alive().max(MIN_KEEP_ALIVE));
        if let Some((username, password)) = self.config.credentials() {
            options.set_credentials(username, password);
        }
        options
    }

    async fn publish_once(&self, topic: &str, payload: &[u8]) -> Result<(), PublishError> {
        let qos = self.qos();
        let (client, mut eventloop) = AsyncClient::new(self.options(), 10);

        client.publish(topic, qos, self.config.retain, payload.to_vec()).await?;

        loop {
            match eventloop.poll().await? {
                Event::Incoming(Incoming::ConnAck(ack)) => {
                    debug!(code = ?ack.code, "MqttBusClient: connected");
                }
                Event::Outgoing(Outgoing::Publish(_)) if qos == QoS::AtMostOnce => {
                    client.disconnect().await?;
                }
                Event::Incoming(Incoming::PubAck(_)) if qos == QoS::AtLeastOnce => {
                    client.disconnect().await?;
                }
                Event::Incoming(Incoming::PubComp(_)) if qos == QoS::ExactlyOnce => {
                    client.disconnect().await?;
                }
                Event::Outgoing(Outgoing::Disconnect) => {
                    debug!(%topic, "MqttBusClient: published and disconnected");
                    return Ok(());
                }
                event => debug!(?event, "MqttBusClient: event"),
            }
        }
    }
}

#[async_trait]
impl BusClient for MqttBusClient {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), PublishError> {
        let timeout = self.config.timeout();
        tokio::time::timeout(timeout, self.publish_once(topic, payload))
            .await
            .map_err(|_| PublishError::Timeout(timeout))?
    }
}
