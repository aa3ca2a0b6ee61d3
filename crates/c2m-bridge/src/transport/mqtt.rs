//! MQTT adapter on top of rumqttc

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{closed_receiver, MqttMessage, MqttTransport, TransportError};
use crate::config::MqttConfig;

/// Capacity of rumqttc's request channel
const REQUEST_CAPACITY: usize = 10;

const DISCONNECT_GRACE: Duration = Duration::from_secs(1);

type MessageSender = Arc<Mutex<Option<broadcast::Sender<MqttMessage>>>>;

/// MQTT transport backed by a rumqttc client and its event loop task
pub struct RumqttcTransport {
    client: AsyncClient,
    qos: QoS,
    connected: Arc<AtomicBool>,
    incoming_tx: MessageSender,
    eventloop_handle: Mutex<Option<JoinHandle<()>>>,
}

impl RumqttcTransport {
    /// Connect and wait for CONNACK
    ///
    /// Returns an error when the broker is unreachable, refuses the
    /// connection or does not answer within the connect timeout.
    pub async fn connect(config: &MqttConfig) -> Result<Self, TransportError> {
        let qos = to_qos(config.qos)?;

        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(config.keep_alive());
        if let Some(username) = &config.username {
            options.set_credentials(username, config.password.as_deref().unwrap_or_default());
        }

        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);

        tokio::time::timeout(config.connect_timeout(), wait_for_connack(&mut eventloop))
            .await
            .map_err(|_| {
                TransportError::Timeout(format!(
                    "no CONNACK from {}:{} within {:?}",
                    config.host,
                    config.port,
                    config.connect_timeout()
                ))
            })??;

        info!(host = %config.host, port = config.port, client_id = %config.client_id, "Connected to MQTT broker");

        let (incoming_tx, _) = broadcast::channel(1024);
        let transport = Self {
            client,
            qos,
            connected: Arc::new(AtomicBool::new(true)),
            incoming_tx: Arc::new(Mutex::new(Some(incoming_tx))),
            eventloop_handle: Mutex::new(None),
        };
        transport.start_eventloop(eventloop);
        Ok(transport)
    }

    fn start_eventloop(&self, mut eventloop: EventLoop) {
        let connected = self.connected.clone();
        let incoming_tx = self.incoming_tx.clone();

        let handle = tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        debug!(topic = %publish.topic, len = publish.payload.len(), "MQTT message received");
                        let msg = MqttMessage {
                            topic: publish.topic,
                            payload: publish.payload,
                        };
                        if let Some(tx) = incoming_tx.lock().as_ref() {
                            let _ = tx.send(msg);
                        }
                    }
                    Ok(Event::Incoming(Packet::Disconnect)) => {
                        warn!("Broker sent DISCONNECT");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        if connected.load(Ordering::SeqCst) {
                            error!(error = %e, "MQTT connection lost");
                        }
                        break;
                    }
                }
            }
            connected.store(false, Ordering::SeqCst);
            // Dropping the sender closes every subscriber's channel
            incoming_tx.lock().take();
            debug!("MQTT event loop stopped");
        });

        *self.eventloop_handle.lock() = Some(handle);
    }
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<(), TransportError> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return if ack.code == ConnectReturnCode::Success {
                    Ok(())
                } else {
                    Err(TransportError::ConnectionFailed(format!(
                        "broker refused connection: {:?}",
                        ack.code
                    )))
                };
            }
            Ok(_) => continue,
            Err(e) => return Err(TransportError::ConnectionFailed(e.to_string())),
        }
    }
}

fn to_qos(qos: u8) -> Result<QoS, TransportError> {
    match qos {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(TransportError::InvalidConfig(format!(
            "invalid QoS {}, expected 0, 1 or 2",
            other
        ))),
    }
}

#[async_trait]
impl MqttTransport for RumqttcTransport {
    async fn subscribe(&self, topic: &str) -> Result<(), TransportError> {
        self.client
            .subscribe(topic, self.qos)
            .await
            .map_err(|e| TransportError::SubscribeFailed(format!("{}: {}", topic, e)))
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), TransportError> {
        self.client
            .unsubscribe(topic)
            .await
            .map_err(|e| TransportError::SubscribeFailed(format!("{}: {}", topic, e)))
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }
        self.client
            .publish(topic, self.qos, false, payload)
            .await
            .map_err(|e| TransportError::SendFailed(format!("{}: {}", topic, e)))
    }

    fn incoming(&self) -> broadcast::Receiver<MqttMessage> {
        match self.incoming_tx.lock().as_ref() {
            Some(tx) => tx.subscribe(),
            None => closed_receiver(),
        }
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn disconnect(&self) {
        // Clear the flag first so the event loop exits quietly
        if self.connected.swap(false, Ordering::SeqCst) {
            if let Err(e) = self.client.disconnect().await {
                debug!(error = %e, "MQTT disconnect request failed");
            }
        }
        let handle = self.eventloop_handle.lock().take();
        if let Some(mut handle) = handle {
            // Give the event loop a moment to flush DISCONNECT
            if tokio::time::timeout(DISCONNECT_GRACE, &mut handle).await.is_err() {
                handle.abort();
            }
        }
        self.incoming_tx.lock().take();
        info!("Disconnected from MQTT broker");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_qos() {
        assert_eq!(to_qos(0).unwrap(), QoS::AtMostOnce);
        assert_eq!(to_qos(1).unwrap(), QoS::AtLeastOnce);
        assert_eq!(to_qos(2).unwrap(), QoS::ExactlyOnce);
        assert!(to_qos(3).is_err());
    }

    #[tokio::test]
    async fn test_connect_refused_is_fatal() {
        // nothing listens on port 1 of localhost
        let config = MqttConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            connect_timeout_secs: 2,
            ..MqttConfig::default()
        };
        assert!(RumqttcTransport::connect(&config).await.is_err());
    }
}
