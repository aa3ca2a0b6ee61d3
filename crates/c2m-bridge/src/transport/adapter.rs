//! Transport traits and types

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::broadcast;

use c2m_conv::CanFrame;

use super::TransportError;

/// A message received from or sent to the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttMessage {
    pub topic: String,
    pub payload: Bytes,
}

impl MqttMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Access to a CAN bus
///
/// The bus is opened by the adapter's constructor; a failure there is fatal
/// for the bridge.
#[async_trait]
pub trait CanTransport: Send + Sync {
    /// Subscribe to received data frames
    ///
    /// The channel closes when the bus connection is lost or
    /// [`disconnect`](Self::disconnect) is called.
    fn subscribe(&self) -> broadcast::Receiver<CanFrame>;

    /// Write one frame to the bus; ids >= 0x800 go out as extended frames
    async fn send(&self, frame: &CanFrame) -> Result<(), TransportError>;

    async fn is_connected(&self) -> bool;

    /// Close the bus connection
    async fn disconnect(&self);
}

/// Access to an MQTT broker
#[async_trait]
pub trait MqttTransport: Send + Sync {
    async fn subscribe(&self, topic: &str) -> Result<(), TransportError>;

    async fn unsubscribe(&self, topic: &str) -> Result<(), TransportError>;

    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), TransportError>;

    /// Messages delivered for subscribed topics
    ///
    /// The channel closes when the broker connection is lost or
    /// [`disconnect`](Self::disconnect) is called.
    fn incoming(&self) -> broadcast::Receiver<MqttMessage>;

    async fn is_connected(&self) -> bool;

    async fn disconnect(&self);
}

/// Receiver for a channel that has already been closed
pub(crate) fn closed_receiver<T: Clone>() -> broadcast::Receiver<T> {
    let (_, rx) = broadcast::channel(1);
    rx
}
