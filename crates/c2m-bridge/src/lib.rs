//! c2m-bridge - bidirectional CAN <-> MQTT bridge
//!
//! Frames on subscribed CAN IDs are decoded and published on their route's
//! topic; messages on subscribed topics are encoded and written to the bus.
//! The route set can be replaced at runtime through a route-update topic.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                            Bridge                             │
//! │                                                               │
//! │  ┌─────────────┐   mpsc: MqttMessage   ┌──────────────┐       │
//! │  │ CanListener │ ────────────────────► │ MqttListener │       │
//! │  │ reader      │                       │ writer       │       │
//! │  │ writer      │ ◄──────────────────── │ reader       │       │
//! │  └──────┬──────┘     mpsc: CanFrame    └──────┬───────┘       │
//! │         │                                     │               │
//! │         │    ┌──────────────┐ ┌───────────────┤               │
//! │         └───►│ RoutingTable │ │ ConfigUpdater │◄── routes     │
//! │              │ CodecRegistry│ │ (observers)   │    topic      │
//! │              └──────────────┘ └───────────────┘               │
//! │         │                                     │               │
//! │  ┌──────┴───────┐                      ┌──────┴─────────┐     │
//! │  │ CanTransport │                      │ MqttTransport  │     │
//! │  │ (SocketCAN)  │                      │ (rumqttc)      │     │
//! │  └──────────────┘                      └────────────────┘     │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each writer unsubscribes the key it is about to emit on and resubscribes
//! afterwards, so the bridge does not ingest its own output. For MQTT the
//! broker stops delivering; for CAN the filter is local, so a loopback echo
//! arriving after the window is still ingested.

pub mod bridge;
pub mod can_listener;
pub mod config;
pub mod error;
pub mod listener;
pub mod mqtt_listener;
pub mod subscription;
pub mod transport;

pub use bridge::{Bridge, BridgeHandle};
pub use can_listener::CanListener;
pub use config::{BridgeConfig, CanConfig, DirMode, MqttConfig};
pub use error::{BridgeError, BridgeResult};
pub use listener::ListenerState;
pub use mqtt_listener::MqttListener;
pub use subscription::SubscriptionSet;
pub use transport::{
    connect_can, connect_mqtt, CanTransport, MqttMessage, MqttTransport, TransportError,
};

// Re-export for convenience
pub use c2m_conv::{CanFrame, Codec, CodecRegistry};
pub use c2m_routing::{ConfigUpdater, Direction, Route, RouteDelta, RoutingTable};
