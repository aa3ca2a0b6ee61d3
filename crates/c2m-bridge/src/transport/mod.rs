//! Transport layer
//!
//! - SocketCAN adapter for the CAN side (Linux only)
//! - rumqttc adapter for the MQTT side
//! - In-memory mocks of both for testing

mod adapter;
pub mod error;
pub mod mock;
pub mod mqtt;

#[cfg(all(target_os = "linux", feature = "socketcan"))]
pub mod socketcan;

pub use adapter::{CanTransport, MqttMessage, MqttTransport};
pub(crate) use adapter::closed_receiver;
pub use error::TransportError;
pub use mqtt::RumqttcTransport;

use std::sync::Arc;

use crate::config::{CanConfig, MqttConfig};

/// Open the CAN interface
pub async fn connect_can(config: &CanConfig) -> Result<Arc<dyn CanTransport>, TransportError> {
    #[cfg(all(target_os = "linux", feature = "socketcan"))]
    {
        let adapter = socketcan::SocketCanTransport::open(config)?;
        Ok(Arc::new(adapter))
    }
    #[cfg(not(all(target_os = "linux", feature = "socketcan")))]
    {
        Err(TransportError::Unsupported(format!(
            "cannot open {}: SocketCAN requires Linux and the 'socketcan' feature",
            config.interface
        )))
    }
}

/// Connect to the MQTT broker, waiting for its acknowledgement
pub async fn connect_mqtt(config: &MqttConfig) -> Result<Arc<dyn MqttTransport>, TransportError> {
    let adapter = RumqttcTransport::connect(config).await?;
    Ok(Arc::new(adapter))
}
