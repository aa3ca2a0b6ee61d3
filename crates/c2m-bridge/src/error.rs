//! Bridge errors

use thiserror::Error;

use c2m_conv::ConvError;
use c2m_routing::RoutingError;

use crate::transport::TransportError;

#[derive(Debug, Error)]
pub enum BridgeError {
    /// Bus or broker failure; fatal at startup
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Routing error: {0}")]
    Routing(#[from] RoutingError),

    #[error("Conversion error: {0}")]
    Conversion(#[from] ConvError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Listener already running")]
    AlreadyRunning,

    #[error("Task failed: {0}")]
    Task(String),
}

pub type BridgeResult<T> = Result<T, BridgeError>;
