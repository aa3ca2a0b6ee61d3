//! Routing errors

use thiserror::Error;

use c2m_conv::ConvError;

use crate::route::RouteHash;

/// Errors from the routing table, updater and route loaders
#[derive(Debug, Error)]
pub enum RoutingError {
    /// A route with identical content is already installed
    #[error("route with hash {0} already exists")]
    DuplicateRoute(RouteHash),

    /// The CAN ID is owned by a different route
    #[error("CAN ID {can_id} already routed by {owner}")]
    CanIdInUse { can_id: String, owner: RouteHash },

    /// The topic is owned by a different route
    #[error("topic {topic:?} already routed by {owner}")]
    TopicInUse { topic: String, owner: RouteHash },

    /// No route for the given key
    #[error("route not in configuration: {0}")]
    NotFound(String),

    /// Topic is empty
    #[error("route topic must not be empty")]
    EmptyTopic,

    /// Invalid CAN ID or unknown codec
    #[error(transparent)]
    Conv(#[from] ConvError),

    /// Route-set payload could not be deserialized
    #[error("invalid route payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    /// Static route file could not be read
    #[error("route file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Unsupported route file format
    #[error("unsupported route file {0:?}: expected .csv or .json")]
    UnsupportedFormat(String),
}

/// Result type for routing operations
pub type RoutingResult<T> = Result<T, RoutingError>;
