//! Configuration updater
//!
//! Takes a complete route set (raw JSON from the route-update topic, or an
//! already parsed list), replaces the routing table and tells every
//! registered observer what was added and removed.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use c2m_conv::CodecRegistry;

use crate::error::{RoutingError, RoutingResult};
use crate::route::Route;
use crate::table::{RouteDelta, RoutingTable};

/// Receives route deltas after the table was replaced
///
/// Implementations must not block on anything the updater's caller is
/// waiting for (e.g. the event loop that delivered the update).
#[async_trait]
pub trait RouteObserver: Send + Sync {
    async fn update_configuration(&self, delta: &RouteDelta);
}

/// Applies full route-set updates and fans the delta out to observers
pub struct ConfigUpdater {
    table: Arc<RoutingTable>,
    registry: Option<Arc<CodecRegistry>>,
    /// Topic no route may publish on or listen to
    reserved_topic: Option<String>,
    observers: RwLock<Vec<Arc<dyn RouteObserver>>>,
    /// One update at a time, observers included
    in_flight: tokio::sync::Mutex<()>,
}

impl ConfigUpdater {
    pub fn new(table: Arc<RoutingTable>) -> Self {
        Self {
            table,
            registry: None,
            reserved_topic: None,
            observers: RwLock::new(Vec::new()),
            in_flight: tokio::sync::Mutex::new(()),
        }
    }

    /// Drop routes naming a codec the registry does not know
    pub fn with_registry(mut self, registry: Arc<CodecRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Drop routes bound to `topic`, normally the route-update topic itself
    pub fn with_reserved_topic(mut self, topic: impl Into<String>) -> Self {
        self.reserved_topic = Some(topic.into());
        self
    }

    pub fn table(&self) -> &Arc<RoutingTable> {
        &self.table
    }

    /// Register an observer; observers are called in registration order
    pub fn register(&self, observer: Arc<dyn RouteObserver>) {
        self.observers.write().push(observer);
    }

    /// Handle a raw route-update payload (JSON array of routes)
    ///
    /// A payload that does not deserialize leaves the table untouched.
    pub async fn config_update(&self, raw: &[u8]) -> RoutingResult<RouteDelta> {
        let routes: Vec<Route> = match serde_json::from_slice(raw) {
            Ok(routes) => routes,
            Err(e) => {
                error!(
                    payload = %String::from_utf8_lossy(raw),
                    error = %e,
                    "Invalid route update payload"
                );
                return Err(RoutingError::InvalidPayload(e));
            }
        };
        self.apply(routes).await
    }

    /// Replace the route set and inform observers
    pub async fn apply(&self, routes: Vec<Route>) -> RoutingResult<RouteDelta> {
        let _guard = self.in_flight.lock().await;

        let routes = match &self.registry {
            Some(registry) => retain_known_codecs(routes, registry),
            None => routes,
        };
        let routes = match &self.reserved_topic {
            Some(topic) => retain_unreserved(routes, topic),
            None => routes,
        };

        let (delta, rejected) = self.table.replace_routes(routes);
        for e in &rejected {
            warn!(error = %e, "Skipping route");
        }

        if delta.is_empty() {
            debug!("Route update without changes");
            return Ok(delta);
        }

        info!(
            added = delta.added.len(),
            removed = delta.removed.len(),
            total = self.table.len(),
            "Routing table updated"
        );

        self.inform(&delta).await;
        Ok(delta)
    }

    /// Call every observer with the delta, in registration order
    pub async fn inform(&self, delta: &RouteDelta) {
        let observers: Vec<Arc<dyn RouteObserver>> = self.observers.read().clone();
        for observer in observers {
            observer.update_configuration(delta).await;
        }
    }
}

/// Keep routes whose codec is registered, warning about the rest
pub fn retain_known_codecs(routes: Vec<Route>, registry: &CodecRegistry) -> Vec<Route> {
    routes
        .into_iter()
        .filter(|route| {
            let known = registry.contains(route.codec_name());
            if !known {
                warn!(
                    can_id = %route.can_id,
                    topic = %route.topic,
                    codec = route.codec_name(),
                    "Skipping route, unknown codec"
                );
            }
            known
        })
        .collect()
}

/// Keep routes not bound to the reserved topic, warning about the rest
pub fn retain_unreserved(routes: Vec<Route>, reserved: &str) -> Vec<Route> {
    routes
        .into_iter()
        .filter(|route| {
            let clash = route.topic == reserved;
            if clash {
                warn!(
                    can_id = %route.can_id,
                    topic = %route.topic,
                    "Skipping route, topic is reserved for route updates"
                );
            }
            !clash
        })
        .collect()
}
