//! Bridge assembly
//!
//! Wires both listeners to the shared routing table, the codec registry and
//! the configuration updater, and connects them with two bounded queues.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use c2m_conv::{CanFrame, CodecRegistry};
use c2m_routing::{ConfigUpdater, Route, RouteDelta, RoutingTable};

use crate::can_listener::CanListener;
use crate::config::BridgeConfig;
use crate::error::BridgeResult;
use crate::listener::join_result;
use crate::mqtt_listener::MqttListener;
use crate::transport::{CanTransport, MqttMessage, MqttTransport};

pub struct Bridge {
    config: BridgeConfig,
    table: Arc<RoutingTable>,
    updater: Arc<ConfigUpdater>,
    can: Arc<CanListener>,
    mqtt: Arc<MqttListener>,
}

impl Bridge {
    pub fn new(
        can: Arc<dyn CanTransport>,
        mqtt: Arc<dyn MqttTransport>,
        table: Arc<RoutingTable>,
        registry: Arc<CodecRegistry>,
        config: BridgeConfig,
    ) -> Self {
        if let Ok(route) = table.remove_route_by_topic(&config.routes_topic) {
            warn!(%route, "Dropping route, topic is reserved for route updates");
        }
        let updater = Arc::new(
            ConfigUpdater::new(table.clone())
                .with_registry(registry.clone())
                .with_reserved_topic(config.routes_topic.clone()),
        );

        let can = Arc::new(CanListener::new(
            can,
            table.clone(),
            registry.clone(),
            config.direction,
        ));
        let mqtt = Arc::new(MqttListener::new(mqtt, table.clone(), registry, &config));

        updater.register(can.clone());
        updater.register(mqtt.clone());

        Self {
            config,
            table,
            updater,
            can,
            mqtt,
        }
    }

    /// Run both listeners and start listening for route updates
    ///
    /// Routes already in the table are subscribed right away. If either side
    /// fails to start, whatever was started is stopped again.
    pub async fn start(&self) -> BridgeResult<BridgeHandle> {
        let capacity = self.config.queue_capacity.max(1);
        let (to_mqtt, from_can) = mpsc::channel::<MqttMessage>(capacity);
        let (to_can, from_mqtt) = mpsc::channel::<CanFrame>(capacity);

        let can = self.can.run(to_mqtt, from_mqtt).await?;
        let mqtt = match self.mqtt.run(to_can, from_can).await {
            Ok(handle) => handle,
            Err(e) => {
                self.can.stop().await;
                return Err(e);
            }
        };
        if let Err(e) = self.mqtt.subscribe_config(self.updater.clone()).await {
            self.stop().await;
            return Err(e);
        }

        info!(
            routes = self.table.len(),
            mode = ?self.config.direction,
            routes_topic = %self.config.routes_topic,
            "Bridge started"
        );
        Ok(BridgeHandle { can, mqtt })
    }

    /// Replace the route set, as a route update from the broker would
    pub async fn load_routes(&self, routes: Vec<Route>) -> BridgeResult<RouteDelta> {
        Ok(self.updater.apply(routes).await?)
    }

    pub async fn stop(&self) {
        self.can.stop().await;
        self.mqtt.stop().await;
        info!("Bridge stopped");
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn table(&self) -> &Arc<RoutingTable> {
        &self.table
    }

    pub fn updater(&self) -> &Arc<ConfigUpdater> {
        &self.updater
    }

    pub fn can_listener(&self) -> &Arc<CanListener> {
        &self.can
    }

    pub fn mqtt_listener(&self) -> &Arc<MqttListener> {
        &self.mqtt
    }
}

/// Reader tasks of a running bridge
pub struct BridgeHandle {
    can: JoinHandle<BridgeResult<()>>,
    mqtt: JoinHandle<BridgeResult<()>>,
}

impl BridgeHandle {
    /// Wait until either side stops
    ///
    /// Resolves with an error when the bus or broker connection was lost and
    /// with `Ok(())` after [`Bridge::stop`].
    pub async fn wait(mut self) -> BridgeResult<()> {
        tokio::select! {
            result = &mut self.can => join_result(result),
            result = &mut self.mqtt => join_result(result),
        }
    }
}
