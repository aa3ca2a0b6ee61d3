//! MQTT side of the bridge
//!
//! Receives messages for subscribed route topics, converts them to frames
//! and queues them for the CAN writer. Messages on the route-update topic go
//! to the configuration updater instead. A second task publishes whatever the
//! CAN side translated.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use c2m_conv::{format_can_id, CanFrame, CodecRegistry};
use c2m_routing::{ConfigUpdater, Route, RouteDelta, RouteObserver, RoutingTable};

use crate::config::{BridgeConfig, DirMode};
use crate::error::{BridgeError, BridgeResult};
use crate::listener::{ListenerState, Tasks};
use crate::subscription::SubscriptionSet;
use crate::transport::{MqttMessage, MqttTransport, TransportError};

pub struct MqttListener {
    transport: Arc<dyn MqttTransport>,
    table: Arc<RoutingTable>,
    registry: Arc<CodecRegistry>,
    mode: DirMode,
    routes_topic: String,
    queue_capacity: usize,
    topics: SubscriptionSet<String>,
    updater: Mutex<Option<Arc<ConfigUpdater>>>,
    state: Mutex<ListenerState>,
    tasks: Tasks,
}

impl MqttListener {
    pub fn new(
        transport: Arc<dyn MqttTransport>,
        table: Arc<RoutingTable>,
        registry: Arc<CodecRegistry>,
        config: &BridgeConfig,
    ) -> Self {
        Self {
            transport,
            table,
            registry,
            mode: config.direction,
            routes_topic: config.routes_topic.clone(),
            queue_capacity: config.queue_capacity.max(1),
            topics: SubscriptionSet::new(),
            updater: Mutex::new(None),
            state: Mutex::new(ListenerState::Stopped),
            tasks: Tasks::default(),
        }
    }

    pub fn state(&self) -> ListenerState {
        *self.state.lock()
    }

    pub fn routes_topic(&self) -> &str {
        &self.routes_topic
    }

    /// Subscribe a route topic at the broker
    pub async fn subscribe(&self, topic: &str) -> Result<(), TransportError> {
        let key = topic.to_string();
        if self.topics.subscribe(key.clone()) {
            if let Err(e) = self.transport.subscribe(topic).await {
                self.topics.unsubscribe(&key);
                return Err(e);
            }
            debug!(topic, "Subscribed topic");
        }
        Ok(())
    }

    pub async fn unsubscribe(&self, topic: &str) -> Result<(), TransportError> {
        if self.topics.unsubscribe(&topic.to_string()) {
            self.transport.unsubscribe(topic).await?;
            debug!(topic, "Unsubscribed topic");
        }
        Ok(())
    }

    /// Messages on `topic` are currently forwarded
    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.topics.contains(&topic.to_string())
    }

    /// Subscribed route topics, sorted
    pub fn subscribed(&self) -> Vec<String> {
        let mut topics = self.topics.wanted();
        topics.sort();
        topics
    }

    /// Hand route-update payloads to `updater` and subscribe the update topic
    pub async fn subscribe_config(&self, updater: Arc<ConfigUpdater>) -> BridgeResult<()> {
        *self.updater.lock() = Some(updater);
        self.transport.subscribe(&self.routes_topic).await?;
        info!(topic = %self.routes_topic, "Listening for route updates");
        Ok(())
    }

    /// Routes this side ingests: MQTT -> CAN allowed by route and mode
    fn wants(&self, route: &Route) -> bool {
        self.mode.mqtt_to_can() && route.direction.mqtt_to_can()
    }

    async fn add_route(&self, route: &Route) {
        if !self.wants(route) {
            return;
        }
        if route.topic == self.routes_topic {
            warn!(topic = %route.topic, "Route topic collides with the route-update topic, not subscribing");
            return;
        }
        if let Err(e) = self.subscribe(&route.topic).await {
            warn!(topic = %route.topic, error = %e, "Failed to subscribe route topic");
        }
    }

    /// Start the reader, writer and configuration tasks
    ///
    /// `to_can` receives encoded frames; `from_can` supplies messages to
    /// publish. The returned handle resolves with an error when the broker
    /// connection is lost.
    pub async fn run(
        self: &Arc<Self>,
        to_can: mpsc::Sender<CanFrame>,
        from_can: mpsc::Receiver<MqttMessage>,
    ) -> BridgeResult<JoinHandle<BridgeResult<()>>> {
        {
            let mut state = self.state.lock();
            if *state != ListenerState::Stopped {
                return Err(BridgeError::AlreadyRunning);
            }
            *state = ListenerState::Connecting;
        }

        if !self.transport.is_connected().await {
            *self.state.lock() = ListenerState::Stopped;
            return Err(TransportError::ConnectionFailed("MQTT broker not connected".into()).into());
        }

        let messages = self.transport.incoming();
        for route in self.table.routes() {
            self.add_route(&route).await;
        }

        // Updates run on their own task so the reader keeps draining the
        // broker while observers resubscribe.
        let (config_tx, config_rx) = mpsc::channel(self.queue_capacity);
        let this = Arc::clone(self);
        let config = tokio::spawn(async move { this.config_loop(config_rx).await });

        let this = Arc::clone(self);
        let reader = tokio::spawn(async move {
            let result = this.read_loop(messages, to_can, config_tx).await;
            *this.state.lock() = ListenerState::Stopped;
            result
        });

        let this = Arc::clone(self);
        let writer = tokio::spawn(async move { this.write_loop(from_can).await });

        self.tasks.push(reader.abort_handle());
        self.tasks.push(writer.abort_handle());
        self.tasks.push(config.abort_handle());

        *self.state.lock() = ListenerState::Running;
        info!(topics = self.topics.len(), mode = ?self.mode, "MQTT listener running");
        Ok(reader)
    }

    /// Abort all tasks and disconnect from the broker
    pub async fn stop(&self) {
        self.tasks.abort_all();
        self.transport.disconnect().await;
        *self.state.lock() = ListenerState::Stopped;
        info!("MQTT listener stopped");
    }

    async fn read_loop(
        &self,
        mut messages: broadcast::Receiver<MqttMessage>,
        to_can: mpsc::Sender<CanFrame>,
        config_tx: mpsc::Sender<Bytes>,
    ) -> BridgeResult<()> {
        loop {
            match messages.recv().await {
                Ok(msg) if msg.topic == self.routes_topic => {
                    debug!(len = msg.payload.len(), "Route update received");
                    if config_tx.send(msg.payload).await.is_err() {
                        warn!("Configuration task gone, route update dropped");
                    }
                }
                Ok(msg) => {
                    let Some(frame) = self.handle_message(&msg) else {
                        continue;
                    };
                    if to_can.send(frame).await.is_err() {
                        debug!("CAN queue closed, MQTT reader exiting");
                        return Ok(());
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "MQTT reader lagging, messages dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    error!("MQTT broker connection closed");
                    return Err(TransportError::ConnectionClosed.into());
                }
            }
        }
    }

    async fn config_loop(&self, mut config_rx: mpsc::Receiver<Bytes>) {
        while let Some(raw) = config_rx.recv().await {
            let updater = self.updater.lock().clone();
            match updater {
                // Errors are logged by the updater; the old table stays
                Some(updater) => {
                    let _ = updater.config_update(&raw).await;
                }
                None => debug!("No configuration updater, route update ignored"),
            }
        }
    }

    /// Translate one received message, or `None` if it is filtered or fails
    pub fn handle_message(&self, msg: &MqttMessage) -> Option<CanFrame> {
        if !self.topics.contains(&msg.topic) {
            trace!(topic = %msg.topic, "Topic not subscribed");
            return None;
        }

        let route = match self.table.get_by_topic(&msg.topic) {
            Ok(route) => route,
            Err(_) => {
                debug!(topic = %msg.topic, "No route for topic");
                return None;
            }
        };
        if !self.wants(&route) {
            return None;
        }

        let codec = match self.registry.get(route.codec_name()) {
            Ok(codec) => codec,
            Err(e) => {
                warn!(topic = %msg.topic, error = %e, "Message dropped");
                return None;
            }
        };
        let frame = route
            .id()
            .map_err(BridgeError::from)
            .and_then(|id| Ok(codec.encode(&msg.payload)?.with_id(id)?));
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                warn!(
                    topic = %msg.topic,
                    codec = %codec,
                    payload = %String::from_utf8_lossy(&msg.payload),
                    error = %e,
                    "Conversion failed, message dropped"
                );
                return None;
            }
        };

        info!(
            can_id = %format_can_id(frame.id()),
            len = frame.len(),
            data = %hex::encode(frame.data()),
            codec = %codec,
            topic = %msg.topic,
            payload = %String::from_utf8_lossy(&msg.payload),
            "CAN <- MQTT"
        );
        Some(frame)
    }

    async fn write_loop(&self, mut from_can: mpsc::Receiver<MqttMessage>) -> BridgeResult<()> {
        while let Some(msg) = from_can.recv().await {
            let result = self.publish_unheard(&msg).await;
            match result {
                Ok(()) => trace!(topic = %msg.topic, "Message published"),
                Err(TransportError::ConnectionClosed) => {
                    error!("MQTT broker connection closed, writer exiting");
                    return Err(TransportError::ConnectionClosed.into());
                }
                Err(e) => warn!(topic = %msg.topic, error = %e, "Failed to publish message"),
            }
        }
        debug!("MQTT publish queue closed");
        Ok(())
    }

    /// Publish with the topic unsubscribed, so the broker does not echo it back
    async fn publish_unheard(&self, msg: &MqttMessage) -> Result<(), TransportError> {
        if msg.topic == self.routes_topic {
            return Err(TransportError::ReservedTopic(msg.topic.clone()));
        }
        let suspended = self.topics.suspend(&msg.topic);
        if suspended {
            if let Err(e) = self.transport.unsubscribe(&msg.topic).await {
                warn!(topic = %msg.topic, error = %e, "Failed to unsubscribe before publish");
            }
        }

        let result = self.transport.publish(&msg.topic, msg.payload.clone()).await;

        if suspended && self.topics.resume(&msg.topic) {
            if let Err(e) = self.transport.subscribe(&msg.topic).await {
                warn!(topic = %msg.topic, error = %e, "Failed to resubscribe after publish");
            }
        }
        result
    }
}

#[async_trait]
impl RouteObserver for MqttListener {
    async fn update_configuration(&self, delta: &RouteDelta) {
        for route in &delta.removed {
            if let Err(e) = self.unsubscribe(&route.topic).await {
                warn!(topic = %route.topic, error = %e, "Failed to unsubscribe route topic");
            }
        }
        for route in &delta.added {
            self.add_route(route).await;
        }
    }
}
