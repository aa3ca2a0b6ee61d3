//! CAN side of the bridge
//!
//! Reads frames from the bus, keeps those whose identifier is subscribed,
//! converts them with the route's codec and queues the result for the MQTT
//! writer. A second task drains the frames queued by the MQTT side and
//! writes them to the bus.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use c2m_conv::{format_can_id, CanFrame, CodecRegistry};
use c2m_routing::{Route, RouteDelta, RouteObserver, RoutingTable};

use crate::config::DirMode;
use crate::error::{BridgeError, BridgeResult};
use crate::listener::{ListenerState, Tasks};
use crate::subscription::SubscriptionSet;
use crate::transport::{CanTransport, MqttMessage, TransportError};

pub struct CanListener {
    transport: Arc<dyn CanTransport>,
    table: Arc<RoutingTable>,
    registry: Arc<CodecRegistry>,
    mode: DirMode,
    ids: SubscriptionSet<u32>,
    state: Mutex<ListenerState>,
    tasks: Tasks,
}

impl CanListener {
    pub fn new(
        transport: Arc<dyn CanTransport>,
        table: Arc<RoutingTable>,
        registry: Arc<CodecRegistry>,
        mode: DirMode,
    ) -> Self {
        Self {
            transport,
            table,
            registry,
            mode,
            ids: SubscriptionSet::new(),
            state: Mutex::new(ListenerState::Stopped),
            tasks: Tasks::default(),
        }
    }

    pub fn state(&self) -> ListenerState {
        *self.state.lock()
    }

    /// Start forwarding frames with this identifier
    pub fn subscribe(&self, id: u32) {
        if self.ids.subscribe(id) {
            debug!(can_id = %format_can_id(id), "Subscribed CAN ID");
        }
    }

    pub fn unsubscribe(&self, id: u32) {
        if self.ids.unsubscribe(&id) {
            debug!(can_id = %format_can_id(id), "Unsubscribed CAN ID");
        }
    }

    /// Frames with `id` are currently forwarded
    pub fn is_subscribed(&self, id: u32) -> bool {
        self.ids.contains(&id)
    }

    /// Subscribed identifiers, sorted
    pub fn subscribed(&self) -> Vec<u32> {
        let mut ids = self.ids.wanted();
        ids.sort_unstable();
        ids
    }

    /// Routes this side ingests: CAN -> MQTT allowed by route and mode
    fn wants(&self, route: &Route) -> bool {
        self.mode.can_to_mqtt() && route.direction.can_to_mqtt()
    }

    fn add_route(&self, route: &Route) {
        if !self.wants(route) {
            return;
        }
        match route.id() {
            Ok(id) => self.subscribe(id),
            Err(e) => warn!(can_id = %route.can_id, error = %e, "Not subscribing route"),
        }
    }

    /// Start the reader and writer tasks
    ///
    /// `to_mqtt` receives translated frames; `from_mqtt` supplies frames to
    /// write. The returned handle resolves with an error when the bus
    /// connection is lost.
    pub async fn run(
        self: &Arc<Self>,
        to_mqtt: mpsc::Sender<MqttMessage>,
        from_mqtt: mpsc::Receiver<CanFrame>,
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
            return Err(TransportError::ConnectionFailed("CAN bus not connected".into()).into());
        }

        let frames = self.transport.subscribe();
        for route in self.table.routes() {
            self.add_route(&route);
        }

        let this = Arc::clone(self);
        let reader = tokio::spawn(async move {
            let result = this.read_loop(frames, to_mqtt).await;
            *this.state.lock() = ListenerState::Stopped;
            result
        });

        let this = Arc::clone(self);
        let writer = tokio::spawn(async move { this.write_loop(from_mqtt).await });

        self.tasks.push(reader.abort_handle());
        self.tasks.push(writer.abort_handle());

        *self.state.lock() = ListenerState::Running;
        info!(ids = self.ids.len(), mode = ?self.mode, "CAN listener running");
        Ok(reader)
    }

    /// Abort both tasks and close the bus
    pub async fn stop(&self) {
        self.tasks.abort_all();
        self.transport.disconnect().await;
        *self.state.lock() = ListenerState::Stopped;
        info!("CAN listener stopped");
    }

    async fn read_loop(
        &self,
        mut frames: broadcast::Receiver<CanFrame>,
        to_mqtt: mpsc::Sender<MqttMessage>,
    ) -> BridgeResult<()> {
        loop {
            match frames.recv().await {
                Ok(frame) => {
                    let Some(msg) = self.handle_frame(&frame) else {
                        continue;
                    };
                    if to_mqtt.send(msg).await.is_err() {
                        debug!("MQTT queue closed, CAN reader exiting");
                        return Ok(());
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "CAN reader lagging, frames dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    error!("CAN bus connection closed");
                    return Err(TransportError::ConnectionClosed.into());
                }
            }
        }
    }

    /// Translate one received frame, or `None` if it is filtered or fails
    pub fn handle_frame(&self, frame: &CanFrame) -> Option<MqttMessage> {
        let id = frame.id();
        if !self.ids.contains(&id) {
            trace!(can_id = %format_can_id(id), "CAN ID not subscribed");
            return None;
        }

        let route = match self.table.get_by_can_id(id) {
            Ok(route) => route,
            Err(_) => {
                debug!(can_id = %format_can_id(id), "No route for CAN ID");
                return None;
            }
        };
        if !self.wants(&route) {
            return None;
        }

        let codec = match self.registry.get(route.codec_name()) {
            Ok(codec) => codec,
            Err(e) => {
                warn!(can_id = %format_can_id(id), error = %e, "Frame dropped");
                return None;
            }
        };
        let payload = match codec.decode(frame) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(
                    can_id = %format_can_id(id),
                    codec = %codec,
                    data = %hex::encode(frame.data()),
                    error = %e,
                    "Conversion failed, frame dropped"
                );
                return None;
            }
        };

        info!(
            can_id = %format_can_id(id),
            len = frame.len(),
            data = %hex::encode(frame.data()),
            codec = %codec,
            topic = %route.topic,
            payload = %String::from_utf8_lossy(&payload),
            "CAN -> MQTT"
        );
        Some(MqttMessage {
            topic: route.topic,
            payload,
        })
    }

    async fn write_loop(&self, mut from_mqtt: mpsc::Receiver<CanFrame>) -> BridgeResult<()> {
        while let Some(frame) = from_mqtt.recv().await {
            let id = frame.id();

            // Not listening on our own frame while it is on the wire
            let suspended = self.ids.suspend(&id);
            let result = self.transport.send(&frame).await;
            if suspended {
                self.ids.resume(&id);
            }

            match result {
                Ok(()) => trace!(frame = %frame, "Frame written"),
                Err(TransportError::ConnectionClosed) => {
                    error!("CAN bus connection closed, writer exiting");
                    return Err(TransportError::ConnectionClosed.into());
                }
                Err(e) => warn!(frame = %frame, error = %e, "Failed to write frame"),
            }
        }
        debug!("CAN write queue closed");
        Ok(())
    }
}

#[async_trait]
impl RouteObserver for CanListener {
    async fn update_configuration(&self, delta: &RouteDelta) {
        for route in &delta.removed {
            if let Ok(id) = route.id() {
                self.unsubscribe(id);
            }
        }
        for route in &delta.added {
            self.add_route(route);
        }
    }
}
