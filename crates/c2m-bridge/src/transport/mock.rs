//! In-memory transports for testing

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use c2m_conv::CanFrame;

use super::{closed_receiver, CanTransport, MqttMessage, MqttTransport, TransportError};

type SendProbe = Box<dyn Fn(&CanFrame) + Send + Sync>;

/// Mock CAN bus
///
/// Tests inject frames as if another node sent them and inspect what the
/// bridge wrote. With loopback enabled every written frame is also delivered
/// back to subscribers, like a bus echo seen by a second socket.
pub struct MockCanBus {
    connected: AtomicBool,
    loopback: bool,
    incoming_tx: Mutex<Option<broadcast::Sender<CanFrame>>>,
    sent: Mutex<Vec<CanFrame>>,
    on_send: Mutex<Option<SendProbe>>,
}

impl MockCanBus {
    pub fn new() -> Self {
        let (incoming_tx, _) = broadcast::channel(256);
        Self {
            connected: AtomicBool::new(true),
            loopback: false,
            incoming_tx: Mutex::new(Some(incoming_tx)),
            sent: Mutex::new(Vec::new()),
            on_send: Mutex::new(None),
        }
    }

    /// Deliver written frames back to subscribers
    pub fn with_loopback(mut self) -> Self {
        self.loopback = true;
        self
    }

    /// Inject a frame from another bus node
    pub fn inject(&self, frame: CanFrame) {
        if let Some(tx) = self.incoming_tx.lock().as_ref() {
            let _ = tx.send(frame);
        }
    }

    /// Frames written so far
    pub fn sent(&self) -> Vec<CanFrame> {
        self.sent.lock().clone()
    }

    /// Run `hook` on every frame at the moment it is written
    pub fn on_send(&self, hook: impl Fn(&CanFrame) + Send + Sync + 'static) {
        *self.on_send.lock() = Some(Box::new(hook));
    }

    /// Simulate losing the bus
    pub fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.incoming_tx.lock().take();
    }
}

impl Default for MockCanBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CanTransport for MockCanBus {
    fn subscribe(&self) -> broadcast::Receiver<CanFrame> {
        match self.incoming_tx.lock().as_ref() {
            Some(tx) => tx.subscribe(),
            None => closed_receiver(),
        }
    }

    async fn send(&self, frame: &CanFrame) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }
        if let Some(hook) = self.on_send.lock().as_ref() {
            hook(frame);
        }
        self.sent.lock().push(*frame);
        if self.loopback {
            self.inject(*frame);
        }
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn disconnect(&self) {
        self.close();
    }
}

/// Operation performed by the client against the mock broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerOp {
    Subscribe(String),
    Unsubscribe(String),
    Publish(String, Bytes),
}

/// Mock MQTT broker with a single connected client (the bridge)
///
/// A message, whether injected by a test or published by the client itself,
/// is delivered to the client only if its topic is subscribed at that
/// moment. Every client operation is recorded in order.
pub struct MockBroker {
    connected: AtomicBool,
    refuse_subscribe: AtomicBool,
    subscriptions: Mutex<HashSet<String>>,
    ops: Mutex<Vec<BrokerOp>>,
    incoming_tx: Mutex<Option<broadcast::Sender<MqttMessage>>>,
}

impl MockBroker {
    pub fn new() -> Self {
        let (incoming_tx, _) = broadcast::channel(256);
        Self {
            connected: AtomicBool::new(true),
            refuse_subscribe: AtomicBool::new(false),
            subscriptions: Mutex::new(HashSet::new()),
            ops: Mutex::new(Vec::new()),
            incoming_tx: Mutex::new(Some(incoming_tx)),
        }
    }

    /// Publish from another client; returns whether it was delivered
    pub fn inject(&self, topic: &str, payload: impl Into<Bytes>) -> bool {
        self.deliver(MqttMessage::new(topic, payload))
    }

    fn deliver(&self, msg: MqttMessage) -> bool {
        if !self.subscriptions.lock().contains(&msg.topic) {
            return false;
        }
        match self.incoming_tx.lock().as_ref() {
            Some(tx) => tx.send(msg).is_ok(),
            None => false,
        }
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.subscriptions.lock().contains(topic)
    }

    /// Currently subscribed topics, sorted
    pub fn subscriptions(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.subscriptions.lock().iter().cloned().collect();
        topics.sort();
        topics
    }

    /// All client operations so far
    pub fn ops(&self) -> Vec<BrokerOp> {
        self.ops.lock().clone()
    }

    /// Client operations that concern `topic`
    pub fn ops_for(&self, topic: &str) -> Vec<BrokerOp> {
        self.ops
            .lock()
            .iter()
            .filter(|op| match op {
                BrokerOp::Subscribe(t) | BrokerOp::Unsubscribe(t) | BrokerOp::Publish(t, _) => {
                    t == topic
                }
            })
            .cloned()
            .collect()
    }

    /// Messages published by the client
    pub fn published(&self) -> Vec<MqttMessage> {
        self.ops
            .lock()
            .iter()
            .filter_map(|op| match op {
                BrokerOp::Publish(topic, payload) => Some(MqttMessage::new(topic.clone(), payload.clone())),
                _ => None,
            })
            .collect()
    }

    /// Make subscribe requests fail while the connection stays up
    pub fn refuse_subscribe(&self, refuse: bool) {
        self.refuse_subscribe.store(refuse, Ordering::SeqCst);
    }

    /// Simulate losing the broker connection
    pub fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.incoming_tx.lock().take();
    }

    fn check_connected(&self) -> Result<(), TransportError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TransportError::ConnectionClosed)
        }
    }
}

impl Default for MockBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MqttTransport for MockBroker {
    async fn subscribe(&self, topic: &str) -> Result<(), TransportError> {
        self.check_connected()?;
        if self.refuse_subscribe.load(Ordering::SeqCst) {
            return Err(TransportError::SubscribeFailed(topic.to_string()));
        }
        self.ops.lock().push(BrokerOp::Subscribe(topic.to_string()));
        self.subscriptions.lock().insert(topic.to_string());
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), TransportError> {
        self.check_connected()?;
        self.ops.lock().push(BrokerOp::Unsubscribe(topic.to_string()));
        self.subscriptions.lock().remove(topic);
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), TransportError> {
        self.check_connected()?;
        self.ops
            .lock()
            .push(BrokerOp::Publish(topic.to_string(), payload.clone()));
        self.deliver(MqttMessage::new(topic, payload));
        Ok(())
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
        self.close();
    }
}
