//! SocketCAN adapter using a raw CAN socket

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use socketcan::{CanSocket, EmbeddedFrame, ExtendedId, Id, Socket, StandardId};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use c2m_conv::CanFrame;

use super::{closed_receiver, CanTransport, TransportError};
use crate::config::CanConfig;

type FrameSender = Arc<Mutex<Option<broadcast::Sender<CanFrame>>>>;

/// Raw SocketCAN transport
pub struct SocketCanTransport {
    interface: String,
    socket: Arc<Mutex<CanSocket>>,
    connected: Arc<AtomicBool>,
    incoming_tx: FrameSender,
    listener_handle: Mutex<Option<JoinHandle<()>>>,
}

impl SocketCanTransport {
    /// Open the interface and start the background reader
    pub fn open(config: &CanConfig) -> Result<Self, TransportError> {
        let socket = CanSocket::open(&config.interface).map_err(|e| {
            TransportError::ConnectionFailed(format!(
                "Failed to open CAN socket on {}: {}",
                config.interface, e
            ))
        })?;

        // Set socket to non-blocking so the reader can observe shutdown
        socket.set_nonblocking(true).map_err(|e| {
            TransportError::InvalidConfig(format!("Failed to set non-blocking: {}", e))
        })?;

        let (incoming_tx, _) = broadcast::channel(1024);

        let transport = Self {
            interface: config.interface.clone(),
            socket: Arc::new(Mutex::new(socket)),
            connected: Arc::new(AtomicBool::new(true)),
            incoming_tx: Arc::new(Mutex::new(Some(incoming_tx))),
            listener_handle: Mutex::new(None),
        };
        transport.start_listener();

        info!(interface = %transport.interface, "CAN interface opened");
        Ok(transport)
    }

    fn start_listener(&self) {
        let socket = self.socket.clone();
        let connected = self.connected.clone();
        let incoming_tx = self.incoming_tx.clone();

        let handle = tokio::task::spawn_blocking(move || {
            while connected.load(Ordering::SeqCst) {
                let result = socket.lock().read_frame();
                match result {
                    Ok(socketcan::CanFrame::Data(frame)) => {
                        let id = match frame.id() {
                            Id::Standard(id) => u32::from(id.as_raw()),
                            Id::Extended(id) => id.as_raw(),
                        };
                        match CanFrame::new(id, frame.data()) {
                            Ok(frame) => {
                                if let Some(tx) = incoming_tx.lock().as_ref() {
                                    // No receivers is fine
                                    let _ = tx.send(frame);
                                }
                            }
                            Err(e) => debug!(error = %e, "Dropping unreadable frame"),
                        }
                    }
                    Ok(_) => {
                        // Remote and error frames carry no payload to route
                    }
                    Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        std::thread::sleep(Duration::from_millis(1));
                    }
                    Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                    Err(e) => {
                        // Interface down or removed; subscribers see the channel close
                        error!(error = %e, "SocketCAN read failed");
                        connected.store(false, Ordering::SeqCst);
                        break;
                    }
                }
            }
            incoming_tx.lock().take();
            debug!("SocketCAN listener stopped");
        });

        *self.listener_handle.lock() = Some(handle);
    }
}

fn to_socketcan(frame: &CanFrame) -> Result<socketcan::CanFrame, TransportError> {
    let id = if frame.is_extended() {
        ExtendedId::new(frame.id()).map(Id::Extended)
    } else {
        StandardId::new(frame.id() as u16).map(Id::Standard)
    }
    .ok_or_else(|| TransportError::SendFailed(format!("Invalid CAN ID: 0x{:X}", frame.id())))?;

    socketcan::CanFrame::new(id, frame.data())
        .ok_or_else(|| TransportError::SendFailed(format!("Invalid frame: {}", frame)))
}

#[async_trait]
impl CanTransport for SocketCanTransport {
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

        let socket = self.socket.clone();
        let frame = to_socketcan(frame)?;

        tokio::task::spawn_blocking(move || {
            let socket_guard = socket.lock();
            socket_guard
                .write_frame(&frame)
                .map_err(|e| TransportError::SendFailed(e.to_string()))
        })
        .await
        .map_err(|e| TransportError::SendFailed(format!("Task join error: {}", e)))??;

        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        let handle = self.listener_handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        info!(interface = %self.interface, "CAN interface closed");
    }
}

impl Drop for SocketCanTransport {
    fn drop(&mut self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}
