//! Loopback transport for testing and offline runs.
//!
//! A [`LoopbackHub`] reproduces the relay's fan-out in process: every
//! endpoint created with [`LoopbackHub::connect`] receives every submitted
//! message, including its own.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use paircast_proto::message::ChatMessage;
use tokio::sync::{self, mpsc};

use super::{Transport, TransportError, TransportType};

type Endpoints = Arc<Mutex<Vec<mpsc::UnboundedSender<serde_json::Value>>>>;

/// In-process broadcast relay.
///
/// Cloning the hub yields another handle to the same set of endpoints.
#[derive(Debug, Clone, Default)]
pub struct LoopbackHub {
    endpoints: Endpoints,
}

impl LoopbackHub {
    /// Create a hub with no endpoints.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new endpoint.
    ///
    /// The endpoint receives every payload broadcast after this call.
    #[must_use]
    pub fn connect(&self) -> LoopbackTransport {
        let (tx, rx) = mpsc::unbounded_channel();
        self.endpoints.lock().push(tx);
        LoopbackTransport {
            endpoints: Arc::clone(&self.endpoints),
            incoming: sync::Mutex::new(rx),
            closed: AtomicBool::new(false),
        }
    }

    /// Deliver a raw payload to every endpoint, bypassing validation.
    ///
    /// Returns the number of endpoints reached.
    pub fn inject(&self, payload: &serde_json::Value) -> usize {
        broadcast(&self.endpoints, payload)
    }

    /// Number of live endpoints.
    #[must_use]
    pub fn endpoint_count(&self) -> usize {
        let mut endpoints = self.endpoints.lock();
        endpoints.retain(|tx| !tx.is_closed());
        endpoints.len()
    }
}

fn broadcast(endpoints: &Endpoints, payload: &serde_json::Value) -> usize {
    let mut endpoints = endpoints.lock();
    endpoints.retain(|tx| tx.send(payload.clone()).is_ok());
    endpoints.len()
}

/// One endpoint attached to a [`LoopbackHub`].
pub struct LoopbackTransport {
    endpoints: Endpoints,
    incoming: sync::Mutex<mpsc::UnboundedReceiver<serde_json::Value>>,
    closed: AtomicBool,
}

impl Transport for LoopbackTransport {
    async fn submit(&self, msg: &ChatMessage) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(TransportError::ConnectionClosed);
        }
        let reached = broadcast(&self.endpoints, &msg.to_event());
        tracing::trace!(reached, "loopback broadcast");
        Ok(())
    }

    async fn recv(&self) -> Result<serde_json::Value, TransportError> {
        let mut rx = self.incoming.lock().await;
        rx.recv().await.ok_or(TransportError::ConnectionClosed)
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::Relaxed)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
        self.incoming.lock().await.close();
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Loopback
    }
}
