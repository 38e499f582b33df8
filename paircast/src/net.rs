//! Networking coordinator between the presentation loop and a transport.
//!
//! The presentation loop and the ingestion task share one
//! [`ChatSession`] behind a `parking_lot::Mutex`. Outgoing messages are
//! composed synchronously on the session, then handed to the background
//! task as [`NetCommand::Submit`]; deliveries from the transport are
//! validated, ingested and announced as [`NetEvent`]s.
//!
//! # Architecture
//!
//! ```text
//! presentation  ── NetCommand ─→  run_net(&transport)  ─→  relay
//!       ↑                             │
//!       └──────── NetEvent ───────────┘  (session.ingest under lock)
//! ```

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use paircast_proto::message::ChatMessage;

use crate::chat::ChatSession;
use crate::chat::history::KeyValueStore;
use crate::transport::relay::{RelayOptions, RelayTransport};
use crate::transport::{Transport, TransportError, TransportType};

/// A session shared between the presentation loop and the ingestion task.
pub type SharedSession<S> = Arc<Mutex<ChatSession<S>>>;

/// Commands sent from the presentation loop to the networking task.
#[derive(Debug)]
pub enum NetCommand {
    /// Submit a composed message for broadcast.
    Submit(ChatMessage),
    /// Gracefully shut down the networking task.
    Shutdown,
}

/// Events sent from the networking task to the presentation loop.
#[derive(Debug)]
pub enum NetEvent {
    /// A delivered message was new and has been stored.
    MessageIngested(ChatMessage),
    /// Connection status update.
    ConnectionStatus {
        /// Whether the transport is connected.
        connected: bool,
        /// Which transport is in use.
        transport_type: TransportType,
    },
    /// An error occurred in the networking layer.
    Error(String),
}

/// Configuration for the networking layer.
#[derive(Debug, Clone)]
pub struct NetConfig {
    /// WebSocket URL of the relay server (e.g., `ws://127.0.0.1:4000/ws`).
    pub relay_url: String,
    /// Timeout for establishing the relay connection.
    pub connect_timeout: Duration,
    /// Channel capacity for command/event mpsc channels.
    pub channel_capacity: usize,
}

/// Default channel capacity for commands and events.
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

impl NetConfig {
    /// Creates a `NetConfig` with default timeouts and capacities.
    #[must_use]
    pub const fn new(relay_url: String) -> Self {
        Self {
            relay_url,
            connect_timeout: crate::transport::relay::CONNECT_TIMEOUT,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Handles for talking to a spawned networking task.
pub struct NetHandle {
    /// Command channel into the task.
    pub commands: mpsc::Sender<NetCommand>,
    /// Event channel out of the task.
    pub events: mpsc::Receiver<NetEvent>,
    /// The task itself; completes after shutdown or disconnect.
    pub task: tokio::task::JoinHandle<()>,
}

/// Connect to the relay described by `config`.
///
/// # Errors
///
/// Returns [`TransportError`] if the relay cannot be reached or does not
/// complete the welcome handshake.
pub async fn connect_relay(config: &NetConfig) -> Result<RelayTransport, TransportError> {
    RelayTransport::connect_with(
        &config.relay_url,
        RelayOptions {
            connect_timeout: config.connect_timeout,
            channel_capacity: config.channel_capacity,
        },
    )
    .await
}

/// Spawn the networking task over `transport` and return its handles.
///
/// The task owns the transport, drives [`run_net`] with a reference to it,
/// and closes it when the loop ends.
pub fn spawn_net<T, S>(transport: T, session: SharedSession<S>, channel_capacity: usize) -> NetHandle
where
    T: Transport + 'static,
    S: KeyValueStore + 'static,
{
    let capacity = channel_capacity.max(1);
    let (cmd_tx, cmd_rx) = mpsc::channel::<NetCommand>(capacity);
    let (evt_tx, evt_rx) = mpsc::channel::<NetEvent>(capacity);

    let task = tokio::spawn(async move {
        let _ = evt_tx
            .send(NetEvent::ConnectionStatus {
                connected: transport.is_connected(),
                transport_type: transport.transport_type(),
            })
            .await;
        run_net(&transport, &session, cmd_rx, &evt_tx).await;
        transport.close().await;
    });

    NetHandle {
        commands: cmd_tx,
        events: evt_rx,
        task,
    }
}

/// Drive one transport until shutdown or disconnect.
///
/// Submits commanded messages and ingests every delivery into `session`.
/// Malformed deliveries are logged and dropped. Returns when a
/// [`NetCommand::Shutdown`] arrives, the command channel closes, or the
/// transport reports [`TransportError::ConnectionClosed`].
pub async fn run_net<T, S>(
    transport: &T,
    session: &SharedSession<S>,
    mut cmd_rx: mpsc::Receiver<NetCommand>,
    evt_tx: &mpsc::Sender<NetEvent>,
) where
    T: Transport,
    S: KeyValueStore,
{
    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(NetCommand::Submit(msg)) => {
                    if let Err(e) = transport.submit(&msg).await {
                        tracing::warn!(error = %e, "submit failed");
                        let _ = evt_tx.send(NetEvent::Error(format!("Send failed: {e}"))).await;
                    }
                }
                Some(NetCommand::Shutdown) | None => {
                    tracing::info!("net task shutting down");
                    break;
                }
            },
            delivery = transport.recv() => match delivery {
                Ok(payload) => {
                    if let Some(msg) = ingest_delivery(session, &payload)
                        && evt_tx.send(NetEvent::MessageIngested(msg)).await.is_err()
                    {
                        // Presentation dropped; exit.
                        break;
                    }
                }
                Err(TransportError::ConnectionClosed) => {
                    tracing::warn!(transport = %transport.transport_type(), "transport closed");
                    let _ = evt_tx
                        .send(NetEvent::ConnectionStatus {
                            connected: false,
                            transport_type: transport.transport_type(),
                        })
                        .await;
                    break;
                }
                Err(TransportError::Rejected(reason)) => {
                    let _ = evt_tx
                        .send(NetEvent::Error(format!("Relay rejected message: {reason}")))
                        .await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "receive error");
                    let _ = evt_tx.send(NetEvent::Error(format!("Receive error: {e}"))).await;
                }
            },
        }
    }
}

/// Validate and ingest one delivery. Returns the message if it was new.
fn ingest_delivery<S: KeyValueStore>(
    session: &SharedSession<S>,
    payload: &serde_json::Value,
) -> Option<ChatMessage> {
    session.lock().receive_event(payload).ok().flatten()
}
