//! Relay server core: shared state, WebSocket handler, connection registry,
//! and broadcast fan-out.
//!
//! Every accepted WebSocket is registered under a fresh connection id and
//! immediately receives a [`RelayFrame::Welcome`]. Each [`RelayFrame::Submit`]
//! is re-emitted as a [`RelayFrame::Deliver`] to every registered connection,
//! the submitter included. Nothing is filtered, persisted, or acknowledged.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, Utf8Bytes, WebSocket};
use futures_util::{SinkExt, StreamExt};
use paircast_proto::relay::{self, RelayFrame};
use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use crate::config::DEFAULT_MAX_PAYLOAD_SIZE;

/// Server-assigned identifier for one WebSocket connection.
pub type ConnectionId = Uuid;

/// Shared relay server state holding the connection registry.
pub struct RelayState {
    /// Maps each live connection to the channel feeding its writer task.
    connections: RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<Message>>>,
    /// Maximum accepted frame size in bytes.
    max_payload_size: usize,
}

impl Default for RelayState {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayState {
    /// Creates a relay state with an empty registry and the default size limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(DEFAULT_MAX_PAYLOAD_SIZE)
    }

    /// Creates a relay state with a custom frame size limit.
    #[must_use]
    pub fn with_config(max_payload_size: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            max_payload_size,
        }
    }

    /// Registers a connection, storing the sender half of its message channel.
    pub async fn register(&self, id: ConnectionId, sender: mpsc::UnboundedSender<Message>) {
        self.connections.write().await.insert(id, sender);
    }

    /// Removes a connection from the registry, returning the sender if it existed.
    pub async fn unregister(&self, id: &ConnectionId) -> Option<mpsc::UnboundedSender<Message>> {
        self.connections.write().await.remove(id)
    }

    /// Number of currently registered connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Sends `frame` to every registered connection.
    ///
    /// Connections whose writer has gone away are unregistered. Returns the
    /// number of connections the frame was handed to.
    pub async fn broadcast(&self, frame: &RelayFrame) -> usize {
        let text: Utf8Bytes = match relay::encode(frame) {
            Ok(t) => t.into(),
            Err(e) => {
                tracing::error!(error = %e, "failed to encode broadcast frame");
                return 0;
            }
        };

        let mut delivered = 0;
        let mut dead = Vec::new();
        {
            let conns = self.connections.read().await;
            for (id, sender) in conns.iter() {
                if sender.send(Message::Text(text.clone())).is_ok() {
                    delivered += 1;
                } else {
                    dead.push(*id);
                }
            }
        }

        for id in dead {
            tracing::warn!(connection = %id, "fan-out failed, unregistering connection");
            self.unregister(&id).await;
        }

        delivered
    }

    /// Sends a frame to a single connection, if it is still registered.
    pub async fn send_to(&self, id: &ConnectionId, frame: &RelayFrame) {
        let Ok(text) = relay::encode(frame) else {
            return;
        };
        if let Some(sender) = self.connections.read().await.get(id) {
            let _ = sender.send(Message::Text(text.into()));
        }
    }

    /// Send a WebSocket Close frame to all connected clients.
    ///
    /// Each writer task forwards the close frame, which lets clients observe
    /// the disconnection. Used for graceful shutdown and testing.
    pub async fn close_all_connections(&self) {
        let conns = self.connections.read().await;
        for (id, sender) in conns.iter() {
            tracing::info!(connection = %id, "sending close frame");
            let _ = sender.send(Message::Close(None));
        }
    }
}

/// Handles an upgraded WebSocket connection.
///
/// The connection lifecycle:
/// 1. Register a fresh connection id for fan-out.
/// 2. Send `Welcome` so the client knows it is receiving broadcasts.
/// 3. Run the reader (submissions in) and writer (deliveries out) tasks.
/// 4. On disconnect, unregister.
pub async fn handle_socket(socket: WebSocket, state: Arc<RelayState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let id: ConnectionId = Uuid::now_v7();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    state.register(id, tx).await;

    tracing::info!(connection = %id, "client connected");

    let welcome = RelayFrame::Welcome {
        connection_id: id.to_string(),
    };
    if let Err(e) = send_frame(&mut ws_sender, &welcome).await {
        tracing::warn!(connection = %id, error = %e, "failed to send welcome");
        state.unregister(&id).await;
        return;
    }

    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if ws_sender.send(msg).await.is_err() {
                tracing::warn!(connection = %id, "WebSocket write failed");
                break;
            }
            if closing {
                break;
            }
        }
    });

    let reader_state = Arc::clone(&state);
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Text(text) => {
                    handle_text_frame(id, text.as_str(), &reader_state).await;
                }
                Message::Binary(data) => {
                    tracing::debug!(connection = %id, len = data.len(), "ignoring binary frame");
                }
                Message::Close(_) => {
                    tracing::info!(connection = %id, "received close frame");
                    break;
                }
                Message::Ping(_) | Message::Pong(_) => {}
            }
        }
    });

    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    state.unregister(&id).await;
    tracing::info!(connection = %id, "client disconnected");
}

/// Handles one text frame from a connected client.
async fn handle_text_frame(id: ConnectionId, text: &str, state: &RelayState) {
    if text.len() > state.max_payload_size {
        tracing::warn!(
            connection = %id,
            size = text.len(),
            max = state.max_payload_size,
            "frame exceeds size limit"
        );
        let err = RelayFrame::Error {
            reason: format!(
                "payload too large: {} bytes (max {})",
                text.len(),
                state.max_payload_size
            ),
        };
        state.send_to(&id, &err).await;
        return;
    }

    let frame = match relay::decode(text) {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!(connection = %id, error = %e, "failed to decode frame");
            let err = RelayFrame::Error {
                reason: format!("malformed frame: {e}"),
            };
            state.send_to(&id, &err).await;
            return;
        }
    };

    match frame {
        RelayFrame::Submit { message } => {
            let deliver = RelayFrame::Deliver { message };
            let fanout = state.broadcast(&deliver).await;
            tracing::debug!(connection = %id, fanout, "broadcast submitted message");
        }
        other => {
            tracing::warn!(connection = %id, frame = ?other, "unexpected frame type from client");
        }
    }
}

/// Encodes and sends a relay frame directly on a WebSocket sender.
async fn send_frame(
    ws_sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    frame: &RelayFrame,
) -> Result<(), String> {
    let text = relay::encode(frame).map_err(|e| e.to_string())?;
    ws_sender
        .send(Message::Text(text.into()))
        .await
        .map_err(|e| format!("WebSocket send error: {e}"))
}

/// Starts the relay server on the given address and returns the bound address
/// and a join handle.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(RelayState::new())).await
}

/// Starts the relay server with a pre-configured [`RelayState`].
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<RelayState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "relay server error");
        }
    });

    Ok((bound_addr, handle))
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler(
    ws: axum::extract::ws::WebSocketUpgrade,
    axum::extract::State(state): axum::extract::State<Arc<RelayState>>,
) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}
