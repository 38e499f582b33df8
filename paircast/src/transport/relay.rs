//! WebSocket relay transport for Paircast.
//!
//! Implements the [`Transport`] trait over a WebSocket connection to a
//! broadcast relay. Submitted messages travel as `submit` frames; every
//! `deliver` frame the relay emits is handed to [`Transport::recv`] with its
//! payload untouched.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use paircast_proto::message::ChatMessage;
use paircast_proto::relay::{self, MAX_FRAME_SIZE, RelayFrame};

use super::{Transport, TransportError, TransportType};

/// Type alias for the write half of a WebSocket connection.
type WsSender = futures_util::stream::SplitSink<
    WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

/// Type alias for the read half of a WebSocket connection.
type WsReader =
    futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;

/// What the reader task hands to [`Transport::recv`].
type Incoming = Result<serde_json::Value, TransportError>;

/// Default timeout for connecting to the relay server.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for waiting for the `welcome` frame from the server.
const WELCOME_TIMEOUT: Duration = Duration::from_secs(5);

/// Default capacity of the delivery channel between reader task and `recv`.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Tuning for [`RelayTransport::connect_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayOptions {
    /// Upper bound on establishing the WebSocket connection.
    pub connect_timeout: Duration,
    /// Buffered deliveries before the reader task waits for `recv`.
    pub channel_capacity: usize,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// WebSocket relay transport implementing the [`Transport`] trait.
///
/// Created via [`RelayTransport::connect`], which establishes the WebSocket
/// connection, waits until the relay has registered it for fan-out, and
/// spawns a background reader task. Dropping the transport or calling
/// [`Transport::close`] ends the connection.
pub struct RelayTransport {
    /// The relay server URL (ws:// or wss://).
    relay_url: String,
    /// Identifier the relay assigned to this connection.
    connection_id: String,
    /// Write half of the WebSocket connection (shared for concurrent sends).
    ws_sender: Arc<Mutex<WsSender>>,
    /// Deliveries and relay rejections from the background reader task.
    incoming: Mutex<mpsc::Receiver<Incoming>>,
    /// Whether the WebSocket connection to the relay is active.
    connected: Arc<AtomicBool>,
    /// Handle to the background reader task.
    reader_handle: tokio::task::JoinHandle<()>,
}

impl RelayTransport {
    /// Connect to a relay server with default options.
    ///
    /// # Errors
    ///
    /// See [`connect_with`](Self::connect_with).
    pub async fn connect(relay_url: &str) -> Result<Self, TransportError> {
        Self::connect_with(relay_url, RelayOptions::default()).await
    }

    /// Connect to a relay server.
    ///
    /// Performs the following steps:
    /// 1. Establishes a WebSocket connection to `relay_url`
    /// 2. Waits for the relay's `welcome` frame (5s timeout)
    /// 3. Spawns a background task to read deliveries
    ///
    /// # Errors
    ///
    /// - [`TransportError::Timeout`] if connection or welcome times out.
    /// - [`TransportError::Unreachable`] if the relay refuses the connection.
    /// - [`TransportError::Protocol`] if the relay answers with anything but `welcome`.
    /// - [`TransportError::Io`] for other WebSocket failures.
    pub async fn connect_with(
        relay_url: &str,
        options: RelayOptions,
    ) -> Result<Self, TransportError> {
        let (ws_stream, _response) =
            tokio::time::timeout(options.connect_timeout, connect_async(relay_url))
                .await
                .map_err(|_| {
                    tracing::warn!(url = relay_url, "relay WebSocket connect timed out");
                    TransportError::Timeout
                })?
                .map_err(|e| {
                    tracing::warn!(url = relay_url, err = %e, "relay WebSocket connect failed");
                    map_ws_connect_error(relay_url, e)
                })?;

        let (ws_sender, mut ws_reader) = ws_stream.split();

        let connection_id = await_welcome(&mut ws_reader, relay_url).await?;

        let (tx, rx) = mpsc::channel(options.channel_capacity.max(1));
        let connected = Arc::new(AtomicBool::new(true));
        let reader_handle = tokio::spawn(reader_loop(ws_reader, tx, Arc::clone(&connected)));

        Ok(Self {
            relay_url: relay_url.to_string(),
            connection_id,
            ws_sender: Arc::new(Mutex::new(ws_sender)),
            incoming: Mutex::new(rx),
            connected,
            reader_handle,
        })
    }

    /// Return the relay server URL this transport is connected to.
    #[must_use]
    pub fn relay_url(&self) -> &str {
        &self.relay_url
    }

    /// Return the identifier the relay assigned to this connection.
    #[must_use]
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }
}

impl Drop for RelayTransport {
    fn drop(&mut self) {
        self.reader_handle.abort();
    }
}

impl Transport for RelayTransport {
    /// Submit a message to the relay as a `submit` frame.
    ///
    /// # Errors
    ///
    /// - [`TransportError::ConnectionClosed`] if the relay connection is down.
    /// - [`TransportError::Protocol`] if the frame cannot be encoded.
    /// - [`TransportError::FrameTooLarge`] if the encoded frame exceeds
    ///   [`MAX_FRAME_SIZE`]; nothing is sent.
    async fn submit(&self, msg: &ChatMessage) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::Relaxed) {
            return Err(TransportError::ConnectionClosed);
        }

        let frame = RelayFrame::Submit {
            message: msg.to_event(),
        };
        let text = relay::encode(&frame).map_err(|e| TransportError::Protocol(e.to_string()))?;
        if text.len() > MAX_FRAME_SIZE {
            return Err(TransportError::FrameTooLarge {
                size: text.len(),
                max: MAX_FRAME_SIZE,
            });
        }

        let mut sender = self.ws_sender.lock().await;
        sender.send(Message::Text(text.into())).await.map_err(|e| {
            tracing::warn!(err = %e, "relay submit failed");
            self.connected.store(false, Ordering::Relaxed);
            TransportError::ConnectionClosed
        })?;

        Ok(())
    }

    /// Receive the next delivered payload.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Rejected`] for an `error` frame from the
    /// relay, and [`TransportError::ConnectionClosed`] once the reader task
    /// has exited and every buffered delivery has been consumed.
    async fn recv(&self) -> Result<serde_json::Value, TransportError> {
        let mut rx = self.incoming.lock().await;
        rx.recv().await.ok_or(TransportError::ConnectionClosed)?
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Close the connection.
    ///
    /// Sends a close frame, stops the reader task and marks the transport
    /// disconnected. Pending `recv` calls return
    /// [`TransportError::ConnectionClosed`]. Calling `close` twice is harmless.
    async fn close(&self) {
        if !self.connected.swap(false, Ordering::Relaxed) {
            self.reader_handle.abort();
            return;
        }
        let mut sender = self.ws_sender.lock().await;
        if let Err(e) = sender.send(Message::Close(None)).await {
            tracing::debug!(err = %e, "relay close frame not sent");
        }
        drop(sender);
        self.reader_handle.abort();
        tracing::info!(url = %self.relay_url, "relay connection closed");
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Relay
    }
}

/// Wait for the relay's `welcome` frame and return the connection id.
async fn await_welcome(ws_reader: &mut WsReader, relay_url: &str) -> Result<String, TransportError> {
    let first = tokio::time::timeout(WELCOME_TIMEOUT, ws_reader.next())
        .await
        .map_err(|_| {
            tracing::warn!(url = relay_url, "relay welcome timed out");
            TransportError::Timeout
        })?;

    match first {
        Some(Ok(Message::Text(text))) => match relay::decode(text.as_str()) {
            Ok(RelayFrame::Welcome { connection_id }) => {
                tracing::info!(
                    connection_id = %connection_id,
                    url = relay_url,
                    "connected to relay server"
                );
                Ok(connection_id)
            }
            Ok(RelayFrame::Error { reason }) => {
                tracing::warn!(reason = %reason, "relay rejected connection");
                Err(TransportError::Protocol(format!("relay rejected connection: {reason}")))
            }
            Ok(other) => {
                tracing::warn!(?other, "unexpected relay frame before welcome");
                Err(TransportError::Protocol("unexpected frame before welcome".into()))
            }
            Err(e) => {
                tracing::warn!(err = %e, "malformed relay welcome");
                Err(TransportError::Protocol(format!("malformed welcome: {e}")))
            }
        },
        Some(Ok(Message::Close(_))) | None => {
            tracing::warn!("relay closed connection before welcome");
            Err(TransportError::ConnectionClosed)
        }
        Some(Ok(_)) => Err(TransportError::Protocol(
            "unexpected non-text frame before welcome".into(),
        )),
        Some(Err(e)) => Err(TransportError::Io(std::io::Error::other(format!(
            "WebSocket error before welcome: {e}"
        )))),
    }
}

/// Background task that reads relay frames and forwards deliveries and
/// relay `error` frames.
///
/// Malformed frames are logged and skipped; the task does not disconnect on
/// bad data. Sets `connected` to `false` when the WebSocket closes or errors.
async fn reader_loop(
    mut ws_reader: WsReader,
    tx: mpsc::Sender<Incoming>,
    connected: Arc<AtomicBool>,
) {
    while let Some(msg_result) = ws_reader.next().await {
        match msg_result {
            Ok(Message::Text(text)) => match relay::decode(text.as_str()) {
                Ok(RelayFrame::Deliver { message }) => {
                    if tx.send(Ok(message)).await.is_err() {
                        // Receiver dropped: transport was dropped.
                        break;
                    }
                }
                Ok(RelayFrame::Error { reason }) => {
                    tracing::warn!(reason = %reason, "relay server error");
                    if tx.send(Err(TransportError::Rejected(reason))).await.is_err() {
                        break;
                    }
                }
                Ok(other) => {
                    tracing::debug!(?other, "unexpected relay frame type");
                }
                Err(e) => {
                    tracing::warn!(err = %e, "malformed relay frame, skipping");
                }
            },
            Ok(Message::Close(_)) => {
                tracing::info!("relay WebSocket closed by server");
                break;
            }
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_)) => {}
            Err(e) => {
                tracing::warn!(err = %e, "relay WebSocket read error");
                break;
            }
        }
    }
    connected.store(false, Ordering::Relaxed);
    tracing::info!("relay reader task exiting");
}

/// Map a `tokio_tungstenite` connection error to a [`TransportError`].
fn map_ws_connect_error(url: &str, err: tokio_tungstenite::tungstenite::Error) -> TransportError {
    use tokio_tungstenite::tungstenite::Error as WsError;
    match err {
        WsError::Io(io_err) => {
            if io_err.kind() == std::io::ErrorKind::ConnectionRefused
                || io_err.kind() == std::io::ErrorKind::AddrNotAvailable
            {
                TransportError::Unreachable(url.to_string())
            } else {
                TransportError::Io(io_err)
            }
        }
        WsError::Http(response) => TransportError::Io(std::io::Error::other(format!(
            "relay HTTP error: status {}",
            response.status()
        ))),
        other => TransportError::Io(std::io::Error::other(format!(
            "relay connection error: {other}"
        ))),
    }
}
