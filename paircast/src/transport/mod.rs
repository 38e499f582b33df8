//! Transport layer abstraction for `Paircast`.
//!
//! Defines the [`Transport`] trait the ingestion loop drives. Concrete
//! implementations include:
//! - [`loopback::LoopbackHub`] endpoints: in-process broadcast for tests and offline runs
//! - [`relay::RelayTransport`]: WebSocket connection to a broadcast relay

pub mod loopback;
pub mod relay;

use std::fmt;

use paircast_proto::message::ChatMessage;

/// Describes which kind of transport is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportType {
    /// Relay server via WebSocket.
    Relay,
    /// In-process loopback.
    Loopback,
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Relay => write!(f, "Relay"),
            Self::Loopback => write!(f, "Loopback"),
        }
    }
}

/// Errors that can occur during transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection has been closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// The operation timed out before completing.
    #[error("transport operation timed out")]
    Timeout,

    /// The relay at the given address could not be reached.
    #[error("relay {0} is unreachable")]
    Unreachable(String),

    /// An underlying I/O error occurred.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer sent something that violates the relay protocol.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The encoded frame exceeds what the relay accepts.
    #[error("frame too large ({size} bytes, max {max} bytes)")]
    FrameTooLarge {
        /// Encoded frame size in bytes.
        size: usize,
        /// Largest accepted frame.
        max: usize,
    },

    /// The relay refused one of our frames.
    #[error("relay rejected frame: {0}")]
    Rejected(String),
}

/// Async broadcast transport.
///
/// A submitted message is delivered to every connected endpoint, the
/// submitter included. There is no acknowledgment: `Ok(())` from
/// [`Transport::submit`] only means the message was handed off.
///
/// [`Transport::recv`] yields raw delivered payloads. They are untrusted
/// and must be validated before ingestion.
pub trait Transport: Send + Sync {
    /// Submit a message for broadcast.
    fn submit(
        &self,
        msg: &ChatMessage,
    ) -> impl std::future::Future<Output = Result<(), TransportError>> + Send;

    /// Receive the next delivered payload.
    ///
    /// Blocks asynchronously until a delivery arrives. Returns
    /// [`TransportError::ConnectionClosed`] once no more can arrive, and
    /// [`TransportError::Rejected`] when the relay refused an earlier
    /// submission.
    fn recv(
        &self,
    ) -> impl std::future::Future<Output = Result<serde_json::Value, TransportError>> + Send;

    /// Check whether this transport is currently connected.
    fn is_connected(&self) -> bool;

    /// Return the type of this transport.
    fn transport_type(&self) -> TransportType;

    /// Shut the transport down. Later `recv` calls report
    /// [`TransportError::ConnectionClosed`].
    fn close(&self) -> impl std::future::Future<Output = ()> + Send {
        async {}
    }
}
